// Organisation
pub mod branches;
pub mod profiles;

// Sales
pub mod customers;
pub mod lead_assignment;
pub mod lead_sync;
pub mod leads;

// Documents and money
pub mod invoices;
pub mod ledger;
pub mod numbering;
pub mod orders;
pub mod payments;
pub mod pricing;
pub mod quotations;

// HR
pub mod employees;
pub mod leave;
pub mod payroll;

// Procurement and dispatch
pub mod procurement;
pub mod shipments;
pub mod vendors;

// External collaborators
pub mod functions;
pub mod storage;

pub mod validators;

#[cfg(test)]
pub(crate) mod testing;

use crate::errors::ServiceError;
use sea_orm::{
    sea_query::{Expr, Func},
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, Select,
};

/// Normalised page coordinates; `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub limit: u64,
}

impl PageRequest {
    pub fn new(page: u64, limit: u64, max_limit: u64) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, max_limit.max(1)),
        }
    }

    pub fn total_pages(&self, total: u64) -> u64 {
        if total == 0 {
            0
        } else {
            (total + self.limit - 1) / self.limit
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, limit: 20 }
    }
}

/// Runs a counted, paged query.
pub async fn fetch_page<E>(
    db: &DatabaseConnection,
    select: Select<E>,
    page: PageRequest,
) -> Result<(Vec<E::Model>, u64), ServiceError>
where
    E: EntityTrait,
    E::Model: Send + Sync,
{
    let paginator = select.paginate(db, page.limit);
    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(page.page - 1).await?;
    Ok((items, total))
}

/// Case-insensitive substring match on any of `columns`.
pub fn search_condition<C>(columns: &[C], term: &str) -> Condition
where
    C: ColumnTrait,
{
    let pattern = format!("%{}%", term.trim().to_lowercase());
    columns.iter().fold(Condition::any(), |cond, col| {
        cond.add(Expr::expr(Func::lower(Expr::col(*col))).like(pattern.clone()))
    })
}

/// Trims optional free text; blank input becomes `None`.
pub fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_request_is_clamped() {
        let page = PageRequest::new(0, 500, 100);
        assert_eq!(page, PageRequest { page: 1, limit: 100 });
        assert_eq!(page.total_pages(0), 0);
        assert_eq!(page.total_pages(101), 2);
        assert_eq!(PageRequest::new(3, 0, 100).limit, 1);
    }

    #[test]
    fn blank_text_is_dropped() {
        assert_eq!(optional_text(Some("  ".into())), None);
        assert_eq!(optional_text(Some(" Pune ".into())).as_deref(), Some("Pune"));
        assert_eq!(optional_text(None), None);
    }
}
