use crate::{
    db::DbPool,
    entities::{
        document_sequence::DocumentKind,
        invoice::{self, InvoiceStatus},
        invoice_item,
        ledger_entry::LedgerSourceType,
        order::OrderStatus,
        payment,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        branches::load_branch,
        customers::load_customer,
        fetch_page,
        ledger::{post_entry, NewLedgerEntry},
        numbering::next_number,
        optional_text,
        orders::{load_order, order_items},
        pricing::{apply_totals, price_document, resolve_place_of_supply, LineItemInput},
        search_condition,
        validators::validate_state_code,
        PageRequest,
    },
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateInvoiceRequest {
    pub customer_id: Uuid,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    #[validate(custom = "validate_state_code")]
    pub place_of_supply: Option<String>,
    pub notes: Option<String>,
    pub items: Vec<LineItemInput>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct InvoiceFromOrderRequest {
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateInvoiceRequest {
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct InvoiceFilter {
    pub status: Option<InvoiceStatus>,
    pub customer_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InvoiceDetail {
    pub invoice: invoice::Model,
    pub items: Vec<invoice_item::Model>,
}

struct NewInvoice {
    branch_id: Uuid,
    customer_id: Uuid,
    order_id: Option<Uuid>,
    invoice_date: NaiveDate,
    due_date: Option<NaiveDate>,
    place_of_supply: String,
    notes: Option<String>,
    created_by: Uuid,
    items: Vec<LineItemInput>,
}

fn check_due_date(invoice_date: NaiveDate, due_date: Option<NaiveDate>) -> Result<(), ServiceError> {
    if due_date.is_some_and(|due| due < invoice_date) {
        return Err(ServiceError::invalid_field(
            "due_date",
            "due date cannot precede the invoice date",
        ));
    }
    Ok(())
}

pub async fn load_invoice<C>(conn: &C, branch_id: Uuid, invoice_id: Uuid) -> Result<invoice::Model, ServiceError>
where
    C: ConnectionTrait,
{
    invoice::Entity::find_by_id(invoice_id)
        .filter(invoice::Column::BranchId.eq(branch_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Invoice", invoice_id))
}

async fn invoice_items<C>(conn: &C, invoice_id: Uuid) -> Result<Vec<invoice_item::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    Ok(invoice_item::Entity::find()
        .filter(invoice_item::Column::InvoiceId.eq(invoice_id))
        .order_by_asc(invoice_item::Column::LineNo)
        .all(conn)
        .await?)
}

async fn insert_invoice<C>(conn: &C, branch_state: &str, new: NewInvoice) -> Result<InvoiceDetail, ServiceError>
where
    C: ConnectionTrait,
{
    check_due_date(new.invoice_date, new.due_date)?;
    let priced = price_document(&new.items, &new.place_of_supply, branch_state)?;
    let invoice_number = next_number(conn, new.branch_id, DocumentKind::Invoice).await?;
    let invoice_id = Uuid::new_v4();
    let now = Utc::now();

    let mut header = invoice::ActiveModel {
        id: Set(invoice_id),
        branch_id: Set(new.branch_id),
        invoice_number: Set(invoice_number),
        customer_id: Set(new.customer_id),
        order_id: Set(new.order_id),
        status: Set(InvoiceStatus::Draft),
        invoice_date: Set(new.invoice_date),
        due_date: Set(new.due_date),
        place_of_supply: Set(new.place_of_supply),
        amount_paid: Set(Decimal::ZERO),
        balance_due: Set(priced.totals.grand_total),
        notes: Set(optional_text(new.notes)),
        created_by: Set(new.created_by),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    apply_totals!(header, priced.totals);
    let invoice = header.insert(conn).await.map_err(|e| {
        error!(error = %e, %invoice_id, "Failed to insert invoice");
        ServiceError::DatabaseError(e)
    })?;

    invoice_item::Entity::insert_many(priced.lines.iter().map(|line| line.invoice_item(invoice_id)))
        .exec_without_returning(conn)
        .await
        .map_err(|e| {
            error!(error = %e, %invoice_id, "Failed to insert invoice items");
            ServiceError::DatabaseError(e)
        })?;

    let items = invoice_items(conn, invoice_id).await?;
    Ok(InvoiceDetail { invoice, items })
}

/// Status for an invoice after its paid amount changed.
pub fn settlement_status(grand_total: Decimal, amount_paid: Decimal) -> InvoiceStatus {
    if amount_paid <= Decimal::ZERO {
        InvoiceStatus::Issued
    } else if amount_paid >= grand_total {
        InvoiceStatus::Paid
    } else {
        InvoiceStatus::PartiallyPaid
    }
}

/// Tax invoices, issue and cancellation with their ledger postings
#[derive(Clone)]
pub struct InvoiceService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl InvoiceService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    #[instrument(skip(self))]
    pub async fn list_invoices(
        &self,
        branch_id: Uuid,
        filter: InvoiceFilter,
        page: PageRequest,
    ) -> Result<(Vec<invoice::Model>, u64), ServiceError> {
        let mut select = invoice::Entity::find()
            .filter(invoice::Column::BranchId.eq(branch_id))
            .order_by_desc(invoice::Column::InvoiceDate)
            .order_by_desc(invoice::Column::CreatedAt);
        if let Some(status) = filter.status {
            select = select.filter(invoice::Column::Status.eq(status));
        }
        if let Some(customer_id) = filter.customer_id {
            select = select.filter(invoice::Column::CustomerId.eq(customer_id));
        }
        if let Some(order_id) = filter.order_id {
            select = select.filter(invoice::Column::OrderId.eq(order_id));
        }
        if let Some(term) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
            select = select.filter(search_condition(&[invoice::Column::InvoiceNumber], term));
        }
        fetch_page(&self.db_pool, select, page).await
    }

    #[instrument(skip(self))]
    pub async fn get_invoice(&self, branch_id: Uuid, invoice_id: Uuid) -> Result<InvoiceDetail, ServiceError> {
        let db = &*self.db_pool;
        let invoice = load_invoice(db, branch_id, invoice_id).await?;
        let items = invoice_items(db, invoice_id).await?;
        Ok(InvoiceDetail { invoice, items })
    }

    /// Direct invoice, created as a draft.
    #[instrument(skip(self, request), fields(customer_id = %request.customer_id))]
    pub async fn create_invoice(
        &self,
        branch_id: Uuid,
        created_by: Uuid,
        request: CreateInvoiceRequest,
    ) -> Result<InvoiceDetail, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for invoice creation");
            ServiceError::DatabaseError(e)
        })?;

        let branch = load_branch(&txn, branch_id).await?;
        let customer = load_customer(&txn, branch_id, request.customer_id).await?;
        let detail = insert_invoice(
            &txn,
            &branch.state_code,
            NewInvoice {
                branch_id,
                customer_id: customer.id,
                order_id: None,
                invoice_date: request.invoice_date.unwrap_or_else(|| Utc::now().date_naive()),
                due_date: request.due_date,
                place_of_supply: resolve_place_of_supply(
                    request.place_of_supply.as_deref(),
                    customer.state_code.as_deref(),
                    &branch.state_code,
                ),
                notes: request.notes,
                created_by,
                items: request.items,
            },
        )
        .await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit invoice creation");
            ServiceError::DatabaseError(e)
        })?;

        info!(invoice_id = %detail.invoice.id, number = %detail.invoice.invoice_number, "invoice created");
        self.event_sender
            .send_or_log(Event::created(branch_id, "invoices", detail.invoice.id))
            .await;
        Ok(detail)
    }

    /// Copies an order's lines into a draft invoice. An order carries at most
    /// one invoice that is not cancelled.
    #[instrument(skip(self, request))]
    pub async fn create_from_order(
        &self,
        branch_id: Uuid,
        order_id: Uuid,
        created_by: Uuid,
        request: InvoiceFromOrderRequest,
    ) -> Result<InvoiceDetail, ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order invoicing");
            ServiceError::DatabaseError(e)
        })?;

        let order = load_order(&txn, branch_id, order_id).await?;
        if order.status == OrderStatus::Cancelled {
            return Err(ServiceError::InvalidStatus(format!(
                "order {} is cancelled",
                order.order_number
            )));
        }
        let existing = invoice::Entity::find()
            .filter(invoice::Column::OrderId.eq(order_id))
            .filter(invoice::Column::Status.ne(InvoiceStatus::Cancelled))
            .one(&txn)
            .await?;
        if let Some(existing) = existing {
            return Err(ServiceError::Conflict(format!(
                "order {} is already invoiced as {}",
                order.order_number, existing.invoice_number
            )));
        }

        let branch = load_branch(&txn, branch_id).await?;
        let items = order_items(&txn, order_id).await?;
        let detail = insert_invoice(
            &txn,
            &branch.state_code,
            NewInvoice {
                branch_id,
                customer_id: order.customer_id,
                order_id: Some(order_id),
                invoice_date: request.invoice_date.unwrap_or_else(|| Utc::now().date_naive()),
                due_date: request.due_date,
                place_of_supply: order.place_of_supply.clone(),
                notes: request.notes.or(order.notes.clone()),
                created_by,
                items: items.iter().map(LineItemInput::from).collect(),
            },
        )
        .await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, %order_id, "Failed to commit order invoicing");
            ServiceError::DatabaseError(e)
        })?;

        info!(%order_id, invoice_id = %detail.invoice.id, "invoice generated from order");
        self.event_sender
            .send_or_log(Event::created(branch_id, "invoices", detail.invoice.id))
            .await;
        Ok(detail)
    }

    #[instrument(skip(self, request))]
    pub async fn update_invoice(
        &self,
        branch_id: Uuid,
        invoice_id: Uuid,
        request: UpdateInvoiceRequest,
    ) -> Result<invoice::Model, ServiceError> {
        let db = &*self.db_pool;
        let existing = load_invoice(db, branch_id, invoice_id).await?;
        if existing.status == InvoiceStatus::Cancelled {
            return Err(ServiceError::InvalidStatus("cancelled invoices cannot be edited".into()));
        }
        check_due_date(existing.invoice_date, request.due_date)?;

        let mut active = existing.into_active_model();
        if request.due_date.is_some() {
            active.due_date = Set(request.due_date);
        }
        if request.notes.is_some() {
            active.notes = Set(optional_text(request.notes));
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(db).await?;
        self.event_sender
            .send_or_log(Event::updated(branch_id, "invoices", invoice_id))
            .await;
        Ok(updated)
    }

    /// Draft → issued; posts the grand total as a ledger debit.
    #[instrument(skip(self))]
    pub async fn issue_invoice(
        &self,
        branch_id: Uuid,
        invoice_id: Uuid,
        issued_by: Uuid,
    ) -> Result<invoice::Model, ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for invoice issue");
            ServiceError::DatabaseError(e)
        })?;

        let existing = load_invoice(&txn, branch_id, invoice_id).await?;
        if existing.status != InvoiceStatus::Draft {
            return Err(ServiceError::InvalidStatus(format!(
                "only draft invoices can be issued; {} is {}",
                existing.invoice_number, existing.status
            )));
        }

        post_entry(
            &txn,
            NewLedgerEntry {
                branch_id,
                customer_id: existing.customer_id,
                entry_date: existing.invoice_date,
                description: format!("Invoice {}", existing.invoice_number),
                debit: existing.grand_total,
                credit: Decimal::ZERO,
                source_type: LedgerSourceType::Invoice,
                source_id: Some(invoice_id),
                created_by: issued_by,
            },
        )
        .await?;

        let amount = existing.grand_total;
        let mut active = existing.into_active_model();
        active.status = Set(InvoiceStatus::Issued);
        active.balance_due = Set(amount);
        active.updated_at = Set(Utc::now());
        let issued = active.update(&txn).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, %invoice_id, "Failed to commit invoice issue");
            ServiceError::DatabaseError(e)
        })?;

        info!(%invoice_id, %amount, "invoice issued");
        self.event_sender
            .send_or_log(Event::InvoiceIssued {
                branch_id,
                invoice_id,
                amount,
            })
            .await;
        Ok(issued)
    }

    /// Cancels a draft, or an issued invoice with no payments. Issued
    /// invoices get a reversing credit.
    #[instrument(skip(self))]
    pub async fn cancel_invoice(
        &self,
        branch_id: Uuid,
        invoice_id: Uuid,
        cancelled_by: Uuid,
    ) -> Result<invoice::Model, ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for invoice cancellation");
            ServiceError::DatabaseError(e)
        })?;

        let existing = load_invoice(&txn, branch_id, invoice_id).await?;
        if !matches!(existing.status, InvoiceStatus::Draft | InvoiceStatus::Issued) {
            return Err(ServiceError::InvalidStatus(format!(
                "{} invoices cannot be cancelled",
                existing.status
            )));
        }
        let payments = payment::Entity::find()
            .filter(payment::Column::InvoiceId.eq(invoice_id))
            .count(&txn)
            .await?;
        if payments > 0 {
            return Err(ServiceError::Conflict(format!(
                "invoice {} has recorded payments",
                existing.invoice_number
            )));
        }

        if existing.status == InvoiceStatus::Issued {
            post_entry(
                &txn,
                NewLedgerEntry {
                    branch_id,
                    customer_id: existing.customer_id,
                    entry_date: Utc::now().date_naive(),
                    description: format!("Cancellation of invoice {}", existing.invoice_number),
                    debit: Decimal::ZERO,
                    credit: existing.grand_total,
                    source_type: LedgerSourceType::Reversal,
                    source_id: Some(invoice_id),
                    created_by: cancelled_by,
                },
            )
            .await?;
        }

        let mut active = existing.into_active_model();
        active.status = Set(InvoiceStatus::Cancelled);
        active.balance_due = Set(Decimal::ZERO);
        active.updated_at = Set(Utc::now());
        let cancelled = active.update(&txn).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, %invoice_id, "Failed to commit invoice cancellation");
            ServiceError::DatabaseError(e)
        })?;

        info!(%invoice_id, "invoice cancelled");
        self.event_sender
            .send_or_log(Event::updated(branch_id, "invoices", invoice_id))
            .await;
        Ok(cancelled)
    }

    /// Issued or partially paid invoices past their due date.
    #[instrument(skip(self))]
    pub async fn overdue_invoices(&self, branch_id: Uuid, today: NaiveDate) -> Result<Vec<invoice::Model>, ServiceError> {
        Ok(invoice::Entity::find()
            .filter(invoice::Column::BranchId.eq(branch_id))
            .filter(invoice::Column::Status.is_in([InvoiceStatus::Issued, InvoiceStatus::PartiallyPaid]))
            .filter(invoice::Column::DueDate.lt(today))
            .order_by_asc(invoice::Column::DueDate)
            .all(&*self.db_pool)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::services::ledger::customer_balance;
    use crate::services::orders::{CreateOrderRequest, OrderService};
    use crate::services::testing::{event_sender, seed_branch, seed_customer};
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn item() -> LineItemInput {
        LineItemInput {
            name: "Conveyor belt".into(),
            description: None,
            hsn_code: None,
            quantity: dec!(1),
            unit: None,
            unit_price: dec!(10000),
            discount_percent: dec!(0),
            gst_rate: dec!(18),
        }
    }

    fn direct(customer_id: Uuid, due: Option<NaiveDate>) -> CreateInvoiceRequest {
        CreateInvoiceRequest {
            customer_id,
            invoice_date: NaiveDate::from_ymd_opt(2024, 8, 1),
            due_date: due,
            place_of_supply: None,
            notes: None,
            items: vec![item()],
        }
    }

    #[tokio::test]
    async fn issue_and_cancel_post_to_ledger() {
        let db = Arc::new(memory_pool().await);
        let branch = seed_branch(&db, "INA", "27").await;
        let customer = seed_customer(&db, branch.id, "Acme", Some("27")).await;
        let service = InvoiceService::new(db.clone(), event_sender());
        let user = Uuid::new_v4();

        let draft = service.create_invoice(branch.id, user, direct(customer.id, None)).await.unwrap();
        assert_eq!(draft.invoice.invoice_number, "INV-00001");
        assert_eq!(draft.invoice.status, InvoiceStatus::Draft);
        assert_eq!(customer_balance(&*db, customer.id).await.unwrap(), Decimal::ZERO);

        let issued = service.issue_invoice(branch.id, draft.invoice.id, user).await.unwrap();
        assert_eq!(issued.status, InvoiceStatus::Issued);
        assert_eq!(customer_balance(&*db, customer.id).await.unwrap().round_dp(2), dec!(11800.00));

        assert_matches!(
            service.issue_invoice(branch.id, draft.invoice.id, user).await,
            Err(ServiceError::InvalidStatus(_))
        );

        service.cancel_invoice(branch.id, draft.invoice.id, user).await.unwrap();
        assert_eq!(customer_balance(&*db, customer.id).await.unwrap().round_dp(2), dec!(0.00));
    }

    #[tokio::test]
    async fn one_live_invoice_per_order() {
        let db = Arc::new(memory_pool().await);
        let branch = seed_branch(&db, "INB", "27").await;
        let customer = seed_customer(&db, branch.id, "Acme", Some("27")).await;
        let user = Uuid::new_v4();
        let order = OrderService::new(db.clone(), event_sender())
            .create_order(
                branch.id,
                user,
                CreateOrderRequest {
                    customer_id: customer.id,
                    order_date: None,
                    expected_delivery: None,
                    place_of_supply: None,
                    notes: Some("urgent".into()),
                    items: vec![item()],
                },
            )
            .await
            .unwrap();
        let service = InvoiceService::new(db.clone(), event_sender());

        let first = service
            .create_from_order(branch.id, order.order.id, user, InvoiceFromOrderRequest::default())
            .await
            .unwrap();
        assert_eq!(first.invoice.order_id, Some(order.order.id));
        assert_eq!(first.invoice.grand_total, order.order.grand_total);
        assert_eq!(first.invoice.notes.as_deref(), Some("urgent"));

        assert_matches!(
            service
                .create_from_order(branch.id, order.order.id, user, InvoiceFromOrderRequest::default())
                .await,
            Err(ServiceError::Conflict(_))
        );

        service.cancel_invoice(branch.id, first.invoice.id, user).await.unwrap();
        assert!(service
            .create_from_order(branch.id, order.order.id, user, InvoiceFromOrderRequest::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn overdue_lists_unpaid_past_due() {
        let db = Arc::new(memory_pool().await);
        let branch = seed_branch(&db, "INC", "27").await;
        let customer = seed_customer(&db, branch.id, "Acme", None).await;
        let service = InvoiceService::new(db.clone(), event_sender());
        let user = Uuid::new_v4();

        let past_due = service
            .create_invoice(branch.id, user, direct(customer.id, NaiveDate::from_ymd_opt(2024, 8, 15)))
            .await
            .unwrap();
        service.issue_invoice(branch.id, past_due.invoice.id, user).await.unwrap();
        // still a draft, so never overdue
        service
            .create_invoice(branch.id, user, direct(customer.id, NaiveDate::from_ymd_opt(2024, 8, 10)))
            .await
            .unwrap();

        let overdue = service
            .overdue_invoices(branch.id, NaiveDate::from_ymd_opt(2024, 9, 1).unwrap())
            .await
            .unwrap();
        assert_eq!(overdue.iter().map(|i| i.id).collect::<Vec<_>>(), vec![past_due.invoice.id]);

        assert_matches!(
            service
                .create_invoice(branch.id, user, direct(customer.id, NaiveDate::from_ymd_opt(2024, 7, 1)))
                .await,
            Err(ServiceError::InvalidField { field, .. }) if field == "due_date"
        );
    }

    #[test]
    fn settlement_follows_paid_amount() {
        assert_eq!(settlement_status(dec!(100), dec!(0)), InvoiceStatus::Issued);
        assert_eq!(settlement_status(dec!(100), dec!(40)), InvoiceStatus::PartiallyPaid);
        assert_eq!(settlement_status(dec!(100), dec!(100)), InvoiceStatus::Paid);
    }
}
