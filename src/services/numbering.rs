//! Per-branch document numbers backed by the `document_sequences` table.
//!
//! Numbers are reserved with a compare-and-swap update on the sequence row,
//! so two concurrent creates never receive the same value. Call
//! [`next_number`] on the same transaction that inserts the document.

use crate::entities::{
    document_sequence::{self, DocumentKind},
    invoice, order, purchase_order, quotation, shipment,
};
use crate::errors::ServiceError;
use chrono::Utc;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect, Set,
};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Upper bound on CAS retries before giving up with a conflict.
pub const MAX_ATTEMPTS: usize = 8;

pub fn format_number(kind: DocumentKind, value: i64) -> String {
    format!("{}-{:05}", kind.prefix(), value)
}

/// Trailing decimal digits of a document number (`"QT-2024-0012"` → 12).
pub fn parse_trailing_number(number: &str) -> Option<i64> {
    let digits = number
        .bytes()
        .rev()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits == 0 {
        return None;
    }
    number[number.len() - digits..].parse().ok()
}

/// Reserves and formats the next number for `kind` in `branch_id`.
#[instrument(skip(conn))]
pub async fn next_number<C>(
    conn: &C,
    branch_id: Uuid,
    kind: DocumentKind,
) -> Result<String, ServiceError>
where
    C: ConnectionTrait,
{
    for attempt in 0..MAX_ATTEMPTS {
        let current = document_sequence::Entity::find()
            .filter(document_sequence::Column::BranchId.eq(branch_id))
            .filter(document_sequence::Column::Kind.eq(kind))
            .one(conn)
            .await?;

        let Some(sequence) = current else {
            seed_sequence(conn, branch_id, kind).await?;
            continue;
        };

        let value = sequence.next_value;
        let result = document_sequence::Entity::update_many()
            .col_expr(document_sequence::Column::NextValue, Expr::value(value + 1))
            .col_expr(document_sequence::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(document_sequence::Column::Id.eq(sequence.id))
            .filter(document_sequence::Column::NextValue.eq(value))
            .exec(conn)
            .await?;

        if result.rows_affected == 1 {
            return Ok(format_number(kind, value));
        }
        debug!(attempt, %kind, "sequence moved underneath us, retrying");
    }

    warn!(%branch_id, %kind, "document sequence contention exhausted retries");
    Err(ServiceError::Conflict(format!(
        "could not reserve a {kind} number, please retry"
    )))
}

/// Creates the sequence row, starting after the highest number already in use.
/// A concurrent seeder winning the unique constraint is not an error.
async fn seed_sequence<C>(conn: &C, branch_id: Uuid, kind: DocumentKind) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    let existing = existing_numbers(conn, branch_id, kind).await?;
    let highest = existing
        .iter()
        .filter_map(|n| parse_trailing_number(n))
        .max()
        .unwrap_or(0);

    let row = document_sequence::ActiveModel {
        id: Set(Uuid::new_v4()),
        branch_id: Set(branch_id),
        kind: Set(kind),
        next_value: Set(highest + 1),
        updated_at: Set(Utc::now()),
    };
    let inserted = document_sequence::Entity::insert(row)
        .on_conflict(
            OnConflict::columns([
                document_sequence::Column::BranchId,
                document_sequence::Column::Kind,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;

    debug!(%branch_id, %kind, start = highest + 1, inserted, "document sequence seeded");
    Ok(())
}

async fn existing_numbers<C>(
    conn: &C,
    branch_id: Uuid,
    kind: DocumentKind,
) -> Result<Vec<String>, ServiceError>
where
    C: ConnectionTrait,
{
    let numbers = match kind {
        DocumentKind::Quotation => {
            quotation::Entity::find()
                .select_only()
                .column(quotation::Column::QuotationNumber)
                .filter(quotation::Column::BranchId.eq(branch_id))
                .into_tuple::<String>()
                .all(conn)
                .await?
        }
        DocumentKind::Order => {
            order::Entity::find()
                .select_only()
                .column(order::Column::OrderNumber)
                .filter(order::Column::BranchId.eq(branch_id))
                .into_tuple::<String>()
                .all(conn)
                .await?
        }
        DocumentKind::Invoice => {
            invoice::Entity::find()
                .select_only()
                .column(invoice::Column::InvoiceNumber)
                .filter(invoice::Column::BranchId.eq(branch_id))
                .into_tuple::<String>()
                .all(conn)
                .await?
        }
        DocumentKind::PurchaseOrder => {
            purchase_order::Entity::find()
                .select_only()
                .column(purchase_order::Column::PoNumber)
                .filter(purchase_order::Column::BranchId.eq(branch_id))
                .into_tuple::<String>()
                .all(conn)
                .await?
        }
        DocumentKind::Shipment => {
            shipment::Entity::find()
                .select_only()
                .column(shipment::Column::ShipmentNumber)
                .filter(shipment::Column::BranchId.eq(branch_id))
                .into_tuple::<String>()
                .all(conn)
                .await?
        }
    };
    Ok(numbers)
}
