use crate::{
    db::DbPool,
    entities::ledger_entry::{self, LedgerSourceType},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{customers::load_customer, pricing::bounded_amount},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

/// Which side of the ledger a balance sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BalanceSide {
    /// Customer owes the branch
    Debit,
    /// Branch owes the customer (advance or overpayment)
    Credit,
    Settled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct BalanceDisplay {
    pub amount: Decimal,
    pub side: BalanceSide,
}

impl BalanceDisplay {
    pub fn from_balance(balance: Decimal) -> Self {
        let side = if balance > Decimal::ZERO {
            BalanceSide::Debit
        } else if balance < Decimal::ZERO {
            BalanceSide::Credit
        } else {
            BalanceSide::Settled
        };
        Self {
            amount: balance.abs().round_dp(2),
            side,
        }
    }
}

impl fmt::Display for BalanceDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.side {
            BalanceSide::Debit => write!(f, "{:.2} Dr", self.amount),
            BalanceSide::Credit => write!(f, "{:.2} Cr", self.amount),
            BalanceSide::Settled => write!(f, "{:.2}", self.amount),
        }
    }
}

/// A system or manual posting, before its running balance is known
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub branch_id: Uuid,
    pub customer_id: Uuid,
    pub entry_date: NaiveDate,
    pub description: String,
    pub debit: Decimal,
    pub credit: Decimal,
    pub source_type: LedgerSourceType,
    pub source_id: Option<Uuid>,
    pub created_by: Uuid,
}

/// Inserts an entry and recalculates the customer's running balances.
pub async fn post_entry<C>(conn: &C, entry: NewLedgerEntry) -> Result<ledger_entry::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let id = Uuid::new_v4();
    let customer_id = entry.customer_id;
    ledger_entry::ActiveModel {
        id: Set(id),
        branch_id: Set(entry.branch_id),
        customer_id: Set(entry.customer_id),
        entry_date: Set(entry.entry_date),
        description: Set(entry.description),
        debit: Set(entry.debit),
        credit: Set(entry.credit),
        balance: Set(Decimal::ZERO),
        source_type: Set(entry.source_type),
        source_id: Set(entry.source_id),
        created_by: Set(entry.created_by),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await?;

    recalculate_balances(conn, customer_id).await?;

    ledger_entry::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Ledger entry", id))
}

/// Deletes the postings made for a source document and recalculates.
pub async fn remove_source_entries<C>(
    conn: &C,
    customer_id: Uuid,
    source_type: LedgerSourceType,
    source_id: Uuid,
) -> Result<u64, ServiceError>
where
    C: ConnectionTrait,
{
    let deleted = ledger_entry::Entity::delete_many()
        .filter(ledger_entry::Column::CustomerId.eq(customer_id))
        .filter(ledger_entry::Column::SourceType.eq(source_type))
        .filter(ledger_entry::Column::SourceId.eq(source_id))
        .exec(conn)
        .await?
        .rows_affected;
    if deleted > 0 {
        recalculate_balances(conn, customer_id).await?;
    }
    Ok(deleted)
}

/// Running balance in (entry_date, created_at, id) order.
/// Only rows whose stored balance changed are rewritten. Returns the closing balance.
pub async fn recalculate_balances<C>(conn: &C, customer_id: Uuid) -> Result<Decimal, ServiceError>
where
    C: ConnectionTrait,
{
    let entries = ordered_entries(conn, customer_id).await?;

    let mut running = Decimal::ZERO;
    for entry in entries {
        running += entry.debit - entry.credit;
        if entry.balance != running {
            let mut active = entry.into_active_model();
            active.balance = Set(running);
            active.update(conn).await?;
        }
    }
    Ok(running)
}

async fn ordered_entries<C>(conn: &C, customer_id: Uuid) -> Result<Vec<ledger_entry::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    Ok(ledger_entry::Entity::find()
        .filter(ledger_entry::Column::CustomerId.eq(customer_id))
        .order_by_asc(ledger_entry::Column::EntryDate)
        .order_by_asc(ledger_entry::Column::CreatedAt)
        .order_by_asc(ledger_entry::Column::Id)
        .all(conn)
        .await?)
}

/// Current balance of a customer (sum of debits minus credits).
pub async fn customer_balance<C>(conn: &C, customer_id: Uuid) -> Result<Decimal, ServiceError>
where
    C: ConnectionTrait,
{
    Ok(ordered_entries(conn, customer_id)
        .await?
        .iter()
        .fold(Decimal::ZERO, |acc, e| acc + e.debit - e.credit))
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ManualEntryRequest {
    pub entry_date: Option<NaiveDate>,
    pub description: String,
    #[serde(default)]
    #[schema(value_type = f64)]
    pub debit: Decimal,
    #[serde(default)]
    #[schema(value_type = f64)]
    pub credit: Decimal,
}

impl ManualEntryRequest {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.debit < Decimal::ZERO {
            return Err(ServiceError::invalid_field("debit", "debit cannot be negative"));
        }
        if self.credit < Decimal::ZERO {
            return Err(ServiceError::invalid_field("credit", "credit cannot be negative"));
        }
        bounded_amount(Some(self.debit), "debit")?;
        bounded_amount(Some(self.credit), "credit")?;
        if self.debit.is_zero() && self.credit.is_zero() {
            return Err(ServiceError::invalid_field(
                "debit",
                "either debit or credit must be greater than zero",
            ));
        }
        if self.description.trim().is_empty() {
            return Err(ServiceError::invalid_field("description", "description is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LedgerStatement {
    pub customer_id: Uuid,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub opening_balance: BalanceDisplay,
    pub entries: Vec<ledger_entry::Model>,
    pub closing_balance: BalanceDisplay,
    /// Closing balance rendered as `"1234.50 Dr"`, `"80.00 Cr"` or `"0.00"`
    pub closing_balance_text: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CustomerBalance {
    pub customer_id: Uuid,
    pub balance: BalanceDisplay,
    pub display: String,
}

/// Customer ledger postings, statements and balances
#[derive(Clone)]
pub struct LedgerService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl LedgerService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    #[instrument(skip(self, request))]
    pub async fn add_manual_entry(
        &self,
        branch_id: Uuid,
        customer_id: Uuid,
        created_by: Uuid,
        request: ManualEntryRequest,
    ) -> Result<ledger_entry::Model, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for ledger entry");
            ServiceError::DatabaseError(e)
        })?;
        load_customer(&txn, branch_id, customer_id).await?;

        let entry = post_entry(
            &txn,
            NewLedgerEntry {
                branch_id,
                customer_id,
                entry_date: request.entry_date.unwrap_or_else(|| Utc::now().date_naive()),
                description: request.description.trim().to_string(),
                debit: request.debit,
                credit: request.credit,
                source_type: LedgerSourceType::Manual,
                source_id: None,
                created_by,
            },
        )
        .await?;
        txn.commit().await?;

        info!(entry_id = %entry.id, %customer_id, "manual ledger entry posted");
        self.event_sender
            .send_or_log(Event::created(branch_id, "ledger_entries", entry.id))
            .await;
        Ok(entry)
    }

    /// Only manual entries can be removed; system postings follow their documents.
    #[instrument(skip(self))]
    pub async fn delete_manual_entry(&self, branch_id: Uuid, entry_id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await?;

        let entry = ledger_entry::Entity::find_by_id(entry_id)
            .filter(ledger_entry::Column::BranchId.eq(branch_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Ledger entry", entry_id))?;
        if entry.source_type != LedgerSourceType::Manual {
            return Err(ServiceError::InvalidOperation(format!(
                "{} postings are managed by their source document",
                entry.source_type
            )));
        }

        ledger_entry::Entity::delete_by_id(entry_id).exec(&txn).await?;
        recalculate_balances(&txn, entry.customer_id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::deleted(branch_id, "ledger_entries", entry_id))
            .await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn statement(
        &self,
        branch_id: Uuid,
        customer_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<LedgerStatement, ServiceError> {
        if let (Some(from), Some(to)) = (from, to) {
            if to < from {
                return Err(ServiceError::invalid_field("to", "end date precedes start date"));
            }
        }
        let db = &*self.db_pool;
        load_customer(db, branch_id, customer_id).await?;

        let all = ordered_entries(db, customer_id).await?;
        let opening = all
            .iter()
            .filter(|e| from.map_or(false, |f| e.entry_date < f))
            .fold(Decimal::ZERO, |acc, e| acc + e.debit - e.credit);

        let entries: Vec<_> = all
            .into_iter()
            .filter(|e| from.map_or(true, |f| e.entry_date >= f))
            .filter(|e| to.map_or(true, |t| e.entry_date <= t))
            .collect();
        let closing = entries
            .iter()
            .fold(opening, |acc, e| acc + e.debit - e.credit);
        let closing_balance = BalanceDisplay::from_balance(closing);

        Ok(LedgerStatement {
            customer_id,
            from,
            to,
            opening_balance: BalanceDisplay::from_balance(opening),
            entries,
            closing_balance,
            closing_balance_text: closing_balance.to_string(),
        })
    }

    #[instrument(skip(self))]
    pub async fn balance(&self, branch_id: Uuid, customer_id: Uuid) -> Result<CustomerBalance, ServiceError> {
        let db = &*self.db_pool;
        load_customer(db, branch_id, customer_id).await?;
        let balance = BalanceDisplay::from_balance(customer_balance(db, customer_id).await?);
        Ok(CustomerBalance {
            customer_id,
            balance,
            display: balance.to_string(),
        })
    }

    /// Rebuilds stored running balances; returns the closing balance.
    #[instrument(skip(self))]
    pub async fn recalculate(&self, branch_id: Uuid, customer_id: Uuid) -> Result<BalanceDisplay, ServiceError> {
        let txn = self.db_pool.begin().await?;
        load_customer(&txn, branch_id, customer_id).await?;
        let closing = recalculate_balances(&txn, customer_id).await?;
        txn.commit().await?;
        Ok(BalanceDisplay::from_balance(closing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::services::testing::{event_sender, seed_branch, seed_customer};
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn manual(debit: Decimal, credit: Decimal) -> ManualEntryRequest {
        ManualEntryRequest {
            entry_date: None,
            description: "Adjustment".into(),
            debit,
            credit,
        }
    }

    #[test]
    fn zero_debit_and_credit_is_rejected_on_debit() {
        assert_matches!(
            manual(Decimal::ZERO, Decimal::ZERO).validate(),
            Err(ServiceError::InvalidField { field, .. }) if field == "debit"
        );
        assert_matches!(
            manual(Decimal::ZERO, dec!(-1)).validate(),
            Err(ServiceError::InvalidField { field, .. }) if field == "credit"
        );
        assert!(manual(dec!(10), Decimal::ZERO).validate().is_ok());
        assert_matches!(
            manual(Decimal::ZERO, Decimal::MAX).validate(),
            Err(ServiceError::InvalidField { field, .. }) if field == "credit"
        );
    }

    #[test]
    fn balance_side_flips_at_zero() {
        assert_eq!(BalanceDisplay::from_balance(dec!(1234.5)).to_string(), "1234.50 Dr");
        assert_eq!(BalanceDisplay::from_balance(dec!(-80)).to_string(), "80.00 Cr");
        assert_eq!(BalanceDisplay::from_balance(Decimal::ZERO).to_string(), "0.00");
        assert_eq!(BalanceDisplay::from_balance(dec!(0.01)).side, BalanceSide::Debit);
        assert_eq!(BalanceDisplay::from_balance(dec!(-0.01)).side, BalanceSide::Credit);
    }

    #[tokio::test]
    async fn backdated_entry_rewrites_later_balances() {
        let db = memory_pool().await;
        let branch = seed_branch(&db, "LDG", "27").await;
        let customer = seed_customer(&db, branch.id, "Acme", Some("27")).await;
        let day = |d| NaiveDate::from_ymd_opt(2025, 3, d).unwrap();
        let entry = |date, debit, credit| NewLedgerEntry {
            branch_id: branch.id,
            customer_id: customer.id,
            entry_date: date,
            description: "x".into(),
            debit,
            credit,
            source_type: LedgerSourceType::Manual,
            source_id: None,
            created_by: Uuid::new_v4(),
        };

        post_entry(&db, entry(day(10), dec!(1000), Decimal::ZERO)).await.unwrap();
        let later = post_entry(&db, entry(day(20), Decimal::ZERO, dec!(400))).await.unwrap();
        assert_eq!(later.balance.round_dp(2), dec!(600));

        post_entry(&db, entry(day(5), Decimal::ZERO, dec!(700))).await.unwrap();
        let balances: Vec<Decimal> = ordered_entries(&db, customer.id)
            .await
            .unwrap()
            .iter()
            .map(|e| e.balance.round_dp(2))
            .collect();
        assert_eq!(balances, vec![dec!(-700), dec!(300), dec!(-100)]);
        assert_eq!(customer_balance(&db, customer.id).await.unwrap().round_dp(2), dec!(-100));
    }

    #[tokio::test]
    async fn system_postings_cannot_be_deleted_manually() {
        let db = Arc::new(memory_pool().await);
        let branch = seed_branch(&db, "SYS", "27").await;
        let customer = seed_customer(&db, branch.id, "Beta", None).await;
        let service = LedgerService::new(db.clone(), event_sender());

        let posting = post_entry(
            &*db,
            NewLedgerEntry {
                branch_id: branch.id,
                customer_id: customer.id,
                entry_date: Utc::now().date_naive(),
                description: "Invoice INV-00001".into(),
                debit: dec!(500),
                credit: Decimal::ZERO,
                source_type: LedgerSourceType::Invoice,
                source_id: Some(Uuid::new_v4()),
                created_by: Uuid::new_v4(),
            },
        )
        .await
        .unwrap();

        assert_matches!(
            service.delete_manual_entry(branch.id, posting.id).await,
            Err(ServiceError::InvalidOperation(_))
        );

        let manual_entry = service
            .add_manual_entry(branch.id, customer.id, Uuid::new_v4(), manual(Decimal::ZERO, dec!(200)))
            .await
            .unwrap();
        assert_eq!(manual_entry.balance.round_dp(2), dec!(300));

        service.delete_manual_entry(branch.id, manual_entry.id).await.unwrap();
        let balance = service.balance(branch.id, customer.id).await.unwrap();
        assert_eq!(balance.display, "500.00 Dr");
    }

    #[tokio::test]
    async fn statement_carries_opening_balance() {
        let db = Arc::new(memory_pool().await);
        let branch = seed_branch(&db, "STM", "27").await;
        let customer = seed_customer(&db, branch.id, "Gamma", None).await;
        let service = LedgerService::new(db.clone(), event_sender());

        for (d, debit, credit) in [(1, dec!(100), Decimal::ZERO), (15, dec!(50), Decimal::ZERO), (28, Decimal::ZERO, dec!(150))] {
            service
                .add_manual_entry(
                    branch.id,
                    customer.id,
                    Uuid::new_v4(),
                    ManualEntryRequest {
                        entry_date: NaiveDate::from_ymd_opt(2025, 4, d),
                        description: format!("entry {d}"),
                        debit,
                        credit,
                    },
                )
                .await
                .unwrap();
        }

        let statement = service
            .statement(
                branch.id,
                customer.id,
                NaiveDate::from_ymd_opt(2025, 4, 10),
                NaiveDate::from_ymd_opt(2025, 4, 20),
            )
            .await
            .unwrap();
        assert_eq!(statement.opening_balance.amount, dec!(100));
        assert_eq!(statement.entries.len(), 1);
        assert_eq!(statement.closing_balance_text, "150.00 Dr");

        let full = service.statement(branch.id, customer.id, None, None).await.unwrap();
        assert_eq!(full.closing_balance_text, "0.00");
        assert_eq!(full.closing_balance.side, BalanceSide::Settled);
    }
}
