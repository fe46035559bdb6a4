use crate::{
    db::DbPool,
    entities::{
        invoice,
        ledger_entry::LedgerSourceType,
        payment::{self, PaymentMethod},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        customers::load_customer,
        fetch_page,
        invoices::{load_invoice, settlement_status},
        ledger::{post_entry, remove_source_entries, NewLedgerEntry},
        optional_text,
        pricing::bounded_amount,
        storage::{StorageCategory, StorageLocation, StorageService},
        PageRequest,
    },
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, ModelTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RecordPaymentRequest {
    pub customer_id: Uuid,
    pub invoice_id: Option<Uuid>,
    #[schema(value_type = f64)]
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub payment_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct PaymentFilter {
    pub customer_id: Option<Uuid>,
    pub invoice_id: Option<Uuid>,
    pub method: Option<PaymentMethod>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AttachReceiptRequest {
    pub file_name: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReceiptUpload {
    pub payment: payment::Model,
    pub location: StorageLocation,
}

async fn load_payment<C>(conn: &C, branch_id: Uuid, payment_id: Uuid) -> Result<payment::Model, ServiceError>
where
    C: ConnectionTrait,
{
    payment::Entity::find_by_id(payment_id)
        .filter(payment::Column::BranchId.eq(branch_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Payment", payment_id))
}

/// Moves `delta` onto an invoice's paid amount and re-derives its status.
async fn apply_to_invoice<C>(conn: &C, invoice: invoice::Model, delta: Decimal) -> Result<invoice::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let amount_paid = bounded_amount(invoice.amount_paid.checked_add(delta), "amount")?.max(Decimal::ZERO);
    let balance_due = (invoice.grand_total - amount_paid).max(Decimal::ZERO);
    let status = settlement_status(invoice.grand_total, amount_paid);
    let mut active = invoice.into_active_model();
    active.amount_paid = Set(amount_paid);
    active.balance_due = Set(balance_due);
    active.status = Set(status);
    active.updated_at = Set(Utc::now());
    Ok(active.update(conn).await?)
}

/// Customer receipts and their effect on invoices and the ledger
#[derive(Clone)]
pub struct PaymentService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    storage: StorageService,
}

impl PaymentService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, storage: StorageService) -> Self {
        Self {
            db_pool,
            event_sender,
            storage,
        }
    }

    #[instrument(skip(self))]
    pub async fn list_payments(
        &self,
        branch_id: Uuid,
        filter: PaymentFilter,
        page: PageRequest,
    ) -> Result<(Vec<payment::Model>, u64), ServiceError> {
        let mut select = payment::Entity::find()
            .filter(payment::Column::BranchId.eq(branch_id))
            .order_by_desc(payment::Column::PaymentDate)
            .order_by_desc(payment::Column::CreatedAt);
        if let Some(customer_id) = filter.customer_id {
            select = select.filter(payment::Column::CustomerId.eq(customer_id));
        }
        if let Some(invoice_id) = filter.invoice_id {
            select = select.filter(payment::Column::InvoiceId.eq(invoice_id));
        }
        if let Some(method) = filter.method {
            select = select.filter(payment::Column::Method.eq(method));
        }
        if let Some(from) = filter.from {
            select = select.filter(payment::Column::PaymentDate.gte(from));
        }
        if let Some(to) = filter.to {
            select = select.filter(payment::Column::PaymentDate.lte(to));
        }
        fetch_page(&self.db_pool, select, page).await
    }

    #[instrument(skip(self))]
    pub async fn get_payment(&self, branch_id: Uuid, payment_id: Uuid) -> Result<payment::Model, ServiceError> {
        load_payment(&*self.db_pool, branch_id, payment_id).await
    }

    /// Records a receipt. Settling an invoice, updating it and the ledger
    /// credit all happen in one transaction.
    #[instrument(skip(self, request), fields(customer_id = %request.customer_id, amount = %request.amount))]
    pub async fn record_payment(
        &self,
        branch_id: Uuid,
        created_by: Uuid,
        request: RecordPaymentRequest,
    ) -> Result<payment::Model, ServiceError> {
        if request.amount <= Decimal::ZERO {
            return Err(ServiceError::invalid_field("amount", "amount must be greater than zero"));
        }
        bounded_amount(Some(request.amount), "amount")?;

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for payment");
            ServiceError::DatabaseError(e)
        })?;

        let customer = load_customer(&txn, branch_id, request.customer_id).await?;
        let payment_date = request.payment_date.unwrap_or_else(|| Utc::now().date_naive());

        let mut description = format!("Payment received ({})", request.method);
        if let Some(invoice_id) = request.invoice_id {
            let invoice = load_invoice(&txn, branch_id, invoice_id).await?;
            if invoice.customer_id != customer.id {
                return Err(ServiceError::invalid_field(
                    "invoice_id",
                    "invoice belongs to a different customer",
                ));
            }
            if !invoice.status.accepts_payment() {
                return Err(ServiceError::InvalidStatus(format!(
                    "invoice {} is {} and cannot take payments",
                    invoice.invoice_number, invoice.status
                )));
            }
            if request.amount > invoice.balance_due {
                return Err(ServiceError::invalid_field(
                    "amount",
                    format!("amount exceeds the balance due of {}", invoice.balance_due.round_dp(2)),
                ));
            }
            description = format!("Payment against invoice {}", invoice.invoice_number);
            apply_to_invoice(&txn, invoice, request.amount).await?;
        }

        let payment_id = Uuid::new_v4();
        let payment = payment::ActiveModel {
            id: Set(payment_id),
            branch_id: Set(branch_id),
            customer_id: Set(customer.id),
            invoice_id: Set(request.invoice_id),
            amount: Set(request.amount),
            method: Set(request.method),
            reference: Set(optional_text(request.reference)),
            payment_date: Set(payment_date),
            receipt_path: Set(None),
            notes: Set(optional_text(request.notes)),
            created_by: Set(created_by),
            created_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, %payment_id, "Failed to insert payment");
            ServiceError::DatabaseError(e)
        })?;

        post_entry(
            &txn,
            NewLedgerEntry {
                branch_id,
                customer_id: customer.id,
                entry_date: payment_date,
                description,
                debit: Decimal::ZERO,
                credit: request.amount,
                source_type: LedgerSourceType::Payment,
                source_id: Some(payment_id),
                created_by,
            },
        )
        .await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, %payment_id, "Failed to commit payment");
            ServiceError::DatabaseError(e)
        })?;

        info!(%payment_id, "payment recorded");
        self.event_sender
            .send_or_log(Event::PaymentRecorded {
                branch_id,
                payment_id,
                amount: payment.amount,
            })
            .await;
        Ok(payment)
    }

    /// Removes a payment and undoes its invoice settlement and ledger credit.
    #[instrument(skip(self))]
    pub async fn delete_payment(&self, branch_id: Uuid, payment_id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for payment deletion");
            ServiceError::DatabaseError(e)
        })?;

        let payment = load_payment(&txn, branch_id, payment_id).await?;
        if let Some(invoice_id) = payment.invoice_id {
            match load_invoice(&txn, branch_id, invoice_id).await {
                Ok(invoice) => {
                    apply_to_invoice(&txn, invoice, -payment.amount).await?;
                }
                Err(ServiceError::NotFound(_)) => {
                    warn!(%payment_id, %invoice_id, "settled invoice no longer exists");
                }
                Err(e) => return Err(e),
            }
        }
        remove_source_entries(&txn, payment.customer_id, LedgerSourceType::Payment, payment_id).await?;
        payment.delete(&txn).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, %payment_id, "Failed to commit payment deletion");
            ServiceError::DatabaseError(e)
        })?;

        info!(%payment_id, "payment deleted");
        self.event_sender
            .send_or_log(Event::deleted(branch_id, "payments", payment_id))
            .await;
        Ok(())
    }

    /// Reserves a storage path for the receipt and records it on the payment.
    #[instrument(skip(self, request))]
    pub async fn attach_receipt(
        &self,
        branch_id: Uuid,
        payment_id: Uuid,
        user_id: Uuid,
        request: AttachReceiptRequest,
    ) -> Result<ReceiptUpload, ServiceError> {
        let db = &*self.db_pool;
        let existing = load_payment(db, branch_id, payment_id).await?;
        let location = self
            .storage
            .reserve(user_id, StorageCategory::Receipts, &request.file_name)?;

        let mut active = existing.into_active_model();
        active.receipt_path = Set(Some(location.path.clone()));
        let payment = active.update(db).await?;

        info!(%payment_id, path = %location.path, "receipt path reserved");
        self.event_sender
            .send_or_log(Event::updated(branch_id, "payments", payment_id))
            .await;
        Ok(ReceiptUpload { payment, location })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::entities::invoice::InvoiceStatus;
    use crate::services::invoices::{CreateInvoiceRequest, InvoiceService};
    use crate::services::ledger::customer_balance;
    use crate::services::pricing::LineItemInput;
    use crate::services::testing::{event_sender, seed_branch, seed_customer};
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    struct Fixture {
        db: Arc<DbPool>,
        branch_id: Uuid,
        customer_id: Uuid,
        invoice_id: Uuid,
        payments: PaymentService,
    }

    /// One issued invoice of 1000 + 18% GST = 1180.
    async fn fixture() -> Fixture {
        let db = Arc::new(memory_pool().await);
        let branch = seed_branch(&db, "PAY", "27").await;
        let customer = seed_customer(&db, branch.id, "Acme", Some("27")).await;
        let invoices = InvoiceService::new(db.clone(), event_sender());
        let user = Uuid::new_v4();
        let draft = invoices
            .create_invoice(
                branch.id,
                user,
                CreateInvoiceRequest {
                    customer_id: customer.id,
                    invoice_date: None,
                    due_date: None,
                    place_of_supply: None,
                    notes: None,
                    items: vec![LineItemInput {
                        name: "Pallet".into(),
                        description: None,
                        hsn_code: None,
                        quantity: dec!(10),
                        unit: None,
                        unit_price: dec!(100),
                        discount_percent: dec!(0),
                        gst_rate: dec!(18),
                    }],
                },
            )
            .await
            .unwrap();
        invoices.issue_invoice(branch.id, draft.invoice.id, user).await.unwrap();
        Fixture {
            payments: PaymentService::new(db.clone(), event_sender(), StorageService::new("documents")),
            db,
            branch_id: branch.id,
            customer_id: customer.id,
            invoice_id: draft.invoice.id,
        }
    }

    fn receipt(f: &Fixture, amount: Decimal) -> RecordPaymentRequest {
        RecordPaymentRequest {
            customer_id: f.customer_id,
            invoice_id: Some(f.invoice_id),
            amount,
            method: PaymentMethod::Upi,
            reference: Some("UTR123".into()),
            payment_date: None,
            notes: None,
        }
    }

    async fn invoice(f: &Fixture) -> invoice::Model {
        invoice::Entity::find_by_id(f.invoice_id).one(&*f.db).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn partial_then_full_settlement() {
        let f = fixture().await;
        let user = Uuid::new_v4();

        f.payments.record_payment(f.branch_id, user, receipt(&f, dec!(180))).await.unwrap();
        let inv = invoice(&f).await;
        assert_eq!(inv.status, InvoiceStatus::PartiallyPaid);
        assert_eq!(inv.balance_due.round_dp(2), dec!(1000.00));
        assert_eq!(customer_balance(&*f.db, f.customer_id).await.unwrap().round_dp(2), dec!(1000.00));

        assert_matches!(
            f.payments.record_payment(f.branch_id, user, receipt(&f, dec!(1000.01))).await,
            Err(ServiceError::InvalidField { field, .. }) if field == "amount"
        );

        f.payments.record_payment(f.branch_id, user, receipt(&f, dec!(1000))).await.unwrap();
        let inv = invoice(&f).await;
        assert_eq!(inv.status, InvoiceStatus::Paid);
        assert_eq!(inv.balance_due.round_dp(2), dec!(0.00));

        assert_matches!(
            f.payments.record_payment(f.branch_id, user, receipt(&f, dec!(1))).await,
            Err(ServiceError::InvalidStatus(_))
        );
    }

    #[tokio::test]
    async fn rejects_non_positive_and_foreign_invoice() {
        let f = fixture().await;
        let user = Uuid::new_v4();
        assert_matches!(
            f.payments.record_payment(f.branch_id, user, receipt(&f, dec!(0))).await,
            Err(ServiceError::InvalidField { field, .. }) if field == "amount"
        );

        let mut huge = receipt(&f, Decimal::MAX);
        huge.invoice_id = None;
        assert_matches!(
            f.payments.record_payment(f.branch_id, user, huge).await,
            Err(ServiceError::InvalidField { field, .. }) if field == "amount"
        );

        let other = seed_customer(&f.db, f.branch_id, "Other", None).await;
        let mut request = receipt(&f, dec!(10));
        request.customer_id = other.id;
        assert_matches!(
            f.payments.record_payment(f.branch_id, user, request).await,
            Err(ServiceError::InvalidField { field, .. }) if field == "invoice_id"
        );
    }

    #[tokio::test]
    async fn delete_restores_invoice_and_ledger() {
        let f = fixture().await;
        let user = Uuid::new_v4();
        let payment = f.payments.record_payment(f.branch_id, user, receipt(&f, dec!(1180))).await.unwrap();
        assert_eq!(invoice(&f).await.status, InvoiceStatus::Paid);

        f.payments.delete_payment(f.branch_id, payment.id).await.unwrap();
        let inv = invoice(&f).await;
        assert_eq!(inv.status, InvoiceStatus::Issued);
        assert_eq!(inv.amount_paid.round_dp(2), dec!(0.00));
        assert_eq!(inv.balance_due.round_dp(2), dec!(1180.00));
        assert_eq!(customer_balance(&*f.db, f.customer_id).await.unwrap().round_dp(2), dec!(1180.00));
        assert_matches!(
            f.payments.get_payment(f.branch_id, payment.id).await,
            Err(ServiceError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn on_account_payment_and_receipt() {
        let f = fixture().await;
        let user = Uuid::new_v4();
        let mut request = receipt(&f, dec!(500));
        request.invoice_id = None;
        let payment = f.payments.record_payment(f.branch_id, user, request).await.unwrap();
        assert_eq!(invoice(&f).await.status, InvoiceStatus::Issued);
        assert_eq!(customer_balance(&*f.db, f.customer_id).await.unwrap().round_dp(2), dec!(680.00));

        let upload = f
            .payments
            .attach_receipt(
                f.branch_id,
                payment.id,
                user,
                AttachReceiptRequest {
                    file_name: "upi screenshot.png".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(upload.location.bucket, "documents");
        assert!(upload.location.path.starts_with(&format!("{user}/receipts/")));
        assert!(upload.location.path.ends_with("_upi_screenshot.png"));
        assert_eq!(upload.payment.receipt_path.as_deref(), Some(upload.location.path.as_str()));
    }
}
