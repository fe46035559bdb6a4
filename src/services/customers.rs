use crate::{
    db::DbPool,
    entities::{customer, invoice, ledger_entry::LedgerSourceType, order, payment, quotation},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        fetch_page,
        ledger::{post_entry, NewLedgerEntry},
        optional_text,
        pricing::bounded_amount,
        search_condition,
        validators::{validate_gstin, validate_not_blank, validate_state_code},
        PageRequest,
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Loads a customer owned by `branch_id`; other branches' rows are reported as missing.
pub async fn load_customer<C>(conn: &C, branch_id: Uuid, customer_id: Uuid) -> Result<customer::Model, ServiceError>
where
    C: ConnectionTrait,
{
    customer::Entity::find_by_id(customer_id)
        .filter(customer::Column::BranchId.eq(branch_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Customer", customer_id))
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateCustomerRequest {
    #[validate(length(min = 1, max = 200), custom = "validate_not_blank")]
    pub name: String,
    pub company: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    #[validate(custom = "validate_gstin")]
    pub gstin: Option<String>,
    #[validate(custom = "validate_state_code")]
    pub state_code: Option<String>,
    pub billing_address: Option<String>,
    pub shipping_address: Option<String>,
    /// Positive when the customer already owes the branch
    #[serde(default)]
    #[schema(value_type = f64)]
    pub opening_balance: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateCustomerRequest {
    #[validate(length(min = 1, max = 200), custom = "validate_not_blank")]
    pub name: Option<String>,
    pub company: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    #[validate(custom = "validate_gstin")]
    pub gstin: Option<String>,
    #[validate(custom = "validate_state_code")]
    pub state_code: Option<String>,
    pub billing_address: Option<String>,
    pub shipping_address: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CustomerFilter {
    pub search: Option<String>,
}

/// Service for managing customers
#[derive(Clone)]
pub struct CustomerService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl CustomerService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    #[instrument(skip(self))]
    pub async fn list_customers(
        &self,
        branch_id: Uuid,
        filter: CustomerFilter,
        page: PageRequest,
    ) -> Result<(Vec<customer::Model>, u64), ServiceError> {
        let mut select = customer::Entity::find()
            .filter(customer::Column::BranchId.eq(branch_id))
            .order_by_asc(customer::Column::Name);
        if let Some(term) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
            select = select.filter(search_condition(
                &[
                    customer::Column::Name,
                    customer::Column::Company,
                    customer::Column::Email,
                    customer::Column::Phone,
                ],
                term,
            ));
        }
        fetch_page(&self.db_pool, select, page).await
    }

    #[instrument(skip(self))]
    pub async fn get_customer(&self, branch_id: Uuid, customer_id: Uuid) -> Result<customer::Model, ServiceError> {
        load_customer(&*self.db_pool, branch_id, customer_id).await
    }

    /// Creates a customer. A non-zero opening balance is posted to the ledger
    /// in the same transaction.
    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_customer(
        &self,
        branch_id: Uuid,
        created_by: Uuid,
        request: CreateCustomerRequest,
    ) -> Result<customer::Model, ServiceError> {
        request.validate()?;
        bounded_amount(Some(request.opening_balance), "opening_balance")?;
        let db = &*self.db_pool;
        let now = Utc::now();
        let customer_id = Uuid::new_v4();

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for customer creation");
            ServiceError::DatabaseError(e)
        })?;

        let customer = customer::ActiveModel {
            id: Set(customer_id),
            branch_id: Set(branch_id),
            name: Set(request.name.trim().to_string()),
            company: Set(optional_text(request.company)),
            email: Set(optional_text(request.email)),
            phone: Set(optional_text(request.phone)),
            gstin: Set(optional_text(request.gstin)),
            state_code: Set(optional_text(request.state_code)),
            billing_address: Set(optional_text(request.billing_address)),
            shipping_address: Set(optional_text(request.shipping_address)),
            opening_balance: Set(request.opening_balance),
            created_by: Set(created_by),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, %customer_id, "Failed to insert customer");
            ServiceError::DatabaseError(e)
        })?;

        if !request.opening_balance.is_zero() {
            let amount = request.opening_balance.abs();
            let (debit, credit) = if request.opening_balance > Decimal::ZERO {
                (amount, Decimal::ZERO)
            } else {
                (Decimal::ZERO, amount)
            };
            post_entry(
                &txn,
                NewLedgerEntry {
                    branch_id,
                    customer_id,
                    entry_date: now.date_naive(),
                    description: "Opening balance".to_string(),
                    debit,
                    credit,
                    source_type: LedgerSourceType::Opening,
                    source_id: Some(customer_id),
                    created_by,
                },
            )
            .await?;
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, %customer_id, "Failed to commit customer creation");
            ServiceError::DatabaseError(e)
        })?;

        info!(%customer_id, "customer created");
        self.event_sender
            .send_or_log(Event::created(branch_id, "customers", customer_id))
            .await;
        Ok(customer)
    }

    #[instrument(skip(self, request))]
    pub async fn update_customer(
        &self,
        branch_id: Uuid,
        customer_id: Uuid,
        request: UpdateCustomerRequest,
    ) -> Result<customer::Model, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;
        let existing = load_customer(db, branch_id, customer_id).await?;

        let mut active = existing.into_active_model();
        if let Some(name) = request.name {
            active.name = Set(name.trim().to_string());
        }
        if request.company.is_some() {
            active.company = Set(optional_text(request.company));
        }
        if request.email.is_some() {
            active.email = Set(optional_text(request.email));
        }
        if request.phone.is_some() {
            active.phone = Set(optional_text(request.phone));
        }
        if request.gstin.is_some() {
            active.gstin = Set(optional_text(request.gstin));
        }
        if request.state_code.is_some() {
            active.state_code = Set(optional_text(request.state_code));
        }
        if request.billing_address.is_some() {
            active.billing_address = Set(optional_text(request.billing_address));
        }
        if request.shipping_address.is_some() {
            active.shipping_address = Set(optional_text(request.shipping_address));
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(db).await?;
        self.event_sender
            .send_or_log(Event::updated(branch_id, "customers", customer_id))
            .await;
        Ok(updated)
    }

    /// Deletes a customer that no document references. Its ledger goes with it.
    #[instrument(skip(self))]
    pub async fn delete_customer(&self, branch_id: Uuid, customer_id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await?;
        load_customer(&txn, branch_id, customer_id).await?;

        let references = quotation::Entity::find()
            .filter(quotation::Column::CustomerId.eq(customer_id))
            .count(&txn)
            .await?
            + order::Entity::find()
                .filter(order::Column::CustomerId.eq(customer_id))
                .count(&txn)
                .await?
            + invoice::Entity::find()
                .filter(invoice::Column::CustomerId.eq(customer_id))
                .count(&txn)
                .await?
            + payment::Entity::find()
                .filter(payment::Column::CustomerId.eq(customer_id))
                .count(&txn)
                .await?;
        if references > 0 {
            return Err(ServiceError::Conflict(format!(
                "customer is referenced by {references} document(s)"
            )));
        }

        customer::Entity::delete_by_id(customer_id).exec(&txn).await?;
        txn.commit().await?;

        info!(%customer_id, "customer deleted");
        self.event_sender
            .send_or_log(Event::deleted(branch_id, "customers", customer_id))
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::services::ledger::customer_balance;
    use crate::services::testing::{event_sender, seed_branch};
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn request(name: &str, opening: Decimal) -> CreateCustomerRequest {
        CreateCustomerRequest {
            name: name.into(),
            company: Some("Acme Industries".into()),
            email: Some("buyer@acme.example".into()),
            phone: None,
            gstin: None,
            state_code: Some("27".into()),
            billing_address: None,
            shipping_address: None,
            opening_balance: opening,
        }
    }

    #[tokio::test]
    async fn opening_balance_is_posted_to_ledger() {
        let db = Arc::new(memory_pool().await);
        let branch = seed_branch(&db, "CUS", "27").await;
        let service = CustomerService::new(db.clone(), event_sender());

        let advance = service
            .create_customer(branch.id, Uuid::new_v4(), request("Advance Payer", dec!(-2500)))
            .await
            .unwrap();
        assert_eq!(
            customer_balance(&*db, advance.id).await.unwrap().round_dp(2),
            dec!(-2500)
        );

        let clean = service
            .create_customer(branch.id, Uuid::new_v4(), request("Clean Slate", Decimal::ZERO))
            .await
            .unwrap();
        assert_eq!(customer_balance(&*db, clean.id).await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn blank_name_and_bad_state_are_rejected() {
        let db = Arc::new(memory_pool().await);
        let branch = seed_branch(&db, "CUV", "27").await;
        let service = CustomerService::new(db.clone(), event_sender());

        assert_matches!(
            service
                .create_customer(branch.id, Uuid::new_v4(), request("   ", Decimal::ZERO))
                .await,
            Err(ServiceError::InvalidField { field, .. }) if field == "name"
        );

        assert_matches!(
            service
                .create_customer(branch.id, Uuid::new_v4(), request("Gamma", Decimal::MIN))
                .await,
            Err(ServiceError::InvalidField { field, .. }) if field == "opening_balance"
        );

        let mut bad_state = request("Delta", Decimal::ZERO);
        bad_state.state_code = Some("MH".into());
        assert_matches!(
            service.create_customer(branch.id, Uuid::new_v4(), bad_state).await,
            Err(ServiceError::InvalidField { field, .. }) if field == "state_code"
        );
    }

    #[tokio::test]
    async fn customers_are_branch_scoped_and_searchable() {
        let db = Arc::new(memory_pool().await);
        let a = seed_branch(&db, "CSA", "27").await;
        let b = seed_branch(&db, "CSB", "27").await;
        let service = CustomerService::new(db.clone(), event_sender());

        let created = service
            .create_customer(a.id, Uuid::new_v4(), request("Shree Ganesh Traders", Decimal::ZERO))
            .await
            .unwrap();
        service
            .create_customer(a.id, Uuid::new_v4(), request("Other", Decimal::ZERO))
            .await
            .unwrap();

        let (found, total) = service
            .list_customers(
                a.id,
                CustomerFilter {
                    search: Some("ganesh".into()),
                },
                PageRequest::default(),
            )
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(found[0].id, created.id);

        assert_matches!(
            service.get_customer(b.id, created.id).await,
            Err(ServiceError::NotFound(_))
        );
        assert_matches!(
            service.delete_customer(b.id, created.id).await,
            Err(ServiceError::NotFound(_))
        );
        service.delete_customer(a.id, created.id).await.unwrap();
    }
}
