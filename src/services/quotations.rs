use crate::{
    db::DbPool,
    entities::{
        document_sequence::DocumentKind,
        quotation::{self, QuotationStatus},
        quotation_item, quotation_revision,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        branches::load_branch,
        customers::load_customer,
        fetch_page,
        leads::load_lead,
        numbering::next_number,
        optional_text,
        orders::{insert_order, NewOrder, OrderDetail},
        pricing::{apply_totals, price_document, resolve_place_of_supply, LineItemInput},
        search_condition,
        validators::validate_state_code,
        PageRequest,
    },
};
use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateQuotationRequest {
    pub customer_id: Uuid,
    pub lead_id: Option<Uuid>,
    pub quotation_date: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
    #[validate(custom = "validate_state_code")]
    pub place_of_supply: Option<String>,
    pub terms: Option<String>,
    pub notes: Option<String>,
    pub items: Vec<LineItemInput>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateQuotationRequest {
    pub quotation_date: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
    #[validate(custom = "validate_state_code")]
    pub place_of_supply: Option<String>,
    pub terms: Option<String>,
    pub notes: Option<String>,
    /// Replaces every line when present
    pub items: Option<Vec<LineItemInput>>,
    /// Stored with the revision snapshot
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct QuotationFilter {
    pub status: Option<QuotationStatus>,
    pub customer_id: Option<Uuid>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuotationDetail {
    pub quotation: quotation::Model,
    pub items: Vec<quotation_item::Model>,
}

fn check_validity(quotation_date: NaiveDate, valid_until: Option<NaiveDate>) -> Result<(), ServiceError> {
    match valid_until {
        Some(until) if until < quotation_date => Err(ServiceError::invalid_field(
            "valid_until",
            "validity cannot end before the quotation date",
        )),
        _ => Ok(()),
    }
}

pub async fn load_quotation<C>(conn: &C, branch_id: Uuid, quotation_id: Uuid) -> Result<quotation::Model, ServiceError>
where
    C: ConnectionTrait,
{
    quotation::Entity::find_by_id(quotation_id)
        .filter(quotation::Column::BranchId.eq(branch_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Quotation", quotation_id))
}

async fn quotation_items<C>(conn: &C, quotation_id: Uuid) -> Result<Vec<quotation_item::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    Ok(quotation_item::Entity::find()
        .filter(quotation_item::Column::QuotationId.eq(quotation_id))
        .order_by_asc(quotation_item::Column::LineNo)
        .all(conn)
        .await?)
}

/// Quotations, their revision history and conversion into orders
#[derive(Clone)]
pub struct QuotationService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl QuotationService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    #[instrument(skip(self))]
    pub async fn list_quotations(
        &self,
        branch_id: Uuid,
        filter: QuotationFilter,
        page: PageRequest,
    ) -> Result<(Vec<quotation::Model>, u64), ServiceError> {
        let mut select = quotation::Entity::find()
            .filter(quotation::Column::BranchId.eq(branch_id))
            .order_by_desc(quotation::Column::QuotationDate)
            .order_by_desc(quotation::Column::CreatedAt);
        if let Some(status) = filter.status {
            select = select.filter(quotation::Column::Status.eq(status));
        }
        if let Some(customer_id) = filter.customer_id {
            select = select.filter(quotation::Column::CustomerId.eq(customer_id));
        }
        if let Some(term) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
            select = select.filter(search_condition(&[quotation::Column::QuotationNumber], term));
        }
        fetch_page(&self.db_pool, select, page).await
    }

    #[instrument(skip(self))]
    pub async fn get_quotation(&self, branch_id: Uuid, quotation_id: Uuid) -> Result<QuotationDetail, ServiceError> {
        let db = &*self.db_pool;
        let quotation = load_quotation(db, branch_id, quotation_id).await?;
        let items = quotation_items(db, quotation_id).await?;
        Ok(QuotationDetail { quotation, items })
    }

    /// Number, header, items and totals are written in one transaction.
    #[instrument(skip(self, request), fields(customer_id = %request.customer_id))]
    pub async fn create_quotation(
        &self,
        branch_id: Uuid,
        created_by: Uuid,
        request: CreateQuotationRequest,
    ) -> Result<QuotationDetail, ServiceError> {
        request.validate()?;
        let quotation_date = request.quotation_date.unwrap_or_else(|| Utc::now().date_naive());
        check_validity(quotation_date, request.valid_until)?;
        let db = &*self.db_pool;

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for quotation creation");
            ServiceError::DatabaseError(e)
        })?;

        let branch = load_branch(&txn, branch_id).await?;
        let customer = load_customer(&txn, branch_id, request.customer_id).await?;
        if let Some(lead_id) = request.lead_id {
            load_lead(&txn, branch_id, lead_id).await?;
        }
        let place_of_supply = resolve_place_of_supply(
            request.place_of_supply.as_deref(),
            customer.state_code.as_deref(),
            &branch.state_code,
        );
        let priced = price_document(&request.items, &place_of_supply, &branch.state_code)?;

        let quotation_number = next_number(&txn, branch_id, DocumentKind::Quotation).await?;
        let quotation_id = Uuid::new_v4();
        let now = Utc::now();
        let mut header = quotation::ActiveModel {
            id: Set(quotation_id),
            branch_id: Set(branch_id),
            quotation_number: Set(quotation_number),
            customer_id: Set(customer.id),
            lead_id: Set(request.lead_id),
            status: Set(QuotationStatus::Draft),
            quotation_date: Set(quotation_date),
            valid_until: Set(request.valid_until),
            place_of_supply: Set(place_of_supply),
            terms: Set(optional_text(request.terms)),
            notes: Set(optional_text(request.notes)),
            revision: Set(1),
            created_by: Set(created_by),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        apply_totals!(header, priced.totals);
        let quotation = header.insert(&txn).await.map_err(|e| {
            error!(error = %e, %quotation_id, "Failed to insert quotation");
            ServiceError::DatabaseError(e)
        })?;

        quotation_item::Entity::insert_many(priced.lines.iter().map(|line| line.quotation_item(quotation_id)))
            .exec_without_returning(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, %quotation_id, "Failed to insert quotation items");
                ServiceError::DatabaseError(e)
            })?;
        let items = quotation_items(&txn, quotation_id).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, %quotation_id, "Failed to commit quotation creation");
            ServiceError::DatabaseError(e)
        })?;

        info!(%quotation_id, number = %quotation.quotation_number, "quotation created");
        self.event_sender
            .send_or_log(Event::created(branch_id, "quotations", quotation_id))
            .await;
        Ok(QuotationDetail { quotation, items })
    }

    /// Snapshots the current version into `quotation_revisions`, applies the
    /// changes and bumps `revision`, all in one transaction.
    #[instrument(skip(self, request))]
    pub async fn update_quotation(
        &self,
        branch_id: Uuid,
        quotation_id: Uuid,
        updated_by: Uuid,
        request: UpdateQuotationRequest,
    ) -> Result<QuotationDetail, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for quotation update");
            ServiceError::DatabaseError(e)
        })?;

        let existing = load_quotation(&txn, branch_id, quotation_id).await?;
        if !existing.status.is_editable() {
            return Err(ServiceError::InvalidStatus(format!(
                "{} quotations cannot be edited",
                existing.status
            )));
        }
        let quotation_date = request.quotation_date.unwrap_or(existing.quotation_date);
        let valid_until = request.valid_until.or(existing.valid_until);
        check_validity(quotation_date, valid_until)?;

        let current_items = quotation_items(&txn, quotation_id).await?;
        let snapshot = serde_json::to_value(QuotationDetail {
            quotation: existing.clone(),
            items: current_items.clone(),
        })?;
        quotation_revision::ActiveModel {
            id: Set(Uuid::new_v4()),
            quotation_id: Set(quotation_id),
            revision: Set(existing.revision),
            snapshot: Set(snapshot),
            reason: Set(optional_text(request.reason)),
            created_by: Set(updated_by),
            created_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await?;

        let branch = load_branch(&txn, branch_id).await?;
        let place_of_supply = request
            .place_of_supply
            .clone()
            .unwrap_or_else(|| existing.place_of_supply.clone());
        let inputs: Vec<LineItemInput> = match request.items {
            Some(items) => items,
            None => current_items.iter().map(LineItemInput::from).collect(),
        };
        let priced = price_document(&inputs, &place_of_supply, &branch.state_code)?;

        let next_revision = existing.revision + 1;
        let mut active = existing.into_active_model();
        active.quotation_date = Set(quotation_date);
        active.valid_until = Set(valid_until);
        active.place_of_supply = Set(place_of_supply);
        if request.terms.is_some() {
            active.terms = Set(optional_text(request.terms));
        }
        if request.notes.is_some() {
            active.notes = Set(optional_text(request.notes));
        }
        apply_totals!(active, priced.totals);
        active.revision = Set(next_revision);
        active.updated_at = Set(Utc::now());
        let quotation = active.update(&txn).await?;

        quotation_item::Entity::delete_many()
            .filter(quotation_item::Column::QuotationId.eq(quotation_id))
            .exec(&txn)
            .await?;
        quotation_item::Entity::insert_many(priced.lines.iter().map(|line| line.quotation_item(quotation_id)))
            .exec_without_returning(&txn)
            .await?;
        let items = quotation_items(&txn, quotation_id).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, %quotation_id, "Failed to commit quotation update");
            ServiceError::DatabaseError(e)
        })?;

        info!(%quotation_id, revision = next_revision, "quotation revised");
        self.event_sender
            .send_or_log(Event::updated(branch_id, "quotations", quotation_id))
            .await;
        Ok(QuotationDetail { quotation, items })
    }

    #[instrument(skip(self))]
    pub async fn change_status(
        &self,
        branch_id: Uuid,
        quotation_id: Uuid,
        status: QuotationStatus,
    ) -> Result<quotation::Model, ServiceError> {
        let db = &*self.db_pool;
        let existing = load_quotation(db, branch_id, quotation_id).await?;
        if !existing.status.can_transition_to(status) {
            return Err(ServiceError::InvalidStatus(format!(
                "quotation cannot move from {} to {}",
                existing.status, status
            )));
        }
        let mut active = existing.into_active_model();
        active.status = Set(status);
        active.updated_at = Set(Utc::now());
        let updated = active.update(db).await?;

        info!(%quotation_id, %status, "quotation status changed");
        self.event_sender
            .send_or_log(Event::updated(branch_id, "quotations", quotation_id))
            .await;
        Ok(updated)
    }

    /// Accepted quotations become pending orders; the quotation is marked converted.
    #[instrument(skip(self))]
    pub async fn convert_to_order(
        &self,
        branch_id: Uuid,
        quotation_id: Uuid,
        created_by: Uuid,
    ) -> Result<OrderDetail, ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for quotation conversion");
            ServiceError::DatabaseError(e)
        })?;

        let existing = load_quotation(&txn, branch_id, quotation_id).await?;
        if existing.status != QuotationStatus::Accepted {
            return Err(ServiceError::InvalidStatus(format!(
                "only accepted quotations can be converted; {} is {}",
                existing.quotation_number, existing.status
            )));
        }
        let branch = load_branch(&txn, branch_id).await?;
        let items = quotation_items(&txn, quotation_id).await?;

        let detail = insert_order(
            &txn,
            &branch.state_code,
            NewOrder {
                branch_id,
                customer_id: existing.customer_id,
                quotation_id: Some(quotation_id),
                order_date: Utc::now().date_naive(),
                expected_delivery: None,
                place_of_supply: existing.place_of_supply.clone(),
                notes: existing.notes.clone(),
                created_by,
                items: items.iter().map(LineItemInput::from).collect(),
            },
        )
        .await?;

        let mut active = existing.into_active_model();
        active.status = Set(QuotationStatus::Converted);
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, %quotation_id, "Failed to commit quotation conversion");
            ServiceError::DatabaseError(e)
        })?;

        info!(%quotation_id, order_id = %detail.order.id, "quotation converted to order");
        self.event_sender
            .send_or_log(Event::updated(branch_id, "quotations", quotation_id))
            .await;
        self.event_sender
            .send_or_log(Event::created(branch_id, "orders", detail.order.id))
            .await;
        Ok(detail)
    }

    #[instrument(skip(self))]
    pub async fn delete_quotation(&self, branch_id: Uuid, quotation_id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let existing = load_quotation(db, branch_id, quotation_id).await?;
        if existing.status != QuotationStatus::Draft {
            return Err(ServiceError::InvalidStatus(format!(
                "only draft quotations can be deleted; {} is {}",
                existing.quotation_number, existing.status
            )));
        }
        quotation::Entity::delete_by_id(quotation_id).exec(db).await?;
        info!(%quotation_id, "quotation deleted");
        self.event_sender
            .send_or_log(Event::deleted(branch_id, "quotations", quotation_id))
            .await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_revisions(
        &self,
        branch_id: Uuid,
        quotation_id: Uuid,
    ) -> Result<Vec<quotation_revision::Model>, ServiceError> {
        let db = &*self.db_pool;
        load_quotation(db, branch_id, quotation_id).await?;
        Ok(quotation_revision::Entity::find()
            .filter(quotation_revision::Column::QuotationId.eq(quotation_id))
            .order_by_desc(quotation_revision::Column::Revision)
            .all(db)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::entities::order::OrderStatus;
    use crate::services::testing::{event_sender, seed_branch, seed_customer};
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn item(name: &str, price: rust_decimal::Decimal) -> LineItemInput {
        LineItemInput {
            name: name.into(),
            description: None,
            hsn_code: None,
            quantity: dec!(1),
            unit: None,
            unit_price: price,
            discount_percent: dec!(10),
            gst_rate: dec!(12),
        }
    }

    fn request(customer_id: Uuid) -> CreateQuotationRequest {
        CreateQuotationRequest {
            customer_id,
            lead_id: None,
            quotation_date: NaiveDate::from_ymd_opt(2024, 7, 1),
            valid_until: NaiveDate::from_ymd_opt(2024, 7, 31),
            place_of_supply: None,
            terms: Some("50% advance".into()),
            notes: None,
            items: vec![item("Cabinet", dec!(5000))],
        }
    }

    async fn setup(code: &str) -> (Arc<DbPool>, Uuid, Uuid, QuotationService) {
        let db = Arc::new(memory_pool().await);
        let branch = seed_branch(&db, code, "27").await;
        let customer = seed_customer(&db, branch.id, "Acme", Some("27")).await;
        let service = QuotationService::new(db.clone(), event_sender());
        (db, branch.id, customer.id, service)
    }

    #[tokio::test]
    async fn validity_must_not_precede_date() {
        let (_db, branch_id, customer_id, service) = setup("QTA").await;
        let mut req = request(customer_id);
        req.valid_until = NaiveDate::from_ymd_opt(2024, 6, 30);
        assert_matches!(
            service.create_quotation(branch_id, Uuid::new_v4(), req).await,
            Err(ServiceError::InvalidField { field, .. }) if field == "valid_until"
        );
    }

    #[tokio::test]
    async fn revision_snapshots_previous_version() {
        let (_db, branch_id, customer_id, service) = setup("QTB").await;
        let user = Uuid::new_v4();
        let created = service.create_quotation(branch_id, user, request(customer_id)).await.unwrap();
        assert_eq!(created.quotation.quotation_number, "QT-00001");
        // 5000 - 10% = 4500, 12% GST = 540
        assert_eq!(created.quotation.grand_total.round_dp(2), dec!(5040.00));

        let revised = service
            .update_quotation(
                branch_id,
                created.quotation.id,
                user,
                UpdateQuotationRequest {
                    items: Some(vec![item("Cabinet", dec!(5000)), item("Locker", dec!(2000))]),
                    reason: Some("added locker".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(revised.quotation.revision, 2);
        assert_eq!(revised.items.len(), 2);
        assert_eq!(revised.quotation.grand_total.round_dp(2), dec!(7056.00));

        let revisions = service.list_revisions(branch_id, created.quotation.id).await.unwrap();
        assert_eq!(revisions.len(), 1);
        assert_eq!(revisions[0].revision, 1);
        assert_eq!(revisions[0].reason.as_deref(), Some("added locker"));
        assert_eq!(revisions[0].snapshot["items"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn conversion_requires_acceptance() {
        let (_db, branch_id, customer_id, service) = setup("QTC").await;
        let user = Uuid::new_v4();
        let created = service.create_quotation(branch_id, user, request(customer_id)).await.unwrap();
        let id = created.quotation.id;

        assert_matches!(
            service.convert_to_order(branch_id, id, user).await,
            Err(ServiceError::InvalidStatus(_))
        );
        service.change_status(branch_id, id, QuotationStatus::Sent).await.unwrap();
        service.change_status(branch_id, id, QuotationStatus::Accepted).await.unwrap();

        let order = service.convert_to_order(branch_id, id, user).await.unwrap();
        assert_eq!(order.order.status, OrderStatus::Pending);
        assert_eq!(order.order.quotation_id, Some(id));
        assert_eq!(order.order.grand_total, created.quotation.grand_total);
        assert_eq!(order.items.len(), 1);

        let converted = service.get_quotation(branch_id, id).await.unwrap();
        assert_eq!(converted.quotation.status, QuotationStatus::Converted);
        assert_matches!(
            service.update_quotation(branch_id, id, user, UpdateQuotationRequest::default()).await,
            Err(ServiceError::InvalidStatus(_))
        );
        assert_matches!(
            service.delete_quotation(branch_id, id).await,
            Err(ServiceError::InvalidStatus(_))
        );
    }
}
