use crate::{
    db::DbPool,
    entities::{
        customer,
        lead::{self, LeadPriority, LeadStatus},
        lead_source::{self, LeadSourceKind},
        profile,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        fetch_page,
        lead_assignment::{auto_assign, LeadFacts},
        optional_text, search_condition,
        validators::validate_not_blank,
        PageRequest,
    },
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

fn default_source_kind() -> LeadSourceKind {
    LeadSourceKind::Other
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateLeadRequest {
    #[validate(length(min = 1, max = 200), custom = "validate_not_blank")]
    pub name: String,
    pub company: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 5, max = 20))]
    pub phone: Option<String>,
    pub requirement: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    #[serde(default = "default_source_kind")]
    pub source_kind: LeadSourceKind,
    pub source_id: Option<Uuid>,
    #[serde(default)]
    pub priority: LeadPriority,
    pub assigned_to: Option<Uuid>,
    #[schema(value_type = Option<f64>)]
    pub estimated_value: Option<Decimal>,
    pub follow_up_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateLeadRequest {
    #[validate(length(min = 1, max = 200), custom = "validate_not_blank")]
    pub name: Option<String>,
    pub company: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 5, max = 20))]
    pub phone: Option<String>,
    pub requirement: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub priority: Option<LeadPriority>,
    #[schema(value_type = Option<f64>)]
    pub estimated_value: Option<Decimal>,
    pub follow_up_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct LeadFilter {
    pub status: Option<LeadStatus>,
    pub assigned_to: Option<Uuid>,
    pub source_kind: Option<LeadSourceKind>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LeadSummary {
    pub total: u64,
    pub by_status: BTreeMap<String, u64>,
    pub won: u64,
    /// Percentage of all leads that were won
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LeadConversion {
    pub lead: lead::Model,
    pub customer: customer::Model,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateLeadSourceRequest {
    #[validate(length(min = 1, max = 120), custom = "validate_not_blank")]
    pub name: String,
    pub kind: LeadSourceKind,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateLeadSourceRequest {
    #[validate(length(min = 1, max = 120), custom = "validate_not_blank")]
    pub name: Option<String>,
    pub is_active: Option<bool>,
}

fn require_contact(email: Option<&str>, phone: Option<&str>) -> Result<(), ServiceError> {
    let present = |v: Option<&str>| v.is_some_and(|s| !s.trim().is_empty());
    if present(email) || present(phone) {
        Ok(())
    } else {
        Err(ServiceError::invalid_field("phone", "a phone number or email is required"))
    }
}

pub async fn load_lead<C>(conn: &C, branch_id: Uuid, lead_id: Uuid) -> Result<lead::Model, ServiceError>
where
    C: ConnectionTrait,
{
    lead::Entity::find_by_id(lead_id)
        .filter(lead::Column::BranchId.eq(branch_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Lead", lead_id))
}

async fn check_assignee<C>(conn: &C, branch_id: Uuid, assignee: Uuid) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    let found = profile::Entity::find_by_id(assignee)
        .filter(profile::Column::BranchId.eq(branch_id))
        .filter(profile::Column::IsActive.eq(true))
        .one(conn)
        .await?;
    match found {
        Some(_) => Ok(()),
        None => Err(ServiceError::invalid_field(
            "assigned_to",
            "assignee must be an active user of this branch",
        )),
    }
}

/// Lead capture, qualification and conversion
#[derive(Clone)]
pub struct LeadService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl LeadService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    #[instrument(skip(self))]
    pub async fn list_leads(
        &self,
        branch_id: Uuid,
        filter: LeadFilter,
        page: PageRequest,
    ) -> Result<(Vec<lead::Model>, u64), ServiceError> {
        let mut select = lead::Entity::find()
            .filter(lead::Column::BranchId.eq(branch_id))
            .order_by_desc(lead::Column::ReceivedAt);
        if let Some(status) = filter.status {
            select = select.filter(lead::Column::Status.eq(status));
        }
        if let Some(assignee) = filter.assigned_to {
            select = select.filter(lead::Column::AssignedTo.eq(assignee));
        }
        if let Some(kind) = filter.source_kind {
            select = select.filter(lead::Column::SourceKind.eq(kind));
        }
        if let Some(term) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
            select = select.filter(search_condition(
                &[
                    lead::Column::Name,
                    lead::Column::Company,
                    lead::Column::Email,
                    lead::Column::Phone,
                    lead::Column::Requirement,
                ],
                term,
            ));
        }
        fetch_page(&self.db_pool, select, page).await
    }

    #[instrument(skip(self))]
    pub async fn get_lead(&self, branch_id: Uuid, lead_id: Uuid) -> Result<lead::Model, ServiceError> {
        load_lead(&*self.db_pool, branch_id, lead_id).await
    }

    /// Creates a lead. Without an explicit assignee the branch's assignment
    /// rules pick one in the same transaction.
    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_lead(&self, branch_id: Uuid, request: CreateLeadRequest) -> Result<lead::Model, ServiceError> {
        request.validate()?;
        require_contact(request.email.as_deref(), request.phone.as_deref())?;
        let db = &*self.db_pool;
        let lead_id = Uuid::new_v4();

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for lead creation");
            ServiceError::DatabaseError(e)
        })?;

        let assigned_to = match request.assigned_to {
            Some(assignee) => {
                check_assignee(&txn, branch_id, assignee).await?;
                Some(assignee)
            }
            None => {
                let facts = LeadFacts {
                    source_kind: request.source_kind,
                    name: &request.name,
                    company: request.company.as_deref(),
                    requirement: request.requirement.as_deref(),
                };
                auto_assign(&txn, branch_id, &facts).await?
            }
        };

        let now = Utc::now();
        let lead = lead::ActiveModel {
            id: Set(lead_id),
            branch_id: Set(branch_id),
            source_kind: Set(request.source_kind),
            source_id: Set(request.source_id),
            external_id: Set(None),
            name: Set(request.name.trim().to_string()),
            company: Set(optional_text(request.company)),
            email: Set(optional_text(request.email)),
            phone: Set(optional_text(request.phone)),
            requirement: Set(optional_text(request.requirement)),
            city: Set(optional_text(request.city)),
            state: Set(optional_text(request.state)),
            status: Set(LeadStatus::New),
            priority: Set(request.priority),
            assigned_to: Set(assigned_to),
            customer_id: Set(None),
            estimated_value: Set(request.estimated_value),
            follow_up_date: Set(request.follow_up_date),
            notes: Set(optional_text(request.notes)),
            received_at: Set(now),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, %lead_id, "Failed to insert lead");
            ServiceError::DatabaseError(e)
        })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, %lead_id, "Failed to commit lead creation");
            ServiceError::DatabaseError(e)
        })?;

        info!(%lead_id, assigned_to = ?lead.assigned_to, "lead created");
        self.event_sender
            .send_or_log(Event::created(branch_id, "leads", lead_id))
            .await;
        Ok(lead)
    }

    #[instrument(skip(self, request))]
    pub async fn update_lead(
        &self,
        branch_id: Uuid,
        lead_id: Uuid,
        request: UpdateLeadRequest,
    ) -> Result<lead::Model, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;
        let existing = load_lead(db, branch_id, lead_id).await?;

        let email = request.email.clone().or_else(|| existing.email.clone());
        let phone = request.phone.clone().or_else(|| existing.phone.clone());
        require_contact(email.as_deref(), phone.as_deref())?;

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
        if request.requirement.is_some() {
            active.requirement = Set(optional_text(request.requirement));
        }
        if request.city.is_some() {
            active.city = Set(optional_text(request.city));
        }
        if request.state.is_some() {
            active.state = Set(optional_text(request.state));
        }
        if let Some(priority) = request.priority {
            active.priority = Set(priority);
        }
        if request.estimated_value.is_some() {
            active.estimated_value = Set(request.estimated_value);
        }
        if request.follow_up_date.is_some() {
            active.follow_up_date = Set(request.follow_up_date);
        }
        if request.notes.is_some() {
            active.notes = Set(optional_text(request.notes));
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(db).await?;

        self.event_sender
            .send_or_log(Event::updated(branch_id, "leads", lead_id))
            .await;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn change_status(
        &self,
        branch_id: Uuid,
        lead_id: Uuid,
        status: LeadStatus,
    ) -> Result<lead::Model, ServiceError> {
        let db = &*self.db_pool;
        let existing = load_lead(db, branch_id, lead_id).await?;
        if !existing.status.can_transition_to(status) {
            return Err(ServiceError::InvalidStatus(format!(
                "lead cannot move from {} to {}",
                existing.status, status
            )));
        }

        let old_status = existing.status;
        let mut active = existing.into_active_model();
        active.status = Set(status);
        active.updated_at = Set(Utc::now());
        let updated = active.update(db).await?;

        info!(%lead_id, %old_status, new_status = %status, "lead status changed");
        self.event_sender
            .send_or_log(Event::updated(branch_id, "leads", lead_id))
            .await;
        Ok(updated)
    }

    /// Sets or clears the assignee.
    #[instrument(skip(self))]
    pub async fn assign_lead(
        &self,
        branch_id: Uuid,
        lead_id: Uuid,
        assignee: Option<Uuid>,
    ) -> Result<lead::Model, ServiceError> {
        let db = &*self.db_pool;
        let existing = load_lead(db, branch_id, lead_id).await?;
        if let Some(assignee) = assignee {
            check_assignee(db, branch_id, assignee).await?;
        }

        let mut active = existing.into_active_model();
        active.assigned_to = Set(assignee);
        active.updated_at = Set(Utc::now());
        let updated = active.update(db).await?;

        self.event_sender
            .send_or_log(Event::updated(branch_id, "leads", lead_id))
            .await;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete_lead(&self, branch_id: Uuid, lead_id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let lead = load_lead(db, branch_id, lead_id).await?;
        lead::Entity::delete_by_id(lead.id).exec(db).await?;
        info!(%lead_id, "lead deleted");
        self.event_sender
            .send_or_log(Event::deleted(branch_id, "leads", lead_id))
            .await;
        Ok(())
    }

    /// Creates a customer from the lead and links it. Early-stage leads are
    /// promoted to `qualified`.
    #[instrument(skip(self))]
    pub async fn convert_to_customer(
        &self,
        branch_id: Uuid,
        lead_id: Uuid,
        created_by: Uuid,
    ) -> Result<LeadConversion, ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for lead conversion");
            ServiceError::DatabaseError(e)
        })?;

        let lead = load_lead(&txn, branch_id, lead_id).await?;
        if let Some(customer_id) = lead.customer_id {
            return Err(ServiceError::Conflict(format!(
                "lead {lead_id} was already converted to customer {customer_id}"
            )));
        }

        let now = Utc::now();
        let customer_id = Uuid::new_v4();
        let address = match (lead.city.as_deref(), lead.state.as_deref()) {
            (Some(city), Some(state)) => Some(format!("{city}, {state}")),
            (Some(part), None) | (None, Some(part)) => Some(part.to_string()),
            (None, None) => None,
        };
        let customer = customer::ActiveModel {
            id: Set(customer_id),
            branch_id: Set(branch_id),
            name: Set(lead.name.clone()),
            company: Set(lead.company.clone()),
            email: Set(lead.email.clone()),
            phone: Set(lead.phone.clone()),
            gstin: Set(None),
            state_code: Set(None),
            billing_address: Set(address.clone()),
            shipping_address: Set(address),
            opening_balance: Set(Decimal::ZERO),
            created_by: Set(created_by),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, %lead_id, "Failed to insert customer for lead");
            ServiceError::DatabaseError(e)
        })?;

        let promote = matches!(lead.status, LeadStatus::New | LeadStatus::Contacted);
        let mut active = lead.into_active_model();
        active.customer_id = Set(Some(customer_id));
        if promote {
            active.status = Set(LeadStatus::Qualified);
        }
        active.updated_at = Set(now);
        let lead = active.update(&txn).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, %lead_id, "Failed to commit lead conversion");
            ServiceError::DatabaseError(e)
        })?;

        info!(%lead_id, %customer_id, "lead converted to customer");
        self.event_sender
            .send_or_log(Event::created(branch_id, "customers", customer_id))
            .await;
        self.event_sender
            .send_or_log(Event::updated(branch_id, "leads", lead_id))
            .await;
        Ok(LeadConversion { lead, customer })
    }

    /// Open leads whose follow-up date is on or before `today`.
    #[instrument(skip(self))]
    pub async fn due_follow_ups(&self, branch_id: Uuid, today: NaiveDate) -> Result<Vec<lead::Model>, ServiceError> {
        Ok(lead::Entity::find()
            .filter(lead::Column::BranchId.eq(branch_id))
            .filter(lead::Column::FollowUpDate.lte(today))
            .filter(lead::Column::Status.is_not_in([LeadStatus::Won, LeadStatus::Lost]))
            .order_by_asc(lead::Column::FollowUpDate)
            .all(&*self.db_pool)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn summary(&self, branch_id: Uuid) -> Result<LeadSummary, ServiceError> {
        let counts: Vec<(LeadStatus, i64)> = lead::Entity::find()
            .select_only()
            .column(lead::Column::Status)
            .column_as(lead::Column::Id.count(), "count")
            .filter(lead::Column::BranchId.eq(branch_id))
            .group_by(lead::Column::Status)
            .into_tuple()
            .all(&*self.db_pool)
            .await?;

        let mut by_status = BTreeMap::new();
        let mut total = 0u64;
        let mut won = 0u64;
        for (status, count) in counts {
            let count = count.max(0) as u64;
            total += count;
            if status == LeadStatus::Won {
                won = count;
            }
            by_status.insert(status.to_string(), count);
        }
        let conversion_rate = if total == 0 {
            0.0
        } else {
            ((won as f64 / total as f64) * 10_000.0).round() / 100.0
        };

        Ok(LeadSummary {
            total,
            by_status,
            won,
            conversion_rate,
        })
    }

    // Lead sources

    #[instrument(skip(self))]
    pub async fn list_sources(&self, branch_id: Uuid) -> Result<Vec<lead_source::Model>, ServiceError> {
        Ok(lead_source::Entity::find()
            .filter(lead_source::Column::BranchId.eq(branch_id))
            .order_by_asc(lead_source::Column::Name)
            .all(&*self.db_pool)
            .await?)
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_source(
        &self,
        branch_id: Uuid,
        request: CreateLeadSourceRequest,
    ) -> Result<lead_source::Model, ServiceError> {
        request.validate()?;
        let source = lead_source::ActiveModel {
            id: Set(Uuid::new_v4()),
            branch_id: Set(branch_id),
            name: Set(request.name.trim().to_string()),
            kind: Set(request.kind),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db_pool)
        .await?;
        self.event_sender
            .send_or_log(Event::created(branch_id, "lead_sources", source.id))
            .await;
        Ok(source)
    }

    #[instrument(skip(self, request))]
    pub async fn update_source(
        &self,
        branch_id: Uuid,
        source_id: Uuid,
        request: UpdateLeadSourceRequest,
    ) -> Result<lead_source::Model, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;
        let existing = self.load_source(branch_id, source_id).await?;
        let mut active = existing.into_active_model();
        if let Some(name) = request.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(is_active) = request.is_active {
            active.is_active = Set(is_active);
        }
        let updated = active.update(db).await?;
        self.event_sender
            .send_or_log(Event::updated(branch_id, "lead_sources", source_id))
            .await;
        Ok(updated)
    }

    /// Sources still referenced by leads are deactivated instead of removed.
    #[instrument(skip(self))]
    pub async fn delete_source(&self, branch_id: Uuid, source_id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let existing = self.load_source(branch_id, source_id).await?;
        let in_use = lead::Entity::find()
            .filter(lead::Column::SourceId.eq(source_id))
            .count(db)
            .await?;
        if in_use > 0 {
            let mut active = existing.into_active_model();
            active.is_active = Set(false);
            active.update(db).await?;
            info!(%source_id, in_use, "lead source deactivated");
            self.event_sender
                .send_or_log(Event::updated(branch_id, "lead_sources", source_id))
                .await;
        } else {
            lead_source::Entity::delete_by_id(source_id).exec(db).await?;
            self.event_sender
                .send_or_log(Event::deleted(branch_id, "lead_sources", source_id))
                .await;
        }
        Ok(())
    }

    async fn load_source(&self, branch_id: Uuid, source_id: Uuid) -> Result<lead_source::Model, ServiceError> {
        lead_source::Entity::find_by_id(source_id)
            .filter(lead_source::Column::BranchId.eq(branch_id))
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Lead source", source_id))
    }
}
