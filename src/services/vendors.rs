use crate::{
    db::DbPool,
    entities::{purchase_order, vendor},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        fetch_page, optional_text, search_condition,
        validators::{validate_gstin, validate_not_blank, validate_state_code},
        PageRequest,
    },
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, ModelTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateVendorRequest {
    #[validate(length(min = 1, max = 200), custom = "validate_not_blank")]
    pub name: String,
    pub contact_person: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    #[validate(custom = "validate_gstin")]
    pub gstin: Option<String>,
    #[validate(custom = "validate_state_code")]
    pub state_code: Option<String>,
    pub address: Option<String>,
    pub payment_terms: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateVendorRequest {
    #[validate(length(min = 1, max = 200), custom = "validate_not_blank")]
    pub name: Option<String>,
    pub contact_person: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    #[validate(custom = "validate_gstin")]
    pub gstin: Option<String>,
    #[validate(custom = "validate_state_code")]
    pub state_code: Option<String>,
    pub address: Option<String>,
    pub payment_terms: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct VendorFilter {
    pub active: Option<bool>,
    pub search: Option<String>,
}

/// What happened to a vendor on delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VendorRemoval {
    Deleted,
    Deactivated,
}

pub async fn load_vendor<C>(conn: &C, branch_id: Uuid, vendor_id: Uuid) -> Result<vendor::Model, ServiceError>
where
    C: ConnectionTrait,
{
    vendor::Entity::find_by_id(vendor_id)
        .filter(vendor::Column::BranchId.eq(branch_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Vendor", vendor_id))
}

/// Suppliers purchase orders are raised against
#[derive(Clone)]
pub struct VendorService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl VendorService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    #[instrument(skip(self))]
    pub async fn list_vendors(
        &self,
        branch_id: Uuid,
        filter: VendorFilter,
        page: PageRequest,
    ) -> Result<(Vec<vendor::Model>, u64), ServiceError> {
        let mut select = vendor::Entity::find()
            .filter(vendor::Column::BranchId.eq(branch_id))
            .order_by_asc(vendor::Column::Name);
        if let Some(active) = filter.active {
            select = select.filter(vendor::Column::IsActive.eq(active));
        }
        if let Some(term) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
            select = select.filter(search_condition(
                &[
                    vendor::Column::Name,
                    vendor::Column::ContactPerson,
                    vendor::Column::Email,
                    vendor::Column::Gstin,
                ],
                term,
            ));
        }
        fetch_page(&self.db_pool, select, page).await
    }

    #[instrument(skip(self))]
    pub async fn get_vendor(&self, branch_id: Uuid, vendor_id: Uuid) -> Result<vendor::Model, ServiceError> {
        load_vendor(&*self.db_pool, branch_id, vendor_id).await
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_vendor(&self, branch_id: Uuid, request: CreateVendorRequest) -> Result<vendor::Model, ServiceError> {
        request.validate()?;
        let now = Utc::now();
        let created = vendor::ActiveModel {
            id: Set(Uuid::new_v4()),
            branch_id: Set(branch_id),
            name: Set(request.name.trim().to_string()),
            contact_person: Set(optional_text(request.contact_person)),
            email: Set(optional_text(request.email).map(|e| e.to_lowercase())),
            phone: Set(optional_text(request.phone)),
            gstin: Set(optional_text(request.gstin).map(|g| g.to_uppercase())),
            state_code: Set(optional_text(request.state_code)),
            address: Set(optional_text(request.address)),
            payment_terms: Set(optional_text(request.payment_terms)),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db_pool)
        .await?;

        info!(vendor_id = %created.id, "vendor created");
        self.event_sender
            .send_or_log(Event::created(branch_id, "vendors", created.id))
            .await;
        Ok(created)
    }

    #[instrument(skip(self, request))]
    pub async fn update_vendor(
        &self,
        branch_id: Uuid,
        vendor_id: Uuid,
        request: UpdateVendorRequest,
    ) -> Result<vendor::Model, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;
        let existing = load_vendor(db, branch_id, vendor_id).await?;

        let mut active = existing.into_active_model();
        if let Some(name) = request.name {
            active.name = Set(name.trim().to_string());
        }
        if request.contact_person.is_some() {
            active.contact_person = Set(optional_text(request.contact_person));
        }
        if request.email.is_some() {
            active.email = Set(optional_text(request.email).map(|e| e.to_lowercase()));
        }
        if request.phone.is_some() {
            active.phone = Set(optional_text(request.phone));
        }
        if request.gstin.is_some() {
            active.gstin = Set(optional_text(request.gstin).map(|g| g.to_uppercase()));
        }
        if request.state_code.is_some() {
            active.state_code = Set(optional_text(request.state_code));
        }
        if request.address.is_some() {
            active.address = Set(optional_text(request.address));
        }
        if request.payment_terms.is_some() {
            active.payment_terms = Set(optional_text(request.payment_terms));
        }
        if let Some(is_active) = request.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(db).await?;

        self.event_sender
            .send_or_log(Event::updated(branch_id, "vendors", vendor_id))
            .await;
        Ok(updated)
    }

    /// Deletes the vendor, or deactivates it when purchase orders refer to it.
    #[instrument(skip(self))]
    pub async fn delete_vendor(&self, branch_id: Uuid, vendor_id: Uuid) -> Result<VendorRemoval, ServiceError> {
        let db = &*self.db_pool;
        let existing = load_vendor(db, branch_id, vendor_id).await?;
        let references = purchase_order::Entity::find()
            .filter(purchase_order::Column::VendorId.eq(vendor_id))
            .count(db)
            .await?;

        if references > 0 {
            let mut active = existing.into_active_model();
            active.is_active = Set(false);
            active.updated_at = Set(Utc::now());
            active.update(db).await?;
            info!(%vendor_id, references, "vendor deactivated instead of deleted");
            self.event_sender
                .send_or_log(Event::updated(branch_id, "vendors", vendor_id))
                .await;
            return Ok(VendorRemoval::Deactivated);
        }

        existing.delete(db).await?;
        info!(%vendor_id, "vendor deleted");
        self.event_sender
            .send_or_log(Event::deleted(branch_id, "vendors", vendor_id))
            .await;
        Ok(VendorRemoval::Deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::services::testing::{event_sender, seed_branch, seed_vendor};
    use assert_matches::assert_matches;

    fn request(name: &str, email: &str) -> CreateVendorRequest {
        CreateVendorRequest {
            name: name.into(),
            contact_person: Some("Kiran".into()),
            email: Some(email.into()),
            phone: None,
            gstin: None,
            state_code: Some("24".into()),
            address: None,
            payment_terms: Some("Net 30".into()),
        }
    }

    #[tokio::test]
    async fn create_search_and_scope() {
        let db = Arc::new(memory_pool().await);
        let branch = seed_branch(&db, "VND", "27").await;
        let other = seed_branch(&db, "VNX", "27").await;
        let service = VendorService::new(db.clone(), event_sender());

        let created = service
            .create_vendor(branch.id, request("Gujarat Steel", "Sales@GujaratSteel.example"))
            .await
            .unwrap();
        assert_eq!(created.email.as_deref(), Some("sales@gujaratsteel.example"));
        service
            .create_vendor(branch.id, request("Paper Mills", "orders@papermills.example"))
            .await
            .unwrap();

        let (found, total) = service
            .list_vendors(
                branch.id,
                VendorFilter {
                    search: Some("steel".into()),
                    ..Default::default()
                },
                PageRequest::default(),
            )
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(found[0].id, created.id);

        assert_matches!(
            service.get_vendor(other.id, created.id).await,
            Err(ServiceError::NotFound(_))
        );
        assert_matches!(
            service.create_vendor(branch.id, request("  ", "blank@vendor.example")).await,
            Err(ServiceError::InvalidField { field, .. }) if field == "name"
        );
    }

    #[tokio::test]
    async fn unreferenced_vendor_is_deleted() {
        let db = Arc::new(memory_pool().await);
        let branch = seed_branch(&db, "VND", "27").await;
        let vendor = seed_vendor(&db, branch.id, "Loose Parts", Some("27")).await;
        let service = VendorService::new(db.clone(), event_sender());

        assert_eq!(
            service.delete_vendor(branch.id, vendor.id).await.unwrap(),
            VendorRemoval::Deleted
        );
        assert_matches!(
            service.get_vendor(branch.id, vendor.id).await,
            Err(ServiceError::NotFound(_))
        );
    }
}
