use crate::{
    auth::SessionStore,
    db::DbPool,
    entities::profile::{self, Role},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{branches::load_branch, fetch_page, optional_text, search_condition, PageRequest},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateProfileRequest {
    /// Auth provider user id
    pub id: Uuid,
    /// Defaults to the caller's effective branch
    pub branch_id: Option<Uuid>,
    #[validate(length(min = 1, max = 200))]
    pub full_name: String,
    #[validate(email)]
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 200))]
    pub full_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Option<Role>,
    pub branch_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

pub async fn load_profile<C>(conn: &C, branch_id: Uuid, profile_id: Uuid) -> Result<profile::Model, ServiceError>
where
    C: ConnectionTrait,
{
    profile::Entity::find_by_id(profile_id)
        .filter(profile::Column::BranchId.eq(branch_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Profile", profile_id))
}

/// User profiles; deactivation and role changes end the user's sessions
#[derive(Clone)]
pub struct ProfileService {
    db_pool: Arc<DbPool>,
    sessions: Arc<dyn SessionStore>,
    event_sender: Arc<EventSender>,
}

impl ProfileService {
    pub fn new(db_pool: Arc<DbPool>, sessions: Arc<dyn SessionStore>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            sessions,
            event_sender,
        }
    }

    #[instrument(skip(self))]
    pub async fn list_profiles(
        &self,
        branch_id: Uuid,
        search: Option<String>,
        page: PageRequest,
    ) -> Result<(Vec<profile::Model>, u64), ServiceError> {
        let mut select = profile::Entity::find()
            .filter(profile::Column::BranchId.eq(branch_id))
            .order_by_asc(profile::Column::FullName);
        if let Some(term) = search.as_deref().filter(|s| !s.trim().is_empty()) {
            select = select.filter(search_condition(
                &[profile::Column::FullName, profile::Column::Email],
                term,
            ));
        }
        fetch_page(&self.db_pool, select, page).await
    }

    #[instrument(skip(self))]
    pub async fn get_profile(&self, branch_id: Uuid, profile_id: Uuid) -> Result<profile::Model, ServiceError> {
        load_profile(&*self.db_pool, branch_id, profile_id).await
    }

    #[instrument(skip(self, request), fields(profile_id = %request.id))]
    pub async fn create_profile(
        &self,
        branch_id: Uuid,
        request: CreateProfileRequest,
    ) -> Result<profile::Model, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;
        let branch_id = request.branch_id.unwrap_or(branch_id);
        load_branch(db, branch_id).await?;

        if profile::Entity::find_by_id(request.id).one(db).await?.is_some() {
            return Err(ServiceError::Conflict(format!("profile {} already exists", request.id)));
        }

        let now = Utc::now();
        let created = profile::ActiveModel {
            id: Set(request.id),
            branch_id: Set(branch_id),
            full_name: Set(request.full_name.trim().to_string()),
            email: Set(request.email.trim().to_lowercase()),
            phone: Set(optional_text(request.phone)),
            role: Set(request.role),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await?;

        info!(profile_id = %created.id, role = %created.role, "profile created");
        self.event_sender
            .send_or_log(Event::created(branch_id, "profiles", created.id))
            .await;
        Ok(created)
    }

    #[instrument(skip(self, request))]
    pub async fn update_profile(
        &self,
        branch_id: Uuid,
        profile_id: Uuid,
        request: UpdateProfileRequest,
    ) -> Result<profile::Model, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;
        let existing = load_profile(db, branch_id, profile_id).await?;

        let deactivating = existing.is_active && request.is_active == Some(false);
        let access_changed = request.role.is_some_and(|r| r != existing.role)
            || request.branch_id.is_some_and(|b| b != existing.branch_id);

        let mut active = existing.into_active_model();
        if let Some(name) = request.full_name {
            active.full_name = Set(name.trim().to_string());
        }
        if let Some(email) = request.email {
            active.email = Set(email.trim().to_lowercase());
        }
        if request.phone.is_some() {
            active.phone = Set(optional_text(request.phone));
        }
        if let Some(role) = request.role {
            active.role = Set(role);
        }
        if let Some(target) = request.branch_id {
            load_branch(db, target).await?;
            active.branch_id = Set(target);
        }
        if let Some(is_active) = request.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(db).await?;

        if deactivating || access_changed {
            self.end_sessions(profile_id).await;
        }
        self.event_sender
            .send_or_log(Event::updated(branch_id, "profiles", profile_id))
            .await;
        Ok(updated)
    }

    /// Deactivates a profile by id regardless of branch. Used when an employee's
    /// login is withdrawn.
    #[instrument(skip(self))]
    pub async fn deactivate(&self, profile_id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        if let Some(existing) = profile::Entity::find_by_id(profile_id).one(db).await? {
            let mut active = existing.into_active_model();
            active.is_active = Set(false);
            active.updated_at = Set(Utc::now());
            active.update(db).await?;
        }
        self.end_sessions(profile_id).await;
        Ok(())
    }

    async fn end_sessions(&self, user_id: Uuid) {
        let count = self.sessions.revoke_user(user_id).await;
        self.event_sender
            .send_or_log(Event::SessionsRevoked { user_id, count })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::InMemorySessionStore;
    use crate::db::memory_pool;
    use crate::services::testing::{event_sender, seed_branch, seed_profile};
    use chrono::Duration;

    #[tokio::test]
    async fn deactivation_revokes_sessions() {
        let db = Arc::new(memory_pool().await);
        let branch = seed_branch(&db, "PRF", "27").await;
        let user = seed_profile(&db, branch.id, Role::Sales).await;
        let store = Arc::new(InMemorySessionStore::new());
        let session = store
            .create(user.id, branch.id, Role::Sales, Duration::hours(1))
            .await;
        let service = ProfileService::new(db.clone(), store.clone(), event_sender());

        let renamed = service
            .update_profile(
                branch.id,
                user.id,
                UpdateProfileRequest {
                    full_name: Some("Renamed".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.full_name, "Renamed");
        assert!(store.get(&session.token).await.is_some());

        service
            .update_profile(
                branch.id,
                user.id,
                UpdateProfileRequest {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(store.get(&session.token).await.is_none());
    }
}
