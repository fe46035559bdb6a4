use crate::{
    db::DbPool,
    entities::branch,
    errors::ServiceError,
    services::{
        optional_text,
        validators::{validate_branch_code, validate_gstin, validate_not_blank, validate_state_code},
    },
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

pub async fn load_branch<C>(conn: &C, branch_id: Uuid) -> Result<branch::Model, ServiceError>
where
    C: ConnectionTrait,
{
    branch::Entity::find_by_id(branch_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Branch", branch_id))
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBranchRequest {
    #[validate(length(min = 1, max = 200), custom = "validate_not_blank")]
    pub name: String,
    #[validate(custom = "validate_branch_code")]
    pub code: String,
    #[validate(custom = "validate_state_code")]
    pub state_code: String,
    #[validate(custom = "validate_gstin")]
    pub gstin: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBranchRequest {
    #[validate(length(min = 1, max = 200), custom = "validate_not_blank")]
    pub name: Option<String>,
    #[validate(custom = "validate_state_code")]
    pub state_code: Option<String>,
    #[validate(custom = "validate_gstin")]
    pub gstin: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Clone)]
pub struct BranchService {
    db_pool: Arc<DbPool>,
}

impl BranchService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self))]
    pub async fn list_branches(&self) -> Result<Vec<branch::Model>, ServiceError> {
        Ok(branch::Entity::find()
            .order_by_asc(branch::Column::Code)
            .all(&*self.db_pool)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn get_branch(&self, branch_id: Uuid) -> Result<branch::Model, ServiceError> {
        load_branch(&*self.db_pool, branch_id).await
    }

    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create_branch(&self, request: CreateBranchRequest) -> Result<branch::Model, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;
        let code = request.code.to_uppercase();

        let taken = branch::Entity::find()
            .filter(branch::Column::Code.eq(code.clone()))
            .one(db)
            .await?;
        if taken.is_some() {
            return Err(ServiceError::Conflict(format!("branch code {code} is already in use")));
        }

        let now = Utc::now();
        let branch = branch::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name.trim().to_string()),
            code: Set(code),
            state_code: Set(request.state_code),
            gstin: Set(optional_text(request.gstin)),
            address: Set(optional_text(request.address)),
            phone: Set(optional_text(request.phone)),
            email: Set(optional_text(request.email)),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await?;

        info!(branch_id = %branch.id, code = %branch.code, "branch created");
        Ok(branch)
    }

    #[instrument(skip(self, request))]
    pub async fn update_branch(
        &self,
        branch_id: Uuid,
        request: UpdateBranchRequest,
    ) -> Result<branch::Model, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;
        let mut active = load_branch(db, branch_id).await?.into_active_model();

        if let Some(name) = request.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(state_code) = request.state_code {
            active.state_code = Set(state_code);
        }
        if request.gstin.is_some() {
            active.gstin = Set(optional_text(request.gstin));
        }
        if request.address.is_some() {
            active.address = Set(optional_text(request.address));
        }
        if request.phone.is_some() {
            active.phone = Set(optional_text(request.phone));
        }
        if request.email.is_some() {
            active.email = Set(optional_text(request.email));
        }
        if let Some(is_active) = request.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        Ok(active.update(db).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use assert_matches::assert_matches;

    fn request(code: &str, state: &str) -> CreateBranchRequest {
        CreateBranchRequest {
            name: "Pune".into(),
            code: code.into(),
            state_code: state.into(),
            gstin: None,
            address: None,
            phone: None,
            email: None,
        }
    }

    #[tokio::test]
    async fn codes_are_unique_case_insensitively() {
        let service = BranchService::new(Arc::new(memory_pool().await));
        let created = service.create_branch(request("pun01", "27")).await.unwrap();
        assert_eq!(created.code, "PUN01");

        assert_matches!(
            service.create_branch(request("PUN01", "27")).await,
            Err(ServiceError::Conflict(_))
        );
    }

    #[tokio::test]
    async fn rejects_malformed_codes() {
        let service = BranchService::new(Arc::new(memory_pool().await));
        assert_matches!(
            service.create_branch(request("P-1", "27")).await,
            Err(ServiceError::InvalidField { field, .. }) if field == "code"
        );
        assert_matches!(
            service.create_branch(request("PUN02", "270")).await,
            Err(ServiceError::InvalidField { field, .. }) if field == "state_code"
        );
    }
}
