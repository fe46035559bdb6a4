use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const DEFAULT_INTERVAL_MINUTES: i32 = 5;
pub const MIN_INTERVAL_MINUTES: i32 = 1;
pub const MAX_INTERVAL_MINUTES: i32 = 30;

/// Per-branch auto-sync preference.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "sync_settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub branch_id: Uuid,
    pub auto_sync_enabled: bool,
    pub interval_minutes: i32,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn defaults(branch_id: Uuid) -> Self {
        Self {
            branch_id,
            auto_sync_enabled: false,
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
