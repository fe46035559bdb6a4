use super::lead_source::LeadSourceKind;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Durable state of one (branch, source) sync job.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "sync_status")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub branch_id: Uuid,
    pub source_kind: LeadSourceKind,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: i32,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_new_count: i32,
    pub total_imported: i64,
    /// Set while a run is in flight; cleared on completion and at start-up
    pub running_since: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
