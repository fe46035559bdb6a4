use super::lead_source::LeadSourceKind;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Round-robin assignment rule for incoming leads.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "lead_assignment_rules")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub branch_id: Uuid,
    pub name: String,
    /// Only leads from this source match; `None` matches every source
    pub source_kind: Option<LeadSourceKind>,
    /// Case-insensitive substring looked up in requirement, company and name
    pub keyword: Option<String>,
    /// JSON array of profile ids
    pub assignee_ids: Json,
    pub next_index: i32,
    /// Lower values are evaluated first
    pub priority: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Parsed assignee list; malformed entries are skipped.
    pub fn assignees(&self) -> Vec<Uuid> {
        self.assignee_ids
            .as_array()
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_str().and_then(|s| Uuid::parse_str(s).ok()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
