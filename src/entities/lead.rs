use super::lead_source::LeadSourceKind;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LeadStatus {
    #[sea_orm(string_value = "new")]
    New,
    #[sea_orm(string_value = "contacted")]
    Contacted,
    #[sea_orm(string_value = "qualified")]
    Qualified,
    #[sea_orm(string_value = "proposal_sent")]
    ProposalSent,
    #[sea_orm(string_value = "negotiation")]
    Negotiation,
    #[sea_orm(string_value = "won")]
    Won,
    #[sea_orm(string_value = "lost")]
    Lost,
}

impl LeadStatus {
    pub fn is_open(self) -> bool {
        !matches!(self, LeadStatus::Won | LeadStatus::Lost)
    }

    /// Open leads move freely; `won` is final and `lost` may only be reopened.
    pub fn can_transition_to(self, next: LeadStatus) -> bool {
        match self {
            LeadStatus::Won => false,
            LeadStatus::Lost => next == LeadStatus::New,
            _ => next != self,
        }
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum LeadPriority {
    #[sea_orm(string_value = "low")]
    Low,
    #[default]
    #[sea_orm(string_value = "medium")]
    Medium,
    #[sea_orm(string_value = "high")]
    High,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "leads")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub branch_id: Uuid,
    pub source_kind: LeadSourceKind,
    pub source_id: Option<Uuid>,
    /// Identifier assigned by the external marketplace, unique per branch and source
    pub external_id: Option<String>,
    pub name: String,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub requirement: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub status: LeadStatus,
    pub priority: LeadPriority,
    pub assigned_to: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))", nullable)]
    pub estimated_value: Option<Decimal>,
    pub follow_up_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub received_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn won_is_terminal() {
        assert!(!LeadStatus::Won.can_transition_to(LeadStatus::New));
        assert!(!LeadStatus::Won.can_transition_to(LeadStatus::Lost));
    }

    #[test]
    fn lost_can_only_reopen() {
        assert!(LeadStatus::Lost.can_transition_to(LeadStatus::New));
        assert!(!LeadStatus::Lost.can_transition_to(LeadStatus::Contacted));
    }

    #[test]
    fn open_statuses_move_freely() {
        assert!(LeadStatus::New.can_transition_to(LeadStatus::Negotiation));
        assert!(LeadStatus::Negotiation.can_transition_to(LeadStatus::Contacted));
        assert!(LeadStatus::Qualified.can_transition_to(LeadStatus::Won));
    }
}
