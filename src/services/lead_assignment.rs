use crate::{
    db::DbPool,
    entities::{lead_assignment_rule, lead_source::LeadSourceKind, profile},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{optional_text, validators::validate_not_blank},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

fn default_priority() -> i32 {
    100
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateRuleRequest {
    #[validate(length(min = 1, max = 120), custom = "validate_not_blank")]
    pub name: String,
    pub source_kind: Option<LeadSourceKind>,
    #[validate(length(max = 120))]
    pub keyword: Option<String>,
    pub assignee_ids: Vec<Uuid>,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateRuleRequest {
    #[validate(length(min = 1, max = 120), custom = "validate_not_blank")]
    pub name: Option<String>,
    pub source_kind: Option<LeadSourceKind>,
    /// Clears the source filter when true
    #[serde(default)]
    pub any_source: bool,
    #[validate(length(max = 120))]
    pub keyword: Option<String>,
    pub assignee_ids: Option<Vec<Uuid>>,
    pub priority: Option<i32>,
    pub is_active: Option<bool>,
}

/// The fields of an incoming lead that rules look at.
#[derive(Debug, Clone, Copy)]
pub struct LeadFacts<'a> {
    pub source_kind: LeadSourceKind,
    pub name: &'a str,
    pub company: Option<&'a str>,
    pub requirement: Option<&'a str>,
}

pub fn rule_matches(rule: &lead_assignment_rule::Model, lead: &LeadFacts<'_>) -> bool {
    if !rule.is_active {
        return false;
    }
    if rule.source_kind.is_some_and(|kind| kind != lead.source_kind) {
        return false;
    }
    match rule.keyword.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        None => true,
        Some(keyword) => {
            let keyword = keyword.to_lowercase();
            [lead.requirement, lead.company, Some(lead.name)]
                .into_iter()
                .flatten()
                .any(|text| text.to_lowercase().contains(&keyword))
        }
    }
}

/// Picks an assignee for a new lead and advances the winning rule's cursor.
/// Returns `None` when no active rule with assignees matches.
pub async fn auto_assign<C>(
    conn: &C,
    branch_id: Uuid,
    lead: &LeadFacts<'_>,
) -> Result<Option<Uuid>, ServiceError>
where
    C: ConnectionTrait,
{
    let rules = lead_assignment_rule::Entity::find()
        .filter(lead_assignment_rule::Column::BranchId.eq(branch_id))
        .filter(lead_assignment_rule::Column::IsActive.eq(true))
        .order_by_asc(lead_assignment_rule::Column::Priority)
        .order_by_asc(lead_assignment_rule::Column::CreatedAt)
        .all(conn)
        .await?;

    for rule in rules {
        if !rule_matches(&rule, lead) {
            continue;
        }
        let assignees = rule.assignees();
        if assignees.is_empty() {
            continue;
        }

        let cursor = rule.next_index.max(0) as usize;
        let assignee = assignees[cursor % assignees.len()];
        let next = ((cursor + 1) % assignees.len()) as i32;
        let rule_id = rule.id;

        let mut active = rule.into_active_model();
        active.next_index = Set(next);
        active.updated_at = Set(Utc::now());
        active.update(conn).await?;

        debug!(%rule_id, %assignee, "lead matched assignment rule");
        return Ok(Some(assignee));
    }
    Ok(None)
}

#[derive(Clone)]
pub struct LeadAssignmentService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl LeadAssignmentService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    async fn load_rule(&self, branch_id: Uuid, rule_id: Uuid) -> Result<lead_assignment_rule::Model, ServiceError> {
        lead_assignment_rule::Entity::find_by_id(rule_id)
            .filter(lead_assignment_rule::Column::BranchId.eq(branch_id))
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Assignment rule", rule_id))
    }

    /// Every assignee must be an active profile of the branch.
    async fn check_assignees(&self, branch_id: Uuid, assignees: &[Uuid]) -> Result<(), ServiceError> {
        if assignees.is_empty() {
            return Err(ServiceError::invalid_field("assignee_ids", "at least one assignee is required"));
        }
        let found = profile::Entity::find()
            .filter(profile::Column::BranchId.eq(branch_id))
            .filter(profile::Column::IsActive.eq(true))
            .filter(profile::Column::Id.is_in(assignees.iter().copied()))
            .count(&*self.db_pool)
            .await?;
        let mut unique = assignees.to_vec();
        unique.sort();
        unique.dedup();
        if found as usize != unique.len() {
            return Err(ServiceError::invalid_field(
                "assignee_ids",
                "assignees must be active users of this branch",
            ));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_rules(&self, branch_id: Uuid) -> Result<Vec<lead_assignment_rule::Model>, ServiceError> {
        Ok(lead_assignment_rule::Entity::find()
            .filter(lead_assignment_rule::Column::BranchId.eq(branch_id))
            .order_by_asc(lead_assignment_rule::Column::Priority)
            .order_by_asc(lead_assignment_rule::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn get_rule(&self, branch_id: Uuid, rule_id: Uuid) -> Result<lead_assignment_rule::Model, ServiceError> {
        self.load_rule(branch_id, rule_id).await
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_rule(
        &self,
        branch_id: Uuid,
        request: CreateRuleRequest,
    ) -> Result<lead_assignment_rule::Model, ServiceError> {
        request.validate()?;
        self.check_assignees(branch_id, &request.assignee_ids).await?;

        let now = Utc::now();
        let rule = lead_assignment_rule::ActiveModel {
            id: Set(Uuid::new_v4()),
            branch_id: Set(branch_id),
            name: Set(request.name.trim().to_string()),
            source_kind: Set(request.source_kind),
            keyword: Set(optional_text(request.keyword)),
            assignee_ids: Set(json!(request.assignee_ids)),
            next_index: Set(0),
            priority: Set(request.priority),
            is_active: Set(request.is_active),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db_pool)
        .await?;

        info!(rule_id = %rule.id, "lead assignment rule created");
        self.event_sender
            .send_or_log(Event::created(branch_id, "lead_assignment_rules", rule.id))
            .await;
        Ok(rule)
    }

    #[instrument(skip(self, request))]
    pub async fn update_rule(
        &self,
        branch_id: Uuid,
        rule_id: Uuid,
        request: UpdateRuleRequest,
    ) -> Result<lead_assignment_rule::Model, ServiceError> {
        request.validate()?;
        let existing = self.load_rule(branch_id, rule_id).await?;
        let mut active = existing.into_active_model();

        if let Some(name) = request.name {
            active.name = Set(name.trim().to_string());
        }
        if request.any_source {
            active.source_kind = Set(None);
        } else if request.source_kind.is_some() {
            active.source_kind = Set(request.source_kind);
        }
        if request.keyword.is_some() {
            active.keyword = Set(optional_text(request.keyword));
        }
        if let Some(assignees) = request.assignee_ids {
            self.check_assignees(branch_id, &assignees).await?;
            active.assignee_ids = Set(json!(assignees));
            active.next_index = Set(0);
        }
        if let Some(priority) = request.priority {
            active.priority = Set(priority);
        }
        if let Some(is_active) = request.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db_pool).await?;

        self.event_sender
            .send_or_log(Event::updated(branch_id, "lead_assignment_rules", rule_id))
            .await;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete_rule(&self, branch_id: Uuid, rule_id: Uuid) -> Result<(), ServiceError> {
        let rule = self.load_rule(branch_id, rule_id).await?;
        lead_assignment_rule::Entity::delete_by_id(rule.id)
            .exec(&*self.db_pool)
            .await?;
        info!(%rule_id, "lead assignment rule deleted");
        self.event_sender
            .send_or_log(Event::deleted(branch_id, "lead_assignment_rules", rule_id))
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::entities::profile::Role;
    use crate::services::testing::{event_sender, seed_branch, seed_profile};
    use assert_matches::assert_matches;

    fn facts<'a>(source_kind: LeadSourceKind, requirement: Option<&'a str>) -> LeadFacts<'a> {
        LeadFacts {
            source_kind,
            name: "Ravi Traders",
            company: Some("Ravi Traders Pvt Ltd"),
            requirement,
        }
    }

    fn rule(source_kind: Option<LeadSourceKind>, keyword: Option<&str>) -> lead_assignment_rule::Model {
        let now = Utc::now();
        lead_assignment_rule::Model {
            id: Uuid::new_v4(),
            branch_id: Uuid::new_v4(),
            name: "r".into(),
            source_kind,
            keyword: keyword.map(str::to_string),
            assignee_ids: json!([]),
            next_index: 0,
            priority: 1,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn matching_by_source_and_keyword() {
        let lead = facts(LeadSourceKind::Indiamart, Some("Need 40 STEEL racks"));
        assert!(rule_matches(&rule(None, None), &lead));
        assert!(rule_matches(&rule(Some(LeadSourceKind::Indiamart), Some("steel")), &lead));
        assert!(!rule_matches(&rule(Some(LeadSourceKind::Tradeindia), None), &lead));
        assert!(!rule_matches(&rule(None, Some("plastic")), &lead));
        // keyword found in the company name
        assert!(rule_matches(&rule(None, Some("pvt")), &facts(LeadSourceKind::Website, None)));

        let mut inactive = rule(None, None);
        inactive.is_active = false;
        assert!(!rule_matches(&inactive, &lead));
    }

    #[tokio::test]
    async fn round_robin_follows_priority() {
        let db = Arc::new(memory_pool().await);
        let branch = seed_branch(&db, "LAR", "27").await;
        let a = seed_profile(&db, branch.id, Role::Sales).await;
        let b = seed_profile(&db, branch.id, Role::Sales).await;
        let c = seed_profile(&db, branch.id, Role::Sales).await;
        let service = LeadAssignmentService::new(db.clone(), event_sender());

        service
            .create_rule(
                branch.id,
                CreateRuleRequest {
                    name: "catch-all".into(),
                    source_kind: None,
                    keyword: None,
                    assignee_ids: vec![c.id],
                    priority: 50,
                    is_active: true,
                },
            )
            .await
            .unwrap();
        service
            .create_rule(
                branch.id,
                CreateRuleRequest {
                    name: "indiamart".into(),
                    source_kind: Some(LeadSourceKind::Indiamart),
                    keyword: None,
                    assignee_ids: vec![a.id, b.id],
                    priority: 10,
                    is_active: true,
                },
            )
            .await
            .unwrap();

        let lead = facts(LeadSourceKind::Indiamart, None);
        let picks: Vec<_> = [
            auto_assign(&*db, branch.id, &lead).await.unwrap(),
            auto_assign(&*db, branch.id, &lead).await.unwrap(),
            auto_assign(&*db, branch.id, &lead).await.unwrap(),
        ]
        .into_iter()
        .flatten()
        .collect();
        assert_eq!(picks, vec![a.id, b.id, a.id]);

        let walk_in = facts(LeadSourceKind::WalkIn, None);
        assert_eq!(auto_assign(&*db, branch.id, &walk_in).await.unwrap(), Some(c.id));
    }

    #[tokio::test]
    async fn assignees_must_belong_to_branch() {
        let db = Arc::new(memory_pool().await);
        let branch = seed_branch(&db, "LAA", "27").await;
        let other = seed_branch(&db, "LAB", "29").await;
        let outsider = seed_profile(&db, other.id, Role::Sales).await;
        let service = LeadAssignmentService::new(db.clone(), event_sender());

        assert_matches!(
            service
                .create_rule(
                    branch.id,
                    CreateRuleRequest {
                        name: "bad".into(),
                        source_kind: None,
                        keyword: None,
                        assignee_ids: vec![outsider.id],
                        priority: 1,
                        is_active: true,
                    },
                )
                .await,
            Err(ServiceError::InvalidField { field, .. }) if field == "assignee_ids"
        );
        assert!(auto_assign(&*db, branch.id, &facts(LeadSourceKind::Other, None))
            .await
            .unwrap()
            .is_none());
    }
}
