use super::common::{created, ok, page_request, paginated, Created, Ok200, StatusChange};
use crate::{
    auth::{consts as perm, AuthRouterExt, AuthUser},
    entities::{
        lead::{self, LeadStatus},
        lead_assignment_rule, lead_source,
    },
    errors::ServiceError,
    services::{
        lead_assignment::{CreateRuleRequest, UpdateRuleRequest},
        leads::{
            CreateLeadRequest, CreateLeadSourceRequest, LeadConversion, LeadFilter, LeadSummary,
            UpdateLeadRequest, UpdateLeadSourceRequest,
        },
    },
    AppState, ListQuery, PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignLeadRequest {
    /// `null` unassigns the lead
    pub assigned_to: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FollowUpQuery {
    pub date: Option<NaiveDate>,
}

#[utoipa::path(
    get,
    path = "/api/v1/leads",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page"),
        ("search" = Option<String>, Query, description = "Name, company, phone, email or requirement"),
        ("status" = Option<LeadStatus>, Query, description = "Filter by status"),
        ("assigned_to" = Option<Uuid>, Query, description = "Filter by assignee"),
        ("source_kind" = Option<String>, Query, description = "Filter by source"),
    ),
    responses(
        (status = 200, description = "Leads in the caller's branch", body = crate::ApiResponse<PaginatedResponse<lead::Model>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "leads"
)]
pub async fn list_leads(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
    Query(filter): Query<LeadFilter>,
) -> Result<Ok200<PaginatedResponse<lead::Model>>, ServiceError> {
    let page = page_request(&state, &query);
    let (items, total) = state
        .services
        .leads
        .list_leads(user.branch_id, filter, page)
        .await?;
    Ok(ok(paginated(items, total, page)))
}

pub async fn get_lead(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Ok200<lead::Model>, ServiceError> {
    Ok(ok(state.services.leads.get_lead(user.branch_id, id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/leads",
    request_body = CreateLeadRequest,
    responses(
        (status = 201, description = "Lead created and run through the assignment rules", body = crate::ApiResponse<lead::Model>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "leads"
)]
pub async fn create_lead(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateLeadRequest>,
) -> Result<Created<lead::Model>, ServiceError> {
    Ok(created(state.services.leads.create_lead(user.branch_id, request).await?))
}

pub async fn update_lead(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateLeadRequest>,
) -> Result<Ok200<lead::Model>, ServiceError> {
    Ok(ok(state
        .services
        .leads
        .update_lead(user.branch_id, id, request)
        .await?))
}

pub async fn change_lead_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusChange<LeadStatus>>,
) -> Result<Ok200<lead::Model>, ServiceError> {
    Ok(ok(state
        .services
        .leads
        .change_status(user.branch_id, id, body.status)
        .await?))
}

pub async fn assign_lead(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<AssignLeadRequest>,
) -> Result<Ok200<lead::Model>, ServiceError> {
    Ok(ok(state
        .services
        .leads
        .assign_lead(user.branch_id, id, body.assigned_to)
        .await?))
}

pub async fn delete_lead(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.leads.delete_lead(user.branch_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/leads/{id}/convert",
    params(("id" = Uuid, Path, description = "Lead id")),
    responses(
        (status = 201, description = "Customer created from the lead", body = crate::ApiResponse<LeadConversion>),
        (status = 404, description = "Lead not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Lead already converted", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "leads"
)]
pub async fn convert_lead(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Created<LeadConversion>, ServiceError> {
    let conversion = state
        .services
        .leads
        .convert_to_customer(user.branch_id, id, user.user_id)
        .await?;
    Ok(created(conversion))
}

pub async fn due_follow_ups(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<FollowUpQuery>,
) -> Result<Ok200<Vec<lead::Model>>, ServiceError> {
    let today = query.date.unwrap_or_else(|| Utc::now().date_naive());
    Ok(ok(state.services.leads.due_follow_ups(user.branch_id, today).await?))
}

pub async fn lead_summary(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Ok200<LeadSummary>, ServiceError> {
    Ok(ok(state.services.leads.summary(user.branch_id).await?))
}

pub async fn list_sources(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Ok200<Vec<lead_source::Model>>, ServiceError> {
    Ok(ok(state.services.leads.list_sources(user.branch_id).await?))
}

pub async fn create_source(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateLeadSourceRequest>,
) -> Result<Created<lead_source::Model>, ServiceError> {
    Ok(created(
        state.services.leads.create_source(user.branch_id, request).await?,
    ))
}

pub async fn update_source(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateLeadSourceRequest>,
) -> Result<Ok200<lead_source::Model>, ServiceError> {
    Ok(ok(state
        .services
        .leads
        .update_source(user.branch_id, id, request)
        .await?))
}

/// Sources referenced by leads are deactivated rather than removed
pub async fn delete_source(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.leads.delete_source(user.branch_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_rules(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Ok200<Vec<lead_assignment_rule::Model>>, ServiceError> {
    Ok(ok(state.services.lead_assignment.list_rules(user.branch_id).await?))
}

pub async fn get_rule(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Ok200<lead_assignment_rule::Model>, ServiceError> {
    Ok(ok(state
        .services
        .lead_assignment
        .get_rule(user.branch_id, id)
        .await?))
}

pub async fn create_rule(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateRuleRequest>,
) -> Result<Created<lead_assignment_rule::Model>, ServiceError> {
    Ok(created(
        state
            .services
            .lead_assignment
            .create_rule(user.branch_id, request)
            .await?,
    ))
}

pub async fn update_rule(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateRuleRequest>,
) -> Result<Ok200<lead_assignment_rule::Model>, ServiceError> {
    Ok(ok(state
        .services
        .lead_assignment
        .update_rule(user.branch_id, id, request)
        .await?))
}

pub async fn delete_rule(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .lead_assignment
        .delete_rule(user.branch_id, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn routes() -> Router<AppState> {
    let read = Router::new()
        .route("/leads", get(list_leads))
        .route("/leads/summary", get(lead_summary))
        .route("/leads/follow-ups", get(due_follow_ups))
        .route("/leads/:id", get(get_lead))
        .route("/lead-sources", get(list_sources))
        .with_permission(perm::LEADS_READ);

    let write = Router::new()
        .route("/leads", post(create_lead))
        .route("/leads/:id", put(update_lead))
        .route("/leads/:id/status", put(change_lead_status))
        .route("/leads/:id/assign", put(assign_lead))
        .route("/leads/:id/convert", post(convert_lead))
        .route("/lead-sources", post(create_source))
        .route("/lead-sources/:id", put(update_source).delete(delete_source))
        .route("/lead-assignment-rules", get(list_rules).post(create_rule))
        .route(
            "/lead-assignment-rules/:id",
            get(get_rule).put(update_rule).delete(delete_rule),
        )
        .with_permission(perm::LEADS_WRITE);

    let remove = Router::new()
        .route("/leads/:id", delete(delete_lead))
        .with_permission(perm::LEADS_DELETE);

    read.merge(write).merge(remove)
}
