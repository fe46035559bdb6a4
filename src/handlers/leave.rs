use super::common::{created, ok, page_request, paginated, Created, Ok200};
use crate::{
    auth::{consts as perm, AuthRouterExt, AuthUser},
    entities::leave_request::{self, LeaveStatus},
    errors::ServiceError,
    services::leave::{ApplyLeaveRequest, LeaveFilter, ReviewLeaveRequest},
    AppState, ListQuery, PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use uuid::Uuid;

#[utoipa::path(
    get,
    path = "/api/v1/leave-requests",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page"),
        ("employee_id" = Option<Uuid>, Query, description = "Filter by employee"),
        ("status" = Option<LeaveStatus>, Query, description = "Filter by status"),
    ),
    responses(
        (status = 200, description = "Leave requests in the caller's branch", body = crate::ApiResponse<PaginatedResponse<leave_request::Model>>),
    ),
    security(("Bearer" = [])),
    tag = "leave"
)]
pub async fn list_requests(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
    Query(filter): Query<LeaveFilter>,
) -> Result<Ok200<PaginatedResponse<leave_request::Model>>, ServiceError> {
    let page = page_request(&state, &query);
    let (items, total) = state
        .services
        .leave
        .list_requests(user.branch_id, filter, page)
        .await?;
    Ok(ok(paginated(items, total, page)))
}

pub async fn get_request(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Ok200<leave_request::Model>, ServiceError> {
    Ok(ok(state.services.leave.get_request(user.branch_id, id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/leave-requests",
    request_body = ApplyLeaveRequest,
    responses(
        (status = 201, description = "Leave request filed", body = crate::ApiResponse<leave_request::Model>),
        (status = 400, description = "Invalid dates or half-day span", body = crate::errors::ErrorResponse),
        (status = 409, description = "Overlaps an existing request", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "leave"
)]
pub async fn apply_leave(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<ApplyLeaveRequest>,
) -> Result<Created<leave_request::Model>, ServiceError> {
    Ok(created(state.services.leave.apply(user.branch_id, request).await?))
}

pub async fn approve_request(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    body: Option<Json<ReviewLeaveRequest>>,
) -> Result<Ok200<leave_request::Model>, ServiceError> {
    let review = body.map(|Json(r)| r).unwrap_or_default();
    Ok(ok(state
        .services
        .leave
        .approve(user.branch_id, id, user.user_id, review)
        .await?))
}

pub async fn reject_request(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    body: Option<Json<ReviewLeaveRequest>>,
) -> Result<Ok200<leave_request::Model>, ServiceError> {
    let review = body.map(|Json(r)| r).unwrap_or_default();
    Ok(ok(state
        .services
        .leave
        .reject(user.branch_id, id, user.user_id, review)
        .await?))
}

pub async fn cancel_request(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Ok200<leave_request::Model>, ServiceError> {
    let today = Utc::now().date_naive();
    Ok(ok(state
        .services
        .leave
        .cancel(user.branch_id, id, today)
        .await?))
}

pub fn routes() -> Router<AppState> {
    let read = Router::new()
        .route("/leave-requests", get(list_requests))
        .route("/leave-requests/:id", get(get_request))
        .with_permission(perm::LEAVE_READ);

    let write = Router::new()
        .route("/leave-requests", post(apply_leave))
        .route("/leave-requests/:id/cancel", post(cancel_request))
        .with_permission(perm::LEAVE_WRITE);

    let review = Router::new()
        .route("/leave-requests/:id/approve", post(approve_request))
        .route("/leave-requests/:id/reject", post(reject_request))
        .with_permission(perm::LEAVE_APPROVE);

    read.merge(write).merge(review)
}
