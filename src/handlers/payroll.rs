use super::common::{created, ok, page_request, paginated, Created, Ok200};
use crate::{
    auth::{consts as perm, AuthRouterExt, AuthUser},
    entities::pay_slip::{self, PaySlipStatus},
    errors::ServiceError,
    services::payroll::{GeneratePaySlipRequest, PaySlipFilter},
    AppState, ListQuery, PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

#[utoipa::path(
    get,
    path = "/api/v1/pay-slips",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page"),
        ("employee_id" = Option<Uuid>, Query, description = "Filter by employee"),
        ("year" = Option<i32>, Query, description = "Pay period year"),
        ("month" = Option<u32>, Query, description = "Pay period month (1-12)"),
        ("status" = Option<PaySlipStatus>, Query, description = "Filter by status"),
    ),
    responses(
        (status = 200, description = "Pay slips in the caller's branch", body = crate::ApiResponse<PaginatedResponse<pay_slip::Model>>),
    ),
    security(("Bearer" = [])),
    tag = "payroll"
)]
pub async fn list_slips(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
    Query(filter): Query<PaySlipFilter>,
) -> Result<Ok200<PaginatedResponse<pay_slip::Model>>, ServiceError> {
    let page = page_request(&state, &query);
    let (items, total) = state
        .services
        .payroll
        .list_slips(user.branch_id, filter, page)
        .await?;
    Ok(ok(paginated(items, total, page)))
}

pub async fn get_slip(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Ok200<pay_slip::Model>, ServiceError> {
    Ok(ok(state.services.payroll.get_slip(user.branch_id, id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/pay-slips",
    request_body = GeneratePaySlipRequest,
    responses(
        (status = 201, description = "Draft pay slip generated", body = crate::ApiResponse<pay_slip::Model>),
        (status = 400, description = "Invalid period or negative net pay", body = crate::errors::ErrorResponse),
        (status = 409, description = "Slip already exists for the month", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "payroll"
)]
pub async fn generate_slip(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<GeneratePaySlipRequest>,
) -> Result<Created<pay_slip::Model>, ServiceError> {
    Ok(created(
        state
            .services
            .payroll
            .generate(user.branch_id, user.user_id, request)
            .await?,
    ))
}

pub async fn issue_slip(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Ok200<pay_slip::Model>, ServiceError> {
    Ok(ok(state.services.payroll.issue(user.branch_id, id).await?))
}

pub async fn mark_paid(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Ok200<pay_slip::Model>, ServiceError> {
    Ok(ok(state.services.payroll.mark_paid(user.branch_id, id).await?))
}

pub fn routes() -> Router<AppState> {
    let read = Router::new()
        .route("/pay-slips", get(list_slips))
        .route("/pay-slips/:id", get(get_slip))
        .with_permission(perm::PAYROLL_READ);

    let write = Router::new()
        .route("/pay-slips", post(generate_slip))
        .route("/pay-slips/:id/issue", post(issue_slip))
        .route("/pay-slips/:id/pay", post(mark_paid))
        .with_permission(perm::PAYROLL_WRITE);

    read.merge(write)
}
