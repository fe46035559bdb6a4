use super::common::{created, ok, page_request, paginated, Created, Ok200, StatusChange};
use crate::{
    auth::{consts as perm, AuthRouterExt, AuthUser},
    entities::{
        quotation::{self, QuotationStatus},
        quotation_revision,
    },
    errors::ServiceError,
    services::{
        orders::OrderDetail,
        quotations::{CreateQuotationRequest, QuotationDetail, QuotationFilter, UpdateQuotationRequest},
    },
    AppState, ListQuery, PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use uuid::Uuid;

#[utoipa::path(
    get,
    path = "/api/v1/quotations",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page"),
        ("search" = Option<String>, Query, description = "Quotation number"),
        ("status" = Option<QuotationStatus>, Query, description = "Filter by status"),
        ("customer_id" = Option<Uuid>, Query, description = "Filter by customer"),
    ),
    responses(
        (status = 200, description = "Quotations in the caller's branch", body = crate::ApiResponse<PaginatedResponse<quotation::Model>>),
    ),
    security(("Bearer" = [])),
    tag = "quotations"
)]
pub async fn list_quotations(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
    Query(filter): Query<QuotationFilter>,
) -> Result<Ok200<PaginatedResponse<quotation::Model>>, ServiceError> {
    let page = page_request(&state, &query);
    let (items, total) = state
        .services
        .quotations
        .list_quotations(user.branch_id, filter, page)
        .await?;
    Ok(ok(paginated(items, total, page)))
}

pub async fn get_quotation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Ok200<QuotationDetail>, ServiceError> {
    Ok(ok(state.services.quotations.get_quotation(user.branch_id, id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/quotations",
    request_body = CreateQuotationRequest,
    responses(
        (status = 201, description = "Quotation created with GST totals", body = crate::ApiResponse<QuotationDetail>),
        (status = 400, description = "Invalid request; errors name the offending line", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "quotations"
)]
pub async fn create_quotation(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateQuotationRequest>,
) -> Result<Created<QuotationDetail>, ServiceError> {
    let detail = state
        .services
        .quotations
        .create_quotation(user.branch_id, user.user_id, request)
        .await?;
    Ok(created(detail))
}

/// Snapshots the current version into the revision history first
pub async fn update_quotation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateQuotationRequest>,
) -> Result<Ok200<QuotationDetail>, ServiceError> {
    let detail = state
        .services
        .quotations
        .update_quotation(user.branch_id, id, user.user_id, request)
        .await?;
    Ok(ok(detail))
}

pub async fn change_quotation_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusChange<QuotationStatus>>,
) -> Result<Ok200<quotation::Model>, ServiceError> {
    Ok(ok(state
        .services
        .quotations
        .change_status(user.branch_id, id, body.status)
        .await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/quotations/{id}/convert",
    params(("id" = Uuid, Path, description = "Quotation id")),
    responses(
        (status = 201, description = "Order created from an accepted quotation", body = crate::ApiResponse<OrderDetail>),
        (status = 400, description = "Quotation is not accepted", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "quotations"
)]
pub async fn convert_quotation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Created<OrderDetail>, ServiceError> {
    let order = state
        .services
        .quotations
        .convert_to_order(user.branch_id, id, user.user_id)
        .await?;
    Ok(created(order))
}

pub async fn list_revisions(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Ok200<Vec<quotation_revision::Model>>, ServiceError> {
    Ok(ok(state
        .services
        .quotations
        .list_revisions(user.branch_id, id)
        .await?))
}

pub async fn delete_quotation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .quotations
        .delete_quotation(user.branch_id, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn routes() -> Router<AppState> {
    let read = Router::new()
        .route("/quotations", get(list_quotations))
        .route("/quotations/:id", get(get_quotation))
        .route("/quotations/:id/revisions", get(list_revisions))
        .with_permission(perm::QUOTATIONS_READ);

    let write = Router::new()
        .route("/quotations", post(create_quotation))
        .route("/quotations/:id", put(update_quotation))
        .route("/quotations/:id/status", put(change_quotation_status))
        .route("/quotations/:id/convert", post(convert_quotation))
        .with_permission(perm::QUOTATIONS_WRITE);

    let remove = Router::new()
        .route("/quotations/:id", delete(delete_quotation))
        .with_permission(perm::QUOTATIONS_DELETE);

    read.merge(write).merge(remove)
}
