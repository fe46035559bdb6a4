use super::common::{created, ok, page_request, paginated, Created, Ok200};
use crate::{
    auth::{consts as perm, AuthRouterExt, AuthUser},
    entities::payment::{self, PaymentMethod},
    errors::ServiceError,
    services::payments::{AttachReceiptRequest, PaymentFilter, ReceiptUpload, RecordPaymentRequest},
    AppState, ListQuery, PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::NaiveDate;
use uuid::Uuid;

#[utoipa::path(
    get,
    path = "/api/v1/payments",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page"),
        ("customer_id" = Option<Uuid>, Query, description = "Filter by customer"),
        ("invoice_id" = Option<Uuid>, Query, description = "Filter by invoice"),
        ("method" = Option<PaymentMethod>, Query, description = "Filter by method"),
        ("from" = Option<NaiveDate>, Query, description = "Earliest payment date"),
        ("to" = Option<NaiveDate>, Query, description = "Latest payment date"),
    ),
    responses(
        (status = 200, description = "Payments in the caller's branch", body = crate::ApiResponse<PaginatedResponse<payment::Model>>),
    ),
    security(("Bearer" = [])),
    tag = "payments"
)]
pub async fn list_payments(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
    Query(filter): Query<PaymentFilter>,
) -> Result<Ok200<PaginatedResponse<payment::Model>>, ServiceError> {
    let page = page_request(&state, &query);
    let (items, total) = state
        .services
        .payments
        .list_payments(user.branch_id, filter, page)
        .await?;
    Ok(ok(paginated(items, total, page)))
}

pub async fn get_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Ok200<payment::Model>, ServiceError> {
    Ok(ok(state.services.payments.get_payment(user.branch_id, id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/payments",
    request_body = RecordPaymentRequest,
    responses(
        (status = 201, description = "Payment recorded and posted to the ledger", body = crate::ApiResponse<payment::Model>),
        (status = 400, description = "Amount rejected or invoice not payable", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "payments"
)]
pub async fn record_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<RecordPaymentRequest>,
) -> Result<Created<payment::Model>, ServiceError> {
    let payment = state
        .services
        .payments
        .record_payment(user.branch_id, user.user_id, request)
        .await?;
    Ok(created(payment))
}

/// Reverses the invoice effect and the ledger posting
pub async fn delete_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.payments.delete_payment(user.branch_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/{id}/receipt",
    params(("id" = Uuid, Path, description = "Payment id")),
    request_body = AttachReceiptRequest,
    responses(
        (status = 200, description = "Storage location reserved for the receipt", body = crate::ApiResponse<ReceiptUpload>),
        (status = 400, description = "Unusable file name", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "payments"
)]
pub async fn attach_receipt(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<AttachReceiptRequest>,
) -> Result<Ok200<ReceiptUpload>, ServiceError> {
    Ok(ok(state
        .services
        .payments
        .attach_receipt(user.branch_id, id, user.user_id, request)
        .await?))
}

pub fn routes() -> Router<AppState> {
    let read = Router::new()
        .route("/payments", get(list_payments))
        .route("/payments/:id", get(get_payment))
        .with_permission(perm::PAYMENTS_READ);

    let write = Router::new()
        .route("/payments", post(record_payment))
        .route("/payments/:id/receipt", post(attach_receipt))
        .with_permission(perm::PAYMENTS_WRITE);

    let remove = Router::new()
        .route("/payments/:id", delete(delete_payment))
        .with_permission(perm::PAYMENTS_DELETE);

    read.merge(write).merge(remove)
}
