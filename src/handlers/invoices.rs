use super::common::{created, ok, page_request, paginated, Created, Ok200};
use crate::{
    auth::{consts as perm, AuthRouterExt, AuthUser},
    entities::invoice::{self, InvoiceStatus},
    errors::ServiceError,
    services::invoices::{
        CreateInvoiceRequest, InvoiceDetail, InvoiceFilter, InvoiceFromOrderRequest,
        UpdateInvoiceRequest,
    },
    AppState, ListQuery, PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct OverdueQuery {
    /// Defaults to today (UTC)
    pub as_of: Option<NaiveDate>,
}

#[utoipa::path(
    get,
    path = "/api/v1/invoices",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page"),
        ("search" = Option<String>, Query, description = "Invoice number"),
        ("status" = Option<InvoiceStatus>, Query, description = "Filter by status"),
        ("customer_id" = Option<Uuid>, Query, description = "Filter by customer"),
        ("order_id" = Option<Uuid>, Query, description = "Filter by source order"),
    ),
    responses(
        (status = 200, description = "Invoices in the caller's branch", body = crate::ApiResponse<PaginatedResponse<invoice::Model>>),
    ),
    security(("Bearer" = [])),
    tag = "invoices"
)]
pub async fn list_invoices(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
    Query(filter): Query<InvoiceFilter>,
) -> Result<Ok200<PaginatedResponse<invoice::Model>>, ServiceError> {
    let page = page_request(&state, &query);
    let (items, total) = state
        .services
        .invoices
        .list_invoices(user.branch_id, filter, page)
        .await?;
    Ok(ok(paginated(items, total, page)))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Ok200<InvoiceDetail>, ServiceError> {
    Ok(ok(state.services.invoices.get_invoice(user.branch_id, id).await?))
}

pub async fn overdue_invoices(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<OverdueQuery>,
) -> Result<Ok200<Vec<invoice::Model>>, ServiceError> {
    let today = query.as_of.unwrap_or_else(|| Utc::now().date_naive());
    Ok(ok(state
        .services
        .invoices
        .overdue_invoices(user.branch_id, today)
        .await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/invoices",
    request_body = CreateInvoiceRequest,
    responses(
        (status = 201, description = "Draft invoice created", body = crate::ApiResponse<InvoiceDetail>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "invoices"
)]
pub async fn create_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateInvoiceRequest>,
) -> Result<Created<InvoiceDetail>, ServiceError> {
    let detail = state
        .services
        .invoices
        .create_invoice(user.branch_id, user.user_id, request)
        .await?;
    Ok(created(detail))
}

/// The body is optional; an empty POST copies the order as-is
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/invoice",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = InvoiceFromOrderRequest,
    responses(
        (status = 201, description = "Draft invoice created from the order", body = crate::ApiResponse<InvoiceDetail>),
        (status = 409, description = "Order already has a live invoice", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "invoices"
)]
pub async fn invoice_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<Uuid>,
    body: Option<Json<InvoiceFromOrderRequest>>,
) -> Result<Created<InvoiceDetail>, ServiceError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let detail = state
        .services
        .invoices
        .create_from_order(user.branch_id, order_id, user.user_id, request)
        .await?;
    Ok(created(detail))
}

pub async fn update_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateInvoiceRequest>,
) -> Result<Ok200<invoice::Model>, ServiceError> {
    Ok(ok(state
        .services
        .invoices
        .update_invoice(user.branch_id, id, request)
        .await?))
}

/// Posts the ledger debit
pub async fn issue_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Ok200<invoice::Model>, ServiceError> {
    Ok(ok(state
        .services
        .invoices
        .issue_invoice(user.branch_id, id, user.user_id)
        .await?))
}

pub async fn cancel_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Ok200<invoice::Model>, ServiceError> {
    Ok(ok(state
        .services
        .invoices
        .cancel_invoice(user.branch_id, id, user.user_id)
        .await?))
}

pub fn routes() -> Router<AppState> {
    let read = Router::new()
        .route("/invoices", get(list_invoices))
        .route("/invoices/overdue", get(overdue_invoices))
        .route("/invoices/:id", get(get_invoice))
        .with_permission(perm::INVOICES_READ);

    let write = Router::new()
        .route("/invoices", post(create_invoice))
        .route("/invoices/:id", put(update_invoice))
        .route("/invoices/:id/issue", post(issue_invoice))
        .route("/invoices/:id/cancel", post(cancel_invoice))
        .route("/orders/:id/invoice", post(invoice_order))
        .with_permission(perm::INVOICES_WRITE);

    read.merge(write)
}
