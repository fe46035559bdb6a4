use super::common::{created, ok, page_request, paginated, Created, Ok200, StatusChange};
use crate::{
    auth::{consts as perm, AuthRouterExt, AuthUser},
    entities::order::{self, OrderStatus},
    errors::ServiceError,
    services::orders::{CreateOrderRequest, OrderDetail, OrderFilter, UpdateOrderRequest},
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
    path = "/api/v1/orders",
    summary = "List orders",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page"),
        ("search" = Option<String>, Query, description = "Order number"),
        ("status" = Option<OrderStatus>, Query, description = "Filter by order status"),
        ("customer_id" = Option<Uuid>, Query, description = "Filter by customer"),
    ),
    responses(
        (status = 200, description = "Orders retrieved successfully", body = crate::ApiResponse<PaginatedResponse<order::Model>>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
    Query(filter): Query<OrderFilter>,
) -> Result<Ok200<PaginatedResponse<order::Model>>, ServiceError> {
    let page = page_request(&state, &query);
    let (items, total) = state
        .services
        .orders
        .list_orders(user.branch_id, filter, page)
        .await?;
    Ok(ok(paginated(items, total, page)))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Get order",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with its items", body = crate::ApiResponse<OrderDetail>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Ok200<OrderDetail>, ServiceError> {
    Ok(ok(state.services.orders.get_order(user.branch_id, id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders",
    summary = "Create order",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created successfully", body = crate::ApiResponse<OrderDetail>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 404, description = "Customer not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateOrderRequest>,
) -> Result<Created<OrderDetail>, ServiceError> {
    let detail = state
        .services
        .orders
        .create_order(user.branch_id, user.user_id, request)
        .await?;
    Ok(created(detail))
}

pub async fn update_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateOrderRequest>,
) -> Result<Ok200<order::Model>, ServiceError> {
    Ok(ok(state
        .services
        .orders
        .update_order(user.branch_id, id, request)
        .await?))
}

pub async fn update_order_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusChange<OrderStatus>>,
) -> Result<Ok200<order::Model>, ServiceError> {
    Ok(ok(state
        .services
        .orders
        .change_status(user.branch_id, id, body.status)
        .await?))
}

/// Pending orders only
pub async fn delete_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.orders.delete_order(user.branch_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn routes() -> Router<AppState> {
    let read = Router::new()
        .route("/orders", get(list_orders))
        .route("/orders/:id", get(get_order))
        .with_permission(perm::ORDERS_READ);

    let write = Router::new()
        .route("/orders", post(create_order))
        .route("/orders/:id", put(update_order))
        .route("/orders/:id/status", put(update_order_status))
        .with_permission(perm::ORDERS_WRITE);

    let remove = Router::new()
        .route("/orders/:id", delete(delete_order))
        .with_permission(perm::ORDERS_DELETE);

    read.merge(write).merge(remove)
}
