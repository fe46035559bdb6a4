use super::common::{created, ok, page_request, paginated, Created, Ok200};
use crate::{
    auth::{consts as perm, AuthRouterExt, AuthUser},
    entities::shipment::{self, ShipmentStatus},
    errors::ServiceError,
    services::shipments::{
        CreateShipmentRequest, ShipmentFilter, ShipmentStatusRequest, UpdateShipmentRequest,
    },
    AppState, ListQuery, PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use uuid::Uuid;

#[utoipa::path(
    get,
    path = "/api/v1/shipments",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page"),
        ("search" = Option<String>, Query, description = "Shipment or tracking number"),
        ("status" = Option<ShipmentStatus>, Query, description = "Filter by status"),
        ("order_id" = Option<Uuid>, Query, description = "Filter by order"),
        ("customer_id" = Option<Uuid>, Query, description = "Filter by customer"),
    ),
    responses(
        (status = 200, description = "Shipments in the caller's branch", body = crate::ApiResponse<PaginatedResponse<shipment::Model>>),
    ),
    security(("Bearer" = [])),
    tag = "shipments"
)]
pub async fn list_shipments(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
    Query(filter): Query<ShipmentFilter>,
) -> Result<Ok200<PaginatedResponse<shipment::Model>>, ServiceError> {
    let page = page_request(&state, &query);
    let (items, total) = state
        .services
        .shipments
        .list_shipments(user.branch_id, filter, page)
        .await?;
    Ok(ok(paginated(items, total, page)))
}

pub async fn get_shipment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Ok200<shipment::Model>, ServiceError> {
    Ok(ok(state.services.shipments.get_shipment(user.branch_id, id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/shipments",
    request_body = CreateShipmentRequest,
    responses(
        (status = 201, description = "Shipment created for the order", body = crate::ApiResponse<shipment::Model>),
        (status = 400, description = "Order is not ready to ship", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "shipments"
)]
pub async fn create_shipment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateShipmentRequest>,
) -> Result<Created<shipment::Model>, ServiceError> {
    let created_shipment = state
        .services
        .shipments
        .create_shipment(user.branch_id, user.user_id, request)
        .await?;
    Ok(created(created_shipment))
}

pub async fn update_shipment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateShipmentRequest>,
) -> Result<Ok200<shipment::Model>, ServiceError> {
    Ok(ok(state
        .services
        .shipments
        .update_shipment(user.branch_id, id, request)
        .await?))
}

/// Dispatch and delivery also move the order
#[utoipa::path(
    put,
    path = "/api/v1/shipments/{id}/status",
    params(("id" = Uuid, Path, description = "Shipment id")),
    request_body = ShipmentStatusRequest,
    responses(
        (status = 200, description = "Shipment moved", body = crate::ApiResponse<shipment::Model>),
        (status = 400, description = "Transition not allowed or dispatch details missing", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "shipments"
)]
pub async fn change_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<ShipmentStatusRequest>,
) -> Result<Ok200<shipment::Model>, ServiceError> {
    Ok(ok(state
        .services
        .shipments
        .change_status(user.branch_id, id, request)
        .await?))
}

pub fn routes() -> Router<AppState> {
    let read = Router::new()
        .route("/shipments", get(list_shipments))
        .route("/shipments/:id", get(get_shipment))
        .with_permission(perm::SHIPMENTS_READ);

    let write = Router::new()
        .route("/shipments", post(create_shipment))
        .route("/shipments/:id", put(update_shipment))
        .route("/shipments/:id/status", put(change_status))
        .with_permission(perm::SHIPMENTS_WRITE);

    read.merge(write)
}
