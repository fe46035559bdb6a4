use super::common::{created, ok, page_request, paginated, Created, Ok200, StatusChange};
use crate::{
    auth::{consts as perm, AuthRouterExt, AuthUser},
    entities::purchase_order::{self, PurchaseOrderStatus},
    errors::ServiceError,
    services::procurement::{
        AttachDocumentRequest, CreatePurchaseOrderRequest, DocumentUpload, PurchaseOrderDetail,
        PurchaseOrderFilter, ReceiveItemsRequest, UpdatePurchaseOrderRequest,
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
    path = "/api/v1/purchase-orders",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page"),
        ("search" = Option<String>, Query, description = "PO number"),
        ("status" = Option<PurchaseOrderStatus>, Query, description = "Filter by status"),
        ("vendor_id" = Option<Uuid>, Query, description = "Filter by vendor"),
    ),
    responses(
        (status = 200, description = "Purchase orders in the caller's branch", body = crate::ApiResponse<PaginatedResponse<purchase_order::Model>>),
    ),
    security(("Bearer" = [])),
    tag = "procurement"
)]
pub async fn list_purchase_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
    Query(filter): Query<PurchaseOrderFilter>,
) -> Result<Ok200<PaginatedResponse<purchase_order::Model>>, ServiceError> {
    let page = page_request(&state, &query);
    let (items, total) = state
        .services
        .purchase_orders
        .list_purchase_orders(user.branch_id, filter, page)
        .await?;
    Ok(ok(paginated(items, total, page)))
}

pub async fn get_purchase_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Ok200<PurchaseOrderDetail>, ServiceError> {
    Ok(ok(state
        .services
        .purchase_orders
        .get_purchase_order(user.branch_id, id)
        .await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders",
    request_body = CreatePurchaseOrderRequest,
    responses(
        (status = 201, description = "Draft purchase order created", body = crate::ApiResponse<PurchaseOrderDetail>),
        (status = 400, description = "Inactive vendor or invalid lines", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "procurement"
)]
pub async fn create_purchase_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreatePurchaseOrderRequest>,
) -> Result<Created<PurchaseOrderDetail>, ServiceError> {
    let detail = state
        .services
        .purchase_orders
        .create_purchase_order(user.branch_id, user.user_id, request)
        .await?;
    Ok(created(detail))
}

pub async fn update_purchase_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdatePurchaseOrderRequest>,
) -> Result<Ok200<PurchaseOrderDetail>, ServiceError> {
    Ok(ok(state
        .services
        .purchase_orders
        .update_purchase_order(user.branch_id, id, request)
        .await?))
}

pub async fn change_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusChange<PurchaseOrderStatus>>,
) -> Result<Ok200<purchase_order::Model>, ServiceError> {
    Ok(ok(state
        .services
        .purchase_orders
        .change_status(user.branch_id, id, body.status)
        .await?))
}

pub async fn receive_items(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<ReceiveItemsRequest>,
) -> Result<Ok200<PurchaseOrderDetail>, ServiceError> {
    Ok(ok(state
        .services
        .purchase_orders
        .receive_items(user.branch_id, id, request)
        .await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders/{id}/document",
    params(("id" = Uuid, Path, description = "Purchase order id")),
    request_body = AttachDocumentRequest,
    responses(
        (status = 200, description = "Storage location reserved for the PDF", body = crate::ApiResponse<DocumentUpload>),
        (status = 400, description = "File name is not a PDF", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "procurement"
)]
pub async fn attach_document(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<AttachDocumentRequest>,
) -> Result<Ok200<DocumentUpload>, ServiceError> {
    Ok(ok(state
        .services
        .purchase_orders
        .attach_document(user.branch_id, id, user.user_id, request)
        .await?))
}

pub fn routes() -> Router<AppState> {
    let read = Router::new()
        .route("/purchase-orders", get(list_purchase_orders))
        .route("/purchase-orders/:id", get(get_purchase_order))
        .with_permission(perm::PURCHASE_ORDERS_READ);

    let write = Router::new()
        .route("/purchase-orders", post(create_purchase_order))
        .route("/purchase-orders/:id", put(update_purchase_order))
        .route("/purchase-orders/:id/status", put(change_status))
        .route("/purchase-orders/:id/receive", post(receive_items))
        .route("/purchase-orders/:id/document", post(attach_document))
        .with_permission(perm::PURCHASE_ORDERS_WRITE);

    read.merge(write)
}
