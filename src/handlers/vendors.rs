use super::common::{created, ok, page_request, paginated, Created, Ok200};
use crate::{
    auth::{consts as perm, AuthRouterExt, AuthUser},
    entities::vendor,
    errors::ServiceError,
    services::vendors::{CreateVendorRequest, UpdateVendorRequest, VendorFilter, VendorRemoval},
    AppState, ListQuery, PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use uuid::Uuid;

pub async fn list_vendors(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
    Query(filter): Query<VendorFilter>,
) -> Result<Ok200<PaginatedResponse<vendor::Model>>, ServiceError> {
    let page = page_request(&state, &query);
    let (items, total) = state
        .services
        .vendors
        .list_vendors(user.branch_id, filter, page)
        .await?;
    Ok(ok(paginated(items, total, page)))
}

pub async fn get_vendor(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Ok200<vendor::Model>, ServiceError> {
    Ok(ok(state.services.vendors.get_vendor(user.branch_id, id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/vendors",
    request_body = CreateVendorRequest,
    responses(
        (status = 201, description = "Vendor created", body = crate::ApiResponse<vendor::Model>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "procurement"
)]
pub async fn create_vendor(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateVendorRequest>,
) -> Result<Created<vendor::Model>, ServiceError> {
    Ok(created(
        state.services.vendors.create_vendor(user.branch_id, request).await?,
    ))
}

pub async fn update_vendor(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateVendorRequest>,
) -> Result<Ok200<vendor::Model>, ServiceError> {
    Ok(ok(state
        .services
        .vendors
        .update_vendor(user.branch_id, id, request)
        .await?))
}

/// Reports whether the vendor was removed or only deactivated
pub async fn delete_vendor(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Ok200<VendorRemoval>, ServiceError> {
    Ok(ok(state.services.vendors.delete_vendor(user.branch_id, id).await?))
}

pub fn routes() -> Router<AppState> {
    let read = Router::new()
        .route("/vendors", get(list_vendors))
        .route("/vendors/:id", get(get_vendor))
        .with_permission(perm::VENDORS_READ);

    let write = Router::new()
        .route("/vendors", post(create_vendor))
        .route("/vendors/:id", put(update_vendor).delete(delete_vendor))
        .with_permission(perm::VENDORS_WRITE);

    read.merge(write)
}
