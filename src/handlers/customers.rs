use super::common::{created, ok, page_request, paginated, Created, Ok200};
use crate::{
    auth::{consts as perm, AuthRouterExt, AuthUser},
    entities::customer,
    errors::ServiceError,
    services::customers::{CreateCustomerRequest, CustomerFilter, UpdateCustomerRequest},
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
    path = "/api/v1/customers",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page"),
        ("search" = Option<String>, Query, description = "Name, company, email, phone or GSTIN"),
    ),
    responses(
        (status = 200, description = "Customers in the caller's branch", body = crate::ApiResponse<PaginatedResponse<customer::Model>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "customers"
)]
pub async fn list_customers(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Ok200<PaginatedResponse<customer::Model>>, ServiceError> {
    let page = page_request(&state, &query);
    let filter = CustomerFilter {
        search: query.search.clone(),
    };
    let (items, total) = state
        .services
        .customers
        .list_customers(user.branch_id, filter, page)
        .await?;
    Ok(ok(paginated(items, total, page)))
}

pub async fn get_customer(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Ok200<customer::Model>, ServiceError> {
    let found = state.services.customers.get_customer(user.branch_id, id).await?;
    Ok(ok(found))
}

#[utoipa::path(
    post,
    path = "/api/v1/customers",
    request_body = CreateCustomerRequest,
    responses(
        (status = 201, description = "Customer created", body = crate::ApiResponse<customer::Model>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "customers"
)]
pub async fn create_customer(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateCustomerRequest>,
) -> Result<Created<customer::Model>, ServiceError> {
    let customer = state
        .services
        .customers
        .create_customer(user.branch_id, user.user_id, request)
        .await?;
    Ok(created(customer))
}

pub async fn update_customer(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateCustomerRequest>,
) -> Result<Ok200<customer::Model>, ServiceError> {
    let updated = state
        .services
        .customers
        .update_customer(user.branch_id, id, request)
        .await?;
    Ok(ok(updated))
}

/// Referenced customers are a Conflict
pub async fn delete_customer(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.customers.delete_customer(user.branch_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn routes() -> Router<AppState> {
    let read = Router::new()
        .route("/customers", get(list_customers))
        .route("/customers/:id", get(get_customer))
        .with_permission(perm::CUSTOMERS_READ);

    let write = Router::new()
        .route("/customers", post(create_customer))
        .route("/customers/:id", put(update_customer))
        .with_permission(perm::CUSTOMERS_WRITE);

    let remove = Router::new()
        .route("/customers/:id", delete(delete_customer))
        .with_permission(perm::CUSTOMERS_DELETE);

    read.merge(write).merge(remove)
}
