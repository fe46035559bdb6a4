use super::common::{created, ok, page_request, paginated, Created, Ok200};
use crate::{
    auth::{consts as perm, AuthRouterExt, AuthUser},
    entities::employee::{self, EmployeeStatus},
    errors::ServiceError,
    services::employees::{
        AccessGranted, CreateEmployeeRequest, EmployeeFilter, ProvisionAccessRequest,
        UpdateEmployeeRequest,
    },
    AppState, ListQuery, PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use uuid::Uuid;

#[utoipa::path(
    get,
    path = "/api/v1/employees",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page"),
        ("search" = Option<String>, Query, description = "Code, name or email"),
        ("status" = Option<EmployeeStatus>, Query, description = "Filter by status"),
        ("department" = Option<String>, Query, description = "Filter by department"),
    ),
    responses(
        (status = 200, description = "Employees of the caller's branch", body = crate::ApiResponse<PaginatedResponse<employee::Model>>),
    ),
    security(("Bearer" = [])),
    tag = "employees"
)]
pub async fn list_employees(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
    Query(filter): Query<EmployeeFilter>,
) -> Result<Ok200<PaginatedResponse<employee::Model>>, ServiceError> {
    let page = page_request(&state, &query);
    let (items, total) = state
        .services
        .employees
        .list_employees(user.branch_id, filter, page)
        .await?;
    Ok(ok(paginated(items, total, page)))
}

pub async fn get_employee(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Ok200<employee::Model>, ServiceError> {
    Ok(ok(state.services.employees.get_employee(user.branch_id, id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/employees",
    request_body = CreateEmployeeRequest,
    responses(
        (status = 201, description = "Employee created", body = crate::ApiResponse<employee::Model>),
        (status = 409, description = "Employee code already in use", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "employees"
)]
pub async fn create_employee(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateEmployeeRequest>,
) -> Result<Created<employee::Model>, ServiceError> {
    Ok(created(
        state
            .services
            .employees
            .create_employee(user.branch_id, request)
            .await?,
    ))
}

/// Terminating a provisioned employee also deactivates the login
pub async fn update_employee(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateEmployeeRequest>,
) -> Result<Ok200<employee::Model>, ServiceError> {
    Ok(ok(state
        .services
        .employees
        .update_employee(user.branch_id, id, request)
        .await?))
}

pub async fn delete_employee(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .employees
        .delete_employee(user.branch_id, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/employees/{id}/access",
    params(("id" = Uuid, Path, description = "Employee id")),
    request_body = ProvisionAccessRequest,
    responses(
        (status = 201, description = "Login provisioned", body = crate::ApiResponse<AccessGranted>),
        (status = 409, description = "Employee already has a login", body = crate::errors::ErrorResponse),
        (status = 502, description = "Employee management function failed", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "employees"
)]
pub async fn provision_access(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<ProvisionAccessRequest>,
) -> Result<Created<AccessGranted>, ServiceError> {
    Ok(created(
        state
            .services
            .employees
            .provision_access(user.branch_id, id, request)
            .await?,
    ))
}

pub async fn reset_password(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .employees
        .reset_password(user.branch_id, id)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn deactivate_access(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .employees
        .deactivate_access(user.branch_id, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn routes() -> Router<AppState> {
    let read = Router::new()
        .route("/employees", get(list_employees))
        .route("/employees/:id", get(get_employee))
        .with_permission(perm::EMPLOYEES_READ);

    let write = Router::new()
        .route("/employees", post(create_employee))
        .route("/employees/:id", put(update_employee).delete(delete_employee))
        .with_permission(perm::EMPLOYEES_WRITE);

    let access = Router::new()
        .route("/employees/:id/access", post(provision_access))
        .route("/employees/:id/access/reset-password", post(reset_password))
        .route("/employees/:id/access/deactivate", post(deactivate_access))
        .with_permission(perm::EMPLOYEES_MANAGE_ACCESS);

    read.merge(write).merge(access)
}
