use super::common::{created, ok, page_request, paginated, Created, Ok200};
use crate::{
    auth::{consts as perm, AuthRouterExt, AuthUser},
    entities::{branch, profile},
    errors::ServiceError,
    services::{
        branches::{CreateBranchRequest, UpdateBranchRequest},
        profiles::{CreateProfileRequest, UpdateProfileRequest},
    },
    AppState, ListQuery, PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use uuid::Uuid;

pub async fn list_branches(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Ok200<Vec<branch::Model>>, ServiceError> {
    Ok(ok(state.services.branches.list_branches().await?))
}

pub async fn get_branch(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Ok200<branch::Model>, ServiceError> {
    Ok(ok(state.services.branches.get_branch(id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/branches",
    request_body = CreateBranchRequest,
    responses(
        (status = 201, description = "Branch created", body = crate::ApiResponse<branch::Model>),
        (status = 409, description = "Branch code already in use", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "branches"
)]
pub async fn create_branch(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(request): Json<CreateBranchRequest>,
) -> Result<Created<branch::Model>, ServiceError> {
    Ok(created(state.services.branches.create_branch(request).await?))
}

pub async fn update_branch(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateBranchRequest>,
) -> Result<Ok200<branch::Model>, ServiceError> {
    Ok(ok(state.services.branches.update_branch(id, request).await?))
}

/// Profiles in the caller's effective branch
pub async fn list_profiles(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Ok200<PaginatedResponse<profile::Model>>, ServiceError> {
    let page = page_request(&state, &query);
    let (items, total) = state
        .services
        .profiles
        .list_profiles(user.branch_id, query.search.clone(), page)
        .await?;
    Ok(ok(paginated(items, total, page)))
}

pub async fn get_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Ok200<profile::Model>, ServiceError> {
    Ok(ok(state.services.profiles.get_profile(user.branch_id, id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/profiles",
    request_body = CreateProfileRequest,
    responses(
        (status = 201, description = "Profile created", body = crate::ApiResponse<profile::Model>),
        (status = 404, description = "Branch not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Profile already exists", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "branches"
)]
pub async fn create_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateProfileRequest>,
) -> Result<Created<profile::Model>, ServiceError> {
    Ok(created(
        state
            .services
            .profiles
            .create_profile(user.branch_id, request)
            .await?,
    ))
}

/// Role, branch or activity changes end the user's sessions
pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Ok200<profile::Model>, ServiceError> {
    Ok(ok(state
        .services
        .profiles
        .update_profile(user.branch_id, id, request)
        .await?))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/branches", get(list_branches).post(create_branch))
        .route("/branches/:id", get(get_branch).put(update_branch))
        .route("/profiles", get(list_profiles).post(create_profile))
        .route("/profiles/:id", get(get_profile).put(update_profile))
        .with_permission(perm::BRANCHES_MANAGE)
}
