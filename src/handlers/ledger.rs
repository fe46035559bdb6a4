use super::common::{created, ok, Created, Ok200};
use crate::{
    auth::{consts as perm, AuthRouterExt, AuthUser},
    entities::ledger_entry,
    errors::ServiceError,
    services::ledger::{BalanceDisplay, CustomerBalance, LedgerStatement, ManualEntryRequest},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatementQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[utoipa::path(
    get,
    path = "/api/v1/customers/{id}/ledger",
    params(("id" = Uuid, Path, description = "Customer id"), StatementQuery),
    responses(
        (status = 200, description = "Entries in range with opening and closing balances", body = crate::ApiResponse<LedgerStatement>),
        (status = 404, description = "Customer not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "ledger"
)]
pub async fn customer_statement(
    State(state): State<AppState>,
    user: AuthUser,
    Path(customer_id): Path<Uuid>,
    Query(range): Query<StatementQuery>,
) -> Result<Ok200<LedgerStatement>, ServiceError> {
    Ok(ok(state
        .services
        .ledger
        .statement(user.branch_id, customer_id, range.from, range.to)
        .await?))
}

pub async fn customer_balance(
    State(state): State<AppState>,
    user: AuthUser,
    Path(customer_id): Path<Uuid>,
) -> Result<Ok200<CustomerBalance>, ServiceError> {
    Ok(ok(state
        .services
        .ledger
        .balance(user.branch_id, customer_id)
        .await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/customers/{id}/ledger",
    params(("id" = Uuid, Path, description = "Customer id")),
    request_body = ManualEntryRequest,
    responses(
        (status = 201, description = "Manual entry posted", body = crate::ApiResponse<ledger_entry::Model>),
        (status = 400, description = "Debit/credit or description rejected", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "ledger"
)]
pub async fn add_manual_entry(
    State(state): State<AppState>,
    user: AuthUser,
    Path(customer_id): Path<Uuid>,
    Json(request): Json<ManualEntryRequest>,
) -> Result<Created<ledger_entry::Model>, ServiceError> {
    let entry = state
        .services
        .ledger
        .add_manual_entry(user.branch_id, customer_id, user.user_id, request)
        .await?;
    Ok(created(entry))
}

pub async fn recalculate(
    State(state): State<AppState>,
    user: AuthUser,
    Path(customer_id): Path<Uuid>,
) -> Result<Ok200<BalanceDisplay>, ServiceError> {
    Ok(ok(state
        .services
        .ledger
        .recalculate(user.branch_id, customer_id)
        .await?))
}

/// System postings are refused
pub async fn delete_manual_entry(
    State(state): State<AppState>,
    user: AuthUser,
    Path(entry_id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .ledger
        .delete_manual_entry(user.branch_id, entry_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn routes() -> Router<AppState> {
    let read = Router::new()
        .route("/customers/:id/ledger", get(customer_statement))
        .route("/customers/:id/balance", get(customer_balance))
        .with_permission(perm::LEDGER_READ);

    let write = Router::new()
        .route("/customers/:id/ledger", post(add_manual_entry))
        .route("/customers/:id/ledger/recalculate", post(recalculate))
        .route("/ledger/:id", delete(delete_manual_entry))
        .with_permission(perm::LEDGER_WRITE);

    read.merge(write)
}
