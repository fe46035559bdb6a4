/*!
 * # Health Check Module
 *
 * - `/health` pings the database and reports 503 when it is unreachable
 * - `/status` reports build and environment information without touching dependencies
 */

use crate::{AppState, ApiResponse};
use axum::{extract::State, http::StatusCode, response::Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::OnceLock;
use tracing::error;
use utoipa::ToSchema;

static STARTED_AT: OnceLock<DateTime<Utc>> = OnceLock::new();

/// Pins the process start time used for uptime reporting.
pub fn mark_started() {
    STARTED_AT.get_or_init(Utc::now);
}

fn uptime_seconds() -> i64 {
    STARTED_AT
        .get()
        .map(|started| (Utc::now() - *started).num_seconds().max(0))
        .unwrap_or(0)
}

#[derive(Debug, Serialize, ToSchema, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub database: HealthStatus,
    pub uptime_seconds: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceStatus {
    pub service: &'static str,
    pub version: &'static str,
    pub environment: String,
    pub uptime_seconds: i64,
    pub timestamp: DateTime<Utc>,
}

#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Service and database reachable", body = ApiResponse<HealthReport>),
        (status = 503, description = "Database unreachable", body = ApiResponse<HealthReport>),
    ),
    tag = "health"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ApiResponse<HealthReport>>) {
    let database = match crate::db::check_connection(&state.db).await {
        Ok(()) => HealthStatus::Up,
        Err(e) => {
            error!(error = %e, "database health check failed");
            HealthStatus::Down
        }
    };
    let code = if database == HealthStatus::Up {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let report = HealthReport {
        status: database,
        database,
        uptime_seconds: uptime_seconds(),
        timestamp: Utc::now(),
    };
    (code, Json(ApiResponse::success(report)))
}

pub async fn api_status(State(state): State<AppState>) -> Json<ApiResponse<ServiceStatus>> {
    Json(ApiResponse::success(ServiceStatus {
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.environment.clone(),
        uptime_seconds: uptime_seconds(),
        timestamp: Utc::now(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_is_never_negative() {
        mark_started();
        assert!(uptime_seconds() >= 0);
    }

    #[test]
    fn health_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&HealthStatus::Down).unwrap(), "\"down\"");
    }
}
