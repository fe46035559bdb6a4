//! Branch-scoped business management backend.
//!
//! Every request runs inside one branch: leads and their marketplace sync,
//! quotations through orders, invoices and payments, the customer ledger,
//! employees with leave and payroll, vendors, purchase orders and shipments.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{http::HeaderValue, routing::get, Extension, Router};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};
use utoipa::ToSchema;

use crate::auth::AuthService;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
    pub change_feed: events::ChangeFeed,
    pub auth: Arc<AuthService>,
}

/// Paging and free-text search shared by every list endpoint
#[derive(Debug, Deserialize, ToSchema)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    /// Falls back to the configured default page size
    pub limit: Option<u64>,
    pub search: Option<String>,
}

fn default_page() -> u64 {
    1
}

#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Every `/api/v1` route; permission gating lives in each handler module.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(health::api_status))
        .route("/health", get(health::health_check))
        .merge(auth::session_routes())
        .merge(handlers::branches::routes())
        .merge(handlers::customers::routes())
        .merge(handlers::leads::routes())
        .merge(handlers::lead_sync::routes())
        .merge(handlers::quotations::routes())
        .merge(handlers::orders::routes())
        .merge(handlers::invoices::routes())
        .merge(handlers::payments::routes())
        .merge(handlers::ledger::routes())
        .merge(handlers::employees::routes())
        .merge(handlers::leave::routes())
        .merge(handlers::payroll::routes())
        .merge(handlers::vendors::routes())
        .merge(handlers::purchase_orders::routes())
        .merge(handlers::shipments::routes())
        .merge(handlers::events::routes())
}

fn cors_layer(config: &config::AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if !origins.is_empty() {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if config.should_allow_permissive_cors() {
        ::tracing::info!("no CORS origins configured; allowing any origin");
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    }
}

/// Full application router with the HTTP middleware stack applied.
pub fn build_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.request_timeout_secs.max(1));
    let cors = cors_layer(&state.config);
    let auth = state.auth.clone();

    Router::new()
        .nest("/api/v1", api_v1_routes())
        .route("/api-docs/openapi.json", get(openapi::openapi_json))
        .layer(axum::middleware::from_fn(metrics::http_metrics_middleware))
        .layer(Extension(auth))
        .layer(TimeoutLayer::new(timeout))
        .layer(crate::tracing::configure_http_tracing())
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(axum::middleware::from_fn(crate::tracing::request_id_middleware))
        .with_state(state)
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[test]
    fn list_query_limit_is_optional() {
        let query: ListQuery = serde_json::from_str(r#"{"search":"acme"}"#).unwrap();
        assert_eq!(query.page, 1);
        assert!(query.limit.is_none());
        assert_eq!(query.search.as_deref(), Some("acme"));
    }

    #[test]
    fn explicit_origins_take_precedence_over_permissive_mode() {
        let mut config = config::AppConfig::new(
            "sqlite::memory:".into(),
            "secret".into(),
            "127.0.0.1".into(),
            0,
            "development".into(),
        );
        config.cors_allowed_origins = Some("https://app.example.com, ,".into());
        // Builds without panicking on the blank entries
        let _ = cors_layer(&config);
    }
}
