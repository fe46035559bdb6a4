#![allow(dead_code)]

use std::{str::FromStr, sync::Arc};

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use branch_erp::{
    auth::{AuthService, InMemorySessionStore, SessionStore},
    build_router,
    config::AppConfig,
    db,
    entities::{branch, profile::{self, Role}},
    events::{self, ChangeFeed, EventSender},
    handlers::AppServices,
    AppState,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "integration-secret-4f1c8a0d2b7e9c3a";

/// Application wired against a fresh in-memory SQLite database with one
/// seeded branch and an admin session.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub branch: branch::Model,
    pub admin: profile::Model,
    pub admin_token: String,
    sessions: Arc<dyn SessionStore>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        // Nothing listens here; calls to the functions host fail fast.
        Self::with_functions_url("http://127.0.0.1:9").await
    }

    pub async fn with_functions_url(functions_base_url: &str) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            JWT_SECRET.to_string(),
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.functions_base_url = functions_base_url.to_string();
        cfg.functions_service_key = "service-key".to_string();
        cfg.lead_sync.enabled = false;
        cfg.lead_sync.request_timeout_secs = 5;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to open in-memory database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let change_feed = ChangeFeed::new(256);
        let event_task = tokio::spawn(events::process_events(event_rx, change_feed.clone()));

        let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let auth = Arc::new(AuthService::new(&cfg, db_arc.clone(), sessions.clone()));
        let services = AppServices::new(db_arc.clone(), event_sender, &cfg, sessions.clone())
            .expect("failed to build services");

        let state = AppState {
            db: db_arc,
            config: cfg,
            services,
            change_feed,
            auth,
        };
        let router = build_router(state.clone());

        let branch = seed_branch(&state, "PUN", "27").await;
        let admin = seed_profile(&state, branch.id, Role::Admin).await;
        let admin_token = sessions
            .create(admin.id, branch.id, Role::Admin, Duration::hours(1))
            .await
            .token;

        Self {
            router,
            state,
            branch,
            admin,
            admin_token,
            sessions,
            _event_task: event_task,
        }
    }

    /// Seeds a profile with `role` in the test branch and returns its session token.
    pub async fn login_as(&self, role: Role) -> (profile::Model, String) {
        let profile = seed_profile(&self.state, self.branch.id, role).await;
        let token = self.token_for(&profile).await;
        (profile, token)
    }

    pub async fn token_for(&self, profile: &profile::Model) -> String {
        self.sessions
            .create(profile.id, profile.branch_id, profile.role, Duration::hours(1))
            .await
            .token
    }

    pub async fn seed_branch(&self, code: &str, state_code: &str) -> branch::Model {
        seed_branch(&self.state, code, state_code).await
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        self.request_with_headers(method, uri, token, body, &[]).await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
        headers: &[(&str, String)],
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        for (name, value) in headers {
            builder = builder.header(*name, value.as_str());
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, Some(&self.admin_token), None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(&self.admin_token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, Some(&self.admin_token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, Some(&self.admin_token), None).await
    }
}

async fn seed_branch(state: &AppState, code: &str, state_code: &str) -> branch::Model {
    let now = Utc::now();
    branch::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(format!("{code} branch")),
        code: Set(code.to_string()),
        state_code: Set(state_code.to_string()),
        gstin: Set(None),
        address: Set(None),
        phone: Set(None),
        email: Set(None),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&*state.db)
    .await
    .expect("seed branch")
}

async fn seed_profile(state: &AppState, branch_id: Uuid, role: Role) -> profile::Model {
    let now = Utc::now();
    let id = Uuid::new_v4();
    profile::ActiveModel {
        id: Set(id),
        branch_id: Set(branch_id),
        full_name: Set(format!("{role} user")),
        email: Set(format!("{id}@example.test")),
        phone: Set(None),
        role: Set(role),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&*state.db)
    .await
    .expect("seed profile")
}

/// Unwraps the `data` member of a success envelope.
pub fn data(body: &Value) -> &Value {
    &body["data"]
}

/// Reads a decimal serialized either as a string or a number.
pub fn dec(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("decimal number"),
        other => panic!("expected a decimal, got {other}"),
    }
}

pub fn id_of(value: &Value) -> String {
    value["id"].as_str().expect("id").to_string()
}
