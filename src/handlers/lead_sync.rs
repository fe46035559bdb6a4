use super::{
    common::{ok, Ok200},
    events::branch_stream,
};
use crate::{
    auth::{consts as perm, AuthRouterExt, AuthUser},
    entities::{lead_source::LeadSourceKind, sync_setting},
    errors::ServiceError,
    events::Event,
    services::lead_sync::{SyncOverview, SyncRunOutcome, UpdateSyncSettingsRequest},
    AppState,
};
use axum::{
    extract::{Path, State},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{get, post, put},
    Json, Router,
};
use futures::Stream;
use std::convert::Infallible;

#[utoipa::path(
    get,
    path = "/api/v1/leads/sync/status",
    responses(
        (status = 200, description = "Sync settings and per-source status", body = crate::ApiResponse<SyncOverview>),
    ),
    security(("Bearer" = [])),
    tag = "lead-sync"
)]
pub async fn sync_status(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Ok200<SyncOverview>, ServiceError> {
    Ok(ok(state.services.lead_sync.overview(user.branch_id).await?))
}

pub async fn update_settings(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<UpdateSyncSettingsRequest>,
) -> Result<Ok200<sync_setting::Model>, ServiceError> {
    Ok(ok(state
        .services
        .lead_sync
        .update_settings(user.branch_id, request)
        .await?))
}

/// Runs a source immediately. A failed run is reported in the body, not as an error status.
#[utoipa::path(
    post,
    path = "/api/v1/leads/sync/{source}/force",
    params(("source" = LeadSourceKind, Path, description = "indiamart or tradeindia")),
    responses(
        (status = 200, description = "Run finished", body = crate::ApiResponse<SyncRunOutcome>),
        (status = 400, description = "Source cannot be synced", body = crate::errors::ErrorResponse),
        (status = 409, description = "A run is already in progress", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "lead-sync"
)]
pub async fn force_sync(
    State(state): State<AppState>,
    user: AuthUser,
    Path(source): Path<LeadSourceKind>,
) -> Result<Ok200<SyncRunOutcome>, ServiceError> {
    Ok(ok(state
        .services
        .lead_sync
        .force_sync(user.branch_id, source)
        .await?))
}

fn status_event(event: &Event) -> Option<SseEvent> {
    match event {
        Event::SyncStatusChanged { status, .. } => SseEvent::default()
            .event("sync_status")
            .json_data(status)
            .ok(),
        _ => None,
    }
}

pub async fn sync_events(
    State(state): State<AppState>,
    user: AuthUser,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let receiver = state.change_feed.subscribe();
    Sse::new(branch_stream(receiver, user.branch_id, status_event)).keep_alive(KeepAlive::default())
}

pub fn routes() -> Router<AppState> {
    let read = Router::new()
        .route("/leads/sync/status", get(sync_status))
        .route("/leads/sync/events", get(sync_events))
        .with_permission(perm::LEADS_READ);

    let sync = Router::new()
        .route("/leads/sync/settings", put(update_settings))
        .route("/leads/sync/:source/force", post(force_sync))
        .with_permission(perm::LEADS_SYNC);

    read.merge(sync)
}
