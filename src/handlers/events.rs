//! Server-sent event streams over the in-process change feed.

use crate::{
    auth::{AuthRouterExt, AuthUser},
    events::Event,
    AppState,
};
use axum::{
    extract::State,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::{stream, Stream};
use std::convert::Infallible;
use tokio::sync::broadcast::{error::RecvError, Receiver};
use tracing::warn;
use uuid::Uuid;

/// Turns a feed subscription into an SSE stream, keeping only the caller's
/// branch and whatever `project` maps to an SSE event.
pub fn branch_stream<F>(
    receiver: Receiver<Event>,
    branch_id: Uuid,
    project: F,
) -> impl Stream<Item = Result<SseEvent, Infallible>>
where
    F: Fn(&Event) -> Option<SseEvent> + Send + 'static,
{
    stream::unfold((receiver, project), move |(mut receiver, project)| async move {
        loop {
            match receiver.recv().await {
                Ok(event) if event.branch_id() == Some(branch_id) => {
                    if let Some(sse) = project(&event) {
                        return Some((Ok(sse), (receiver, project)));
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%branch_id, skipped, "change feed subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

fn change_event(event: &Event) -> Option<SseEvent> {
    let notice = event.change_notice()?;
    SseEvent::default().event("change").json_data(&notice).ok()
}

/// `{ table, action, id }` for every change in the caller's branch
pub async fn stream_changes(
    State(state): State<AppState>,
    user: AuthUser,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let receiver = state.change_feed.subscribe();
    Sse::new(branch_stream(receiver, user.branch_id, change_event)).keep_alive(KeepAlive::default())
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/changes", get(stream_changes))
        .with_auth()
}
