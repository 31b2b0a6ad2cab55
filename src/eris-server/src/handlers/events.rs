//! Live debate events, over SSE or by polling.
//!
//! Both endpoints take `?since=<seq>` to replay buffered events after a
//! known sequence number. SSE clients may send `Last-Event-ID` instead.

use std::time::Duration;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
};
use eris_core::realtime::SequencedEvent;
use eris_core::store::DebateStore;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

use super::owned_session;
use crate::{AppState, auth::AuthUser, error::ApiError};

#[derive(Debug, Default, Deserialize)]
pub struct SinceParams {
    pub since: Option<u64>,
}

fn last_event_id(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn to_sse(event: &SequencedEvent) -> Result<Event, axum::Error> {
    Event::default().id(event.seq.to_string()).json_data(event)
}

/// `GET /api/debate/{id}/events`
pub async fn stream<S>(
    State(state): State<AppState<S>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Query(params): Query<SinceParams>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError>
where
    S: DebateStore + Clone + 'static,
{
    let session = owned_session(&state, &user, id).await?;
    let since = params.since.or_else(|| last_event_id(&headers)).unwrap_or(0);

    // Subscribe before reading the backlog so nothing published in between
    // is lost; the overlap is dropped by sequence number.
    let receiver = state.hub.subscribe(session.id);
    let backlog = state.hub.since(session.id, since);
    let replayed_to = backlog.last().map_or(since, |e| e.seq);

    let session_id = session.id;
    let live = BroadcastStream::new(receiver).filter_map(move |item| match item {
        Ok(event) if event.seq > replayed_to => Some(event),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(%session_id, error = %e, "event stream lagged");
            None
        }
    });

    let events = tokio_stream::iter(backlog)
        .chain(live)
        .map(|event| to_sse(&event));

    tracing::debug!(%session_id, since, "event stream opened");
    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

#[derive(Debug, Serialize)]
pub struct PollResponse {
    pub events: Vec<SequencedEvent>,
    /// Pass back as `since` on the next poll.
    pub last_seq: u64,
}

/// `GET /api/debate/{id}/poll`
pub async fn poll<S>(
    State(state): State<AppState<S>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Query(params): Query<SinceParams>,
) -> Result<Json<PollResponse>, ApiError>
where
    S: DebateStore + Clone + 'static,
{
    let session = owned_session(&state, &user, id).await?;
    let since = params.since.unwrap_or(0);
    let events = state.hub.since(session.id, since);
    let last_seq = events
        .last()
        .map_or_else(|| since.min(state.hub.last_seq(session.id)), |e| e.seq);
    Ok(Json(PollResponse { events, last_seq }))
}
