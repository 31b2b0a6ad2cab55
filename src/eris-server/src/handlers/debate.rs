//! Handlers for `/api/debate` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/api/debate` | The caller's sessions, newest first |
//! | `POST` | `/api/debate/start` | Body: [`StartBody`]; returns 201 + session and snapshot |
//! | `POST` | `/api/debate/speech` | Body: [`SpeechBody`] |
//! | `GET`  | `/api/debate/{id}` | Session plus live snapshot, if the debate is in memory |
//! | `POST` | `/api/debate/{id}/next` | End the current turn |
//! | `POST` | `/api/debate/{id}/ai-turn` | Generate the AI's speech now |
//! | `GET`  | `/api/debate/{id}/speeches` | Stored transcript |
//! | `POST` | `/api/debate/{id}/feedback` | Body: `{"turn_index": n}`; coach feedback on a human speech |
//! | `POST` | `/api/debate/{id}/verdict` | Judge decision for a completed round |

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use eris_core::feedback::{SpeechFeedback, Verdict};
use eris_core::orchestrator::{DebateSnapshot, Transition};
use eris_core::participant::Side;
use eris_core::session::{DebateSession, NewSession, SessionStatus, SpeakerKind, Speech};
use eris_core::store::DebateStore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::owned_session;
use crate::{AppState, auth::AuthUser, debates, error::ApiError};

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session: DebateSession,
    /// `None` when the debate is not held in memory.
    pub snapshot: Option<DebateSnapshot>,
}

// ─── List / get ───────────────────────────────────────────────────────────────

/// `GET /api/debate`
pub async fn list<S>(
    State(state): State<AppState<S>>,
    user: AuthUser,
) -> Result<Json<Vec<DebateSession>>, ApiError>
where
    S: DebateStore + Clone + 'static,
{
    let sessions = state
        .store
        .list_sessions(user.id())
        .await
        .map_err(ApiError::store)?;
    Ok(Json(sessions))
}

/// `GET /api/debate/{id}`
pub async fn get_one<S>(
    State(state): State<AppState<S>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError>
where
    S: DebateStore + Clone + 'static,
{
    let session = owned_session(&state, &user, id).await?;
    let snapshot = match state.debates.get(id) {
        Some(debate) => Some(debate.lock().await.orchestrator.snapshot(Utc::now())),
        None => None,
    };
    Ok(Json(SessionView { session, snapshot }))
}

// ─── Start ────────────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /api/debate/start`. Omitted fields fall back
/// to the caller's preferences, then to the server configuration.
#[derive(Debug, Deserialize)]
pub struct StartBody {
    pub topic: String,
    pub side: Option<Side>,
    pub ai_model: Option<String>,
    pub ai_name: Option<String>,
    pub format: Option<String>,
    pub first_speaker: Option<Side>,
}

/// `POST /api/debate/start`
pub async fn start<S>(
    State(state): State<AppState<S>>,
    user: AuthUser,
    Json(body): Json<StartBody>,
) -> Result<impl IntoResponse, ApiError>
where
    S: DebateStore + Clone + 'static,
{
    let prefs = state
        .store
        .get_preferences(user.id())
        .await
        .map_err(ApiError::store)?;
    let settings = &state.config.debate;

    let new_session = NewSession {
        user_id: user.id(),
        topic: body.topic.trim().to_string(),
        format: body.format.unwrap_or_else(|| settings.format.clone()),
        user_side: body.side.or(prefs.preferred_side).unwrap_or(Side::Pro),
        ai_name: body.ai_name.unwrap_or_else(|| settings.ai_name.clone()),
        ai_model: body
            .ai_model
            .or(prefs.ai_model)
            .unwrap_or_else(|| state.config.openai.model.clone()),
        first_speaker: body.first_speaker.unwrap_or(Side::Pro),
    };

    let (session, snapshot) = debates::start_debate(&state, &user.0, new_session).await?;
    Ok((
        StatusCode::CREATED,
        Json(SessionView {
            session,
            snapshot: Some(snapshot),
        }),
    ))
}

// ─── Turns ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SpeechBody {
    pub session_id: Uuid,
    pub content: String,
    /// Turn the speech was written for; defaults to the current turn.
    pub turn_index: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SpeechAccepted {
    pub speech: Speech,
    pub snapshot: DebateSnapshot,
}

/// `POST /api/debate/speech`
pub async fn submit_speech<S>(
    State(state): State<AppState<S>>,
    user: AuthUser,
    Json(body): Json<SpeechBody>,
) -> Result<Json<SpeechAccepted>, ApiError>
where
    S: DebateStore + Clone + 'static,
{
    let session = owned_session(&state, &user, body.session_id).await?;
    let (speech, snapshot) =
        debates::submit_human_speech(&state, &user.0, &session, body.content, body.turn_index)
            .await?;
    Ok(Json(SpeechAccepted { speech, snapshot }))
}

#[derive(Debug, Serialize)]
pub struct Advanced {
    pub transition: Transition,
    pub snapshot: DebateSnapshot,
}

/// `POST /api/debate/{id}/next`
pub async fn next<S>(
    State(state): State<AppState<S>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Advanced>, ApiError>
where
    S: DebateStore + Clone + 'static,
{
    let session = owned_session(&state, &user, id).await?;
    let (transition, snapshot) = debates::signal_next(&state, &user.0, &session).await?;
    Ok(Json(Advanced {
        transition,
        snapshot,
    }))
}

/// `POST /api/debate/{id}/ai-turn`
pub async fn ai_turn<S>(
    State(state): State<AppState<S>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Speech>, ApiError>
where
    S: DebateStore + Clone + 'static,
{
    let session = owned_session(&state, &user, id).await?;
    let debate = debates::live_debate(&state, &user.0, &session).await?;
    let speech = debates::run_ai_turn(&state, session.id, debate).await?;
    Ok(Json(speech))
}

/// `GET /api/debate/{id}/speeches`
pub async fn speeches<S>(
    State(state): State<AppState<S>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Speech>>, ApiError>
where
    S: DebateStore + Clone + 'static,
{
    let session = owned_session(&state, &user, id).await?;
    let speeches = state
        .store
        .list_speeches(user.id(), session.id)
        .await
        .map_err(ApiError::store)?;
    Ok(Json(speeches))
}

// ─── Judging ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct FeedbackBody {
    pub turn_index: usize,
}

/// `POST /api/debate/{id}/feedback`
pub async fn feedback<S>(
    State(state): State<AppState<S>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<FeedbackBody>,
) -> Result<Json<SpeechFeedback>, ApiError>
where
    S: DebateStore + Clone + 'static,
{
    let session = owned_session(&state, &user, id).await?;
    let speech = state
        .store
        .list_speeches(user.id(), session.id)
        .await
        .map_err(ApiError::store)?
        .into_iter()
        .find(|sp| sp.turn_index == body.turn_index && sp.speaker_kind == SpeakerKind::Human)
        .ok_or_else(|| {
            ApiError::NotFound(format!("no speech of yours at turn {}", body.turn_index))
        })?;

    let feedback = state
        .services
        .judge
        .speech_feedback(&session.topic, &speech.to_message())
        .await?;
    Ok(Json(feedback))
}

/// `POST /api/debate/{id}/verdict`
pub async fn verdict<S>(
    State(state): State<AppState<S>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Verdict>, ApiError>
where
    S: DebateStore + Clone + 'static,
{
    let session = owned_session(&state, &user, id).await?;
    if session.status != SessionStatus::Completed {
        return Err(ApiError::Conflict(
            "a verdict is only given once the debate is over".into(),
        ));
    }

    let transcript: Vec<_> = state
        .store
        .list_speeches(user.id(), session.id)
        .await
        .map_err(ApiError::store)?
        .iter()
        .map(Speech::to_message)
        .collect();
    if transcript.is_empty() {
        return Err(ApiError::Conflict("nothing was said in this debate".into()));
    }

    let verdict = state
        .services
        .judge
        .verdict(&session.topic, &transcript)
        .await?;
    tracing::info!(session_id = %session.id, winner = ?verdict.winner, "verdict given");
    Ok(Json(verdict))
}
