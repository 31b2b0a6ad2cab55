//! HTTP API for Eris.
//!
//! Exposes an axum [`Router`] backed by any [`DebateStore`]. Live debates
//! are kept in memory, driven by a once-per-second phase clock, and fan
//! their events out through an [`EventHub`] to SSE and polling clients.

pub mod auth;
pub mod debates;
pub mod error;
pub mod handlers;
pub mod rate_limit;

pub use error::ApiError;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use eris_core::config::Config;
use eris_core::feedback::FeedbackProvider;
use eris_core::realtime::EventHub;
use eris_core::search::SearchService;
use eris_core::speech::SpeechGenerator;
use eris_core::store::DebateStore;
use eris_core::voice::VoiceService;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

use debates::DebateRegistry;
use handlers::{debate, documents, events, profiles, voice};
use rate_limit::RateLimiter;

// ─── Application state ────────────────────────────────────────────────────────

/// Hosted services the handlers call out to.
#[derive(Clone)]
pub struct Services {
    pub generator: Arc<dyn SpeechGenerator>,
    pub judge: Arc<dyn FeedbackProvider>,
    /// `None` when no ElevenLabs key is configured.
    pub voice: Option<Arc<dyn VoiceService>>,
    pub search: SearchService,
}

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState<S: DebateStore> {
    pub store: Arc<S>,
    pub config: Arc<Config>,
    pub services: Services,
    pub debates: DebateRegistry,
    pub hub: EventHub,
    pub limiter: Arc<RateLimiter>,
}

impl<S: DebateStore> AppState<S> {
    pub fn new(store: S, config: Config, services: Services) -> Self {
        let limiter = if config.rate_limit.enabled {
            RateLimiter::new(
                config.rate_limit.requests,
                Duration::from_secs(config.rate_limit.window_secs),
            )
        } else {
            RateLimiter::disabled()
        };

        Self {
            store: Arc::new(store),
            config: Arc::new(config),
            services,
            debates: DebateRegistry::default(),
            hub: EventHub::new(),
            limiter: Arc::new(limiter),
        }
    }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Largest audio upload accepted for transcription.
const MAX_AUDIO_BYTES: usize = 25 * 1024 * 1024;

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Build the full API router.
pub fn router<S>(state: AppState<S>) -> Router
where
    S: DebateStore + Clone + 'static,
{
    Router::new()
        .route("/health", get(health))
        // Profiles
        .route("/api/profiles", post(profiles::create::<S>))
        .route(
            "/api/profile/preferences",
            get(profiles::get_preferences::<S>).put(profiles::put_preferences::<S>),
        )
        // Debates
        .route("/api/debate", get(debate::list::<S>))
        .route("/api/debate/start", post(debate::start::<S>))
        .route("/api/debate/speech", post(debate::submit_speech::<S>))
        .route("/api/debate/{id}", get(debate::get_one::<S>))
        .route("/api/debate/{id}/next", post(debate::next::<S>))
        .route("/api/debate/{id}/ai-turn", post(debate::ai_turn::<S>))
        .route("/api/debate/{id}/speeches", get(debate::speeches::<S>))
        .route("/api/debate/{id}/feedback", post(debate::feedback::<S>))
        .route("/api/debate/{id}/verdict", post(debate::verdict::<S>))
        .route("/api/debate/{id}/events", get(events::stream::<S>))
        .route("/api/debate/{id}/poll", get(events::poll::<S>))
        // Voice
        .route("/api/voice/tts", post(voice::tts::<S>))
        .route(
            "/api/voice/transcribe",
            post(voice::transcribe::<S>).layer(DefaultBodyLimit::max(MAX_AUDIO_BYTES)),
        )
        // Evidence
        .route(
            "/api/documents",
            get(documents::list::<S>).post(documents::create::<S>),
        )
        .route(
            "/api/documents/{id}",
            get(documents::get_one::<S>).delete(documents::delete_one::<S>),
        )
        .route("/api/wiki-search", get(documents::search::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests;
