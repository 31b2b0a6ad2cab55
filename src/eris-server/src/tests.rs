//! Router tests against an in-memory store with scripted AI services.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::{Duration as ChronoDuration, Utc};
use eris_core::config::Config;
use eris_core::debate_format::PhaseTimings;
use eris_core::feedback::{FeedbackProvider, SpeechFeedback, Verdict};
use eris_core::orchestrator::DebateMessage;
use eris_core::participant::Side;
use eris_core::search::{SearchHit, SearchService, VectorStore};
use eris_core::speech::{SpeechGenerator, SpeechRequest};
use eris_core::DebateError;
use eris_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::{AppState, Services, debates, router};

// ─── Fixtures ────────────────────────────────────────────────────────────────

struct ScriptedGenerator;

#[async_trait]
impl SpeechGenerator for ScriptedGenerator {
    async fn generate(&self, request: &SpeechRequest) -> Result<String, DebateError> {
        Ok(format!(
            "{} argues {:?} in turn {}.",
            request.speaker_name, request.side, request.turn_index
        ))
    }
}

/// Hangs on its first request, then answers like [`ScriptedGenerator`].
#[derive(Default)]
struct StallsOnce {
    calls: AtomicUsize,
}

#[async_trait]
impl SpeechGenerator for StallsOnce {
    async fn generate(&self, request: &SpeechRequest) -> Result<String, DebateError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            std::future::pending::<()>().await;
        }
        ScriptedGenerator.generate(request).await
    }
}

struct UnreachableVectorStore;

#[async_trait]
impl VectorStore for UnreachableVectorStore {
    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<SearchHit>, DebateError> {
        Err(DebateError::Upstream {
            service: "OpenAI",
            status: 503,
            message: "vector store unavailable".into(),
        })
    }
}

struct ScriptedJudge;

#[async_trait]
impl FeedbackProvider for ScriptedJudge {
    async fn speech_feedback(
        &self,
        _topic: &str,
        speech: &DebateMessage,
    ) -> Result<SpeechFeedback, DebateError> {
        Ok(SpeechFeedback {
            score: 7,
            strengths: vec!["clear".into()],
            improvements: vec!["more evidence".into()],
            summary: format!("Feedback on turn {}.", speech.turn_index),
        })
    }

    async fn verdict(
        &self,
        _topic: &str,
        _transcript: &[DebateMessage],
    ) -> Result<Verdict, DebateError> {
        Ok(Verdict {
            winner: Side::Pro,
            reason: "Pro extended their impacts.".into(),
        })
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.debate.auto_ai_turns = false;
    config.rate_limit.enabled = false;
    config
}

async fn make_state(config: Config) -> AppState<SqliteStore> {
    let search = SearchService::new(config.search.clone());
    make_state_with(config, Arc::new(ScriptedGenerator), search).await
}

async fn make_state_with(
    config: Config,
    generator: Arc<dyn SpeechGenerator>,
    search: SearchService,
) -> AppState<SqliteStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let services = Services {
        generator,
        judge: Arc::new(ScriptedJudge),
        voice: None,
        search,
    };
    AppState::new(store, config, services)
}

async fn send(
    state: &AppState<SqliteStore>,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let resp = router(state.clone()).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn signup(state: &AppState<SqliteStore>, name: &str) -> String {
    let (status, body) = send(
        state,
        "POST",
        "/api/profiles",
        None,
        Some(json!({ "display_name": name })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["token"].as_str().unwrap().to_string()
}

async fn start(state: &AppState<SqliteStore>, token: &str, side: &str) -> String {
    let (status, body) = send(
        state,
        "POST",
        "/api/debate/start",
        Some(token),
        Some(json!({ "topic": "Resolved: the US should adopt a carbon tax.", "side": side })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["session"]["id"].as_str().unwrap().to_string()
}

// ─── Health and auth ─────────────────────────────────────────────────────────

#[tokio::test]
async fn health_is_public() {
    let state = make_state(test_config()).await;
    let (status, body) = send(&state, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn protected_routes_require_a_known_token() {
    let state = make_state(test_config()).await;

    let (status, _) = send(&state, "GET", "/api/wiki-search?q=carbon", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&state, "GET", "/api/debate", Some("eris_bogus"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn preferences_round_trip_and_feed_debate_defaults() {
    let state = make_state(test_config()).await;
    let token = signup(&state, "Sam").await;

    let (status, body) = send(&state, "GET", "/api/profile/preferences", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["voice_enabled"], false);

    let (status, _) = send(
        &state,
        "PUT",
        "/api/profile/preferences",
        Some(&token),
        Some(json!({ "preferred_side": "con", "ai_model": "gpt-4o", "voice_enabled": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &state,
        "POST",
        "/api/debate/start",
        Some(&token),
        Some(json!({ "topic": "Resolved: ban homework." })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["session"]["user_side"], "con");
    assert_eq!(body["session"]["ai_model"], "gpt-4o");
}

#[tokio::test]
async fn rate_limit_rejects_excess_requests() {
    let mut config = test_config();
    config.rate_limit.enabled = true;
    config.rate_limit.requests = 2;
    config.rate_limit.window_secs = 60;
    let state = make_state(config).await;
    let token = signup(&state, "Sam").await;

    for _ in 0..2 {
        let (status, _) = send(&state, "GET", "/api/debate", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    let req = Request::builder()
        .uri("/api/debate")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let resp = router(state.clone()).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(resp.headers().contains_key(header::RETRY_AFTER));
}

// ─── Debates ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn start_rejects_bad_input() {
    let state = make_state(test_config()).await;
    let token = signup(&state, "Sam").await;

    let (status, _) = send(
        &state,
        "POST",
        "/api/debate/start",
        Some(&token),
        Some(json!({ "topic": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &state,
        "POST",
        "/api/debate/start",
        Some(&token),
        Some(json!({ "topic": "Resolved: ban homework.", "format": "lincoln_douglas" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, list) = send(&state, "GET", "/api/debate", Some(&token), None).await;
    assert_eq!(list.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn sessions_are_private() {
    let state = make_state(test_config()).await;
    let alice = signup(&state, "Alice").await;
    let bob = signup(&state, "Bob").await;
    let id = start(&state, &alice, "pro").await;

    let (status, body) = send(&state, "GET", &format!("/api/debate/{id}"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["snapshot"]["status"], "in_progress");

    let (status, _) = send(&state, "GET", &format!("/api/debate/{id}"), Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &state,
        "POST",
        "/api/debate/speech",
        Some(&bob),
        Some(json!({ "session_id": id, "content": "Hijack." })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn turns_alternate_between_user_and_ai() {
    let state = make_state(test_config()).await;
    let token = signup(&state, "Sam").await;
    // Pro opens, so the AI holds the floor first.
    let id = start(&state, &token, "con").await;

    let (status, _) = send(
        &state,
        "POST",
        "/api/debate/speech",
        Some(&token),
        Some(json!({ "session_id": id, "content": "Too early." })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(&state, "POST", &format!("/api/debate/{id}/ai-turn"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["turn_index"], 0);
    assert_eq!(body["side"], "pro");
    assert_eq!(body["speaker_kind"], "ai");

    // The floor is now the user's; another AI turn is refused.
    let (status, _) = send(&state, "POST", &format!("/api/debate/{id}/ai-turn"), Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(
        &state,
        "POST",
        "/api/debate/speech",
        Some(&token),
        Some(json!({ "session_id": id, "content": "A carbon tax is regressive.", "turn_index": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["speech"]["side"], "con");
    assert_eq!(body["snapshot"]["turn_index"], 2);

    let (_, speeches) = send(&state, "GET", &format!("/api/debate/{id}/speeches"), Some(&token), None).await;
    let turns: Vec<_> = speeches
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["turn_index"].as_u64().unwrap())
        .collect();
    assert_eq!(turns, vec![0, 1]);

    let (_, session) = send(&state, "GET", &format!("/api/debate/{id}"), Some(&token), None).await;
    assert_eq!(session["session"]["turn_index"], 2);

    let (status, feedback) = send(
        &state,
        "POST",
        &format!("/api/debate/{id}/feedback"),
        Some(&token),
        Some(json!({ "turn_index": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(feedback["score"], 7);

    // Feedback is only given on the user's own speeches.
    let (status, _) = send(
        &state,
        "POST",
        &format!("/api/debate/{id}/feedback"),
        Some(&token),
        Some(json!({ "turn_index": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stale_turn_index_is_rejected() {
    let state = make_state(test_config()).await;
    let token = signup(&state, "Sam").await;
    let id = start(&state, &token, "pro").await;

    let (status, _) = send(
        &state,
        "POST",
        "/api/debate/speech",
        Some(&token),
        Some(json!({ "session_id": id, "content": "Late.", "turn_index": 4 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn verdict_waits_for_the_end_of_the_round() {
    let state = make_state(test_config()).await;
    let token = signup(&state, "Sam").await;
    let id = start(&state, &token, "pro").await;

    let (status, _) = send(&state, "POST", &format!("/api/debate/{id}/verdict"), Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(
        &state,
        "POST",
        "/api/debate/speech",
        Some(&token),
        Some(json!({ "session_id": id, "content": "Emissions fall under a carbon tax." })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let total = body["snapshot"]["total_turns"].as_u64().unwrap();

    // Skip every remaining turn.
    for _ in 1..total {
        let (status, _) = send(&state, "POST", &format!("/api/debate/{id}/next"), Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = send(&state, "POST", &format!("/api/debate/{id}/next"), Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, verdict) = send(&state, "POST", &format!("/api/debate/{id}/verdict"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verdict["winner"], "pro");
}

#[tokio::test]
async fn abandoned_ai_request_does_not_block_the_turn() {
    let search = SearchService::new(test_config().search);
    let state = make_state_with(test_config(), Arc::new(StallsOnce::default()), search).await;
    let token = signup(&state, "Sam").await;
    let id = start(&state, &token, "con").await;
    let uri = format!("/api/debate/{id}/ai-turn");

    // The client gives up while the first generation hangs.
    let gave_up = tokio::time::timeout(
        Duration::from_millis(100),
        send(&state, "POST", &uri, Some(&token), None),
    )
    .await;
    assert!(gave_up.is_err());

    let (status, body) = send(&state, "POST", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["turn_index"], 0);
    assert_eq!(body["side"], "pro");
}

#[tokio::test]
async fn concurrent_turn_changes_keep_the_store_in_step() {
    let state = make_state(test_config()).await;
    let token = signup(&state, "Sam").await;
    let id = start(&state, &token, "pro").await;

    let next_uri = format!("/api/debate/{id}/next");
    for round in 0..2 {
        let content = json!({ "session_id": id, "content": format!("Point {round}.") });
        let speech = send(
            &state,
            "POST",
            "/api/debate/speech",
            Some(&token),
            Some(content),
        );
        let next = send(&state, "POST", &next_uri, Some(&token), None);
        let ((speech_status, _), (next_status, _)) = tokio::join!(speech, next);
        assert!(matches!(speech_status, StatusCode::OK | StatusCode::CONFLICT));
        assert_eq!(next_status, StatusCode::OK);

        let (_, view) = send(&state, "GET", &format!("/api/debate/{id}"), Some(&token), None).await;
        assert_eq!(view["session"]["turn_index"], view["snapshot"]["turn_index"]);
    }
}

#[tokio::test]
async fn automatic_ai_turns_run_in_the_background() {
    let mut config = test_config();
    config.debate.auto_ai_turns = true;
    let state = make_state(config).await;
    let token = signup(&state, "Sam").await;
    // Pro opens; the AI argues pro and should speak without being asked.
    let id = start(&state, &token, "con").await;

    let mut speeches = Vec::new();
    for _ in 0..200 {
        let (status, body) = send(&state, "GET", &format!("/api/debate/{id}/speeches"), Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        speeches = body.as_array().cloned().unwrap_or_default();
        if !speeches.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(speeches.len(), 1, "no AI speech was generated");
    assert_eq!(speeches[0]["speaker_kind"], "ai");
    assert_eq!(speeches[0]["side"], "pro");

    let (_, body) = send(&state, "GET", &format!("/api/debate/{id}/poll"), Some(&token), None).await;
    let events = body["events"].as_array().unwrap();
    assert!(events.iter().any(|e| e["event"]["kind"] == "ai_generating"));
    assert!(events.iter().any(|e| {
        e["event"]["type"] == "speaker_message" && e["event"]["side"] == "pro"
    }));

    // The user holds the floor now, so nothing else is generated.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let (_, body) = send(&state, "GET", &format!("/api/debate/{id}/speeches"), Some(&token), None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn finished_debates_leave_memory_and_their_events_expire() {
    let state = make_state(test_config()).await;
    let token = signup(&state, "Sam").await;
    let id = start(&state, &token, "pro").await;

    let (_, view) = send(&state, "GET", &format!("/api/debate/{id}"), Some(&token), None).await;
    let total = view["snapshot"]["total_turns"].as_u64().unwrap();
    for _ in 0..total {
        let (status, _) = send(&state, "POST", &format!("/api/debate/{id}/next"), Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
    }
    assert!(state.debates.is_empty());

    let (status, _) = send(&state, "POST", &format!("/api/debate/{id}/next"), Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = send(&state, "POST", &format!("/api/debate/{id}/ai-turn"), Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(state.debates.is_empty());

    let (_, view) = send(&state, "GET", &format!("/api/debate/{id}"), Some(&token), None).await;
    assert_eq!(view["session"]["status"], "completed");
    assert!(view["snapshot"].is_null());

    // Pollers can still read how it ended until the retention window passes.
    debates::tick_all(&state, Utc::now()).await;
    let (_, body) = send(&state, "GET", &format!("/api/debate/{id}/poll"), Some(&token), None).await;
    let events = body["events"].as_array().unwrap();
    assert_eq!(events.last().unwrap()["event"]["type"], "debate_end");

    let retention = state.config.debate.event_retention_secs as i64;
    debates::tick_all(&state, Utc::now() + ChronoDuration::seconds(retention + 1)).await;
    let (_, body) = send(&state, "GET", &format!("/api/debate/{id}/poll"), Some(&token), None).await;
    assert!(body["events"].as_array().unwrap().is_empty());
    assert_eq!(body["last_seq"], 0);
    assert!(state.hub.is_empty());
}

// ─── Phase clock and events ──────────────────────────────────────────────────

#[tokio::test]
async fn expired_turns_are_skipped_and_published() {
    let mut config = test_config();
    config.debate.grace_secs = 0;
    config.debate.timings = PhaseTimings {
        constructive_secs: 5,
        crossfire_secs: 5,
        rebuttal_secs: 5,
        final_focus_secs: 5,
    };
    let state = make_state(config).await;
    let token = signup(&state, "Sam").await;
    let id = start(&state, &token, "pro").await;

    assert_eq!(debates::tick_all(&state, Utc::now()).await, 0);
    assert_eq!(
        debates::tick_all(&state, Utc::now() + ChronoDuration::seconds(6)).await,
        1
    );

    let (status, body) = send(&state, "GET", &format!("/api/debate/{id}/poll"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let events = body["events"].as_array().unwrap();
    assert_eq!(events[0]["seq"], 1);
    assert_eq!(events[0]["event"]["type"], "debate_start");

    let skipped = events
        .iter()
        .find(|e| e["event"]["type"] == "turn_skipped")
        .expect("turn_skipped published");
    assert_eq!(skipped["event"]["turn_index"], 0);
    assert_eq!(skipped["event"]["reason"], "timer_expired");

    let last_seq = body["last_seq"].as_u64().unwrap();
    assert_eq!(last_seq, events.last().unwrap()["seq"].as_u64().unwrap());
    let (_, body) = send(
        &state,
        "GET",
        &format!("/api/debate/{id}/poll?since={last_seq}"),
        Some(&token),
        None,
    )
    .await;
    assert!(body["events"].as_array().unwrap().is_empty());
    assert_eq!(body["last_seq"], last_seq);

    let (_, session) = send(&state, "GET", &format!("/api/debate/{id}"), Some(&token), None).await;
    assert_eq!(session["session"]["turn_index"], 1);
}

#[tokio::test]
async fn debates_are_restored_from_the_store() {
    let state = make_state(test_config()).await;
    let token = signup(&state, "Sam").await;
    let id = start(&state, &token, "pro").await;

    let (status, _) = send(
        &state,
        "POST",
        "/api/debate/speech",
        Some(&token),
        Some(json!({ "session_id": id, "content": "Opening case." })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Forget the live debate, as after a restart.
    state.debates.remove(id.parse().unwrap());
    assert!(state.debates.is_empty());

    let (status, body) = send(&state, "POST", &format!("/api/debate/{id}/ai-turn"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["turn_index"], 1);
    assert_eq!(state.debates.len(), 1);
}

// ─── Evidence ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn documents_are_searchable_by_keyword() {
    let state = make_state(test_config()).await;
    let alice = signup(&state, "Alice").await;
    let bob = signup(&state, "Bob").await;

    let (status, doc) = send(
        &state,
        "POST",
        "/api/documents",
        Some(&alice),
        Some(json!({
            "title": "Carbon pricing",
            "source": "https://example.org/carbon",
            "text": "A carbon tax lowers emissions. Revenue can be returned as a dividend.",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let doc_id = doc["id"].as_str().unwrap().to_string();

    let (status, _) = send(&state, "GET", "/api/wiki-search?q=a", Some(&alice), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, results) = send(&state, "GET", "/api/wiki-search?q=carbon%20tax", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(results["backend"], "keyword");
    let hits = results["hits"].as_array().unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0]["title"], "Carbon pricing");

    // Private to Alice.
    let (_, results) = send(&state, "GET", "/api/wiki-search?q=carbon%20tax", Some(&bob), None).await;
    assert!(results["hits"].as_array().unwrap().is_empty());
    let (status, _) = send(&state, "GET", &format!("/api/documents/{doc_id}"), Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&state, "DELETE", &format!("/api/documents/{doc_id}"), Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, view) = send(&state, "GET", &format!("/api/documents/{doc_id}"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["chunks"].as_array().unwrap().len(), 1);

    let (status, _) = send(&state, "DELETE", &format!("/api/documents/{doc_id}"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, list) = send(&state, "GET", "/api/documents", Some(&alice), None).await;
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn voice_endpoints_report_unavailable_without_a_key() {
    let state = make_state(test_config()).await;
    let token = signup(&state, "Sam").await;

    let (status, _) = send(
        &state,
        "POST",
        "/api/voice/tts",
        Some(&token),
        Some(json!({ "text": "Hello there." })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn search_falls_back_to_keywords_when_vector_store_fails() {
    let config = test_config();
    let search =
        SearchService::new(config.search.clone()).with_vector_store(Arc::new(UnreachableVectorStore));
    let state = make_state_with(config, Arc::new(ScriptedGenerator), search).await;
    let token = signup(&state, "Alice").await;

    let (status, _) = send(
        &state,
        "POST",
        "/api/documents",
        Some(&token),
        Some(json!({
            "title": "Carbon pricing",
            "text": "A carbon tax lowers emissions.",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, results) = send(&state, "GET", "/api/wiki-search?q=carbon%20tax", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK, "{results}");
    assert_eq!(results["backend"], "keyword");
    assert_eq!(results["hits"][0]["title"], "Carbon pricing");
}
