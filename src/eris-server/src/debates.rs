//! Live debates: the in-memory registry, turn handling shared by the
//! handlers, and the phase clock.
//!
//! The orchestrator for each debate sits behind a `tokio` mutex, which is
//! held until every change is written to the store. AI speech generation
//! runs with the lock released and records its result against the turn it
//! was generated for, so a turn that expired in the meantime rejects the
//! late speech. Once a change is applied it is committed from a spawned
//! task, so a client hanging up cannot leave memory ahead of the store.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use eris_core::config::Config;
use eris_core::debate_format::get_format;
use eris_core::orchestrator::{
    AdvanceReason, DebateMessage, DebateOrchestrator, DebateSnapshot, DebateStatus, Transition,
};
use eris_core::participant::Participant;
use eris_core::realtime::HubEvent;
use eris_core::session::{
    DebateSession, NewSession, NewSpeech, SessionStatus, SpeakerKind, Speech, UserProfile,
};
use eris_core::store::DebateStore;
use eris_core::DebateError;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

// ─── Registry ─────────────────────────────────────────────────────────────────

pub struct LiveDebate {
    pub user_id: Uuid,
    pub orchestrator: DebateOrchestrator,
    ai_in_flight: Arc<AtomicBool>,
    /// Set when a write failed and the registry let go of this debate.
    evicted: bool,
}

impl LiveDebate {
    pub fn new(user_id: Uuid, orchestrator: DebateOrchestrator) -> Self {
        Self {
            user_id,
            orchestrator,
            ai_in_flight: Arc::new(AtomicBool::new(false)),
            evicted: false,
        }
    }

    fn ai_holds_floor(&self) -> bool {
        self.orchestrator
            .current_speaker()
            .is_some_and(Participant::is_ai)
    }

    pub fn ai_in_flight(&self) -> bool {
        self.ai_in_flight.load(Ordering::Acquire)
    }
}

/// Claim on a debate's AI generation. Dropping it, even by cancelling the
/// future that holds it, frees the debate for another attempt.
struct InFlight(Arc<AtomicBool>);

impl InFlight {
    fn claim(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag.clone()))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub type SharedDebate = Arc<Mutex<LiveDebate>>;

/// Debates currently held in memory, by session id.
#[derive(Clone, Default)]
pub struct DebateRegistry {
    inner: Arc<parking_lot::Mutex<HashMap<Uuid, SharedDebate>>>,
}

impl DebateRegistry {
    pub fn get(&self, session_id: Uuid) -> Option<SharedDebate> {
        self.inner.lock().get(&session_id).cloned()
    }

    /// Insert unless another request got there first; returns whichever
    /// debate is registered.
    pub fn insert(&self, session_id: Uuid, debate: LiveDebate) -> SharedDebate {
        self.inner
            .lock()
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(debate)))
            .clone()
    }

    pub fn remove(&self, session_id: Uuid) {
        self.inner.lock().remove(&session_id);
    }

    pub fn entries(&self) -> Vec<(Uuid, SharedDebate)> {
        self.inner
            .lock()
            .iter()
            .map(|(id, debate)| (*id, debate.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─── Construction ─────────────────────────────────────────────────────────────

/// Orchestrator for a session: the user against the configured AI.
pub fn build_orchestrator(
    config: &Config,
    session: &DebateSession,
    user_name: &str,
) -> Result<DebateOrchestrator, DebateError> {
    let format = get_format(
        &session.format,
        session.first_speaker,
        config.debate.timings.clone(),
    )
    .ok_or_else(|| DebateError::UnknownFormat(session.format.clone()))?;

    let ai_side = session.user_side.opponent();
    let human = Participant::human(user_name, session.user_side, session.user_id);
    let mut ai = Participant::ai(&session.ai_name, ai_side, &session.ai_model);
    if let Some(prompt) = config.get_prompt(ai_side, &session.ai_name, &session.topic, user_name) {
        ai = ai.with_system_prompt(prompt);
    }

    Ok(DebateOrchestrator::new(&session.topic, vec![human, ai], format)?
        .with_grace(Duration::from_secs(u64::from(config.debate.grace_secs))))
}

/// The live debate for an owned session, rebuilt from stored speeches when
/// it is not in memory (e.g. after a restart). Finished debates are not
/// brought back.
pub async fn live_debate<S>(
    state: &AppState<S>,
    user: &UserProfile,
    session: &DebateSession,
) -> Result<SharedDebate, ApiError>
where
    S: DebateStore,
{
    if let Some(debate) = state.debates.get(session.id) {
        return Ok(debate);
    }
    if session.status != SessionStatus::Active {
        return Err(DebateError::Finished.into());
    }

    let transcript: Vec<DebateMessage> = state
        .store
        .list_speeches(user.id, session.id)
        .await
        .map_err(ApiError::store)?
        .iter()
        .map(Speech::to_message)
        .collect();

    let orchestrator = build_orchestrator(&state.config, session, &user.display_name)?
        .with_callback(state.hub.debate_callback(session.id))
        .resume(session.turn_index, transcript, Utc::now())?;

    tracing::info!(session_id = %session.id, turn = session.turn_index, "restored debate");
    Ok(state
        .debates
        .insert(session.id, LiveDebate::new(user.id, orchestrator)))
}

// ─── Progress ─────────────────────────────────────────────────────────────────

/// Where an orchestrator stands, in storable terms.
#[derive(Debug, Clone, Copy)]
struct Progress {
    turn_index: usize,
    status: SessionStatus,
}

impl Progress {
    fn of(orchestrator: &DebateOrchestrator) -> Self {
        Self {
            turn_index: orchestrator.turn_index(),
            status: match orchestrator.status() {
                DebateStatus::Completed => SessionStatus::Completed,
                _ => SessionStatus::Active,
            },
        }
    }
}

/// Lock a debate, refusing one the registry has already let go of.
async fn lock(debate: &SharedDebate) -> Result<MutexGuard<'_, LiveDebate>, ApiError> {
    let live = debate.lock().await;
    if live.evicted {
        return Err(ApiError::Conflict(
            "the debate was reloaded, retry the request".into(),
        ));
    }
    Ok(live)
}

/// Run `task` to completion even if the caller stops waiting for it.
async fn detached<T, F>(task: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, ApiError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(task)
        .await
        .map_err(|e| ApiError::Internal(format!("debate task failed: {e}")))?
}

/// Drop a debate whose in-memory state could not be written. The next
/// request rebuilds it from what the store has.
fn evict<S: DebateStore>(
    state: &AppState<S>,
    session_id: Uuid,
    live: &mut LiveDebate,
    error: &ApiError,
) {
    tracing::warn!(%session_id, %error, "failed to persist debate, dropping it from memory");
    live.evicted = true;
    state.debates.remove(session_id);
}

async fn persist_progress<S>(
    state: &AppState<S>,
    user_id: Uuid,
    session_id: Uuid,
    progress: Progress,
) -> Result<(), ApiError>
where
    S: DebateStore,
{
    state
        .store
        .update_session_progress(user_id, session_id, progress.turn_index, progress.status)
        .await
        .map_err(ApiError::store)?
        .ok_or_else(|| ApiError::NotFound(format!("debate {session_id} not found")))?;
    Ok(())
}

async fn persist_speech<S>(
    state: &AppState<S>,
    user_id: Uuid,
    session_id: Uuid,
    message: DebateMessage,
    speaker_kind: SpeakerKind,
) -> Result<Speech, ApiError>
where
    S: DebateStore,
{
    state
        .store
        .add_speech(
            user_id,
            NewSpeech {
                session_id,
                message,
                speaker_kind,
                audio_ref: None,
            },
        )
        .await
        .map_err(ApiError::from_store::<S>)?
        .ok_or_else(|| ApiError::NotFound(format!("debate {session_id} not found")))
}

/// Store a speech just recorded on the locked debate.
async fn commit_speech<S>(
    state: &AppState<S>,
    session_id: Uuid,
    live: &mut LiveDebate,
    message: DebateMessage,
    speaker_kind: SpeakerKind,
) -> Result<Speech, ApiError>
where
    S: DebateStore,
{
    persist_speech(state, live.user_id, session_id, message, speaker_kind)
        .await
        .inspect_err(|e| evict(state, session_id, live, e))
}

/// Store where the locked debate stands. A finished debate leaves the
/// registry.
async fn commit_progress<S>(
    state: &AppState<S>,
    session_id: Uuid,
    live: &mut LiveDebate,
) -> Result<Progress, ApiError>
where
    S: DebateStore,
{
    let progress = Progress::of(&live.orchestrator);
    persist_progress(state, live.user_id, session_id, progress)
        .await
        .inspect_err(|e| evict(state, session_id, live, e))?;

    if progress.status == SessionStatus::Completed {
        state.debates.remove(session_id);
        tracing::info!(%session_id, "debate completed");
    }
    Ok(progress)
}

// ─── Operations ───────────────────────────────────────────────────────────────

/// Create a session and open the debate.
pub async fn start_debate<S>(
    state: &AppState<S>,
    user: &UserProfile,
    new_session: NewSession,
) -> Result<(DebateSession, DebateSnapshot), ApiError>
where
    S: DebateStore + Clone + 'static,
{
    new_session.validate()?;
    // Fail on an unknown format before anything is written.
    if get_format(&new_session.format, new_session.first_speaker, Default::default()).is_none() {
        return Err(DebateError::UnknownFormat(new_session.format).into());
    }

    let session = state
        .store
        .create_session(new_session)
        .await
        .map_err(ApiError::store)?;

    let mut orchestrator = build_orchestrator(&state.config, &session, &user.display_name)?
        .with_callback(state.hub.debate_callback(session.id));
    let now = Utc::now();
    orchestrator.start(now)?;
    let snapshot = orchestrator.snapshot(now);

    state
        .debates
        .insert(session.id, LiveDebate::new(user.id, orchestrator));
    tracing::info!(session_id = %session.id, topic = %session.topic, "debate started");

    maybe_spawn_ai(state, session.id);
    Ok((session, snapshot))
}

/// Record the user's speech for the current (or given) turn.
pub async fn submit_human_speech<S>(
    state: &AppState<S>,
    user: &UserProfile,
    session: &DebateSession,
    content: String,
    turn_index: Option<usize>,
) -> Result<(Speech, DebateSnapshot), ApiError>
where
    S: DebateStore + Clone + 'static,
{
    let debate = live_debate(state, user, session).await?;
    let state = state.clone();
    let (session_id, side) = (session.id, session.user_side);

    detached(async move {
        let mut live = lock(&debate).await?;
        let now = Utc::now();
        let turn = turn_index.unwrap_or_else(|| live.orchestrator.turn_index());
        let message = live.orchestrator.record_speech_at(turn, side, content, now)?;
        let snapshot = live.orchestrator.snapshot(now);

        let speech = commit_speech(&state, session_id, &mut live, message, SpeakerKind::Human).await?;
        commit_progress(&state, session_id, &mut live).await?;
        drop(live);

        maybe_spawn_ai(&state, session_id);
        Ok::<_, ApiError>((speech, snapshot))
    })
    .await
}

/// End the current turn on an explicit signal from the client.
pub async fn signal_next<S>(
    state: &AppState<S>,
    user: &UserProfile,
    session: &DebateSession,
) -> Result<(Transition, DebateSnapshot), ApiError>
where
    S: DebateStore + Clone + 'static,
{
    let debate = live_debate(state, user, session).await?;
    let state = state.clone();
    let session_id = session.id;

    detached(async move {
        let mut live = lock(&debate).await?;
        let now = Utc::now();
        let transition = live.orchestrator.advance(AdvanceReason::Signal, now)?;
        let snapshot = live.orchestrator.snapshot(now);

        commit_progress(&state, session_id, &mut live).await?;
        drop(live);

        maybe_spawn_ai(&state, session_id);
        Ok::<_, ApiError>((transition, snapshot))
    })
    .await
}

/// Generate and record the AI's speech for the current turn.
pub async fn run_ai_turn<S>(
    state: &AppState<S>,
    session_id: Uuid,
    debate: SharedDebate,
) -> Result<Speech, ApiError>
where
    S: DebateStore + Clone + 'static,
{
    let (request, claim) = {
        let live = lock(&debate).await?;
        let claim = InFlight::claim(&live.ai_in_flight).ok_or_else(|| {
            ApiError::Conflict("the AI speech for this turn is already being generated".into())
        })?;
        (live.orchestrator.speech_request()?, claim)
    };

    state.hub.publish(
        session_id,
        HubEvent::AiGenerating {
            turn_index: request.turn_index,
        },
    );
    let text = match state.services.generator.generate(&request).await {
        Ok(text) => text,
        Err(e) => {
            drop(claim);
            tracing::warn!(%session_id, turn = request.turn_index, error = %e, "AI speech failed");
            state.hub.publish(
                session_id,
                HubEvent::AiFailed {
                    turn_index: request.turn_index,
                    message: e.to_string(),
                },
            );
            return Err(e.into());
        }
    };

    let state = state.clone();
    detached(async move {
        let mut live = lock(&debate).await?;
        let message = live
            .orchestrator
            .record_speech_at(request.turn_index, request.side, text, Utc::now())
            .inspect_err(|e| {
                tracing::info!(
                    %session_id,
                    turn = request.turn_index,
                    error = %e,
                    "discarding AI speech for a turn that already ended"
                );
            })?;

        let speech = commit_speech(&state, session_id, &mut live, message, SpeakerKind::Ai).await?;
        commit_progress(&state, session_id, &mut live).await?;
        drop(live);
        drop(claim);

        maybe_spawn_ai(&state, session_id);
        Ok::<_, ApiError>(speech)
    })
    .await
}

/// With automatic AI turns enabled, generate the AI's speech in the
/// background if the AI now holds the floor.
pub fn maybe_spawn_ai<S>(state: &AppState<S>, session_id: Uuid)
where
    S: DebateStore + Clone + 'static,
{
    if !state.config.debate.auto_ai_turns {
        return;
    }
    let Some(debate) = state.debates.get(session_id) else {
        return;
    };

    let state = state.clone();
    tokio::spawn(async move {
        let ready = {
            let live = debate.lock().await;
            !live.evicted && live.ai_holds_floor() && !live.ai_in_flight()
        };
        if !ready {
            return;
        }
        if let Err(e) = run_ai_turn(&state, session_id, debate).await {
            tracing::debug!(%session_id, error = %e, "automatic AI turn did not complete");
        }
    });
}

// ─── Phase clock ──────────────────────────────────────────────────────────────

/// Advance every live debate whose turn has run out, then drop event
/// history of debates that ended long enough ago. Returns how many debates
/// moved.
pub async fn tick_all<S>(state: &AppState<S>, now: DateTime<Utc>) -> usize
where
    S: DebateStore + Clone + 'static,
{
    let mut moved = 0;

    for (session_id, debate) in state.debates.entries() {
        let Ok(mut live) = lock(&debate).await else {
            continue;
        };
        if live.orchestrator.tick(now).is_none() {
            continue;
        }
        moved += 1;

        // Failures are logged and evicted by the commit.
        let committed = commit_progress(state, session_id, &mut live).await;
        drop(live);
        if committed.is_ok_and(|p| p.status == SessionStatus::Active) {
            maybe_spawn_ai(state, session_id);
        }
    }

    // Capped at a year so the conversion cannot overflow.
    let retention_secs = state.config.debate.event_retention_secs.min(365 * 24 * 3600);
    let retention = chrono::Duration::seconds(retention_secs as i64);
    let dropped = state.hub.sweep(now, retention);
    if dropped > 0 {
        tracing::debug!(dropped, "dropped event history of finished debates");
    }

    moved
}

/// Tick all live debates once per second until the runtime shuts down.
pub fn spawn_phase_clock<S>(state: AppState<S>) -> JoinHandle<()>
where
    S: DebateStore + Clone + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let moved = tick_all(&state, Utc::now()).await;
            if moved > 0 {
                tracing::debug!(moved, "phase clock advanced debates");
            }
        }
    })
}
