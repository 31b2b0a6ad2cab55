//! Debate orchestration logic.
//!
//! Tracks the current turn, the speaker holding it and how long they have
//! been speaking. Turns advance when a speech is recorded, when an explicit
//! "next" signal arrives, or when the turn's clock runs out. Time is passed
//! in by the caller, so the state machine itself never sleeps.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::debate_format::{DebateFormat, DebateSection, Phase, Turn};
use crate::error::DebateError;
use crate::participant::{Participant, Side};
use crate::speech::{SpeechGenerator, SpeechRequest};

/// A message in the debate transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebateMessage {
    pub turn_index: usize,
    pub phase: Phase,
    /// Section name when this was spoken.
    pub section: String,
    pub side: Side,
    /// Speaker's name.
    pub speaker_name: String,
    /// The content of the message.
    pub content: String,
}

/// Why the orchestrator moved to the next turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceReason {
    SpeechRecorded,
    /// An explicit "next" from a client.
    Signal,
    TimerExpired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebateStatus {
    NotStarted,
    InProgress,
    Completed,
}

/// Callback for debate events.
pub type DebateCallback = Box<dyn Fn(DebateEvent) + Send + Sync>;

/// Events emitted during a debate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DebateEvent {
    DebateStart {
        topic: String,
    },
    /// A new section is starting.
    SectionStart {
        phase: Phase,
        name: String,
        description: String,
    },
    /// A participant is about to speak.
    SpeakerStart {
        turn_index: usize,
        name: String,
        side: Side,
        time_limit_secs: u32,
    },
    /// A participant has finished speaking.
    SpeakerMessage {
        turn_index: usize,
        name: String,
        side: Side,
        phase: Phase,
        content: String,
    },
    /// A turn ended without a speech.
    TurnSkipped {
        turn_index: usize,
        name: String,
        side: Side,
        reason: AdvanceReason,
    },
    /// The debate has concluded.
    DebateEnd,
}

/// Result of moving off a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from_turn: usize,
    /// `None` once the debate is over.
    pub to_turn: Option<usize>,
    pub reason: AdvanceReason,
    pub phase_changed: bool,
}

/// Who holds the floor, as reported to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerInfo {
    pub name: String,
    pub side: Side,
    pub is_ai: bool,
}

/// Serializable view of the orchestrator, used for polling clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebateSnapshot {
    pub topic: String,
    pub format: String,
    pub status: DebateStatus,
    pub phase: Option<Phase>,
    pub section: Option<String>,
    pub turn_index: usize,
    pub total_turns: usize,
    pub current_speaker: Option<SpeakerInfo>,
    pub time_limit_secs: Option<u32>,
    pub elapsed_secs: u64,
    pub remaining_secs: u64,
    pub speeches: usize,
}

/// Source of speeches for human-held turns when the orchestrator drives the
/// whole debate itself.
#[async_trait]
pub trait HumanSpeaker: Send + Sync {
    /// Return the speech for `turn`, or `None` to pass the turn.
    async fn speak(
        &self,
        turn: &Turn,
        speaker: &Participant,
        transcript: &[DebateMessage],
    ) -> Result<Option<String>, DebateError>;
}

/// Orchestrates the debate between participants.
pub struct DebateOrchestrator {
    topic: String,
    participants: Vec<Participant>,
    pro_index: usize,
    con_index: usize,
    format: Box<dyn DebateFormat>,
    sections: Vec<DebateSection>,
    turns: Vec<Turn>,
    cursor: usize,
    status: DebateStatus,
    turn_started_at: Option<DateTime<Utc>>,
    grace: Duration,
    /// Full debate transcript.
    transcript: Vec<DebateMessage>,
    /// Event callback.
    callback: Option<DebateCallback>,
}

impl DebateOrchestrator {
    /// Create a new orchestrator. Requires one participant per side.
    pub fn new(
        topic: impl Into<String>,
        participants: Vec<Participant>,
        format: Box<dyn DebateFormat>,
    ) -> Result<Self, DebateError> {
        let topic = topic.into();
        if topic.trim().is_empty() {
            return Err(DebateError::Validation("topic must not be empty".into()));
        }

        let participant_count = participants.len();
        let min = format.min_participants();
        let max = format.max_participants();

        if participant_count < min || participant_count > max {
            return Err(DebateError::InvalidParticipantCount {
                min,
                max,
                actual: participant_count,
            });
        }

        let index_of = |side: Side| -> Result<usize, DebateError> {
            let mut holders = participants
                .iter()
                .enumerate()
                .filter(|(_, p)| p.side == side)
                .map(|(i, _)| i);
            match (holders.next(), holders.next()) {
                (Some(i), None) => Ok(i),
                (None, _) => Err(DebateError::InvalidParticipants(format!(
                    "nobody is arguing {side}"
                ))),
                (Some(_), Some(_)) => Err(DebateError::InvalidParticipants(format!(
                    "more than one participant is arguing {side}"
                ))),
            }
        };
        let pro_index = index_of(Side::Pro)?;
        let con_index = index_of(Side::Con)?;

        let sections = format.sections();
        let turns = format.turns();

        Ok(Self {
            topic,
            participants,
            pro_index,
            con_index,
            format,
            sections,
            turns,
            cursor: 0,
            status: DebateStatus::NotStarted,
            turn_started_at: None,
            grace: Duration::ZERO,
            transcript: Vec::new(),
            callback: None,
        })
    }

    /// Set a callback for debate events.
    pub fn with_callback(mut self, callback: DebateCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Extra time a turn may run over before [`tick`](Self::tick) ends it.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Restore persisted progress. The current turn's clock restarts at
    /// `now`; no events are emitted.
    pub fn resume(
        mut self,
        turn_index: usize,
        transcript: Vec<DebateMessage>,
        now: DateTime<Utc>,
    ) -> Result<Self, DebateError> {
        if turn_index > self.turns.len() {
            return Err(DebateError::Validation(format!(
                "turn {turn_index} is past the end of a {}-turn debate",
                self.turns.len()
            )));
        }

        self.cursor = turn_index;
        self.transcript = transcript;
        if turn_index == self.turns.len() {
            self.status = DebateStatus::Completed;
            self.turn_started_at = None;
        } else {
            self.status = DebateStatus::InProgress;
            self.turn_started_at = Some(now);
        }
        Ok(self)
    }

    /// Open the debate and hand the floor to the first speaker.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), DebateError> {
        if self.status != DebateStatus::NotStarted {
            return Err(DebateError::Validation("debate already started".into()));
        }

        self.status = DebateStatus::InProgress;
        tracing::debug!(topic = %self.topic, turns = self.turns.len(), "debate started");
        self.emit_event(DebateEvent::DebateStart {
            topic: self.topic.clone(),
        });
        self.enter_turn(now, true);
        Ok(())
    }

    /// Record a speech for the current turn and move on.
    pub fn record_speech(
        &mut self,
        side: Side,
        content: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<DebateMessage, DebateError> {
        self.record_speech_at(self.cursor, side, content, now)
    }

    /// Record a speech for `turn_index`, which must still be the current
    /// turn. Used when the speech was produced while the orchestrator was
    /// unlocked and the clock may have moved on.
    pub fn record_speech_at(
        &mut self,
        turn_index: usize,
        side: Side,
        content: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<DebateMessage, DebateError> {
        let turn = self.ensure_in_progress()?.clone();

        if turn_index != turn.index {
            return Err(DebateError::StaleTurn {
                requested: turn_index,
                current: turn.index,
            });
        }
        if side != turn.side {
            return Err(DebateError::NotYourTurn {
                expected: turn.side,
                actual: side,
            });
        }

        let content: String = content.into();
        let content = content.trim();
        if content.is_empty() {
            return Err(DebateError::Validation("speech must not be empty".into()));
        }

        let message = DebateMessage {
            turn_index: turn.index,
            phase: turn.phase,
            section: self.sections[turn.section_index].name.clone(),
            side,
            speaker_name: self.participant_for(side).name.clone(),
            content: content.to_string(),
        };
        self.transcript.push(message.clone());

        self.emit_event(DebateEvent::SpeakerMessage {
            turn_index: turn.index,
            name: message.speaker_name.clone(),
            side,
            phase: turn.phase,
            content: message.content.clone(),
        });

        self.move_on(AdvanceReason::SpeechRecorded, now);
        Ok(message)
    }

    /// End the current turn without a speech.
    pub fn advance(
        &mut self,
        reason: AdvanceReason,
        now: DateTime<Utc>,
    ) -> Result<Transition, DebateError> {
        self.ensure_in_progress()?;
        Ok(self.move_on(reason, now))
    }

    /// Advance if the current turn has run past its time limit plus grace.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<Transition> {
        let turn = self.current_turn()?;
        let limit = Duration::from_secs(u64::from(turn.time_limit_secs)) + self.grace;

        if self.elapsed(now) >= limit {
            tracing::debug!(turn = turn.index, "turn clock expired");
            Some(self.move_on(AdvanceReason::TimerExpired, now))
        } else {
            None
        }
    }

    fn move_on(&mut self, reason: AdvanceReason, now: DateTime<Utc>) -> Transition {
        let from = self.turns[self.cursor].clone();

        if reason != AdvanceReason::SpeechRecorded {
            self.emit_event(DebateEvent::TurnSkipped {
                turn_index: from.index,
                name: self.participant_for(from.side).name.clone(),
                side: from.side,
                reason,
            });
        }

        self.cursor += 1;
        let next = self.turns.get(self.cursor).cloned();
        let section_changed = next
            .as_ref()
            .is_some_and(|t| t.section_index != from.section_index);
        self.enter_turn(now, section_changed);

        Transition {
            from_turn: from.index,
            to_turn: next.as_ref().map(|t| t.index),
            reason,
            phase_changed: next.as_ref().is_none_or(|t| t.phase != from.phase),
        }
    }

    fn enter_turn(&mut self, now: DateTime<Utc>, section_changed: bool) {
        let Some(turn) = self.turns.get(self.cursor).cloned() else {
            self.status = DebateStatus::Completed;
            self.turn_started_at = None;
            tracing::debug!(topic = %self.topic, "debate completed");
            self.emit_event(DebateEvent::DebateEnd);
            return;
        };

        if section_changed {
            let section = &self.sections[turn.section_index];
            self.emit_event(DebateEvent::SectionStart {
                phase: section.phase,
                name: section.name.clone(),
                description: section.description.clone(),
            });
        }

        self.turn_started_at = Some(now);
        self.emit_event(DebateEvent::SpeakerStart {
            turn_index: turn.index,
            name: self.participant_for(turn.side).name.clone(),
            side: turn.side,
            time_limit_secs: turn.time_limit_secs,
        });
    }

    fn ensure_in_progress(&self) -> Result<&Turn, DebateError> {
        match self.status {
            DebateStatus::NotStarted => Err(DebateError::NotStarted),
            DebateStatus::Completed => Err(DebateError::Finished),
            DebateStatus::InProgress => self.turns.get(self.cursor).ok_or(DebateError::Finished),
        }
    }

    /// Build the request the speech generator needs for the current turn.
    /// Fails if the turn belongs to a human.
    pub fn speech_request(&self) -> Result<SpeechRequest, DebateError> {
        let turn = self.ensure_in_progress()?;
        let speaker = self.participant_for(turn.side);
        let Some(model) = speaker.model() else {
            return Err(DebateError::HumanTurn { phase: turn.phase });
        };
        let opponent = self.participant_for(turn.side.opponent());
        let section = &self.sections[turn.section_index];

        let system_prompt = speaker.custom_system_prompt.clone().unwrap_or_else(|| {
            self.format
                .system_prompt(&self.topic, &speaker.name, speaker.side, &opponent.name)
        });

        Ok(SpeechRequest {
            topic: self.topic.clone(),
            turn_index: turn.index,
            phase: turn.phase,
            section_name: section.name.clone(),
            section_description: section.description.clone(),
            side: turn.side,
            speaker_name: speaker.name.clone(),
            opponent_name: opponent.name.clone(),
            model: model.to_string(),
            system_prompt,
            time_limit_secs: turn.time_limit_secs,
            max_tokens: turn.max_tokens,
            transcript: self.transcript.clone(),
        })
    }

    /// Run the full debate, asking `generator` for AI turns and `human` for
    /// the rest.
    pub async fn run_with(
        &mut self,
        generator: &dyn SpeechGenerator,
        human: &dyn HumanSpeaker,
    ) -> Result<Vec<DebateMessage>, DebateError> {
        if self.status == DebateStatus::NotStarted {
            self.start(Utc::now())?;
        }

        while let Some(turn) = self.current_turn().cloned() {
            let speaker = self.participant_for(turn.side).clone();

            let content = if speaker.is_ai() {
                let request = self.speech_request()?;
                Some(generator.generate(&request).await?)
            } else {
                human.speak(&turn, &speaker, &self.transcript).await?
            };

            match content.filter(|c| !c.trim().is_empty()) {
                Some(text) => {
                    self.record_speech_at(turn.index, turn.side, text, Utc::now())?;
                }
                None => {
                    self.advance(AdvanceReason::Signal, Utc::now())?;
                }
            }
        }

        Ok(self.transcript.clone())
    }

    /// Emit an event if a callback is registered.
    fn emit_event(&self, event: DebateEvent) {
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }

    fn participant_for(&self, side: Side) -> &Participant {
        match side {
            Side::Pro => &self.participants[self.pro_index],
            Side::Con => &self.participants[self.con_index],
        }
    }

    /// The turn currently holding the floor, if the debate is running.
    pub fn current_turn(&self) -> Option<&Turn> {
        match self.status {
            DebateStatus::InProgress => self.turns.get(self.cursor),
            _ => None,
        }
    }

    pub fn current_speaker(&self) -> Option<&Participant> {
        self.current_turn().map(|t| self.participant_for(t.side))
    }

    pub fn phase(&self) -> Option<Phase> {
        self.current_turn().map(|t| t.phase)
    }

    pub fn status(&self) -> DebateStatus {
        self.status
    }

    pub fn turn_index(&self) -> usize {
        self.cursor
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Time the current speaker has held the floor.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        self.turn_started_at
            .and_then(|started| (now - started).to_std().ok())
            .unwrap_or(Duration::ZERO)
    }

    /// Speaking time left in the current turn, not counting grace.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.current_turn()
            .map(|t| Duration::from_secs(u64::from(t.time_limit_secs)))
            .unwrap_or(Duration::ZERO)
            .saturating_sub(self.elapsed(now))
    }

    /// Get the full transcript.
    pub fn transcript(&self) -> &[DebateMessage] {
        &self.transcript
    }

    /// Get participants.
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> DebateSnapshot {
        let turn = self.current_turn();
        DebateSnapshot {
            topic: self.topic.clone(),
            format: self.format.name().to_string(),
            status: self.status,
            phase: turn.map(|t| t.phase),
            section: turn.map(|t| self.sections[t.section_index].name.clone()),
            turn_index: self.cursor,
            total_turns: self.turns.len(),
            current_speaker: turn.map(|t| {
                let p = self.participant_for(t.side);
                SpeakerInfo {
                    name: p.name.clone(),
                    side: p.side,
                    is_ai: p.is_ai(),
                }
            }),
            time_limit_secs: turn.map(|t| t.time_limit_secs),
            elapsed_secs: self.elapsed(now).as_secs(),
            remaining_secs: self.remaining(now).as_secs(),
            speeches: self.transcript.len(),
        }
    }
}
