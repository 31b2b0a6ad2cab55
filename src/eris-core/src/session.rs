//! Persisted records: debate sessions, speeches, evidence documents and
//! user profiles.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::debate_format::Phase;
use crate::error::DebateError;
use crate::orchestrator::DebateMessage;
use crate::participant::Side;

// ─── Sessions ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Abandoned => "abandoned",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = DebateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "completed" => Ok(SessionStatus::Completed),
            "abandoned" => Ok(SessionStatus::Abandoned),
            other => Err(DebateError::Validation(format!("unknown session status '{other}'"))),
        }
    }
}

/// One practice round between a user and an AI opponent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebateSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub topic: String,
    pub format: String,
    pub user_side: Side,
    pub ai_name: String,
    pub ai_model: String,
    pub first_speaker: Side,
    /// Index of the turn currently holding the floor; equal to the number
    /// of turns once the round is over.
    pub turn_index: usize,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Input for creating a session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: Uuid,
    pub topic: String,
    pub format: String,
    pub user_side: Side,
    pub ai_name: String,
    pub ai_model: String,
    pub first_speaker: Side,
}

impl NewSession {
    pub fn validate(&self) -> Result<(), DebateError> {
        let topic_len = self.topic.trim().chars().count();
        if !(3..=500).contains(&topic_len) {
            return Err(DebateError::Validation(
                "topic must be between 3 and 500 characters".into(),
            ));
        }
        if self.ai_model.trim().is_empty() {
            return Err(DebateError::Validation("AI model must not be empty".into()));
        }
        if self.ai_name.trim().is_empty() {
            return Err(DebateError::Validation("AI name must not be empty".into()));
        }
        Ok(())
    }
}

// ─── Speeches ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeakerKind {
    Human,
    Ai,
}

impl SpeakerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeakerKind::Human => "human",
            SpeakerKind::Ai => "ai",
        }
    }
}

impl FromStr for SpeakerKind {
    type Err = DebateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(SpeakerKind::Human),
            "ai" => Ok(SpeakerKind::Ai),
            other => Err(DebateError::Validation(format!("unknown speaker kind '{other}'"))),
        }
    }
}

/// A speech as stored. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Speech {
    pub id: Uuid,
    pub session_id: Uuid,
    pub turn_index: usize,
    pub phase: Phase,
    pub section: String,
    pub side: Side,
    pub speaker_name: String,
    pub speaker_kind: SpeakerKind,
    pub content: String,
    pub audio_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Speech {
    pub fn to_message(&self) -> DebateMessage {
        DebateMessage {
            turn_index: self.turn_index,
            phase: self.phase,
            section: self.section.clone(),
            side: self.side,
            speaker_name: self.speaker_name.clone(),
            content: self.content.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewSpeech {
    pub session_id: Uuid,
    pub message: DebateMessage,
    pub speaker_kind: SpeakerKind,
    pub audio_ref: Option<String>,
}

// ─── Evidence documents ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    /// Where the text came from (URL, file name, citation).
    pub source: Option<String>,
    /// Visible to every user when set.
    pub shared: bool,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub ordinal: usize,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub owner_id: Uuid,
    pub title: String,
    pub source: Option<String>,
    pub shared: bool,
    pub chunks: Vec<String>,
}

// ─── Profiles ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub display_name: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProfile {
    pub display_name: String,
    pub email: Option<String>,
    /// Hex SHA-256 of the API token. The token itself is never stored.
    pub token_hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub preferred_side: Option<Side>,
    pub ai_model: Option<String>,
    #[serde(default)]
    pub voice_enabled: bool,
    pub voice_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_session(topic: &str) -> NewSession {
        NewSession {
            user_id: Uuid::new_v4(),
            topic: topic.into(),
            format: "public_forum".into(),
            user_side: Side::Pro,
            ai_name: "Eris".into(),
            ai_model: "gpt-4o-mini".into(),
            first_speaker: Side::Pro,
        }
    }

    #[test]
    fn test_session_validation() {
        assert!(new_session("Resolved: ban TikTok.").validate().is_ok());
        assert!(new_session("  a ").validate().is_err());
        assert!(new_session(&"x".repeat(501)).validate().is_err());

        let mut no_model = new_session("Resolved: ban TikTok.");
        no_model.ai_model = " ".into();
        assert!(no_model.validate().is_err());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            SessionStatus::Active,
            SessionStatus::Completed,
            SessionStatus::Abandoned,
        ] {
            assert_eq!(status.as_str().parse::<SessionStatus>().unwrap(), status);
        }
        assert!("paused".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn test_preferences_default_from_empty_json() {
        let prefs: Preferences = serde_json::from_str("{}").unwrap();
        assert_eq!(prefs, Preferences::default());
    }
}
