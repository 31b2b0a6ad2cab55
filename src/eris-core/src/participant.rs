//! Debate participants.
//!
//! A Public Forum round has exactly two sides. Each side is held either by a
//! human (the practicing user) or by an AI persona backed by a chat model.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DebateError;

/// Side of the resolution a participant argues.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Arguing in favor of the resolution.
    Pro,
    /// Arguing against the resolution.
    Con,
}

impl Side {
    pub fn display_name(&self) -> &'static str {
        match self {
            Side::Pro => "PRO",
            Side::Con => "CON",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Pro => "pro",
            Side::Con => "con",
        }
    }

    pub fn opponent(&self) -> Side {
        match self {
            Side::Pro => Side::Con,
            Side::Con => Side::Pro,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Side {
    type Err = DebateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pro" | "for" | "aff" | "affirmative" => Ok(Side::Pro),
            "con" | "against" | "neg" | "negative" => Ok(Side::Con),
            other => Err(DebateError::Validation(format!("unknown side '{other}'"))),
        }
    }
}

/// Who is speaking for a side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ParticipantKind {
    /// A person practicing; speeches arrive from outside the orchestrator.
    Human { user_id: Uuid },
    /// An AI debater; speeches come from the given chat model.
    Ai { model: String },
}

/// A participant in the debate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Display name for this participant.
    pub name: String,
    /// The side this participant is arguing.
    pub side: Side,
    pub kind: ParticipantKind,
    /// Optional custom system prompt override.
    pub custom_system_prompt: Option<String>,
    /// Voice ID for TTS. Read when the CLI exports a debate to audio.
    pub voice_id: Option<String>,
}

impl Participant {
    /// Create a human participant.
    pub fn human(name: impl Into<String>, side: Side, user_id: Uuid) -> Self {
        Self::new(name, side, ParticipantKind::Human { user_id })
    }

    /// Create an AI participant using the given model.
    pub fn ai(name: impl Into<String>, side: Side, model: impl Into<String>) -> Self {
        Self::new(
            name,
            side,
            ParticipantKind::Ai {
                model: model.into(),
            },
        )
    }

    fn new(name: impl Into<String>, side: Side, kind: ParticipantKind) -> Self {
        Self {
            name: name.into(),
            side,
            kind,
            custom_system_prompt: None,
            voice_id: None,
        }
    }

    /// Set a custom system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.custom_system_prompt = Some(prompt.into());
        self
    }

    /// Set the voice ID for TTS.
    pub fn with_voice(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = Some(voice_id.into());
        self
    }

    pub fn is_ai(&self) -> bool {
        matches!(self.kind, ParticipantKind::Ai { .. })
    }

    /// The chat model backing this participant, if it is an AI.
    pub fn model(&self) -> Option<&str> {
        match &self.kind {
            ParticipantKind::Ai { model } => Some(model),
            ParticipantKind::Human { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_parsing_accepts_aliases() {
        assert_eq!("Pro".parse::<Side>().unwrap(), Side::Pro);
        assert_eq!("affirmative".parse::<Side>().unwrap(), Side::Pro);
        assert_eq!(" con ".parse::<Side>().unwrap(), Side::Con);
        assert_eq!("neg".parse::<Side>().unwrap(), Side::Con);
        assert!("moderator".parse::<Side>().is_err());
    }

    #[test]
    fn test_side_opponent() {
        assert_eq!(Side::Pro.opponent(), Side::Con);
        assert_eq!(Side::Con.opponent(), Side::Pro);
    }

    #[test]
    fn test_participant_kind() {
        let ai = Participant::ai("Eris", Side::Con, "gpt-4o-mini");
        assert!(ai.is_ai());
        assert_eq!(ai.model(), Some("gpt-4o-mini"));
        assert_eq!(ai.voice_id, None);

        let human = Participant::human("Sam", Side::Pro, Uuid::new_v4());
        assert!(!human.is_ai());
        assert_eq!(human.model(), None);
    }
}
