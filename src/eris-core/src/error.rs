//! Error types for the debate system.

use thiserror::Error;

use crate::debate_format::Phase;
use crate::participant::Side;

#[derive(Error, Debug)]
pub enum DebateError {
    #[error("Invalid participant count: expected {min}-{max}, got {actual}")]
    InvalidParticipantCount {
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("Invalid participants: {0}")]
    InvalidParticipants(String),

    #[error("OpenAI API error: {0}")]
    OpenAIError(#[from] async_openai::error::OpenAIError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned {status}: {message}")]
    Upstream {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown debate format: {0}")]
    UnknownFormat(String),

    #[error("Debate has not started")]
    NotStarted,

    #[error("Debate is already finished")]
    Finished,

    #[error("It is {expected}'s turn, not {actual}'s")]
    NotYourTurn { expected: Side, actual: Side },

    #[error("Turn {requested} is no longer current (now at turn {current})")]
    StaleTurn { requested: usize, current: usize },

    #[error("Current turn in {phase} belongs to a human speaker")]
    HumanTurn { phase: Phase },

    #[error("AI participant '{speaker}' returned empty response after {attempts} attempts")]
    EmptyResponse { speaker: String, attempts: u32 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DebateError {
    /// Whether retrying the failed operation could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            DebateError::Upstream { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            DebateError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status()
                        .is_some_and(|s| s.is_server_error() || s.as_u16() == 429)
            }
            DebateError::OpenAIError(e) => {
                matches!(e, async_openai::error::OpenAIError::Reqwest(_))
            }
            DebateError::EmptyResponse { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_status_classification() {
        let err = |status| DebateError::Upstream {
            service: "ElevenLabs",
            status,
            message: String::new(),
        };
        assert!(err(429).is_transient());
        assert!(err(503).is_transient());
        assert!(err(408).is_transient());
        assert!(!err(401).is_transient());
        assert!(!err(400).is_transient());
    }

    #[test]
    fn test_turn_errors_are_not_transient() {
        assert!(!DebateError::Finished.is_transient());
        assert!(
            !DebateError::NotYourTurn {
                expected: Side::Pro,
                actual: Side::Con
            }
            .is_transient()
        );
    }
}
