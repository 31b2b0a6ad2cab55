//! Error type for `eris-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("core error: {0}")]
    Core(#[from] eris_core::DebateError),

    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("uuid parse error: {0}")]
    Uuid(#[from] uuid::Error),

    #[error("date/time parse error: {0}")]
    DateParse(String),

    #[error("speech for turn {turn_index} of session {session_id} already recorded")]
    DuplicateSpeech {
        session_id: uuid::Uuid,
        turn_index: usize,
    },

    #[error("a profile with this token already exists")]
    DuplicateToken,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
