//! Conversions between domain types and the text stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, UUIDs hyphenated lowercase, enums their
//! lowercase names. Preferences are stored as JSON.

use chrono::{DateTime, Utc};
use eris_core::session::{
    DebateSession, Document, DocumentChunk, Preferences, Speech, UserProfile,
};
use eris_core::store::ChunkCandidate;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String {
    id.hyphenated().to_string()
}

pub fn decode_uuid(s: &str) -> Result<Uuid> {
    Ok(Uuid::parse_str(s)?)
}

pub fn encode_dt(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_preferences(p: &Preferences) -> Result<String> {
    Ok(serde_json::to_string(p)?)
}

pub fn decode_preferences(s: &str) -> Result<Preferences> {
    Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const PROFILE_COLUMNS: &str = "user_id, display_name, email, created_at";

/// Raw strings read from a `profiles` row.
pub struct RawProfile {
    pub user_id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub created_at: String,
}

impl RawProfile {
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get(0)?,
            display_name: row.get(1)?,
            email: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    pub fn into_profile(self) -> Result<UserProfile> {
        Ok(UserProfile {
            id: decode_uuid(&self.user_id)?,
            display_name: self.display_name,
            email: self.email,
            created_at: decode_dt(&self.created_at)?,
        })
    }
}

pub const SESSION_COLUMNS: &str = "session_id, user_id, topic, format, user_side, ai_name, \
     ai_model, first_speaker, turn_index, status, created_at, updated_at, completed_at";

/// Raw values read from a `sessions` row.
pub struct RawSession {
    pub session_id: String,
    pub user_id: String,
    pub topic: String,
    pub format: String,
    pub user_side: String,
    pub ai_name: String,
    pub ai_model: String,
    pub first_speaker: String,
    pub turn_index: i64,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl RawSession {
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            session_id: row.get(0)?,
            user_id: row.get(1)?,
            topic: row.get(2)?,
            format: row.get(3)?,
            user_side: row.get(4)?,
            ai_name: row.get(5)?,
            ai_model: row.get(6)?,
            first_speaker: row.get(7)?,
            turn_index: row.get(8)?,
            status: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
            completed_at: row.get(12)?,
        })
    }

    pub fn into_session(self) -> Result<DebateSession> {
        Ok(DebateSession {
            id: decode_uuid(&self.session_id)?,
            user_id: decode_uuid(&self.user_id)?,
            topic: self.topic,
            format: self.format,
            user_side: self.user_side.parse()?,
            ai_name: self.ai_name,
            ai_model: self.ai_model,
            first_speaker: self.first_speaker.parse()?,
            turn_index: self.turn_index as usize,
            status: self.status.parse()?,
            created_at: decode_dt(&self.created_at)?,
            updated_at: decode_dt(&self.updated_at)?,
            completed_at: self.completed_at.as_deref().map(decode_dt).transpose()?,
        })
    }
}

/// Columns of `speeches`, qualified with the `sp` alias used in joins.
pub const SPEECH_COLUMNS: &str = "sp.speech_id, sp.session_id, sp.turn_index, sp.phase, \
     sp.section, sp.side, sp.speaker_name, sp.speaker_kind, sp.content, sp.audio_ref, sp.created_at";

pub struct RawSpeech {
    pub speech_id: String,
    pub session_id: String,
    pub turn_index: i64,
    pub phase: String,
    pub section: String,
    pub side: String,
    pub speaker_name: String,
    pub speaker_kind: String,
    pub content: String,
    pub audio_ref: Option<String>,
    pub created_at: String,
}

impl RawSpeech {
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            speech_id: row.get(0)?,
            session_id: row.get(1)?,
            turn_index: row.get(2)?,
            phase: row.get(3)?,
            section: row.get(4)?,
            side: row.get(5)?,
            speaker_name: row.get(6)?,
            speaker_kind: row.get(7)?,
            content: row.get(8)?,
            audio_ref: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    pub fn into_speech(self) -> Result<Speech> {
        Ok(Speech {
            id: decode_uuid(&self.speech_id)?,
            session_id: decode_uuid(&self.session_id)?,
            turn_index: self.turn_index as usize,
            phase: self.phase.parse()?,
            section: self.section,
            side: self.side.parse()?,
            speaker_name: self.speaker_name,
            speaker_kind: self.speaker_kind.parse()?,
            content: self.content,
            audio_ref: self.audio_ref,
            created_at: decode_dt(&self.created_at)?,
        })
    }
}

/// Columns of `documents`, qualified with the `d` alias.
pub const DOCUMENT_COLUMNS: &str =
    "d.document_id, d.owner_id, d.title, d.source, d.shared, d.chunk_count, d.created_at";

pub struct RawDocument {
    pub document_id: String,
    pub owner_id: String,
    pub title: String,
    pub source: Option<String>,
    pub shared: bool,
    pub chunk_count: i64,
    pub created_at: String,
}

impl RawDocument {
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            document_id: row.get(0)?,
            owner_id: row.get(1)?,
            title: row.get(2)?,
            source: row.get(3)?,
            shared: row.get(4)?,
            chunk_count: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    pub fn into_document(self) -> Result<Document> {
        Ok(Document {
            id: decode_uuid(&self.document_id)?,
            owner_id: decode_uuid(&self.owner_id)?,
            title: self.title,
            source: self.source,
            shared: self.shared,
            chunk_count: self.chunk_count as usize,
            created_at: decode_dt(&self.created_at)?,
        })
    }
}

pub struct RawChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub ordinal: i64,
    pub content: String,
}

impl RawChunk {
    pub fn into_chunk(self) -> Result<DocumentChunk> {
        Ok(DocumentChunk {
            id: decode_uuid(&self.chunk_id)?,
            document_id: decode_uuid(&self.document_id)?,
            ordinal: self.ordinal as usize,
            content: self.content,
        })
    }
}

pub struct RawCandidate {
    pub document_id: String,
    pub title: String,
    pub source: Option<String>,
    pub ordinal: i64,
    pub content: String,
}

impl RawCandidate {
    pub fn into_candidate(self) -> Result<ChunkCandidate> {
        Ok(ChunkCandidate {
            document_id: decode_uuid(&self.document_id)?,
            title: self.title,
            source: self.source,
            ordinal: self.ordinal as usize,
            content: self.content,
        })
    }
}

/// Case-folded form used for keyword matching, on both the stored text and
/// the query terms.
pub fn fold_case(text: &str) -> String {
    text.to_lowercase()
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}
