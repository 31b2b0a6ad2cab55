//! SQL schema for the Eris SQLite store.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS profiles (
    user_id      TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    email        TEXT,
    token_hash   TEXT NOT NULL UNIQUE,   -- hex sha256 of the API token
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS preferences (
    user_id          TEXT PRIMARY KEY REFERENCES profiles(user_id) ON DELETE CASCADE,
    preferences_json TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    session_id    TEXT PRIMARY KEY,
    user_id       TEXT NOT NULL REFERENCES profiles(user_id) ON DELETE CASCADE,
    topic         TEXT NOT NULL,
    format        TEXT NOT NULL,
    user_side     TEXT NOT NULL,     -- 'pro' | 'con'
    ai_name       TEXT NOT NULL,
    ai_model      TEXT NOT NULL,
    first_speaker TEXT NOT NULL,
    turn_index    INTEGER NOT NULL DEFAULT 0,
    status        TEXT NOT NULL DEFAULT 'active',
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    completed_at  TEXT
);

-- Speeches are never updated.
CREATE TABLE IF NOT EXISTS speeches (
    speech_id    TEXT PRIMARY KEY,
    session_id   TEXT NOT NULL REFERENCES sessions(session_id) ON DELETE CASCADE,
    turn_index   INTEGER NOT NULL,
    phase        TEXT NOT NULL,
    section      TEXT NOT NULL,
    side         TEXT NOT NULL,
    speaker_name TEXT NOT NULL,
    speaker_kind TEXT NOT NULL,      -- 'human' | 'ai'
    content      TEXT NOT NULL,
    audio_ref    TEXT,
    created_at   TEXT NOT NULL,
    UNIQUE (session_id, turn_index)
);

CREATE TABLE IF NOT EXISTS documents (
    document_id TEXT PRIMARY KEY,
    owner_id    TEXT NOT NULL REFERENCES profiles(user_id) ON DELETE CASCADE,
    title       TEXT NOT NULL,
    source      TEXT,
    shared      INTEGER NOT NULL DEFAULT 0,
    chunk_count INTEGER NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS document_chunks (
    chunk_id    TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES documents(document_id) ON DELETE CASCADE,
    ordinal     INTEGER NOT NULL,
    content     TEXT NOT NULL,
    -- content case-folded in Rust; SQLite's lower() only folds ASCII
    search_text TEXT NOT NULL,
    UNIQUE (document_id, ordinal)
);

CREATE INDEX IF NOT EXISTS sessions_user_idx    ON sessions(user_id, created_at);
CREATE INDEX IF NOT EXISTS speeches_session_idx ON speeches(session_id, turn_index);
CREATE INDEX IF NOT EXISTS documents_owner_idx  ON documents(owner_id);
CREATE INDEX IF NOT EXISTS chunks_document_idx  ON document_chunks(document_id, ordinal);

PRAGMA user_version = 1;
";
