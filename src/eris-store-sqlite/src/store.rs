//! [`SqliteStore`], the SQLite implementation of [`DebateStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use eris_core::session::{
    DebateSession, Document, DocumentChunk, NewDocument, NewProfile, NewSession, NewSpeech,
    Preferences, SessionStatus, Speech, UserProfile,
};
use eris_core::store::{ChunkCandidate, DebateStore};

use crate::encode::{
    decode_preferences, encode_dt, encode_preferences, encode_uuid, fold_case, like_pattern, RawCandidate,
    RawChunk, RawDocument, RawProfile, RawSession, RawSpeech, DOCUMENT_COLUMNS, PROFILE_COLUMNS,
    SESSION_COLUMNS, SPEECH_COLUMNS,
};
use crate::schema::SCHEMA;
use crate::{Error, Result};

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Outcome of an insert guarded by an ownership check.
enum Guarded {
    Missing,
    Duplicate,
    Inserted,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A debate store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
    conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
    /// Open (or create) a store at `path` and run schema initialisation.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = tokio_rusqlite::Connection::open(path).await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory store, for tests.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = tokio_rusqlite::Connection::open_in_memory().await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn session_by_id(&self, user_id: Uuid, session_id: Uuid) -> Result<Option<DebateSession>> {
        let session_str = encode_uuid(session_id);
        let user_str = encode_uuid(user_id);

        let raw: Option<RawSession> = self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        &format!(
                            "SELECT {SESSION_COLUMNS} FROM sessions
                             WHERE session_id = ?1 AND user_id = ?2"
                        ),
                        rusqlite::params![session_str, user_str],
                        RawSession::from_row,
                    )
                    .optional()?)
            })
            .await?;

        raw.map(RawSession::into_session).transpose()
    }
}

// ─── DebateStore impl ────────────────────────────────────────────────────────

impl DebateStore for SqliteStore {
    type Error = Error;

    fn is_conflict(error: &Error) -> bool {
        matches!(error, Error::DuplicateSpeech { .. } | Error::DuplicateToken)
    }

    // ── Profiles ──────────────────────────────────────────────────────────────

    async fn create_profile(&self, profile: NewProfile) -> Result<UserProfile> {
        let created = UserProfile {
            id: Uuid::new_v4(),
            display_name: profile.display_name,
            email: profile.email,
            created_at: Utc::now(),
        };

        let id_str = encode_uuid(created.id);
        let name = created.display_name.clone();
        let email = created.email.clone();
        let at_str = encode_dt(created.created_at);
        let token_hash = profile.token_hash;

        let inserted = self
            .conn
            .call(move |conn| {
                match conn.execute(
                    "INSERT INTO profiles (user_id, display_name, email, token_hash, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![id_str, name, email, token_hash, at_str],
                ) {
                    Ok(_) => Ok(true),
                    Err(e) if is_constraint_violation(&e) => Ok(false),
                    Err(e) => Err(e.into()),
                }
            })
            .await?;

        if !inserted {
            return Err(Error::DuplicateToken);
        }
        Ok(created)
    }

    async fn profile_by_token_hash(&self, token_hash: String) -> Result<Option<UserProfile>> {
        let raw: Option<RawProfile> = self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE token_hash = ?1"),
                        rusqlite::params![token_hash],
                        RawProfile::from_row,
                    )
                    .optional()?)
            })
            .await?;

        raw.map(RawProfile::into_profile).transpose()
    }

    async fn get_preferences(&self, user_id: Uuid) -> Result<Preferences> {
        let user_str = encode_uuid(user_id);

        let json: Option<String> = self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT preferences_json FROM preferences WHERE user_id = ?1",
                        rusqlite::params![user_str],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;

        match json {
            Some(json) => decode_preferences(&json),
            None => Ok(Preferences::default()),
        }
    }

    async fn put_preferences(&self, user_id: Uuid, preferences: Preferences) -> Result<Preferences> {
        let user_str = encode_uuid(user_id);
        let json = encode_preferences(&preferences)?;
        let at_str = encode_dt(Utc::now());

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO preferences (user_id, preferences_json, updated_at)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT (user_id) DO UPDATE SET
                       preferences_json = excluded.preferences_json,
                       updated_at       = excluded.updated_at",
                    rusqlite::params![user_str, json, at_str],
                )?;
                Ok(())
            })
            .await?;

        Ok(preferences)
    }

    // ── Sessions ──────────────────────────────────────────────────────────────

    async fn create_session(&self, session: NewSession) -> Result<DebateSession> {
        session.validate()?;

        let now = Utc::now();
        let created = DebateSession {
            id: Uuid::new_v4(),
            user_id: session.user_id,
            topic: session.topic.trim().to_string(),
            format: session.format,
            user_side: session.user_side,
            ai_name: session.ai_name,
            ai_model: session.ai_model,
            first_speaker: session.first_speaker,
            turn_index: 0,
            status: SessionStatus::Active,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        let row = (
            encode_uuid(created.id),
            encode_uuid(created.user_id),
            created.topic.clone(),
            created.format.clone(),
            created.user_side.as_str(),
            created.ai_name.clone(),
            created.ai_model.clone(),
            created.first_speaker.as_str(),
            created.status.as_str(),
            encode_dt(now),
        );

        self.conn
            .call(move |conn| {
                let (id, user, topic, format, side, ai_name, ai_model, first, status, at) = row;
                conn.execute(
                    "INSERT INTO sessions (
                       session_id, user_id, topic, format, user_side, ai_name, ai_model,
                       first_speaker, turn_index, status, created_at, updated_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?10, ?10)",
                    rusqlite::params![
                        id, user, topic, format, side, ai_name, ai_model, first, status, at
                    ],
                )?;
                Ok(())
            })
            .await?;

        Ok(created)
    }

    async fn get_session(&self, user_id: Uuid, session_id: Uuid) -> Result<Option<DebateSession>> {
        self.session_by_id(user_id, session_id).await
    }

    async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<DebateSession>> {
        let user_str = encode_uuid(user_id);

        let raws: Vec<RawSession> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions
                     WHERE user_id = ?1
                     ORDER BY created_at DESC"
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![user_str], RawSession::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        raws.into_iter().map(RawSession::into_session).collect()
    }

    async fn update_session_progress(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        turn_index: usize,
        status: SessionStatus,
    ) -> Result<Option<DebateSession>> {
        let session_str = encode_uuid(session_id);
        let user_str = encode_uuid(user_id);
        let status_str = status.as_str();
        let at_str = encode_dt(Utc::now());
        let turn = turn_index as i64;

        let changed = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    // Progress only moves forward and a completed session
                    // stays completed.
                    "UPDATE sessions SET
                       turn_index   = MAX(turn_index, ?3),
                       status       = CASE WHEN status = 'completed' THEN status ELSE ?4 END,
                       updated_at   = ?5,
                       completed_at = CASE WHEN ?4 = 'completed'
                                           THEN COALESCE(completed_at, ?5)
                                           ELSE completed_at END
                     WHERE session_id = ?1 AND user_id = ?2",
                    rusqlite::params![session_str, user_str, turn, status_str, at_str],
                )?)
            })
            .await?;

        if changed == 0 {
            return Ok(None);
        }
        self.session_by_id(user_id, session_id).await
    }

    // ── Speeches ──────────────────────────────────────────────────────────────

    async fn add_speech(&self, user_id: Uuid, speech: NewSpeech) -> Result<Option<Speech>> {
        let created = Speech {
            id: Uuid::new_v4(),
            session_id: speech.session_id,
            turn_index: speech.message.turn_index,
            phase: speech.message.phase,
            section: speech.message.section,
            side: speech.message.side,
            speaker_name: speech.message.speaker_name,
            speaker_kind: speech.speaker_kind,
            content: speech.message.content,
            audio_ref: speech.audio_ref,
            created_at: Utc::now(),
        };

        let user_str = encode_uuid(user_id);
        let id_str = encode_uuid(created.id);
        let session_str = encode_uuid(created.session_id);
        let turn = created.turn_index as i64;
        let phase = created.phase.as_str();
        let section = created.section.clone();
        let side = created.side.as_str();
        let speaker_name = created.speaker_name.clone();
        let kind = created.speaker_kind.as_str();
        let content = created.content.clone();
        let audio_ref = created.audio_ref.clone();
        let at_str = encode_dt(created.created_at);

        let outcome = self
            .conn
            .call(move |conn| {
                let owned = conn
                    .query_row(
                        "SELECT 1 FROM sessions WHERE session_id = ?1 AND user_id = ?2",
                        rusqlite::params![session_str, user_str],
                        |_| Ok(true),
                    )
                    .optional()?
                    .unwrap_or(false);
                if !owned {
                    return Ok(Guarded::Missing);
                }

                match conn.execute(
                    "INSERT INTO speeches (
                       speech_id, session_id, turn_index, phase, section, side,
                       speaker_name, speaker_kind, content, audio_ref, created_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    rusqlite::params![
                        id_str,
                        session_str,
                        turn,
                        phase,
                        section,
                        side,
                        speaker_name,
                        kind,
                        content,
                        audio_ref,
                        at_str,
                    ],
                ) {
                    Ok(_) => Ok(Guarded::Inserted),
                    Err(e) if is_constraint_violation(&e) => Ok(Guarded::Duplicate),
                    Err(e) => Err(e.into()),
                }
            })
            .await?;

        match outcome {
            Guarded::Missing => Ok(None),
            Guarded::Duplicate => Err(Error::DuplicateSpeech {
                session_id: created.session_id,
                turn_index: created.turn_index,
            }),
            Guarded::Inserted => Ok(Some(created)),
        }
    }

    async fn list_speeches(&self, user_id: Uuid, session_id: Uuid) -> Result<Vec<Speech>> {
        let session_str = encode_uuid(session_id);
        let user_str = encode_uuid(user_id);

        let raws: Vec<RawSpeech> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SPEECH_COLUMNS}
                     FROM speeches sp
                     JOIN sessions s ON s.session_id = sp.session_id
                     WHERE sp.session_id = ?1 AND s.user_id = ?2
                     ORDER BY sp.turn_index"
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![session_str, user_str], RawSpeech::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        raws.into_iter().map(RawSpeech::into_speech).collect()
    }

    // ── Documents ─────────────────────────────────────────────────────────────

    async fn add_document(&self, document: NewDocument) -> Result<Document> {
        let created = Document {
            id: Uuid::new_v4(),
            owner_id: document.owner_id,
            title: document.title,
            source: document.source,
            shared: document.shared,
            chunk_count: document.chunks.len(),
            created_at: Utc::now(),
        };

        let doc_str = encode_uuid(created.id);
        let owner_str = encode_uuid(created.owner_id);
        let title = created.title.clone();
        let source = created.source.clone();
        let shared = created.shared;
        let count = created.chunk_count as i64;
        let at_str = encode_dt(created.created_at);
        let chunks = document.chunks;

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO documents (
                       document_id, owner_id, title, source, shared, chunk_count, created_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![doc_str, owner_str, title, source, shared, count, at_str],
                )?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO document_chunks (
                           chunk_id, document_id, ordinal, content, search_text
                         ) VALUES (?1, ?2, ?3, ?4, ?5)",
                    )?;
                    for (ordinal, content) in chunks.iter().enumerate() {
                        stmt.execute(rusqlite::params![
                            encode_uuid(Uuid::new_v4()),
                            doc_str,
                            ordinal as i64,
                            content,
                            fold_case(content),
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await?;

        Ok(created)
    }

    async fn get_document(&self, user_id: Uuid, document_id: Uuid) -> Result<Option<Document>> {
        let doc_str = encode_uuid(document_id);
        let user_str = encode_uuid(user_id);

        let raw: Option<RawDocument> = self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        &format!(
                            "SELECT {DOCUMENT_COLUMNS} FROM documents d
                             WHERE d.document_id = ?1 AND (d.owner_id = ?2 OR d.shared = 1)"
                        ),
                        rusqlite::params![doc_str, user_str],
                        RawDocument::from_row,
                    )
                    .optional()?)
            })
            .await?;

        raw.map(RawDocument::into_document).transpose()
    }

    async fn document_chunks(&self, user_id: Uuid, document_id: Uuid) -> Result<Vec<DocumentChunk>> {
        let doc_str = encode_uuid(document_id);
        let user_str = encode_uuid(user_id);

        let raws: Vec<RawChunk> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT c.chunk_id, c.document_id, c.ordinal, c.content
                     FROM document_chunks c
                     JOIN documents d ON d.document_id = c.document_id
                     WHERE c.document_id = ?1 AND (d.owner_id = ?2 OR d.shared = 1)
                     ORDER BY c.ordinal",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![doc_str, user_str], |row| {
                        Ok(RawChunk {
                            chunk_id: row.get(0)?,
                            document_id: row.get(1)?,
                            ordinal: row.get(2)?,
                            content: row.get(3)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        raws.into_iter().map(RawChunk::into_chunk).collect()
    }

    async fn list_documents(&self, user_id: Uuid) -> Result<Vec<Document>> {
        let user_str = encode_uuid(user_id);

        let raws: Vec<RawDocument> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents d
                     WHERE d.owner_id = ?1 OR d.shared = 1
                     ORDER BY d.created_at DESC, d.title"
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![user_str], RawDocument::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        raws.into_iter().map(RawDocument::into_document).collect()
    }

    async fn delete_document(&self, user_id: Uuid, document_id: Uuid) -> Result<bool> {
        let doc_str = encode_uuid(document_id);
        let user_str = encode_uuid(user_id);

        let removed = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM documents WHERE document_id = ?1 AND owner_id = ?2",
                    rusqlite::params![doc_str, user_str],
                )?)
            })
            .await?;

        Ok(removed > 0)
    }

    async fn keyword_candidates(
        &self,
        user_id: Uuid,
        terms: Vec<String>,
        limit: usize,
    ) -> Result<Vec<ChunkCandidate>> {
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut params = vec![
            rusqlite::types::Value::Text(encode_uuid(user_id)),
            rusqlite::types::Value::Integer(limit as i64),
        ];
        let mut conds = Vec::with_capacity(terms.len());
        for term in &terms {
            params.push(rusqlite::types::Value::Text(like_pattern(&fold_case(term))));
            conds.push(format!("(c.search_text LIKE ?{} ESCAPE '\\')", params.len()));
        }

        // Chunks matching more terms come first, before the limit applies.
        let sql = format!(
            "SELECT c.document_id, d.title, d.source, c.ordinal, c.content,
                    {} AS matched
             FROM document_chunks c
             JOIN documents d ON d.document_id = c.document_id
             WHERE (d.owner_id = ?1 OR d.shared = 1)
               AND ({})
             ORDER BY matched DESC, d.title, c.ordinal
             LIMIT ?2",
            conds.join(" + "),
            conds.join(" OR ")
        );

        let raws: Vec<RawCandidate> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                        Ok(RawCandidate {
                            document_id: row.get(0)?,
                            title: row.get(1)?,
                            source: row.get(2)?,
                            ordinal: row.get(3)?,
                            content: row.get(4)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        raws.into_iter().map(RawCandidate::into_candidate).collect()
    }
}
