//! The `DebateStore` trait implemented by persistence backends.
//!
//! Every query that touches user data takes the authenticated user's id and
//! only sees rows that user owns (or, for documents, rows marked shared).
//! Rows belonging to someone else behave exactly like missing rows.

use std::future::Future;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::{
    DebateSession, Document, DocumentChunk, NewDocument, NewProfile, NewSession, NewSpeech,
    Preferences, SessionStatus, Speech, UserProfile,
};

/// A chunk that may match a keyword query, with its document title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkCandidate {
    pub document_id: Uuid,
    pub title: String,
    pub source: Option<String>,
    pub ordinal: usize,
    pub content: String,
}

/// Persistence for profiles, debate sessions, speeches and evidence.
///
/// All methods return `Send` futures so implementations can be shared across
/// axum handlers and background tasks.
pub trait DebateStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Whether `error` means the write clashed with data already stored,
    /// such as a second speech for the same turn.
    fn is_conflict(error: &Self::Error) -> bool {
        let _ = error;
        false
    }

    // ── Profiles ──────────────────────────────────────────────────────────

    fn create_profile(
        &self,
        profile: NewProfile,
    ) -> impl Future<Output = Result<UserProfile, Self::Error>> + Send + '_;

    fn profile_by_token_hash(
        &self,
        token_hash: String,
    ) -> impl Future<Output = Result<Option<UserProfile>, Self::Error>> + Send + '_;

    /// Stored preferences, or the defaults when none were saved.
    fn get_preferences(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = Result<Preferences, Self::Error>> + Send + '_;

    fn put_preferences(
        &self,
        user_id: Uuid,
        preferences: Preferences,
    ) -> impl Future<Output = Result<Preferences, Self::Error>> + Send + '_;

    // ── Sessions ──────────────────────────────────────────────────────────

    fn create_session(
        &self,
        session: NewSession,
    ) -> impl Future<Output = Result<DebateSession, Self::Error>> + Send + '_;

    fn get_session(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> impl Future<Output = Result<Option<DebateSession>, Self::Error>> + Send + '_;

    /// The user's sessions, newest first.
    fn list_sessions(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = Result<Vec<DebateSession>, Self::Error>> + Send + '_;

    /// Move the session's turn cursor and status. Returns `None` when the
    /// session does not exist for this user.
    fn update_session_progress(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        turn_index: usize,
        status: SessionStatus,
    ) -> impl Future<Output = Result<Option<DebateSession>, Self::Error>> + Send + '_;

    // ── Speeches ──────────────────────────────────────────────────────────

    /// Append a speech. Returns `None` when the session does not exist for
    /// this user. A second speech for the same turn is an error.
    fn add_speech(
        &self,
        user_id: Uuid,
        speech: NewSpeech,
    ) -> impl Future<Output = Result<Option<Speech>, Self::Error>> + Send + '_;

    /// Speeches in turn order.
    fn list_speeches(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Speech>, Self::Error>> + Send + '_;

    // ── Documents ─────────────────────────────────────────────────────────

    fn add_document(
        &self,
        document: NewDocument,
    ) -> impl Future<Output = Result<Document, Self::Error>> + Send + '_;

    /// A document the user owns or that is shared.
    fn get_document(
        &self,
        user_id: Uuid,
        document_id: Uuid,
    ) -> impl Future<Output = Result<Option<Document>, Self::Error>> + Send + '_;

    fn document_chunks(
        &self,
        user_id: Uuid,
        document_id: Uuid,
    ) -> impl Future<Output = Result<Vec<DocumentChunk>, Self::Error>> + Send + '_;

    /// Documents the user owns plus shared ones, newest first.
    fn list_documents(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Document>, Self::Error>> + Send + '_;

    /// Delete one of the user's own documents. Returns whether a row was
    /// removed; shared documents of other users are never deleted.
    fn delete_document(
        &self,
        user_id: Uuid,
        document_id: Uuid,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

    /// Visible chunks containing any of `terms` (case-insensitive), at most
    /// `limit` of them.
    fn keyword_candidates(
        &self,
        user_id: Uuid,
        terms: Vec<String>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<ChunkCandidate>, Self::Error>> + Send + '_;
}
