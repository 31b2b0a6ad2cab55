//! axum handlers, one module per resource.

pub mod debate;
pub mod documents;
pub mod events;
pub mod profiles;
pub mod voice;

use eris_core::session::DebateSession;
use eris_core::store::DebateStore;
use uuid::Uuid;

use crate::{AppState, auth::AuthUser, error::ApiError};

/// A session owned by the caller. Other users' sessions are reported as
/// missing.
pub(crate) async fn owned_session<S>(
    state: &AppState<S>,
    user: &AuthUser,
    session_id: Uuid,
) -> Result<DebateSession, ApiError>
where
    S: DebateStore,
{
    state
        .store
        .get_session(user.id(), session_id)
        .await
        .map_err(ApiError::store)?
        .ok_or_else(|| ApiError::NotFound(format!("debate {session_id} not found")))
}
