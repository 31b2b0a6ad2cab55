//! Handlers for profiles and preferences.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/api/profiles` | Unauthenticated; returns 201 + profile and its API token |
//! | `GET`  | `/api/profile/preferences` | |
//! | `PUT`  | `/api/profile/preferences` | Body: [`Preferences`], replaces the stored value |

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use eris_core::session::{NewProfile, Preferences, UserProfile};
use eris_core::store::DebateStore;
use serde::{Deserialize, Serialize};

use crate::{
    AppState,
    auth::{AuthUser, generate_token, hash_token},
    error::ApiError,
};

#[derive(Debug, Deserialize)]
pub struct NewProfileBody {
    pub display_name: String,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedProfile {
    pub profile: UserProfile,
    /// Shown once; only its digest is kept.
    pub token: String,
}

/// `POST /api/profiles`
pub async fn create<S>(
    State(state): State<AppState<S>>,
    Json(body): Json<NewProfileBody>,
) -> Result<impl IntoResponse, ApiError>
where
    S: DebateStore + Clone + 'static,
{
    let display_name = body.display_name.trim();
    if display_name.is_empty() || display_name.chars().count() > 80 {
        return Err(ApiError::BadRequest(
            "display_name must be 1 to 80 characters".into(),
        ));
    }

    let token = generate_token();
    let profile = state
        .store
        .create_profile(NewProfile {
            display_name: display_name.to_string(),
            email: body.email.filter(|e| !e.trim().is_empty()),
            token_hash: hash_token(&token),
        })
        .await
        .map_err(ApiError::from_store::<S>)?;

    tracing::info!(user_id = %profile.id, "profile created");
    Ok((StatusCode::CREATED, Json(CreatedProfile { profile, token })))
}

/// `GET /api/profile/preferences`
pub async fn get_preferences<S>(
    State(state): State<AppState<S>>,
    user: AuthUser,
) -> Result<Json<Preferences>, ApiError>
where
    S: DebateStore + Clone + 'static,
{
    let prefs = state
        .store
        .get_preferences(user.id())
        .await
        .map_err(ApiError::store)?;
    Ok(Json(prefs))
}

/// `PUT /api/profile/preferences`
pub async fn put_preferences<S>(
    State(state): State<AppState<S>>,
    user: AuthUser,
    Json(prefs): Json<Preferences>,
) -> Result<Json<Preferences>, ApiError>
where
    S: DebateStore + Clone + 'static,
{
    state
        .store
        .put_preferences(user.id(), prefs.clone())
        .await
        .map_err(ApiError::store)?;
    Ok(Json(prefs))
}
