//! Bearer-token authentication extractor.
//!
//! Tokens are opaque random strings handed out when a profile is created.
//! Only their SHA-256 digest is stored. Streaming clients that cannot set
//! headers may pass the token as `?access_token=`.

use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, header, request::Parts};
use eris_core::session::UserProfile;
use eris_core::store::DebateStore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// Hex SHA-256 of a token, as stored.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// A fresh random API token.
pub fn generate_token() -> String {
    format!("eris_{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn query_token(parts: &Parts) -> Option<&str> {
    parts
        .uri
        .query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("access_token="))
        .filter(|t| !t.is_empty())
}

/// The authenticated caller. Present in a handler means the request carried
/// a valid token and is within the rate limit.
pub struct AuthUser(pub UserProfile);

impl AuthUser {
    pub fn id(&self) -> Uuid {
        self.0.id
    }
}

impl<S> FromRequestParts<AppState<S>> for AuthUser
where
    S: DebateStore + Clone + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<S>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .or_else(|| query_token(parts))
            .ok_or(ApiError::Unauthorized)?;

        let profile = state
            .store
            .profile_by_token_hash(hash_token(token))
            .await
            .map_err(ApiError::store)?
            .ok_or(ApiError::Unauthorized)?;

        state
            .limiter
            .check(profile.id)
            .map_err(|wait| ApiError::RateLimited {
                retry_after_secs: wait.as_secs().max(1),
            })?;

        Ok(AuthUser(profile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[test]
    fn test_hash_token_is_hex_sha256() {
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_generated_tokens_are_unique() {
        let a = generate_token();
        let b = generate_token();
        assert!(a.starts_with("eris_"));
        assert_eq!(a.len(), 5 + 64);
        assert_ne!(a, b);
    }

    #[test]
    fn test_token_sources() {
        let req = Request::builder()
            .uri("/api/debate/x/events?since=3&access_token=tok")
            .header(header::AUTHORIZATION, "Bearer  hdr ")
            .body(())
            .unwrap();
        let (parts, _) = req.into_parts();
        assert_eq!(bearer_token(&parts.headers), Some("hdr"));
        assert_eq!(query_token(&parts), Some("tok"));

        let req = Request::builder().uri("/x").body(()).unwrap();
        let (parts, _) = req.into_parts();
        assert_eq!(bearer_token(&parts.headers), None);
        assert_eq!(query_token(&parts), None);
    }
}
