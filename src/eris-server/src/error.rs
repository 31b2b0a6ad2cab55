//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use eris_core::DebateError;
use eris_core::search::SearchError;
use eris_core::store::DebateStore;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("missing or invalid API token")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("store error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn store<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
        ApiError::Store(Box::new(e))
    }

    /// Like [`ApiError::store`], but a write that clashed with stored data
    /// is a conflict rather than a server fault.
    pub fn from_store<S: DebateStore>(e: S::Error) -> Self {
        if S::is_conflict(&e) {
            ApiError::Conflict(e.to_string())
        } else {
            ApiError::store(e)
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Store(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DebateError> for ApiError {
    fn from(e: DebateError) -> Self {
        match e {
            DebateError::Validation(_)
            | DebateError::InvalidParticipants(_)
            | DebateError::InvalidParticipantCount { .. }
            | DebateError::UnknownFormat(_)
            | DebateError::Json(_) => ApiError::BadRequest(e.to_string()),

            DebateError::NotStarted
            | DebateError::Finished
            | DebateError::NotYourTurn { .. }
            | DebateError::StaleTurn { .. }
            | DebateError::HumanTurn { .. } => ApiError::Conflict(e.to_string()),

            DebateError::OpenAIError(_)
            | DebateError::Http(_)
            | DebateError::Upstream { .. }
            | DebateError::EmptyResponse { .. } => ApiError::Upstream(e.to_string()),

            DebateError::ConfigError(_) | DebateError::Audio(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl<E: std::error::Error + Send + Sync + 'static> From<SearchError<E>> for ApiError {
    fn from(e: SearchError<E>) -> Self {
        match e {
            SearchError::Debate(e) => e.into(),
            SearchError::Store(e) => ApiError::store(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let mut response = (status, Json(json!({ "error": self.to_string() }))).into_response();
        if let ApiError::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eris_core::Side;

    #[test]
    fn test_debate_errors_map_to_status() {
        let cases = [
            (DebateError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (
                DebateError::NotYourTurn {
                    expected: Side::Pro,
                    actual: Side::Con,
                },
                StatusCode::CONFLICT,
            ),
            (DebateError::Finished, StatusCode::CONFLICT),
            (
                DebateError::Upstream {
                    service: "OpenAI",
                    status: 500,
                    message: "down".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (DebateError::ConfigError("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status(), status);
        }
    }

    #[test]
    fn test_duplicate_writes_are_conflicts() {
        use eris_store_sqlite::{Error, SqliteStore};

        let duplicate = Error::DuplicateSpeech {
            session_id: uuid::Uuid::new_v4(),
            turn_index: 2,
        };
        assert_eq!(
            ApiError::from_store::<SqliteStore>(duplicate).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from_store::<SqliteStore>(Error::DateParse("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = ApiError::RateLimited { retry_after_secs: 12 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "12");
    }
}
