//! Application error taxonomy and its HTTP rendering.
//!
//! Business errors carry a user-safe message and map to a specific status
//! code. Infrastructure faults (database, cache, email transport) collapse
//! to a generic 500 so that no internal detail leaks through the API.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    /// One undifferentiated kind for every purpose-token failure:
    /// bad signature, malformed structure, or expiry. Callers must not
    /// be able to tell these apart.
    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Message plus optional Retry-After seconds.
    #[error("{0}")]
    TooManyRequests(String, Option<u64>),

    #[error("Database error: {0}")]
    Database(anyhow::Error),

    #[error("Cache error: {0}")]
    Cache(anyhow::Error),

    #[error("Email error: {0}")]
    Email(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(anyhow::Error::new(err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorBody {
            error: String,
        }

        let (status, message) = match &self {
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::InvalidToken => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            AppError::TooManyRequests(msg, _) => (StatusCode::TOO_MANY_REQUESTS, msg.clone()),
            AppError::Database(err) => {
                tracing::error!(error = %err, "database fault");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Cache(err) => {
                tracing::error!(error = %err, "cache fault");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Email(err) => {
                tracing::error!(error = %err, "email transport fault");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal fault");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let retry_after = match &self {
            AppError::TooManyRequests(_, secs) => *secs,
            _ => None,
        };

        let mut res = (status, Json(ErrorBody { error: message })).into_response();

        if let Some(secs) = retry_after {
            if let Ok(value) = header::HeaderValue::from_str(&secs.to_string()) {
                res.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        if status == StatusCode::UNAUTHORIZED {
            res.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                header::HeaderValue::from_static("Bearer"),
            );
        }

        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infrastructure_faults_render_generic_message() {
        let res = AppError::Database(anyhow::anyhow!("connection refused to db:5432"))
            .into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn unauthorized_carries_bearer_challenge() {
        let res = AppError::Unauthorized("Could not validate credentials".to_string())
            .into_response();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            res.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );
    }

    #[test]
    fn invalid_token_is_bad_request() {
        let res = AppError::InvalidToken.into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
