//! Bearer-token authentication middleware.
//!
//! Resolves the token to a [`CurrentUser`] snapshot once per request and
//! stashes it in the request extensions; handlers take it back out with
//! the extractor below.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::errors::AppError;
use crate::models::CurrentUser;
use crate::AppState;

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".to_string()))?;

    let user = state.auth.resolve_current_user(token).await?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Extractor for the authenticated user placed by [`auth_middleware`].
#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("Not authenticated".to_string()))
    }
}

