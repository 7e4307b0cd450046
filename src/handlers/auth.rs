//! Authentication handlers: registration, email confirmation, login and
//! the password-reset pair.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::dtos::{
    LoginRequest, MessageResponse, PasswordResetConfirm, PasswordResetRequest, RegisterRequest,
    TokenResponse,
};
use crate::errors::AppError;
use crate::services::ConfirmOutcome;
use crate::utils::password::Password;
use crate::utils::validation::ValidatedJson;
use crate::AppState;

pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    state
        .auth
        .register(&body.username, &body.email, Password::new(body.password))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new(
            "User successfully created. Check your email for confirmation.",
        )),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ConfirmQuery {
    pub token: String,
}

pub async fn confirm_email(
    State(state): State<AppState>,
    Query(query): Query<ConfirmQuery>,
) -> Result<Json<MessageResponse>, AppError> {
    let message = match state.auth.confirm_registration(&query.token).await? {
        ConfirmOutcome::Confirmed => "Email confirmed",
        ConfirmOutcome::AlreadyConfirmed => "Your email is already confirmed",
    };
    Ok(Json(MessageResponse::new(message)))
}

pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let access_token = state
        .auth
        .login(&body.username, Password::new(body.password))
        .await?;

    Ok(Json(TokenResponse::bearer(access_token)))
}

pub async fn request_password_reset(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<PasswordResetRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state.auth.request_password_reset(&body.email).await?;

    // Identical body whether or not the email is on record.
    Ok(Json(MessageResponse::new(
        "If the email is registered, a reset link has been sent.",
    )))
}

pub async fn confirm_password_reset(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<PasswordResetConfirm>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .auth
        .reset_password(&body.token, Password::new(body.new_password))
        .await?;

    Ok(Json(MessageResponse::new("Password successfully changed")))
}
