//! User profile handlers.

use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use serde::Serialize;

use crate::dtos::{ChangeRoleRequest, UserResponse};
use crate::errors::AppError;
use crate::models::{CurrentUser, Role};
use crate::utils::validation::ValidatedJson;
use crate::AppState;

pub async fn me(user: CurrentUser) -> Json<UserResponse> {
    Json(UserResponse::from(user))
}

#[derive(Debug, Serialize)]
pub struct AvatarResponse {
    pub avatar_url: String,
}

/// Multipart upload of a new avatar image, field name `file`.
pub async fn upload_avatar(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> Result<Json<AvatarResponse>, AppError> {
    state.auth.require_role(&user, Role::Admin)?;

    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or("avatar").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("Malformed multipart body: {}", e)))?;
            upload = Some((filename, bytes.to_vec()));
            break;
        }
    }

    let (filename, bytes) =
        upload.ok_or_else(|| AppError::BadRequest("Missing file field".to_string()))?;

    let updated = state
        .auth
        .update_avatar(&user, state.avatars.clone(), &filename, bytes)
        .await?;

    let avatar_url = updated
        .avatar
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("avatar missing after upload")))?;

    Ok(Json(AvatarResponse { avatar_url }))
}

pub async fn change_role(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(user_id): Path<i64>,
    ValidatedJson(body): ValidatedJson<ChangeRoleRequest>,
) -> Result<Json<UserResponse>, AppError> {
    state.auth.require_role(&user, Role::Admin)?;

    let updated = state.auth.change_role(user_id, &body.role).await?;
    Ok(Json(UserResponse::from(updated)))
}
