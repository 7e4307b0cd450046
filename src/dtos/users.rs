//! Request and response bodies for the user endpoints.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::CurrentUser;

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub confirmed: bool,
    pub avatar: Option<String>,
    pub role: String,
}

impl From<CurrentUser> for UserResponse {
    fn from(user: CurrentUser) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            confirmed: user.confirmed,
            avatar: user.avatar,
            role: user.role.as_str().to_string(),
        }
    }
}

/// Role literal arrives as a raw string and is validated against the
/// closed role set in the service.
#[derive(Debug, Deserialize, Validate)]
pub struct ChangeRoleRequest {
    #[validate(length(min = 1, message = "Role is required"))]
    pub role: String,
}
