//! User entity and role model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Closed set of roles. Anything outside this set is rejected at the
/// boundary where it enters (role-change requests, cache decode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    /// Parse a role literal, returning `None` for anything outside the
    /// closed set.
    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "admin" => Some(Role::Admin),
            "user" => Some(Role::User),
            _ => None,
        }
    }
}

/// Persisted user record. The user directory is the system of record;
/// cached copies are advisory.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub hashed_password: String,
    pub created_at: DateTime<Utc>,
    pub avatar: Option<String>,
    pub confirmed: bool,
    pub role: Role,
}

impl User {
    /// Identity projection stored in the cache and handed to handlers.
    /// Deliberately excludes the credential.
    pub fn to_current(&self) -> CurrentUser {
        CurrentUser {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            confirmed: self.confirmed,
            avatar: self.avatar.clone(),
            role: self.role,
        }
    }
}

/// Data needed to insert a user row.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub hashed_password: String,
    pub avatar: Option<String>,
    pub confirmed: bool,
    pub role: Role,
}

/// Identity snapshot backing every authenticated request. Roundtrips
/// through the cache as JSON; an unrecognized role string fails the
/// decode rather than being silently accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub confirmed: bool,
    pub avatar: Option<String>,
    pub role: Role,
}
