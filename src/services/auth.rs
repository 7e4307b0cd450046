//! Account lifecycle and session identity.
//!
//! Registration state lives entirely inside the signed confirmation
//! token: no user row exists until the token is redeemed. The directory
//! row is created at confirmation time, which makes redeeming the same
//! token twice a benign no-op rather than an error.

use std::sync::Arc;

use crate::errors::AppError;
use crate::models::{CurrentUser, NewUser, Role};
use crate::services::cache::{IdentityCache, DEFAULT_IDENTITY_TTL_SECONDS};
use crate::services::database::UserDirectory;
use crate::services::email::EmailProvider;
use crate::services::jwt::JwtService;
use crate::utils::password::{hash_password, verify_password, Password};

/// Result of redeeming a confirmation token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Confirmed,
    AlreadyConfirmed,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserDirectory>,
    cache: Arc<dyn IdentityCache>,
    email: Arc<dyn EmailProvider>,
    jwt: Arc<JwtService>,
    base_url: String,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        cache: Arc<dyn IdentityCache>,
        email: Arc<dyn EmailProvider>,
        jwt: Arc<JwtService>,
        base_url: String,
    ) -> Self {
        Self {
            users,
            cache,
            email,
            jwt,
            base_url,
        }
    }

    /// Start a registration. Hashes the password, wraps the pending
    /// account in a confirmation token and mails it out. Nothing is
    /// written to the directory.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: Password,
    ) -> Result<(), AppError> {
        if self
            .users
            .find_by_email(email)
            .await
            .map_err(AppError::Database)?
            .is_some()
            || self
                .users
                .find_by_username(username)
                .await
                .map_err(AppError::Database)?
                .is_some()
        {
            return Err(AppError::Conflict("Account already exists".to_string()));
        }

        let hashed = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| AppError::Internal(e.into()))??;

        let token = self
            .jwt
            .issue_confirmation_token(email, username, hashed.as_str(), None)?;

        self.deliver_confirmation(email, username, token);

        tracing::info!(username = %username, "Registration started");
        Ok(())
    }

    /// Redeem a confirmation token. Creates the user row on first
    /// redemption; a second redemption finds the row and reports it.
    pub async fn confirm_registration(&self, token: &str) -> Result<ConfirmOutcome, AppError> {
        let claims = self.jwt.verify_confirmation_token(token)?;

        if self
            .users
            .find_by_email(&claims.email)
            .await
            .map_err(AppError::Database)?
            .is_some()
        {
            return Ok(ConfirmOutcome::AlreadyConfirmed);
        }

        // A second pending registration may have claimed the username
        // between token issuance and redemption.
        if self
            .users
            .find_by_username(&claims.username)
            .await
            .map_err(AppError::Database)?
            .is_some()
        {
            return Err(AppError::Conflict("Account already exists".to_string()));
        }

        self.users
            .insert_user(NewUser {
                username: claims.username.clone(),
                email: claims.email.clone(),
                hashed_password: claims.password,
                avatar: None,
                confirmed: true,
                role: Role::User,
            })
            .await
            .map_err(AppError::Database)?;

        tracing::info!(username = %claims.username, "Email confirmed, account created");
        Ok(ConfirmOutcome::Confirmed)
    }

    /// Authenticate by username and password and issue an access token.
    /// Unknown user and wrong password are indistinguishable to the
    /// caller; an unconfirmed account gets a distinct message.
    pub async fn login(&self, username: &str, password: Password) -> Result<String, AppError> {
        let user = self
            .users
            .find_by_username(username)
            .await
            .map_err(AppError::Database)?
            .ok_or_else(|| AppError::Unauthorized("Invalid username or password".to_string()))?;

        let hashed =
            crate::utils::password::PasswordHashString::new(user.hashed_password.clone());
        let valid = tokio::task::spawn_blocking(move || verify_password(&password, &hashed))
            .await
            .map_err(|e| AppError::Internal(e.into()))?;

        if !valid {
            return Err(AppError::Unauthorized(
                "Invalid username or password".to_string(),
            ));
        }

        if !user.confirmed {
            return Err(AppError::Unauthorized("Email not confirmed".to_string()));
        }

        self.jwt.issue_access_token(&user.username, None)
    }

    /// Start a password reset. Responds identically whether or not the
    /// email is known; the difference is only observable in the mailbox.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AppError> {
        match self
            .users
            .find_by_email(email)
            .await
            .map_err(AppError::Database)?
        {
            Some(user) => {
                let token = self.jwt.issue_reset_token(&user.email, None)?;
                self.deliver_reset(&user.email, &user.username, token);
            }
            None => {
                tracing::debug!("Password reset requested for unknown email");
            }
        }
        Ok(())
    }

    /// Redeem a reset token and set a new password.
    pub async fn reset_password(
        &self,
        token: &str,
        new_password: Password,
    ) -> Result<(), AppError> {
        let claims = self.jwt.verify_reset_token(token)?;

        let user = self
            .users
            .find_by_email(&claims.sub)
            .await
            .map_err(AppError::Database)?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let hashed = tokio::task::spawn_blocking(move || hash_password(&new_password))
            .await
            .map_err(|e| AppError::Internal(e.into()))??;

        self.users
            .update_password(user.id, hashed.as_str())
            .await
            .map_err(AppError::Database)?;

        tracing::info!(username = %user.username, "Password changed");
        Ok(())
    }

    /// Resolve a bearer token to the identity snapshot behind it,
    /// read-through against the cache.
    pub async fn resolve_current_user(&self, token: &str) -> Result<CurrentUser, AppError> {
        let claims = self.jwt.verify_access_token(token)?;

        if let Some(cached) = self
            .cache
            .get(&claims.sub)
            .await
            .map_err(AppError::Cache)?
        {
            return Ok(cached);
        }

        let user = self
            .users
            .find_by_username(&claims.sub)
            .await
            .map_err(AppError::Database)?
            .ok_or_else(|| {
                AppError::Unauthorized("Could not validate credentials".to_string())
            })?;

        let snapshot = user.to_current();
        self.cache
            .put(&snapshot.username, &snapshot, DEFAULT_IDENTITY_TTL_SECONDS)
            .await
            .map_err(AppError::Cache)?;

        Ok(snapshot)
    }

    /// Guard for operations restricted to a role.
    pub fn require_role(&self, user: &CurrentUser, role: Role) -> Result<(), AppError> {
        if user.role == role {
            Ok(())
        } else {
            Err(AppError::Forbidden("Not enough permissions".to_string()))
        }
    }

    /// Assign a role from its string literal. Looks the user up first,
    /// then validates the literal against the closed role set. Cached
    /// snapshots are not touched and age out within the TTL.
    pub async fn change_role(
        &self,
        user_id: i64,
        role_literal: &str,
    ) -> Result<CurrentUser, AppError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await
            .map_err(AppError::Database)?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let role = Role::parse(role_literal)
            .ok_or_else(|| AppError::BadRequest("Invalid role".to_string()))?;

        let updated = self
            .users
            .update_role(user.id, role)
            .await
            .map_err(AppError::Database)?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        tracing::info!(username = %updated.username, role = %role.as_str(), "Role changed");
        Ok(updated.to_current())
    }

    /// Store a new avatar image and record its URL on the user row.
    pub async fn update_avatar(
        &self,
        user: &CurrentUser,
        avatars: Arc<dyn crate::services::avatar::AvatarStore>,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<CurrentUser, AppError> {
        let public_id = format!("contact-manager/{}", user.username);
        let url = avatars
            .upload(&public_id, filename, bytes)
            .await
            .map_err(AppError::Internal)?;

        let updated = self
            .users
            .update_avatar(user.id, &url)
            .await
            .map_err(AppError::Database)?;

        Ok(updated.to_current())
    }

    fn deliver_confirmation(&self, email: &str, username: &str, token: String) {
        let provider = self.email.clone();
        let email = email.to_string();
        let username = username.to_string();
        let base_url = self.base_url.clone();
        // Fire and forget; a delivery failure must not fail the request.
        tokio::spawn(async move {
            if let Err(e) = provider
                .send_confirmation_email(&email, &username, &token, &base_url)
                .await
            {
                tracing::error!(error = %e, "Confirmation email delivery failed");
            }
        });
    }

    fn deliver_reset(&self, email: &str, username: &str, token: String) {
        let provider = self.email.clone();
        let email = email.to_string();
        let username = username.to_string();
        let base_url = self.base_url.clone();
        tokio::spawn(async move {
            if let Err(e) = provider
                .send_password_reset_email(&email, &username, &token, &base_url)
                .await
            {
                tracing::error!(error = %e, "Password reset email delivery failed");
            }
        });
    }
}
