//! Outbound email delivery.
//!
//! Tokens leave the process only through this seam. Delivery is detached
//! from request handling; callers spawn the send and log failures rather
//! than surfacing them to the client.

use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message,
    SmtpTransport, Transport,
};
use std::sync::Mutex;
use std::time::Duration;

use crate::errors::AppError;

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_confirmation_email(
        &self,
        to_email: &str,
        username: &str,
        token: &str,
        base_url: &str,
    ) -> Result<(), AppError>;

    async fn send_password_reset_email(
        &self,
        to_email: &str,
        username: &str,
        token: &str,
        base_url: &str,
    ) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct SmtpEmailService {
    mailer: SmtpTransport,
    from_email: String,
}

impl SmtpEmailService {
    pub fn new(config: &crate::config::MailConfig) -> Result<Self, AppError> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());

        let mailer = SmtpTransport::relay(&config.server)
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?
            .credentials(creds)
            .port(config.port)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        tracing::info!(server = %config.server, "Email service initialized");

        Ok(Self {
            mailer,
            from_email: config.from.clone(),
        })
    }

    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        plain_body: &str,
        html_body: &str,
    ) -> Result<(), AppError> {
        let email = Message::builder()
            .from(
                self.from_email
                    .parse()
                    .map_err(|e: lettre::address::AddressError| AppError::Internal(e.into()))?,
            )
            .to(to_email
                .parse()
                .map_err(|e: lettre::address::AddressError| AppError::Internal(e.into()))?)
            .subject(subject)
            .multipart(
                lettre::message::MultiPart::alternative()
                    .singlepart(
                        lettre::message::SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(plain_body.to_string()),
                    )
                    .singlepart(
                        lettre::message::SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )
            .map_err(|e| AppError::Internal(e.into()))?;

        // Send on the blocking pool; SmtpTransport is synchronous.
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::Internal(e.into()))?;

        match result {
            Ok(_) => {
                tracing::info!(to = %to_email, subject = %subject, "Email sent successfully");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e.to_string(), to = %to_email, "Failed to send email");
                Err(AppError::Email(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl EmailProvider for SmtpEmailService {
    async fn send_confirmation_email(
        &self,
        to_email: &str,
        username: &str,
        token: &str,
        base_url: &str,
    ) -> Result<(), AppError> {
        let confirmation_link = format!("{}/api/auth/confirm-email?token={}", base_url, token);

        let html_body = format!(
            r###"<html>
                <body style="font-family: Arial, sans-serif;">
                    <h2>Hi {username}, confirm your email</h2>
                    <p>Thank you for registering. Click the link below to activate your account:</p>
                    <p>
                        <a href="{link}" style="background-color: #4CAF50; color: white; padding: 14px 20px; text-decoration: none; border-radius: 4px;">
                            Confirm Email
                        </a>
                    </p>
                    <p style="color: #666; font-size: 12px;">
                        This link will expire in 7 days. If you didn't register, please ignore this email.
                    </p>
                </body>
            </html>"###,
            username = username,
            link = confirmation_link
        );

        let plain_body = format!(
            "Hi {}, confirm your email\n\nThank you for registering. Please visit the following link to activate your account:\n\n{}\n\nThis link will expire in 7 days. If you didn't register, please ignore this email.",
            username, confirmation_link
        );

        self.send_email(to_email, "Confirm Your Email Address", &plain_body, &html_body)
            .await
    }

    async fn send_password_reset_email(
        &self,
        to_email: &str,
        username: &str,
        token: &str,
        base_url: &str,
    ) -> Result<(), AppError> {
        let reset_link = format!("{}/api/auth/password-reset/confirm?token={}", base_url, token);

        let html_body = format!(
            r###"<html>
                <body style="font-family: Arial, sans-serif;">
                    <h2>Hi {username}, reset your password</h2>
                    <p>We received a request to reset your password. Click the link below to set a new password:</p>
                    <p>
                        <a href="{}" style="background-color: #2196F3; color: white; padding: 14px 20px; text-decoration: none; border-radius: 4px;">
                            Reset Password
                        </a>
                    </p>
                    <p style="color: #666; font-size: 12px;">
                        If you didn't request this, please ignore this email.
                    </p>
                </body>
            </html>"###,
            reset_link
        );

        let plain_body = format!(
            "Password Reset Request\n\nWe received a request to reset your password. Please visit the following link to set a new password:\n\n{}\n\nIf you didn't request this, please ignore this email.",
            reset_link
        );

        self.send_email(to_email, "Reset Your Password", &plain_body, &html_body)
            .await
    }
}

/// Message kinds a mock delivery records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailKind {
    Confirmation,
    PasswordReset,
}

#[derive(Debug, Clone)]
pub struct SentEmail {
    pub kind: EmailKind,
    pub to: String,
    pub token: String,
}

/// Recording double. Captures every message so tests can pull the token
/// that would have been delivered.
#[derive(Default)]
pub struct MockEmailService {
    sent: Mutex<Vec<SentEmail>>,
}

impl MockEmailService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Most recent token delivered to `to_email` of the given kind.
    pub fn last_token(&self, to_email: &str, kind: EmailKind) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|m| m.to == to_email && m.kind == kind)
            .map(|m| m.token)
    }

    fn record(&self, kind: EmailKind, to: &str, token: &str) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentEmail {
                kind,
                to: to.to_string(),
                token: token.to_string(),
            });
        }
    }
}

#[async_trait]
impl EmailProvider for MockEmailService {
    async fn send_confirmation_email(
        &self,
        to_email: &str,
        _username: &str,
        token: &str,
        _base_url: &str,
    ) -> Result<(), AppError> {
        self.record(EmailKind::Confirmation, to_email, token);
        Ok(())
    }

    async fn send_password_reset_email(
        &self,
        to_email: &str,
        _username: &str,
        token: &str,
        _base_url: &str,
    ) -> Result<(), AppError> {
        self.record(EmailKind::PasswordReset, to_email, token);
        Ok(())
    }
}
