//! Environment-driven configuration, loaded once at startup.
//!
//! In dev, most settings fall back to defaults; in prod every setting is
//! required and validation is stricter.

use crate::errors::AppError;
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub port: u16,
    /// Base URL embedded in confirmation/reset links.
    pub base_url: String,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub mail: MailConfig,
    pub cloudinary: CloudinaryConfig,
    pub allowed_origins: Vec<String>,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// HS256 signing secret shared by access and purpose tokens.
    pub secret: String,
    pub access_expiration_seconds: i64,
    pub purpose_token_ttl_days: i64,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub username: String,
    pub password: String,
    pub from: String,
    pub server: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub me_requests: u32,
    pub me_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::Internal(anyhow::anyhow!(e)))?;
        let is_prod = environment == Environment::Prod;

        let port: u16 = get_env("PORT", Some("8000"), is_prod)?
            .parse()
            .map_err(|e: std::num::ParseIntError| AppError::Internal(anyhow::anyhow!(e)))?;

        let config = AppConfig {
            environment,
            service_name: get_env("SERVICE_NAME", Some("contact-manager"), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            port,
            base_url: get_env(
                "BASE_URL",
                Some(&format!("http://localhost:{}", port)),
                is_prod,
            )?,
            database: DatabaseConfig {
                url: get_env("DB_URL", None, is_prod)?,
                max_connections: parse_env("DB_MAX_CONNECTIONS", "10", is_prod)?,
                min_connections: parse_env("DB_MIN_CONNECTIONS", "1", is_prod)?,
            },
            redis: RedisConfig {
                url: get_env("REDIS_URL", Some("redis://localhost:6379"), is_prod)?,
            },
            jwt: JwtConfig {
                secret: get_env("JWT_SECRET", None, is_prod)?,
                access_expiration_seconds: parse_env("JWT_EXPIRATION_SECONDS", "3600", is_prod)?,
                purpose_token_ttl_days: parse_env("JWT_PURPOSE_TOKEN_TTL_DAYS", "7", is_prod)?,
            },
            mail: MailConfig {
                username: get_env("MAIL_USERNAME", None, is_prod)?,
                password: get_env("MAIL_PASSWORD", None, is_prod)?,
                from: get_env("MAIL_FROM", None, is_prod)?,
                server: get_env("MAIL_SERVER", None, is_prod)?,
                port: parse_env("MAIL_PORT", "465", is_prod)?,
            },
            cloudinary: CloudinaryConfig {
                cloud_name: get_env("CLOUDINARY_NAME", None, is_prod)?,
                api_key: get_env("CLOUDINARY_API_KEY", None, is_prod)?,
                api_secret: get_env("CLOUDINARY_API_SECRET", None, is_prod)?,
            },
            allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:3000"), is_prod)?
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            rate_limit: RateLimitConfig {
                me_requests: parse_env("RATE_LIMIT_ME_REQUESTS", "5", is_prod)?,
                me_window_seconds: parse_env("RATE_LIMIT_ME_WINDOW_SECONDS", "60", is_prod)?,
                global_ip_limit: parse_env("RATE_LIMIT_GLOBAL_IP_LIMIT", "100", is_prod)?,
                global_ip_window_seconds: parse_env(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    "60",
                    is_prod,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.port == 0 {
            return Err(AppError::Internal(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.jwt.access_expiration_seconds <= 0 {
            return Err(AppError::Internal(anyhow::anyhow!(
                "JWT_EXPIRATION_SECONDS must be positive"
            )));
        }

        if self.jwt.purpose_token_ttl_days <= 0 {
            return Err(AppError::Internal(anyhow::anyhow!(
                "JWT_PURPOSE_TOKEN_TTL_DAYS must be positive"
            )));
        }

        if self.environment == Environment::Prod
            && self.allowed_origins.iter().any(|o| o == "*")
        {
            return Err(AppError::Internal(anyhow::anyhow!(
                "Wildcard CORS origin not allowed in production"
            )));
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::Internal(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::Internal(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| AppError::Internal(anyhow::anyhow!("{}: {}", key, e)))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
