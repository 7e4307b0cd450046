pub mod config;
pub mod db;
pub mod dtos;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod services;
pub mod utils;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, patch, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::middleware::{auth_middleware, ip_rate_limit_middleware, IpRateLimiter};
use crate::services::{
    AuthService, AvatarStore, ContactService, IdentityCache, JwtService, UserDirectory,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub users: Arc<dyn UserDirectory>,
    pub cache: Arc<dyn IdentityCache>,
    pub avatars: Arc<dyn AvatarStore>,
    pub jwt: Arc<JwtService>,
    pub auth: AuthService,
    pub contacts: ContactService,
    pub me_rate_limiter: IpRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
}

pub fn build_router(state: AppState) -> Router {
    // /users/me carries its own tighter per-IP budget on top of auth.
    let me_route = Router::new()
        .route("/api/users/me", get(handlers::users::me))
        .layer(from_fn_with_state(state.clone(), auth_middleware))
        .layer(from_fn_with_state(
            state.me_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let protected = Router::new()
        .route("/api/users/avatar", post(handlers::users::upload_avatar))
        .route(
            "/api/users/:user_id/role",
            patch(handlers::users::change_role),
        )
        .route(
            "/api/contacts",
            get(handlers::contacts::list).post(handlers::contacts::create),
        )
        .route("/api/contacts/search", get(handlers::contacts::search))
        .route(
            "/api/contacts/birthdays",
            get(handlers::contacts::upcoming_birthdays),
        )
        .route(
            "/api/contacts/:contact_id",
            get(handlers::contacts::get)
                .put(handlers::contacts::update)
                .delete(handlers::contacts::delete),
        )
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let public = Router::new()
        .route("/api/health", get(health_check))
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/confirm-email", get(handlers::auth::confirm_email))
        .route("/api/auth/login", post(handlers::auth::login))
        .route(
            "/api/auth/password-reset/request",
            post(handlers::auth::request_password_reset),
        )
        .route(
            "/api/auth/password-reset/confirm",
            post(handlers::auth::confirm_password_reset),
        );

    let cors = CorsLayer::new()
        .allow_origin(
            state
                .config
                .allowed_origins
                .iter()
                .filter_map(|origin| match origin.parse::<HeaderValue>() {
                    Ok(value) => Some(value),
                    Err(e) => {
                        tracing::error!("Invalid CORS origin '{}': {}", origin, e);
                        None
                    }
                })
                .collect::<Vec<HeaderValue>>(),
        )
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    Router::new()
        .merge(public)
        .merge(me_route)
        .merge(protected)
        .layer(from_fn_with_state(
            state.ip_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<axum::body::Body>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(cors)
        .with_state(state)
}

/// Service health check.
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.users.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "PostgreSQL health check failed");
        AppError::Database(e)
    })?;

    state.cache.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Redis health check failed");
        AppError::Cache(e)
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "postgres": "up",
            "redis": "up"
        }
    })))
}
