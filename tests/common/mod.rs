//! Shared harness for the HTTP-level tests: the full router wired over
//! in-process doubles, driven with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use contact_manager::{
    build_router,
    config::{
        AppConfig, CloudinaryConfig, DatabaseConfig, Environment, JwtConfig, MailConfig,
        RateLimitConfig, RedisConfig,
    },
    middleware::create_ip_rate_limiter,
    services::{
        email::EmailKind, AuthService, ContactService, JwtService, MemoryCache,
        MemoryContactStore, MemoryDirectory, MockAvatarStore, MockEmailService,
    },
    AppState,
};

pub struct TestApp {
    pub router: Router,
    pub users: Arc<MemoryDirectory>,
    pub email: Arc<MockEmailService>,
    pub avatars: Arc<MockAvatarStore>,
}

pub fn test_config() -> AppConfig {
    AppConfig {
        environment: Environment::Dev,
        service_name: "contact-manager".to_string(),
        log_level: "warn".to_string(),
        port: 0,
        base_url: "http://localhost:8000".to_string(),
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        redis: RedisConfig {
            url: "redis://unused".to_string(),
        },
        jwt: JwtConfig {
            secret: "integration-test-secret".to_string(),
            access_expiration_seconds: 3600,
            purpose_token_ttl_days: 7,
        },
        mail: MailConfig {
            username: "mailer@example.com".to_string(),
            password: "unused".to_string(),
            from: "mailer@example.com".to_string(),
            server: "smtp.example.com".to_string(),
            port: 465,
        },
        cloudinary: CloudinaryConfig {
            cloud_name: "unused".to_string(),
            api_key: "unused".to_string(),
            api_secret: "unused".to_string(),
        },
        allowed_origins: vec!["http://localhost:3000".to_string()],
        rate_limit: RateLimitConfig {
            me_requests: 5,
            me_window_seconds: 60,
            global_ip_limit: 10_000,
            global_ip_window_seconds: 60,
        },
    }
}

impl TestApp {
    pub fn spawn() -> Self {
        Self::spawn_with_config(test_config())
    }

    pub fn spawn_with_config(config: AppConfig) -> Self {
        let users = Arc::new(MemoryDirectory::new());
        let contacts_store = Arc::new(MemoryContactStore::new());
        let cache = Arc::new(MemoryCache::new());
        let email = Arc::new(MockEmailService::new());
        let avatars = Arc::new(MockAvatarStore::new());
        let jwt = Arc::new(JwtService::new(&config.jwt));

        let auth = AuthService::new(
            users.clone(),
            cache.clone(),
            email.clone(),
            jwt.clone(),
            config.base_url.clone(),
        );
        let contacts = ContactService::new(contacts_store);

        let me_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.me_requests,
            config.rate_limit.me_window_seconds,
        );
        let ip_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.global_ip_limit,
            config.rate_limit.global_ip_window_seconds,
        );

        let state = AppState {
            config,
            users: users.clone(),
            cache,
            avatars: avatars.clone(),
            jwt,
            auth,
            contacts,
            me_rate_limiter,
            ip_rate_limiter,
        };

        TestApp {
            router: build_router(state),
            users,
            email,
            avatars,
        }
    }

    pub async fn request(&self, req: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(req)
            .await
            .expect("router never fails")
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> Response<Body> {
        self.request(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.request(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn get_with_token(&self, uri: &str, token: &str) -> Response<Body> {
        self.request(
            Request::builder()
                .uri(uri)
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn json_with_token(
        &self,
        method: &str,
        uri: &str,
        token: &str,
        body: Value,
    ) -> Response<Body> {
        self.request(
            Request::builder()
                .method(method)
                .uri(uri)
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// Wait for a spawned email delivery and return its token.
    pub async fn delivered_token(&self, to_email: &str, kind: EmailKind) -> String {
        for _ in 0..50 {
            if let Some(token) = self.email.last_token(to_email, kind) {
                return token;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no {:?} email delivered to {}", kind, to_email);
    }

    /// Register, confirm and log in; returns the access token.
    pub async fn signed_up_user(&self, username: &str, email: &str, password: &str) -> String {
        let res = self
            .post_json(
                "/api/auth/register",
                serde_json::json!({
                    "username": username,
                    "email": email,
                    "password": password,
                }),
            )
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);

        let token = self.delivered_token(email, EmailKind::Confirmation).await;
        let res = self
            .get(&format!("/api/auth/confirm-email?token={}", token))
            .await;
        assert_eq!(res.status(), StatusCode::OK);

        let res = self
            .post_json(
                "/api/auth/login",
                serde_json::json!({ "username": username, "password": password }),
            )
            .await;
        assert_eq!(res.status(), StatusCode::OK);

        let body = body_json(res).await;
        body["access_token"].as_str().unwrap().to_string()
    }
}

pub async fn body_json(res: Response<Body>) -> Value {
    let bytes = res
        .into_body()
        .collect()
        .await
        .expect("body read never fails")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body is JSON")
}
