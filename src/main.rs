use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;

use contact_manager::{
    build_router,
    config::AppConfig,
    db,
    middleware::create_ip_rate_limiter,
    observability::init_tracing,
    services::{
        AuthService, CloudinaryStore, ContactService, JwtService, PgContactStore, PgUserDirectory,
        RedisCache, SmtpEmailService,
    },
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenvy::dotenv().ok();

    // Load configuration, fail fast if invalid.
    let config = AppConfig::from_env()?;

    init_tracing(&config.log_level);

    tracing::info!(
        service = %config.service_name,
        environment = ?config.environment,
        "Starting contact manager"
    );

    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;

    let users = Arc::new(PgUserDirectory::new(pool.clone()));
    let contacts_store = Arc::new(PgContactStore::new(pool));
    let cache = Arc::new(RedisCache::new(&config.redis).await?);
    let email = Arc::new(SmtpEmailService::new(&config.mail)?);
    let avatars = Arc::new(CloudinaryStore::new(&config.cloudinary));
    let jwt = Arc::new(JwtService::new(&config.jwt));

    let auth = AuthService::new(
        users.clone(),
        cache.clone(),
        email,
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

    let port = config.port;
    let state = AppState {
        config,
        users,
        cache,
        avatars,
        jwt,
        auth,
        contacts,
        me_rate_limiter,
        ip_rate_limiter,
    };

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
