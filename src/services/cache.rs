//! Read-through identity cache.
//!
//! The cache is advisory: absence or expiry only ever causes a fallback
//! read from the user directory, never a more permissive decision than the
//! system of record would make. Mutations (avatar, role, password) are not
//! actively invalidated; entries go stale naturally within the TTL.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::models::CurrentUser;

/// Default lifetime of a cached identity snapshot.
pub const DEFAULT_IDENTITY_TTL_SECONDS: u64 = 900;

#[async_trait]
pub trait IdentityCache: Send + Sync {
    /// Fetch the cached snapshot for `username`, `None` on miss or expiry.
    async fn get(&self, username: &str) -> Result<Option<CurrentUser>, anyhow::Error>;

    /// Store a snapshot, overwriting unconditionally.
    async fn put(
        &self,
        username: &str,
        user: &CurrentUser,
        ttl_seconds: u64,
    ) -> Result<(), anyhow::Error>;

    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
}

impl RedisCache {
    pub async fn new(config: &crate::config::RedisConfig) -> Result<Self, anyhow::Error> {
        tracing::info!(url = %config.url, "Connecting to Redis");
        let client = Client::open(config.url.clone())?;

        // ConnectionManager reconnects automatically.
        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self { manager })
    }

    fn key(username: &str) -> String {
        format!("user:{}", username)
    }
}

#[async_trait]
impl IdentityCache for RedisCache {
    async fn get(&self, username: &str) -> Result<Option<CurrentUser>, anyhow::Error> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(Self::key(username))
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read identity cache: {}", e))?;

        match raw {
            // A snapshot that fails to decode (for example an unrecognized
            // role string) degrades to a miss; the directory is re-read
            // rather than trusting a corrupt entry.
            Some(json) => match serde_json::from_str(&json) {
                Ok(user) => Ok(Some(user)),
                Err(e) => {
                    tracing::error!(error = %e, "Corrupt identity cache entry, treating as miss");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        username: &str,
        user: &CurrentUser,
        ttl_seconds: u64,
    ) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        let json = serde_json::to_string(user)?;

        redis::cmd("SET")
            .arg(Self::key(username))
            .arg(json)
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to write identity cache: {}", e))
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Redis health check failed: {}", e))
    }
}

/// In-process cache with lazy per-key expiry, used by the test suite and
/// usable as a single-node fallback.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (CurrentUser, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityCache for MemoryCache {
    async fn get(&self, username: &str) -> Result<Option<CurrentUser>, anyhow::Error> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("Cache mutex poisoned: {}", e))?;

        match entries.get(username) {
            Some((_, expires_at)) if *expires_at <= Instant::now() => {
                entries.remove(username);
                Ok(None)
            }
            Some((user, _)) => Ok(Some(user.clone())),
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        username: &str,
        user: &CurrentUser,
        ttl_seconds: u64,
    ) -> Result<(), anyhow::Error> {
        let expires_at = Instant::now() + Duration::from_secs(ttl_seconds);
        self.entries
            .lock()
            .map_err(|e| anyhow::anyhow!("Cache mutex poisoned: {}", e))?
            .insert(username.to_string(), (user.clone(), expires_at));
        Ok(())
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}
