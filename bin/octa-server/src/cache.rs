//! Key-value cache for spatial records and analysis results.
//!
//! [`Cache`] is the raw store (Redis or in-process).  [`CacheService`] adds
//! the key scheme and TTLs and treats every backend failure as a miss, so a
//! cache outage degrades latency but never fails a request.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cached value is not valid JSON: {0}")]
    Codec(#[from] serde_json::Error),
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        CacheError::Backend(e.to_string())
    }
}

#[async_trait]
pub trait Cache: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), CacheError>;

    /// Returns `true` when a key was removed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Remaining lifetime, `None` when the key is absent.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError>;
}

// ── key scheme ───────────────────────────────────────────────────────────────

pub fn spatial_key(spatial_id: i64) -> String {
    format!("spatial_data:{spatial_id}")
}

/// `analysis:{kind}:{sha256(params)}`.  Hashing keeps keys short and makes
/// them stable across processes.
pub fn analysis_key(kind: &str, params: &str) -> String {
    let digest = Sha256::digest(params.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("analysis:{kind}:{hex}")
}

// ── Redis ────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache").finish_non_exhaustive()
    }
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await?;
        Ok(raw.map(|s| serde_json::from_str(&s)).transpose()?)
    }

    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(key, value.to_string(), ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        Ok(conn.exists(key).await?)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let mut conn = self.conn.clone();
        // -2: no such key, -1: no expiry.
        let secs: i64 = conn.ttl(key).await?;
        Ok(match secs {
            -2 => None,
            s if s < 0 => Some(Duration::MAX),
            s => Some(Duration::from_secs(s.unsigned_abs())),
        })
    }
}

// ── in-process ───────────────────────────────────────────────────────────────

/// TTL-aware in-process cache.  Expired entries are dropped lazily on access.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (Value, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn live(&self, key: &str) -> Option<(Value, Instant)> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return None,
                Some((value, expires)) if *expires > now => return Some((value.clone(), *expires)),
                Some(_) => {}
            }
        }
        self.entries.write().await.remove(key);
        None
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        Ok(self.live(key).await.map(|(value, _)| value))
    }

    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), CacheError> {
        let expires = Instant::now() + ttl;
        self.entries
            .write()
            .await
            .insert(key.to_owned(), (value.clone(), expires));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let live = self.live(key).await.is_some();
        self.entries.write().await.remove(key);
        Ok(live)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.live(key).await.is_some())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        Ok(self
            .live(key)
            .await
            .map(|(_, expires)| expires.saturating_duration_since(Instant::now())))
    }
}

// ── service ──────────────────────────────────────────────────────────────────

/// Typed cache operations used by routes and job handlers.
#[derive(Clone)]
pub struct CacheService {
    cache: Arc<dyn Cache>,
    spatial_ttl: Duration,
    analysis_ttl: Duration,
}

impl std::fmt::Debug for CacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheService")
            .field("spatial_ttl", &self.spatial_ttl)
            .field("analysis_ttl", &self.analysis_ttl)
            .finish_non_exhaustive()
    }
}

impl CacheService {
    pub fn new(cache: Arc<dyn Cache>, spatial_ttl: Duration, analysis_ttl: Duration) -> Self {
        Self {
            cache,
            spatial_ttl,
            analysis_ttl,
        }
    }

    pub fn spatial_ttl(&self) -> Duration {
        self.spatial_ttl
    }

    pub async fn cache_spatial_data(&self, spatial_id: i64, data: &Value) -> bool {
        self.store(&spatial_key(spatial_id), data, self.spatial_ttl).await
    }

    pub async fn cached_spatial_data(&self, spatial_id: i64) -> Option<Value> {
        self.load(&spatial_key(spatial_id)).await
    }

    pub async fn clear_spatial_data(&self, spatial_id: i64) -> bool {
        let key = spatial_key(spatial_id);
        match self.cache.delete(&key).await {
            Ok(removed) => removed,
            Err(e) => {
                error!(%key, error = %e, "cache delete failed");
                false
            }
        }
    }

    pub async fn cache_analysis(&self, kind: &str, params: &str, result: &Value) -> bool {
        self.store(&analysis_key(kind, params), result, self.analysis_ttl)
            .await
    }

    pub async fn cached_analysis(&self, kind: &str, params: &str) -> Option<Value> {
        self.load(&analysis_key(kind, params)).await
    }

    async fn store(&self, key: &str, value: &Value, ttl: Duration) -> bool {
        match self.cache.set(key, value, ttl).await {
            Ok(()) => {
                debug!(%key, ttl_secs = ttl.as_secs(), "cached");
                true
            }
            Err(e) => {
                error!(%key, error = %e, "cache write failed");
                false
            }
        }
    }

    async fn load(&self, key: &str) -> Option<Value> {
        match self.cache.get(key).await {
            Ok(hit) => hit,
            Err(e) => {
                error!(%key, error = %e, "cache read failed; treating as miss");
                None
            }
        }
    }
}
