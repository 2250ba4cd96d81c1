//! Server configuration, loaded from environment variables at startup.

use std::time::Duration;

/// Runtime configuration for octa-server.
///
/// Every field has a sensible default so the server works out-of-the-box
/// without any environment variables set.
#[derive(Debug, Clone)]
pub struct Config {
    /// Name reported by the meta endpoints (default: `"OCTA"`).
    pub app_name: String,

    /// TCP address to bind (default: `"0.0.0.0:8000"`).
    pub bind_address: String,

    /// sqlx SQLite URL (default: `"sqlite://octa.db"`).  The file is created
    /// when missing.
    pub database_url: String,

    /// Upper bound on pooled database connections.
    pub database_max_connections: u32,

    /// Redis URL.  When set, the task queue and the cache live in Redis so
    /// that `serve` and `worker` processes can share them; otherwise both are
    /// in-process.
    pub redis_url: Option<String>,

    /// Redis list key carrying queued jobs.
    pub queue_name: String,

    /// Maximum number of undelivered jobs held by the in-process queue.
    pub queue_capacity: usize,

    /// How long a worker blocks on an empty queue before re-checking its
    /// shutdown signal.
    pub dequeue_timeout: Duration,

    /// Number of concurrent workers in the pool.
    pub worker_count: usize,

    /// Simulated duration of each domain step.
    pub step_delay: Duration,

    /// Neo4j HTTP endpoint, e.g. `"http://localhost:7474"`.
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub neo4j_database: String,

    /// Maximum concurrently open graph sessions.
    pub neo4j_max_sessions: usize,

    /// Per-request timeout for graph queries.
    pub neo4j_timeout: Duration,

    /// TTL of `spatial_data:{id}` cache entries.
    pub spatial_cache_ttl: Duration,

    /// TTL of `analysis:{kind}:{hash}` cache entries.
    pub analysis_cache_ttl: Duration,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// When set, logs are also written to a daily rolling file here.
    pub log_dir: Option<String>,

    /// Comma-separated list of allowed CORS origins; `None` allows any.
    pub cors_allowed_origins: Option<String>,

    /// Serve the OpenAPI document at `/api-docs/openapi.json`.
    pub enable_openapi: bool,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build [`Config`] from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        Self {
            app_name: env.or("OCTA_APP_NAME", "OCTA"),
            bind_address: env.or("OCTA_BIND", "0.0.0.0:8000"),
            database_url: env.or("OCTA_DATABASE_URL", "sqlite://octa.db"),
            database_max_connections: env.parse("OCTA_DATABASE_MAX_CONNECTIONS", 5),
            redis_url: env.optional("OCTA_REDIS_URL"),
            queue_name: env.or("OCTA_QUEUE_NAME", "octa:jobs"),
            queue_capacity: env.parse("OCTA_QUEUE_CAPACITY", 1024),
            dequeue_timeout: Duration::from_millis(env.parse("OCTA_DEQUEUE_TIMEOUT_MS", 1000)),
            worker_count: env.parse("OCTA_WORKERS", 4),
            step_delay: Duration::from_millis(env.parse("OCTA_STEP_DELAY_MS", 500)),
            neo4j_uri: env.or("OCTA_NEO4J_URI", "http://localhost:7474"),
            neo4j_user: env.or("OCTA_NEO4J_USER", "neo4j"),
            neo4j_password: env.or("OCTA_NEO4J_PASSWORD", "networkpass"),
            neo4j_database: env.or("OCTA_NEO4J_DATABASE", "neo4j"),
            neo4j_max_sessions: env.parse("OCTA_NEO4J_MAX_SESSIONS", 8),
            neo4j_timeout: Duration::from_millis(env.parse("OCTA_NEO4J_TIMEOUT_MS", 10_000)),
            spatial_cache_ttl: Duration::from_secs(env.parse("OCTA_SPATIAL_CACHE_TTL_SECS", 1800)),
            analysis_cache_ttl: Duration::from_secs(env.parse("OCTA_ANALYSIS_CACHE_TTL_SECS", 7200)),
            log_level: env.or("OCTA_LOG", "info"),
            log_json: env.flag("OCTA_LOG_JSON", false),
            log_dir: env.optional("OCTA_LOG_DIR"),
            cors_allowed_origins: env.optional("OCTA_CORS_ORIGINS"),
            enable_openapi: env.flag("OCTA_ENABLE_OPENAPI", true),
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn or(&self, key: &str, default: &str) -> String {
        (self.0)(key).unwrap_or_else(|| default.to_owned())
    }

    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        (self.0)(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        (self.0)(key)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(default)
    }
}
