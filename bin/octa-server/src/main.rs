//! octa-server – entry point.
//!
//! Startup order:
//! 1. Parse configuration from environment variables and the command line.
//! 2. Initialise structured tracing (JSON in production, pretty in dev).
//! 3. Open the SQLite database and run pending migrations.
//! 4. Connect the task queue, cache and graph database.
//! 5. Start the worker pool.
//! 6. Build the Axum router and start the HTTP server with graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use octa_core::{MemoryQueue, TaskQueue, WorkerConfig, WorkerPool};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use octa_server::cache::{Cache, MemoryCache, RedisCache};
use octa_server::config::Config;
use octa_server::db::sqlite::SqliteStore;
use octa_server::graph::neo4j::Neo4jHttpClient;
use octa_server::queue::RedisQueue;
use octa_server::routes;
use octa_server::state::AppState;

#[derive(Debug, Parser)]
#[command(name = "octa-server", version, about = "Geospatial and network analysis backend")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the HTTP API (default). Runs a worker pool in-process unless
    /// `--no-workers` is given.
    Serve {
        #[arg(long)]
        no_workers: bool,
    },
    /// Run only the worker pool against the shared Redis queue.
    Worker,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let cli = Cli::parse();
    let cfg = Config::from_env();

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    let _log_guard = init_tracing(&cfg);
    info!(version = env!("CARGO_PKG_VERSION"), "octa-server starting");

    // ── 3. Database ────────────────────────────────────────────────────────────
    let store = SqliteStore::connect(&cfg.database_url, cfg.database_max_connections).await?;
    info!(database_url = %cfg.database_url, "database ready");

    // ── 4. Collaborators ───────────────────────────────────────────────────────
    let (queue, cache): (Arc<dyn TaskQueue>, Arc<dyn Cache>) = match &cfg.redis_url {
        Some(url) => {
            let queue = RedisQueue::connect(url, &cfg.queue_name, cfg.dequeue_timeout).await?;
            let cache = RedisCache::connect(url).await?;
            info!(queue = %cfg.queue_name, "redis queue and cache ready");
            let queue: Arc<dyn TaskQueue> = Arc::new(queue);
            let cache: Arc<dyn Cache> = Arc::new(cache);
            (queue, cache)
        }
        None => {
            if matches!(cli.command, Some(Command::Worker)) {
                anyhow::bail!("`worker` needs OCTA_REDIS_URL to share a queue with the API");
            }
            warn!("OCTA_REDIS_URL not set; using in-process queue and cache");
            let queue: Arc<dyn TaskQueue> =
                Arc::new(MemoryQueue::new(cfg.queue_capacity, cfg.dequeue_timeout));
            let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
            (queue, cache)
        }
    };
    let graph = Neo4jHttpClient::new(
        &cfg.neo4j_uri,
        &cfg.neo4j_database,
        &cfg.neo4j_user,
        &cfg.neo4j_password,
        cfg.neo4j_timeout,
    )?;
    info!(uri = %cfg.neo4j_uri, "graph client ready");

    let state = Arc::new(AppState::new(
        cfg.clone(),
        Arc::new(store),
        Arc::clone(&queue),
        cache,
        Arc::new(graph),
    ));

    // ── 5. Worker pool ─────────────────────────────────────────────────────────
    let run_workers = !matches!(cli.command, Some(Command::Serve { no_workers: true }));
    let pool = run_workers.then(|| {
        WorkerPool::start(
            &WorkerConfig {
                concurrency: cfg.worker_count,
                ..WorkerConfig::default()
            },
            Arc::clone(&state.store),
            Arc::clone(&queue),
            Arc::new(state.job_registry()),
        )
    });

    match cli.command {
        Some(Command::Worker) => shutdown_signal().await,
        _ => {
            // ── 6. HTTP server with graceful shutdown ──────────────────────────
            let app = routes::build(Arc::clone(&state));
            let addr: SocketAddr = cfg.bind_address.parse()?;
            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!(%addr, "HTTP server listening");

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
    }

    if let Some(pool) = pool {
        pool.shutdown().await;
    }
    info!("octa-server stopped");
    Ok(())
}

/// Console output plus, when `OCTA_LOG_DIR` is set, a daily rolling file.
///
/// The returned guard flushes the file writer and must live until exit.
fn init_tracing(cfg: &Config) -> Option<WorkerGuard> {
    // Build the log-level filter, warning loudly if the configured value is
    // not a valid tracing filter expression.
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: OCTA_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                EnvFilter::new("info")
            }
        },
    };

    let console = fmt::layer().with_target(true).with_thread_ids(true);
    let console = if cfg.log_json {
        console.json().boxed()
    } else {
        console.boxed()
    };

    let (file, guard) = match &cfg.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "octa-server.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file)
        .init();
    guard
}

/// Returns a future that resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}
