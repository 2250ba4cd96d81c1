//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use octa_core::{HandlerRegistry, JobService, TaskQueue};

use crate::cache::{Cache, CacheService};
use crate::config::Config;
use crate::db::sqlite::SqliteStore;
use crate::graph::network::NetworkAnalysisService;
use crate::graph::{GraphClient, GraphPool};
use crate::jobs::{self, JobContext};
use crate::services::analysis::GeospatialAnalyzer;

/// State shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Job and spatial record store.
    pub store: Arc<SqliteStore>,
    /// Submission and status of asynchronous jobs.
    pub jobs: JobService<SqliteStore>,
    pub analyzer: GeospatialAnalyzer<SqliteStore>,
    pub network: NetworkAnalysisService,
    pub cache: CacheService,
}

impl AppState {
    /// Wire the services on top of already-connected collaborators.
    pub fn new(
        config: Config,
        store: Arc<SqliteStore>,
        queue: Arc<dyn TaskQueue>,
        cache: Arc<dyn Cache>,
        graph: Arc<dyn GraphClient>,
    ) -> Self {
        let cache = CacheService::new(cache, config.spatial_cache_ttl, config.analysis_cache_ttl);
        let network = NetworkAnalysisService::new(GraphPool::new(graph, config.neo4j_max_sessions))
            .with_cache(cache.clone());
        Self {
            jobs: JobService::new(Arc::clone(&store), queue),
            analyzer: GeospatialAnalyzer::new(Arc::clone(&store)),
            config: Arc::new(config),
            store,
            network,
            cache,
        }
    }

    /// Handlers for every job kind, sharing this state's collaborators.
    pub fn job_registry(&self) -> HandlerRegistry {
        jobs::registry(JobContext {
            spatial: Arc::clone(&self.store),
            network: self.network.clone(),
            cache: self.cache.clone(),
            step_delay: self.config.step_delay,
        })
    }
}
