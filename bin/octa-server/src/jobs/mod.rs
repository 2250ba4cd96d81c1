//! Domain job handlers registered with the worker pool.

mod cache_warm;
mod dataset;
mod network;

use std::sync::Arc;
use std::time::Duration;

use octa_core::HandlerRegistry;

use crate::cache::CacheService;
use crate::db::SpatialStore;
use crate::graph::network::NetworkAnalysisService;
use crate::services::analysis::GeospatialAnalyzer;

pub use cache_warm::CacheWarmHandler;
pub use dataset::DatasetProcessingHandler;
pub use network::NetworkMetricsHandler;

/// Collaborators shared by all handlers.
pub struct JobContext<S> {
    pub spatial: Arc<S>,
    pub network: NetworkAnalysisService,
    pub cache: CacheService,
    /// Simulated duration of each domain step.
    pub step_delay: Duration,
}

/// One handler per job kind.
pub fn registry<S: SpatialStore>(ctx: JobContext<S>) -> HandlerRegistry {
    HandlerRegistry::new()
        .with(Arc::new(DatasetProcessingHandler::new(
            GeospatialAnalyzer::new(Arc::clone(&ctx.spatial)),
            ctx.cache.clone(),
            ctx.step_delay,
        )))
        .with(Arc::new(NetworkMetricsHandler::new(
            ctx.network.clone(),
            ctx.cache.clone(),
            ctx.step_delay,
        )))
        .with(Arc::new(CacheWarmHandler::new(
            ctx.spatial,
            ctx.cache,
            ctx.step_delay,
        )))
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
