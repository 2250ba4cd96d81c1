use std::time::Duration;

use async_trait::async_trait;
use octa_core::{HandlerError, Job, JobHandler, JobKind, ProgressReporter};
use serde_json::{json, Value};
use tracing::debug;

use super::pause;
use crate::cache::CacheService;
use crate::graph::network::NetworkAnalysisService;
use crate::graph::GraphError;

const STEPS: &[&str] = &[
    "Loading network",
    "Calculating centrality",
    "Finding communities",
    "Generating report",
];

/// `network-metrics`: size, centrality and communities of a stored network.
pub struct NetworkMetricsHandler {
    network: NetworkAnalysisService,
    cache: CacheService,
    step_delay: Duration,
}

impl NetworkMetricsHandler {
    pub fn new(network: NetworkAnalysisService, cache: CacheService, step_delay: Duration) -> Self {
        Self {
            network,
            cache,
            step_delay,
        }
    }
}

fn upstream(e: GraphError) -> HandlerError {
    HandlerError::Upstream(e.to_string())
}

#[async_trait]
impl JobHandler for NetworkMetricsHandler {
    fn kind(&self) -> JobKind {
        JobKind::NetworkMetrics
    }

    fn steps(&self) -> &'static [&'static str] {
        STEPS
    }

    async fn run(&self, job: &Job, progress: &mut ProgressReporter) -> Result<Value, HandlerError> {
        let network_id = job
            .payload
            .get("network_id")
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::Invalid("missing network_id".to_owned()))?;
        let kind = JobKind::NetworkMetrics.as_ref();

        progress.advance(STEPS[0]).await;
        if let Some(hit) = self.cache.cached_analysis(kind, network_id).await {
            debug!(%network_id, "network metrics served from cache");
            for step in &STEPS[1..] {
                progress.advance(step).await;
            }
            return Ok(hit);
        }
        let (nodes, edges) = self.network.network_size().await.map_err(upstream)?;
        pause(self.step_delay).await;

        progress.advance(STEPS[1]).await;
        let centrality = self.network.centrality_rows().await.map_err(upstream)?;
        pause(self.step_delay).await;

        progress.advance(STEPS[2]).await;
        let communities = self.network.communities().await.map_err(upstream)?;
        pause(self.step_delay).await;

        progress.advance(STEPS[3]).await;
        let density = if nodes > 1 {
            (2 * edges) as f64 / (nodes * (nodes - 1)) as f64
        } else {
            0.0
        };
        let result = json!({
            "network_id": network_id,
            "centrality_scores": centrality,
            "communities": communities,
            "metrics": { "nodes": nodes, "edges": edges, "density": density },
        });
        self.cache.cache_analysis(kind, network_id, &result).await;
        pause(self.step_delay).await;
        Ok(result)
    }
}
