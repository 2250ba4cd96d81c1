use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use octa_core::{HandlerError, Job, JobHandler, JobKind, ProgressReporter};
use serde_json::{json, Value};
use tracing::info;

use super::pause;
use crate::cache::{spatial_key, CacheService};
use crate::db::SpatialStore;
use crate::schemas::v1::spatial::SpatialDataResponse;

const STEPS: &[&str] = &["Loading record", "Caching record"];

/// `cache-warm`: copy one spatial record into the cache.
pub struct CacheWarmHandler<S> {
    spatial: Arc<S>,
    cache: CacheService,
    step_delay: Duration,
}

impl<S: SpatialStore> CacheWarmHandler<S> {
    pub fn new(spatial: Arc<S>, cache: CacheService, step_delay: Duration) -> Self {
        Self {
            spatial,
            cache,
            step_delay,
        }
    }
}

#[async_trait]
impl<S: SpatialStore> JobHandler for CacheWarmHandler<S> {
    fn kind(&self) -> JobKind {
        JobKind::CacheWarm
    }

    fn steps(&self) -> &'static [&'static str] {
        STEPS
    }

    async fn run(&self, job: &Job, progress: &mut ProgressReporter) -> Result<Value, HandlerError> {
        let spatial_id = job
            .payload
            .get("spatial_id")
            .and_then(Value::as_i64)
            .ok_or_else(|| HandlerError::Invalid("missing spatial_id".to_owned()))?;

        progress.advance(STEPS[0]).await;
        let record = self
            .spatial
            .get_spatial(spatial_id)
            .await
            .map_err(|e| HandlerError::Upstream(format!("spatial store: {e}")))?
            .ok_or_else(|| HandlerError::NotFound(format!("spatial record {spatial_id}")))?;
        pause(self.step_delay).await;

        progress.advance(STEPS[1]).await;
        let data = serde_json::to_value(SpatialDataResponse::from(record))
            .map_err(|e| HandlerError::Invalid(format!("spatial record {spatial_id}: {e}")))?;
        if !self.cache.cache_spatial_data(spatial_id, &data).await {
            return Err(HandlerError::Upstream(format!(
                "cache write failed for {}",
                spatial_key(spatial_id)
            )));
        }
        info!(spatial_id, "spatial record cached");
        pause(self.step_delay).await;

        Ok(json!({
            "status": "cached",
            "key": spatial_key(spatial_id),
            "ttl_secs": self.cache.spatial_ttl().as_secs(),
            "data": data,
        }))
    }
}
