use std::time::Duration;

use async_trait::async_trait;
use octa_core::{HandlerError, Job, JobHandler, JobKind, ProgressReporter};
use serde_json::{json, Value};

use super::pause;
use crate::cache::CacheService;
use crate::db::SpatialStore;
use crate::services::analysis::GeospatialAnalyzer;

const STEPS: &[&str] = &[
    "Loading data",
    "Analyzing patterns",
    "Calculating metrics",
    "Saving results",
];

/// `dataset-processing`: pattern report over the stored records.
pub struct DatasetProcessingHandler<S> {
    analyzer: GeospatialAnalyzer<S>,
    cache: CacheService,
    step_delay: Duration,
}

impl<S: SpatialStore> DatasetProcessingHandler<S> {
    pub fn new(analyzer: GeospatialAnalyzer<S>, cache: CacheService, step_delay: Duration) -> Self {
        Self {
            analyzer,
            cache,
            step_delay,
        }
    }
}

#[async_trait]
impl<S: SpatialStore> JobHandler for DatasetProcessingHandler<S> {
    fn kind(&self) -> JobKind {
        JobKind::DatasetProcessing
    }

    fn steps(&self) -> &'static [&'static str] {
        STEPS
    }

    async fn run(&self, job: &Job, progress: &mut ProgressReporter) -> Result<Value, HandlerError> {
        let dataset_id = job
            .payload
            .get("dataset_id")
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::Invalid("missing dataset_id".to_owned()))?;

        progress.advance(STEPS[0]).await;
        pause(self.step_delay).await;

        progress.advance(STEPS[1]).await;
        pause(self.step_delay).await;
        let report = self
            .analyzer
            .process_dataset(dataset_id)
            .await
            .map_err(|e| HandlerError::Upstream(format!("spatial store: {e}")))?;

        progress.advance(STEPS[2]).await;
        pause(self.step_delay).await;
        let stats = self
            .analyzer
            .spatial_statistics()
            .await
            .map_err(|e| HandlerError::Upstream(format!("spatial store: {e}")))?;

        progress.advance(STEPS[3]).await;
        pause(self.step_delay).await;
        let result = json!({
            "dataset_id": dataset_id,
            "status": "completed",
            "processed_points": report["point_count"],
            "analysis_type": report["analysis_type"],
            "bounding_box": report["bounding_box"],
            "density": report["density"],
            "unique_property_keys": stats.get("unique_property_keys").cloned().unwrap_or(json!(0)),
        });
        self.cache
            .cache_analysis(JobKind::DatasetProcessing.as_ref(), dataset_id, &result)
            .await;
        Ok(result)
    }
}
