//! Job submission and status services.
//!
//! Neither operation ever waits on a worker: `submit` returns as soon as the
//! job is persisted and queued, `status` is a single store read.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::JobError;
use crate::job::{Job, JobId, JobKind, JobState, JobStatusView, QueueMessage};
use crate::queue::TaskQueue;
use crate::store::JobStore;

/// A kind-specific submission request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SubmitRequest {
    #[serde(rename = "dataset-processing")]
    Dataset { dataset_id: String },
    #[serde(rename = "network-metrics")]
    Network { network_id: String },
    #[serde(rename = "cache-warm")]
    CacheWarm { spatial_id: i64 },
}

impl SubmitRequest {
    pub fn kind(&self) -> JobKind {
        match self {
            SubmitRequest::Dataset { .. } => JobKind::DatasetProcessing,
            SubmitRequest::Network { .. } => JobKind::NetworkMetrics,
            SubmitRequest::CacheWarm { .. } => JobKind::CacheWarm,
        }
    }

    /// Reject missing identifiers before anything is persisted.
    pub fn validate(&self) -> Result<(), JobError> {
        match self {
            SubmitRequest::Dataset { dataset_id } if dataset_id.trim().is_empty() => Err(
                JobError::Validation("dataset_id must not be empty".to_owned()),
            ),
            SubmitRequest::Network { network_id } if network_id.trim().is_empty() => Err(
                JobError::Validation("network_id must not be empty".to_owned()),
            ),
            SubmitRequest::CacheWarm { spatial_id } if *spatial_id <= 0 => Err(
                JobError::Validation("spatial_id must be a positive integer".to_owned()),
            ),
            _ => Ok(()),
        }
    }

    /// The payload stored on the job and carried by the queue message.
    pub fn payload(&self) -> Value {
        match self {
            SubmitRequest::Dataset { dataset_id } => json!({ "dataset_id": dataset_id.trim() }),
            SubmitRequest::Network { network_id } => json!({ "network_id": network_id.trim() }),
            SubmitRequest::CacheWarm { spatial_id } => json!({ "spatial_id": spatial_id }),
        }
    }
}

/// Returned to the submitter immediately: `{job_id, state: "pending"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub job_id: JobId,
    pub state: JobState,
}

/// Entry point for the submission and status APIs.
pub struct JobService<S: JobStore> {
    store: Arc<S>,
    queue: Arc<dyn TaskQueue>,
}

impl<S: JobStore> Clone for JobService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<S: JobStore> std::fmt::Debug for JobService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobService").finish_non_exhaustive()
    }
}

impl<S: JobStore> JobService<S> {
    pub fn new(store: Arc<S>, queue: Arc<dyn TaskQueue>) -> Self {
        Self { store, queue }
    }

    /// Validate, persist as `pending`, enqueue, return the receipt.
    ///
    /// If the queue rejects the message the pending record is removed again
    /// so no job exists without queued work behind it.
    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitReceipt, JobError> {
        request.validate()?;

        let job = Job::pending(request.kind(), request.payload());
        let job_id = job.id.clone();
        let kind = job.kind;
        let message = QueueMessage::from(&job);

        self.store.insert(job).await?;

        match self.queue.enqueue(message).await {
            Ok(token) => {
                info!(%job_id, %kind, token = %token.0, "job submitted");
                Ok(SubmitReceipt {
                    job_id,
                    state: JobState::Pending,
                })
            }
            Err(e) => {
                warn!(%job_id, %kind, error = %e, "enqueue failed; rolling back job record");
                if let Err(rollback) = self.store.remove(&job_id).await {
                    warn!(%job_id, error = %rollback, "failed to roll back pending job");
                }
                Err(JobError::Enqueue(e))
            }
        }
    }

    /// Current lifecycle snapshot of a job.
    pub async fn status(&self, job_id: &str) -> Result<JobStatusView, JobError> {
        self.store
            .get(job_id)
            .await?
            .map(|job| job.status_view())
            .ok_or_else(|| JobError::NotFound(format!("job {job_id} not found")))
    }

    /// All jobs, newest first, optionally filtered by kind.
    pub async fn list(&self, kind: Option<JobKind>) -> Result<Vec<Job>, JobError> {
        Ok(self.store.list(kind).await?)
    }
}
