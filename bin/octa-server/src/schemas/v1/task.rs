use octa_core::{Job, SubmitReceipt};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, ToSchema, IntoParams)]
pub struct DatasetQuery {
    /// Identifier of the dataset to process.
    pub dataset_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema, IntoParams)]
pub struct NetworkQuery {
    /// Identifier of the network to analyse.
    pub network_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema, IntoParams)]
pub struct JobKindQuery {
    /// `dataset-processing`, `network-metrics` or `cache-warm`.
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema, IntoParams)]
pub struct HotspotQuery {
    /// Hotspot radius in kilometres (default 1.0).
    pub radius_km: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitResponse {
    pub job_id: String,
    /// Always `"pending"` at submission time.
    pub state: String,
}

impl From<SubmitReceipt> for SubmitResponse {
    fn from(receipt: SubmitReceipt) -> Self {
        Self {
            job_id: receipt.job_id,
            state: receipt.state.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobSummary {
    pub job_id: String,
    pub kind: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Job> for JobSummary {
    fn from(job: Job) -> Self {
        let (step, current, total) = match job.progress {
            Some(p) if !job.state.is_terminal() => (Some(p.step), Some(p.current), Some(p.total)),
            _ => (None, None, None),
        };
        Self {
            job_id: job.id,
            kind: job.kind.to_string(),
            state: job.state.to_string(),
            step,
            current,
            total,
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
        }
    }
}
