use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Opaque job identifier handed back to submitters.
pub type JobId = String;

/// Generate a fresh job identifier.  UUID v4, never reused.
pub fn new_job_id() -> JobId {
    Uuid::new_v4().to_string()
}

/// The kinds of asynchronous work the runtime knows how to route.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum JobKind {
    DatasetProcessing,
    NetworkMetrics,
    CacheWarm,
}

/// Lifecycle state of a job.
///
/// `Pending → Running → {Succeeded, Failed}`; the last two are terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    /// Returns `true` once no further transitions are permitted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

/// Progress sub-state annotated on a `Running` job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub current: u32,
    pub total: u32,
    /// Human-readable label of the step being executed.
    pub step: String,
}

impl Progress {
    /// Progress written at claim time, before any domain step ran.
    pub fn started(total: u32) -> Self {
        Self {
            current: 0,
            total,
            step: "Starting".to_owned(),
        }
    }
}

/// A single unit of asynchronous work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    /// Kind-specific request payload, e.g. `{"dataset_id": "ds-42"}`.
    pub payload: Value,
    pub state: JobState,
    pub progress: Option<Progress>,
    /// Present only when `state == Succeeded`.
    pub result: Option<Value>,
    /// Present only when `state == Failed`.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Build a freshly submitted job in the `Pending` state.
    pub fn pending(kind: JobKind, payload: Value) -> Self {
        let now = Utc::now();
        Self {
            id: new_job_id(),
            kind,
            payload,
            state: JobState::Pending,
            progress: None,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Project this job onto the externally visible status shape.
    pub fn status_view(&self) -> JobStatusView {
        let job_id = self.id.clone();
        match self.state {
            JobState::Pending => JobStatusView::Pending { job_id },
            JobState::Running => {
                let progress = self
                    .progress
                    .clone()
                    .unwrap_or_else(|| Progress::started(100));
                JobStatusView::Running {
                    job_id,
                    step: progress.step,
                    current: progress.current,
                    total: progress.total,
                }
            }
            JobState::Succeeded => JobStatusView::Succeeded {
                job_id,
                result: self.result.clone().unwrap_or(Value::Null),
            },
            JobState::Failed => JobStatusView::Failed {
                job_id,
                error: self
                    .error
                    .clone()
                    .unwrap_or_else(|| "job failed".to_owned()),
            },
        }
    }
}

/// What the status endpoint returns, keyed by `state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum JobStatusView {
    Pending {
        job_id: JobId,
    },
    Running {
        job_id: JobId,
        step: String,
        current: u32,
        total: u32,
    },
    Succeeded {
        job_id: JobId,
        result: Value,
    },
    Failed {
        job_id: JobId,
        error: String,
    },
}

impl JobStatusView {
    pub fn state(&self) -> JobState {
        match self {
            JobStatusView::Pending { .. } => JobState::Pending,
            JobStatusView::Running { .. } => JobState::Running,
            JobStatusView::Succeeded { .. } => JobState::Succeeded,
            JobStatusView::Failed { .. } => JobState::Failed,
        }
    }
}

/// Message carried by the task queue from submitter to worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub job_id: JobId,
    pub kind: JobKind,
    pub payload: Value,
}

impl From<&Job> for QueueMessage {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            kind: job.kind,
            payload: job.payload.clone(),
        }
    }
}
