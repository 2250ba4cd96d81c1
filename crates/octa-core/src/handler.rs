//! Domain job handlers and the progress reporter they drive.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::HandlerError;
use crate::job::{Job, JobKind, Progress};
use crate::store::JobStore;

/// Scale used for `Progress::total`; `current` is a percentage of it.
pub const PROGRESS_TOTAL: u32 = 100;

/// Executes the domain logic of one job kind.
///
/// Implementations call [`ProgressReporter::advance`] once per entry of
/// [`JobHandler::steps`] and return the opaque result payload.  Any error is
/// recorded on the job as `failed`; it never escapes the worker.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    fn kind(&self) -> JobKind;

    /// Ordered labels of the steps this handler reports.
    fn steps(&self) -> &'static [&'static str];

    async fn run(&self, job: &Job, progress: &mut ProgressReporter) -> Result<Value, HandlerError>;
}

/// Kind → handler lookup shared by all workers.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<JobKind, Arc<dyn JobHandler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for its kind.
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) -> &mut Self {
        self.handlers.insert(handler.kind(), handler);
        self
    }

    pub fn with(mut self, handler: Arc<dyn JobHandler>) -> Self {
        self.register(handler);
        self
    }

    pub fn get(&self, kind: JobKind) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&kind).cloned()
    }
}

/// Destination of progress snapshots.
#[async_trait]
pub trait ProgressSink: Send + Sync + 'static {
    async fn publish(&self, progress: Progress);
}

/// Writes progress snapshots straight to the job store.
///
/// Writes are advisory: a failure (including a rejected stale write) is
/// logged and swallowed so domain execution continues.
pub struct StoreProgressSink<S> {
    store: Arc<S>,
    job_id: String,
}

impl<S: JobStore> StoreProgressSink<S> {
    pub fn new(store: Arc<S>, job_id: impl Into<String>) -> Self {
        Self {
            store,
            job_id: job_id.into(),
        }
    }
}

#[async_trait]
impl<S: JobStore> ProgressSink for StoreProgressSink<S> {
    async fn publish(&self, progress: Progress) {
        if let Err(e) = self.store.record_progress(&self.job_id, progress).await {
            warn!(job_id = %self.job_id, error = %e, "progress update rejected");
        }
    }
}

/// Tracks which step of a job is executing and publishes a snapshot each
/// time the handler advances.
pub struct ProgressReporter {
    sink: Arc<dyn ProgressSink>,
    step_count: u32,
    completed: u32,
    total: u32,
    last: Option<Progress>,
}

impl ProgressReporter {
    pub fn new(sink: Arc<dyn ProgressSink>, step_count: usize) -> Self {
        Self {
            sink,
            step_count: u32::try_from(step_count.max(1)).unwrap_or(u32::MAX),
            completed: 0,
            total: PROGRESS_TOTAL,
            last: None,
        }
    }

    /// Enter the next step: `current = (index + 1) * total / step_count`.
    ///
    /// Calling it more often than there are steps saturates at `total`.
    pub async fn advance(&mut self, label: &str) {
        self.completed = (self.completed + 1).min(self.step_count);
        let current = (u64::from(self.completed) * u64::from(self.total)
            / u64::from(self.step_count)) as u32;
        let progress = Progress {
            current,
            total: self.total,
            step: label.to_owned(),
        };
        debug!(step = %label, current, total = self.total, "job progress");
        self.last = Some(progress.clone());
        self.sink.publish(progress).await;
    }

    /// The most recently published snapshot.
    pub fn last(&self) -> Option<&Progress> {
        self.last.as_ref()
    }
}
