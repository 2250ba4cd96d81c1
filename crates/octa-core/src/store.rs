//! Durable mapping from job identifier to current state.
//!
//! [`JobStore`] is written by workers and read by the status service.  Every
//! mutating method is a *conditional* write that enforces the lifecycle
//! rules in a single step:
//!
//! | method            | required prior state | effect                         |
//! |-------------------|----------------------|--------------------------------|
//! | `claim`           | `pending`            | → `running`, progress 0        |
//! | `record_progress` | `running`, current ≥ stored | progress replaced       |
//! | `complete`        | `running`            | → `succeeded` + result         |
//! | `fail`            | `running`            | → `failed` + error             |
//! | `remove`          | `pending`            | row deleted (submit rollback)  |
//!
//! A rejected write returns [`StoreError::Conflict`]; an unknown id returns
//! [`StoreError::NotFound`].
//!
//! All trait methods use `impl Future` in their signatures so no extra
//! `async-trait` boxing is paid on the hot polling path.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::job::{Job, JobKind, JobState, Progress};

pub trait JobStore: Send + Sync + 'static {
    /// Persist a newly submitted job.
    fn insert(&self, job: Job) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Fetch the current snapshot of a job.
    fn get(&self, id: &str) -> impl Future<Output = Result<Option<Job>, StoreError>> + Send;

    /// List jobs, newest first, optionally filtered by kind.
    fn list(
        &self,
        kind: Option<JobKind>,
    ) -> impl Future<Output = Result<Vec<Job>, StoreError>> + Send;

    /// Delete a job that is still `pending`.  Only used to roll back a
    /// submission whose enqueue failed.
    fn remove(&self, id: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Atomically move `pending → running`.  First claim wins.
    fn claim(
        &self,
        id: &str,
        total_steps: u32,
    ) -> impl Future<Output = Result<Job, StoreError>> + Send;

    /// Replace the progress sub-state of a `running` job.
    fn record_progress(
        &self,
        id: &str,
        progress: Progress,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Move `running → succeeded` with the result payload.
    fn complete(
        &self,
        id: &str,
        result: Value,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Move `running → failed` with an error message.
    fn fail(&self, id: &str, error: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// In-process job store.
///
/// Uses a `tokio::sync::RwLock<HashMap>` so many status readers can observe
/// jobs concurrently while workers serialize their writes per call.
#[derive(Debug, Clone, Default)]
pub struct MemoryJobStore {
    inner: Arc<RwLock<HashMap<String, Job>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `f` to the job if it is in `required` state, else reject.
    async fn transition<F>(&self, id: &str, required: JobState, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Job) -> Result<(), StoreError>,
    {
        let mut guard = self.inner.write().await;
        let job = guard
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;
        if job.state != required {
            return Err(StoreError::Conflict {
                id: id.to_owned(),
                state: job.state,
            });
        }
        f(job)?;
        job.updated_at = Utc::now();
        Ok(())
    }
}

impl JobStore for MemoryJobStore {
    async fn insert(&self, job: Job) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if let Some(existing) = guard.get(&job.id) {
            return Err(StoreError::Conflict {
                id: job.id.clone(),
                state: existing.state,
            });
        }
        guard.insert(job.id.clone(), job);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Job>, StoreError> {
        Ok(self.inner.read().await.get(id).cloned())
    }

    async fn list(&self, kind: Option<JobKind>) -> Result<Vec<Job>, StoreError> {
        let guard = self.inner.read().await;
        let mut jobs: Vec<Job> = guard
            .values()
            .filter(|j| kind.is_none_or(|k| j.kind == k))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        match guard.get(id) {
            None => Err(StoreError::NotFound(id.to_owned())),
            Some(job) if job.state != JobState::Pending => Err(StoreError::Conflict {
                id: id.to_owned(),
                state: job.state,
            }),
            Some(_) => {
                guard.remove(id);
                Ok(())
            }
        }
    }

    async fn claim(&self, id: &str, total_steps: u32) -> Result<Job, StoreError> {
        let mut guard = self.inner.write().await;
        let job = guard
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;
        if job.state != JobState::Pending {
            return Err(StoreError::Conflict {
                id: id.to_owned(),
                state: job.state,
            });
        }
        job.state = JobState::Running;
        job.progress = Some(Progress::started(total_steps));
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    async fn record_progress(&self, id: &str, progress: Progress) -> Result<(), StoreError> {
        self.transition(id, JobState::Running, |job| {
            let stored = job.progress.as_ref().map(|p| p.current).unwrap_or(0);
            if progress.current < stored {
                return Err(StoreError::Conflict {
                    id: job.id.clone(),
                    state: job.state,
                });
            }
            job.progress = Some(progress);
            Ok(())
        })
        .await
    }

    async fn complete(&self, id: &str, result: Value) -> Result<(), StoreError> {
        self.transition(id, JobState::Running, |job| {
            job.state = JobState::Succeeded;
            job.result = Some(result);
            job.error = None;
            Ok(())
        })
        .await
    }

    async fn fail(&self, id: &str, error: &str) -> Result<(), StoreError> {
        self.transition(id, JobState::Running, |job| {
            job.state = JobState::Failed;
            job.error = Some(error.to_owned());
            job.result = None;
            Ok(())
        })
        .await
    }
}
