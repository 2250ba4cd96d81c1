use thiserror::Error;

use crate::job::{JobId, JobState};

/// Errors raised by a [`JobStore`](crate::store::JobStore) implementation.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// No job with this identifier was ever created.
    #[error("job not found: {0}")]
    NotFound(JobId),

    /// The write was rejected because the job is not in the state the
    /// transition requires (already claimed, already terminal, stale progress).
    #[error("job {id} rejected transition (current state: {state})")]
    Conflict { id: JobId, state: JobState },

    /// The underlying storage failed.
    #[error("job store backend error: {0}")]
    Backend(String),
}

/// Errors raised by a [`TaskQueue`](crate::queue::TaskQueue) implementation.
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    /// The queue is at capacity.
    #[error("task queue full (capacity {capacity})")]
    Full { capacity: usize },

    /// The queue has been closed; no more messages are accepted.
    #[error("task queue closed")]
    Closed,

    /// The broker could not be reached or returned an error.
    #[error("task queue unreachable: {0}")]
    Unreachable(String),

    /// A message on the wire could not be decoded.
    #[error("malformed queue message: {0}")]
    Malformed(String),
}

/// Errors returned by domain job handlers.  Caught at the worker boundary
/// and recorded on the job as its `failed` message.
#[derive(Debug, Clone, Error)]
pub enum HandlerError {
    /// A record the job depends on does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A downstream collaborator (graph database, cache, relational store)
    /// failed or was unreachable.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// The job payload could not be interpreted.
    #[error("invalid job payload: {0}")]
    Invalid(String),
}

/// Error taxonomy surfaced by the submission and status services.
#[derive(Debug, Error)]
pub enum JobError {
    /// Bad or missing submission input; the job was never created.
    #[error("validation error: {0}")]
    Validation(String),

    /// The queue could not accept the job at submission time.
    #[error("failed to enqueue job: {0}")]
    Enqueue(#[from] QueueError),

    /// Unknown job identifier.
    #[error("not found: {0}")]
    NotFound(String),

    /// Domain logic failed inside a worker.
    #[error("job execution failed: {0}")]
    DomainExecution(String),

    /// Persistence failure.
    #[error("job store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for JobError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => JobError::NotFound(format!("job {id} not found")),
            other => JobError::Store(other),
        }
    }
}

impl From<HandlerError> for JobError {
    fn from(e: HandlerError) -> Self {
        JobError::DomainExecution(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_not_found_maps_to_not_found() {
        let err: JobError = StoreError::NotFound("abc".into()).into();
        assert!(matches!(err, JobError::NotFound(ref m) if m.contains("abc")));
    }

    #[test]
    fn store_conflict_stays_a_store_error() {
        let err: JobError = StoreError::Conflict {
            id: "abc".into(),
            state: JobState::Running,
        }
        .into();
        assert!(matches!(err, JobError::Store(StoreError::Conflict { .. })));
    }

    #[test]
    fn handler_error_message_is_preserved() {
        let err = HandlerError::Upstream("graph database unreachable".into());
        assert_eq!(
            err.to_string(),
            "upstream failure: graph database unreachable"
        );
    }
}
