//! octa-core – asynchronous job lifecycle runtime.
//!
//! ```text
//! JobService::submit ──▶ TaskQueue ──▶ Worker ──▶ JobStore ◀── JobService::status
//! ```
//!
//! * [`store`]   – durable job id → state map with conditional transitions.
//! * [`queue`]   – transport from submitter to worker (at-least-once).
//! * [`worker`]  – claims jobs, runs [`handler::JobHandler`]s, records outcomes.
//! * [`service`] – submission and status entry points used by the HTTP layer.

pub mod error;
pub mod handler;
pub mod job;
pub mod queue;
pub mod service;
pub mod store;
pub mod worker;

pub use error::{HandlerError, JobError, QueueError, StoreError};
pub use handler::{HandlerRegistry, JobHandler, ProgressReporter, ProgressSink, PROGRESS_TOTAL};
pub use job::{Job, JobId, JobKind, JobState, JobStatusView, Progress, QueueMessage};
pub use queue::{MemoryQueue, QueueToken, TaskQueue};
pub use service::{JobService, SubmitReceipt, SubmitRequest};
pub use store::{JobStore, MemoryJobStore};
pub use worker::{WorkOutcome, Worker, WorkerConfig, WorkerPool};
