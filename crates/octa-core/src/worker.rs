//! Worker harness: dequeue → claim → execute → record terminal state.
//!
//! A worker never lets domain failures escape: handler errors, handler
//! panics and unknown job kinds all end as a `failed` job.  The only failure
//! it cannot record is a failure of the recording write itself, which is
//! logged at `error` level and leaves the job `running`.  A claim that fails
//! for a storage reason is retried by putting the message back on the queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn, Instrument};

use crate::error::StoreError;
use crate::handler::{HandlerRegistry, ProgressReporter, StoreProgressSink, PROGRESS_TOTAL};
use crate::job::QueueMessage;
use crate::queue::TaskQueue;
use crate::store::JobStore;

/// What happened to a single dequeued message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkOutcome {
    Succeeded,
    Failed(String),
    /// The job was not ours to run (already claimed, terminal, or unknown).
    Discarded,
    /// The claim hit a store failure; the message went back on the queue.
    Requeued,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of concurrent workers in a [`WorkerPool`].
    pub concurrency: usize,
    /// Pause after a queue or claim error before polling again.
    pub error_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            error_backoff: Duration::from_secs(1),
        }
    }
}

/// A single job-executing loop.
pub struct Worker<S: JobStore> {
    id: usize,
    store: Arc<S>,
    queue: Arc<dyn TaskQueue>,
    handlers: Arc<HandlerRegistry>,
    error_backoff: Duration,
}

impl<S: JobStore> Worker<S> {
    pub fn new(
        id: usize,
        store: Arc<S>,
        queue: Arc<dyn TaskQueue>,
        handlers: Arc<HandlerRegistry>,
    ) -> Self {
        Self {
            id,
            store,
            queue,
            handlers,
            error_backoff: WorkerConfig::default().error_backoff,
        }
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Pull and process messages until `shutdown` flips to `true`.
    ///
    /// The shutdown flag is checked between messages only, so a job that has
    /// been dequeued is always driven to a terminal state first.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        info!(worker = self.id, "worker started");
        while !*shutdown.borrow() {
            match self.queue.dequeue().await {
                Ok(Some(message)) => {
                    self.process(message).await;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(worker = self.id, error = %e, "dequeue failed; backing off");
                    tokio::time::sleep(self.error_backoff).await;
                }
            }
        }
        info!(worker = self.id, "worker stopped");
    }

    /// Drive one message through claim, execution and terminal write.
    pub async fn process(&self, message: QueueMessage) -> WorkOutcome {
        let span = tracing::info_span!(
            "job",
            worker = self.id,
            job_id = %message.job_id,
            kind = %message.kind,
        );
        self.process_inner(message).instrument(span).await
    }

    async fn process_inner(&self, message: QueueMessage) -> WorkOutcome {
        let job = match self.store.claim(&message.job_id, PROGRESS_TOTAL).await {
            Ok(job) => job,
            Err(StoreError::Conflict { state, .. }) => {
                info!(%state, "job already claimed elsewhere; discarding delivery");
                return WorkOutcome::Discarded;
            }
            Err(StoreError::NotFound(_)) => {
                warn!("queued job has no record; discarding delivery");
                return WorkOutcome::Discarded;
            }
            Err(e) => return self.requeue(message, e).await,
        };
        info!("job claimed");

        let Some(handler) = self.handlers.get(job.kind) else {
            let message = format!("no handler registered for job kind '{}'", job.kind);
            return self.record_failure(&job.id, message).await;
        };

        let sink = Arc::new(StoreProgressSink::new(Arc::clone(&self.store), job.id.clone()));
        let mut reporter = ProgressReporter::new(sink, handler.steps().len());
        let task_job = job.clone();
        let execution = tokio::spawn(
            async move { handler.run(&task_job, &mut reporter).await }.in_current_span(),
        );

        match execution.await {
            Ok(Ok(result)) => match self.store.complete(&job.id, result).await {
                Ok(()) => {
                    info!("job succeeded");
                    WorkOutcome::Succeeded
                }
                Err(e) => {
                    error!(error = %e, "failed to record job success");
                    WorkOutcome::Discarded
                }
            },
            Ok(Err(e)) => self.record_failure(&job.id, e.to_string()).await,
            Err(join_err) if join_err.is_panic() => {
                self.record_failure(&job.id, "job handler panicked".to_owned())
                    .await
            }
            Err(_) => {
                self.record_failure(&job.id, "job handler was cancelled".to_owned())
                    .await
            }
        }
    }

    /// A claim that failed for a storage reason leaves the job `pending`, so
    /// the delivery is put back for a later attempt.
    async fn requeue(&self, message: QueueMessage, cause: StoreError) -> WorkOutcome {
        warn!(error = %cause, "failed to claim job; requeueing after backoff");
        tokio::time::sleep(self.error_backoff).await;
        match self.queue.enqueue(message).await {
            Ok(_) => WorkOutcome::Requeued,
            Err(e) => {
                error!(error = %e, "failed to requeue job; it stays pending");
                WorkOutcome::Discarded
            }
        }
    }

    async fn record_failure(&self, job_id: &str, message: String) -> WorkOutcome {
        warn!(error = %message, "job failed");
        if let Err(e) = self.store.fail(job_id, &message).await {
            error!(error = %e, "failed to record job failure");
            return WorkOutcome::Discarded;
        }
        WorkOutcome::Failed(message)
    }
}

/// A set of workers sharing one queue, store and handler registry.
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WorkerPool({} workers)", self.handles.len())
    }
}

impl WorkerPool {
    /// Spawn `config.concurrency` workers on the current tokio runtime.
    pub fn start<S: JobStore>(
        config: &WorkerConfig,
        store: Arc<S>,
        queue: Arc<dyn TaskQueue>,
        handlers: Arc<HandlerRegistry>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handles = (0..config.concurrency.max(1))
            .map(|id| {
                let worker = Worker::new(
                    id,
                    Arc::clone(&store),
                    Arc::clone(&queue),
                    Arc::clone(&handlers),
                )
                .with_error_backoff(config.error_backoff);
                tokio::spawn(worker.run(shutdown_rx.clone()))
            })
            .collect();
        info!(workers = config.concurrency.max(1), "worker pool started");
        Self {
            shutdown_tx,
            handles,
        }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Signal every worker to stop and wait for in-flight jobs to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "worker task ended abnormally");
            }
        }
        info!("worker pool stopped");
    }
}
