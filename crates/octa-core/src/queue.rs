//! Transport carrying job invocations from submitters to workers.
//!
//! The runtime only relies on `enqueue` / `dequeue` and assumes
//! at-least-once delivery: a message may be seen twice, and the worker's
//! conditional claim makes the second delivery a no-op.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::QueueError;
use crate::job::QueueMessage;

/// Opaque receipt returned by [`TaskQueue::enqueue`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueToken(pub String);

#[async_trait]
pub trait TaskQueue: Send + Sync + 'static {
    /// Hand a job to the queue.  Fire-and-forget.
    async fn enqueue(&self, message: QueueMessage) -> Result<QueueToken, QueueError>;

    /// Pull the next message.
    ///
    /// Blocks for at most the implementation's poll interval; `Ok(None)`
    /// means nothing arrived in time (or the queue is closed and drained) so
    /// the caller can re-check its shutdown signal and poll again.
    async fn dequeue(&self) -> Result<Option<QueueMessage>, QueueError>;
}

/// In-process multi-producer / multi-consumer queue backed by a bounded
/// `flume` channel.
#[derive(Debug)]
pub struct MemoryQueue {
    tx: flume::Sender<QueueMessage>,
    rx: flume::Receiver<QueueMessage>,
    capacity: usize,
    poll_interval: Duration,
    closed: AtomicBool,
    seq: AtomicU64,
}

impl MemoryQueue {
    /// * `capacity`      – maximum number of undelivered messages.
    /// * `poll_interval` – how long `dequeue` waits before returning `None`.
    pub fn new(capacity: usize, poll_interval: Duration) -> Self {
        let (tx, rx) = flume::bounded(capacity);
        Self {
            tx,
            rx,
            capacity,
            poll_interval,
            closed: AtomicBool::new(false),
            seq: AtomicU64::new(0),
        }
    }

    /// Stop accepting new messages.  Already queued messages can still be
    /// dequeued.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Number of messages waiting for a worker.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn enqueue(&self, message: QueueMessage) -> Result<QueueToken, QueueError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }
        self.tx.try_send(message).map_err(|e| match e {
            flume::TrySendError::Full(_) => QueueError::Full {
                capacity: self.capacity,
            },
            flume::TrySendError::Disconnected(_) => QueueError::Closed,
        })?;
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        Ok(QueueToken(format!("mem-{seq}")))
    }

    async fn dequeue(&self) -> Result<Option<QueueMessage>, QueueError> {
        if self.closed.load(Ordering::SeqCst) {
            if let Ok(message) = self.rx.try_recv() {
                return Ok(Some(message));
            }
            // Drained: pace callers at the poll interval instead of spinning.
            tokio::time::sleep(self.poll_interval).await;
            return Ok(None);
        }
        match tokio::time::timeout(self.poll_interval, self.rx.recv_async()).await {
            Ok(Ok(message)) => Ok(Some(message)),
            Ok(Err(flume::RecvError::Disconnected)) => Err(QueueError::Closed),
            Err(_elapsed) => Ok(None),
        }
    }
}
