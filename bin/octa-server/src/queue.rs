//! Redis-backed [`TaskQueue`].
//!
//! Messages are JSON-encoded [`QueueMessage`]s pushed with `LPUSH` and
//! popped with `BRPOP`, giving FIFO order across any number of `serve` and
//! `worker` processes.
//!
//! `BRPOP` holds its connection until it returns, so blocking pulls run on
//! their own long-lived connections, kept idle in a small stack between
//! polls.  The shared [`ConnectionManager`] only carries `LPUSH`.

use std::time::Duration;

use async_trait::async_trait;
use octa_core::{QueueError, QueueMessage, QueueToken, TaskQueue};
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::debug;

/// Shortest `BRPOP` wait; Redis reads a zero timeout as "block forever".
const MIN_BLOCK_TIMEOUT: Duration = Duration::from_millis(10);

pub struct RedisQueue {
    client: redis::Client,
    /// Shared connection for non-blocking commands.
    conn: ConnectionManager,
    /// Idle blocking connections, one per concurrently polling worker.
    blocking: Mutex<Vec<MultiplexedConnection>>,
    key: String,
    block_timeout: Duration,
}

impl std::fmt::Debug for RedisQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisQueue")
            .field("key", &self.key)
            .field("block_timeout", &self.block_timeout)
            .finish_non_exhaustive()
    }
}

impl RedisQueue {
    /// Connect to `url` and use the list stored at `key`.
    pub async fn connect(url: &str, key: &str, block_timeout: Duration) -> Result<Self, QueueError> {
        let client = redis::Client::open(url).map_err(unreachable)?;
        let conn = client.get_connection_manager().await.map_err(unreachable)?;
        Ok(Self {
            client,
            conn,
            blocking: Mutex::new(Vec::new()),
            key: key.to_owned(),
            block_timeout: block_timeout.max(MIN_BLOCK_TIMEOUT),
        })
    }

    async fn checkout_blocking(&self) -> Result<MultiplexedConnection, QueueError> {
        if let Some(conn) = self.blocking.lock().await.pop() {
            return Ok(conn);
        }
        debug!(key = %self.key, "opening blocking redis connection");
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(unreachable)
    }
}

#[async_trait]
impl TaskQueue for RedisQueue {
    async fn enqueue(&self, message: QueueMessage) -> Result<QueueToken, QueueError> {
        let body = encode(&message)?;
        let mut conn = self.conn.clone();
        let depth: u64 = conn.lpush(&self.key, body).await.map_err(unreachable)?;
        debug!(job_id = %message.job_id, depth, "job pushed to redis");
        Ok(QueueToken(format!("{}:{}", self.key, message.job_id)))
    }

    async fn dequeue(&self) -> Result<Option<QueueMessage>, QueueError> {
        let mut conn = self.checkout_blocking().await?;
        // A failed pull drops its connection; the next poll opens a fresh one.
        let popped: Option<(String, String)> = conn
            .brpop(&self.key, self.block_timeout.as_secs_f64())
            .await
            .map_err(unreachable)?;
        self.blocking.lock().await.push(conn);
        popped.map(|(_, body)| decode(&body)).transpose()
    }
}

fn unreachable(e: redis::RedisError) -> QueueError {
    QueueError::Unreachable(e.to_string())
}

fn encode(message: &QueueMessage) -> Result<String, QueueError> {
    serde_json::to_string(message).map_err(|e| QueueError::Malformed(e.to_string()))
}

fn decode(body: &str) -> Result<QueueMessage, QueueError> {
    serde_json::from_str(body).map_err(|e| QueueError::Malformed(format!("{e}: {body}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use octa_core::JobKind;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::tcp::OwnedReadHalf;
    use tokio::net::{TcpListener, TcpStream};

    /// Minimal RESP server: every `BRPOP` times out empty, `LPUSH` reports a
    /// depth of one and anything else is `+OK`.  Counts accepted sockets.
    async fn fake_redis() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(socket));
            }
        });
        (format!("redis://{addr}/"), accepted)
    }

    async fn serve(socket: TcpStream) {
        let (read, mut write) = socket.into_split();
        let mut reader = BufReader::new(read);
        while let Some(command) = read_command(&mut reader).await {
            let reply: &[u8] = match command.to_ascii_uppercase().as_str() {
                "BRPOP" => b"*-1\r\n",
                "LPUSH" => b":1\r\n",
                _ => b"+OK\r\n",
            };
            if write.write_all(reply).await.is_err() {
                return;
            }
        }
    }

    /// Read one RESP command array and return its name.
    async fn read_command(reader: &mut BufReader<OwnedReadHalf>) -> Option<String> {
        let mut line = String::new();
        reader.read_line(&mut line).await.ok().filter(|n| *n > 0)?;
        let count: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;
        let mut name = None;
        for _ in 0..count {
            line.clear();
            reader.read_line(&mut line).await.ok()?;
            let len: usize = line.trim_end().strip_prefix('$')?.parse().ok()?;
            let mut data = vec![0; len + 2];
            reader.read_exact(&mut data).await.ok()?;
            data.truncate(len);
            name.get_or_insert_with(|| String::from_utf8_lossy(&data).into_owned());
        }
        name
    }

    #[test]
    fn wire_format_is_plain_json() {
        let message = QueueMessage {
            job_id: "job-1".into(),
            kind: JobKind::NetworkMetrics,
            payload: json!({ "network_id": "net-x" }),
        };
        let body = encode(&message).unwrap();
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["kind"], "network-metrics");
        assert_eq!(decode(&body).unwrap(), message);
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(decode("not json"), Err(QueueError::Malformed(_))));
    }

    #[tokio::test]
    async fn bad_url_is_unreachable() {
        let err = RedisQueue::connect("not-a-url", "q", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Unreachable(_)));
    }

    #[tokio::test]
    async fn idle_polls_reuse_one_blocking_connection() {
        let (url, accepted) = fake_redis().await;
        let queue = RedisQueue::connect(&url, "octa:test", Duration::from_millis(50))
            .await
            .unwrap();

        assert!(queue.dequeue().await.unwrap().is_none());
        let after_first_poll = accepted.load(Ordering::SeqCst);
        for _ in 0..3 {
            assert!(queue.dequeue().await.unwrap().is_none());
        }
        let message = QueueMessage {
            job_id: "job-1".into(),
            kind: JobKind::CacheWarm,
            payload: json!({}),
        };
        queue.enqueue(message).await.unwrap();

        assert_eq!(accepted.load(Ordering::SeqCst), after_first_poll);
        assert_eq!(queue.blocking.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn sub_millisecond_timeouts_are_clamped() {
        let (url, _) = fake_redis().await;
        let queue = RedisQueue::connect(&url, "octa:test", Duration::from_micros(200))
            .await
            .unwrap();
        assert_eq!(queue.block_timeout, MIN_BLOCK_TIMEOUT);
        assert!(queue.block_timeout.as_secs_f64() > 0.0);
    }
}
