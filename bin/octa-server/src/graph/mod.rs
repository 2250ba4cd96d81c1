//! Graph database access.
//!
//! [`GraphClient`] runs a parameterised Cypher statement and returns its rows;
//! [`neo4j::Neo4jHttpClient`] is the production implementation.  Callers go
//! through [`GraphPool::acquire`], which hands out a [`GraphSession`] guard
//! holding one of a bounded number of slots.  The slot is released when the
//! guard drops, whether the caller returns normally, bails out with `?`, or
//! unwinds.

pub mod neo4j;
pub mod network;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// One result row keyed by column name.
pub type Row = Map<String, Value>;

#[derive(Debug, Error)]
pub enum GraphError {
    /// Transport failure: connection refused, timeout, non-2xx status.
    #[error("graph database unreachable: {0}")]
    Unreachable(String),

    /// The database rejected the statement.
    #[error("graph query failed: {code}: {message}")]
    Query { code: String, message: String },

    /// The response did not have the expected shape.
    #[error("unexpected graph response: {0}")]
    Protocol(String),

    #[error("graph session pool closed")]
    PoolClosed,
}

#[async_trait]
pub trait GraphClient: Send + Sync + 'static {
    async fn query(&self, statement: &str, params: Value) -> Result<Vec<Row>, GraphError>;
}

/// Bounded pool of graph sessions.
#[derive(Clone)]
pub struct GraphPool {
    client: Arc<dyn GraphClient>,
    slots: Arc<Semaphore>,
}

impl std::fmt::Debug for GraphPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphPool")
            .field("available", &self.slots.available_permits())
            .finish_non_exhaustive()
    }
}

impl GraphPool {
    pub fn new(client: Arc<dyn GraphClient>, max_sessions: usize) -> Self {
        Self {
            client,
            slots: Arc::new(Semaphore::new(max_sessions.max(1))),
        }
    }

    /// Wait for a free slot and open a session on it.
    pub async fn acquire(&self) -> Result<GraphSession, GraphError> {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| GraphError::PoolClosed)?;
        Ok(GraphSession {
            client: Arc::clone(&self.client),
            _permit: permit,
        })
    }

    /// Number of sessions that can be opened without waiting.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }
}

/// Scoped graph session.  Dropping it frees the pool slot.
pub struct GraphSession {
    client: Arc<dyn GraphClient>,
    _permit: OwnedSemaphorePermit,
}

impl std::fmt::Debug for GraphSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphSession").finish_non_exhaustive()
    }
}

impl GraphSession {
    pub async fn run(&self, statement: &str, params: Value) -> Result<Vec<Row>, GraphError> {
        self.client.query(statement, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl GraphClient for Echo {
        async fn query(&self, statement: &str, params: Value) -> Result<Vec<Row>, GraphError> {
            if statement == "boom" {
                return Err(GraphError::Unreachable("connection refused".into()));
            }
            let mut row = Row::new();
            row.insert("params".into(), params);
            Ok(vec![row])
        }
    }

    #[tokio::test]
    async fn session_holds_a_slot_until_dropped() {
        let pool = GraphPool::new(Arc::new(Echo), 2);
        let session = pool.acquire().await.unwrap();
        assert_eq!(pool.available(), 1);
        let rows = session.run("RETURN 1", json!({ "a": 1 })).await.unwrap();
        assert_eq!(rows[0]["params"], json!({ "a": 1 }));
        drop(session);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn slot_is_released_on_error_paths() {
        let pool = GraphPool::new(Arc::new(Echo), 1);

        async fn failing(pool: &GraphPool) -> Result<Vec<Row>, GraphError> {
            let session = pool.acquire().await?;
            session.run("boom", Value::Null).await
        }

        assert!(failing(&pool).await.is_err());
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn slot_is_released_when_the_holder_panics() {
        let pool = GraphPool::new(Arc::new(Echo), 1);
        let inner = pool.clone();
        let handle = tokio::spawn(async move {
            let _session = inner.acquire().await.unwrap();
            panic!("handler blew up");
        });
        assert!(handle.await.is_err());
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn acquire_waits_for_a_free_slot() {
        let pool = GraphPool::new(Arc::new(Echo), 1);
        let first = pool.acquire().await.unwrap();
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|_| ()) })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        drop(first);
        waiter.await.unwrap().unwrap();
    }
}
