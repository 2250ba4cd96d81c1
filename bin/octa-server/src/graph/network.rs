//! Network analysis delegated to the graph database.

use serde_json::{json, Value};
use tracing::debug;

use super::{GraphError, GraphPool, Row};
use crate::cache::CacheService;

const SHORTEST_PATH: &str = "\
MATCH (start:Node {name: $start_node}), (end:Node {name: $end_node}) \
MATCH path = shortestPath((start)-[*]-(end)) \
RETURN path";

const CENTRALITY: &str = "\
MATCH (n:Node) \
RETURN n.name AS node, COUNT { (n)--() } AS degree \
ORDER BY degree DESC";

const SIZE: &str = "\
MATCH (n:Node) \
OPTIONAL MATCH (n)-[r]-() \
RETURN count(DISTINCT n) AS nodes, count(DISTINCT r) AS edges";

const COMMUNITIES: &str = "\
MATCH (n:Node) WHERE n.community IS NOT NULL \
RETURN n.community AS community, collect(n.name) AS members \
ORDER BY community";

#[derive(Debug, Clone)]
pub struct NetworkAnalysisService {
    pool: GraphPool,
    cache: Option<CacheService>,
}

impl NetworkAnalysisService {
    pub fn new(pool: GraphPool) -> Self {
        Self { pool, cache: None }
    }

    /// Memoize centrality results in `cache`.
    pub fn with_cache(mut self, cache: CacheService) -> Self {
        self.cache = Some(cache);
        self
    }

    pub async fn find_shortest_path(&self, start_node: &str, end_node: &str) -> Result<Value, GraphError> {
        let session = self.pool.acquire().await?;
        let rows = session
            .run(
                SHORTEST_PATH,
                json!({ "start_node": start_node, "end_node": end_node }),
            )
            .await?;
        Ok(json!({ "path": rows, "start": start_node, "end": end_node }))
    }

    pub async fn calculate_centrality(&self, network_id: &str) -> Result<Value, GraphError> {
        let params = format!("network_id={network_id}");
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.cached_analysis("centrality", &params).await {
                debug!(%network_id, "centrality served from cache");
                return Ok(hit);
            }
        }

        let scores = self.centrality_rows().await?;
        let result = json!({ "centrality_scores": scores, "network_id": network_id });
        if let Some(cache) = &self.cache {
            cache.cache_analysis("centrality", &params, &result).await;
        }
        Ok(result)
    }

    /// `(nodes, edges)` of the stored network.
    pub async fn network_size(&self) -> Result<(u64, u64), GraphError> {
        let session = self.pool.acquire().await?;
        let rows = session.run(SIZE, Value::Null).await?;
        let row = rows
            .first()
            .ok_or_else(|| GraphError::Protocol("size query returned no rows".to_owned()))?;
        let count = |column: &str| row.get(column).and_then(Value::as_u64).unwrap_or(0);
        Ok((count("nodes"), count("edges")))
    }

    pub async fn centrality_rows(&self) -> Result<Vec<Row>, GraphError> {
        let session = self.pool.acquire().await?;
        session.run(CENTRALITY, Value::Null).await
    }

    /// Community membership as stored on the nodes.
    pub async fn communities(&self) -> Result<Vec<Row>, GraphError> {
        let session = self.pool.acquire().await?;
        session.run(COMMUNITIES, Value::Null).await
    }
}
