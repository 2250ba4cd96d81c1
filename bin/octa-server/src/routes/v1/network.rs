//! Graph analysis endpoints backed by the graph database.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use utoipa::OpenApi;
use validator::Validate;

use crate::error::ServerError;
use crate::extract::ApiQuery;
use crate::schemas::v1::network::{CentralityQuery, ShortestPathQuery};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(shortest_path, centrality))]
pub struct NetworkApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/network/shortest-path", post(shortest_path))
        .route("/network/centrality", get(centrality))
}

#[utoipa::path(
    post,
    path = "/api/v1/network/shortest-path",
    tag = "network",
    params(ShortestPathQuery),
    responses(
        (status = 200, description = "Shortest path rows", body = Value),
        (status = 400, description = "Missing node name"),
        (status = 503, description = "Graph database unreachable"),
    )
)]
pub async fn shortest_path(
    State(state): State<Arc<AppState>>,
    ApiQuery(q): ApiQuery<ShortestPathQuery>,
) -> Result<Json<Value>, ServerError> {
    q.validate()?;
    let path = state
        .network
        .find_shortest_path(&q.start_node, &q.end_node)
        .await?;
    Ok(Json(path))
}

#[utoipa::path(
    get,
    path = "/api/v1/network/centrality",
    tag = "network",
    params(CentralityQuery),
    responses(
        (status = 200, description = "Degree centrality per node", body = Value),
        (status = 400, description = "Missing network_id"),
        (status = 503, description = "Graph database unreachable"),
    )
)]
pub async fn centrality(
    State(state): State<Arc<AppState>>,
    ApiQuery(q): ApiQuery<CentralityQuery>,
) -> Result<Json<Value>, ServerError> {
    q.validate()?;
    Ok(Json(state.network.calculate_centrality(&q.network_id).await?))
}
