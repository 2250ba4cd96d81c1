pub mod network;
pub mod spatial;
pub mod tasks;

use std::sync::Arc;

use axum::Router;
use utoipa::OpenApi;

use crate::routes::meta;
use crate::state::AppState;

/// Routes nested under `/api/v1`.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(meta::v1_router())
        .merge(tasks::router())
        .merge(spatial::router())
        .merge(network::router())
}

pub fn api_docs() -> utoipa::openapi::OpenApi {
    let mut doc = tasks::TasksApi::openapi();
    doc.merge(spatial::SpatialApi::openapi());
    doc.merge(network::NetworkApi::openapi());
    doc
}
