//! Service metadata: liveness probes and the API banner.
//!
//! `/health` answers load balancers without touching any collaborator.
//! The versioned API root answers on both `/api/v1` and `/api/v1/`.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};

use crate::state::AppState;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(OpenApi)]
#[openapi(
    paths(liveness, banner, service_health),
    components(schemas(Liveness, Banner, ServiceHealth))
)]
pub struct MetaApi;

#[derive(Debug, Serialize, ToSchema)]
pub struct Liveness {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Banner {
    pub message: String,
    pub version: &'static str,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceHealth {
    pub status: &'static str,
    pub service: String,
}

fn service_name(app_name: &str) -> String {
    format!("{app_name} API")
}

/// Top-level routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(liveness))
        // A nested "/" only matches the prefix without its trailing slash.
        .route("/api/v1/", get(banner))
}

/// Routes nested under `/api/v1`.
pub fn v1_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(banner))
        .route("/health", get(service_health))
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "meta",
    responses((status = 200, description = "Process is up", body = Liveness))
)]
pub async fn liveness() -> Json<Liveness> {
    Json(Liveness {
        status: "ok",
        version: VERSION,
    })
}

#[utoipa::path(
    get,
    path = "/api/v1/",
    tag = "meta",
    responses((status = 200, description = "API name and version", body = Banner))
)]
pub async fn banner(State(state): State<Arc<AppState>>) -> Json<Banner> {
    Json(Banner {
        message: service_name(&state.config.app_name),
        version: VERSION,
    })
}

#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "meta",
    responses((status = 200, description = "API is serving", body = ServiceHealth))
)]
pub async fn service_health(State(state): State<Arc<AppState>>) -> Json<ServiceHealth> {
    Json(ServiceHealth {
        status: "healthy",
        service: service_name(&state.config.app_name),
    })
}
