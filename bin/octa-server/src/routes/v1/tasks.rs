//! Asynchronous job endpoints.
//!
//! Submissions return `{job_id, state: "pending"}` immediately; the work
//! itself runs on the worker pool and is observed through `task-status`.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use octa_core::{JobKind, JobStatusView, SubmitRequest};
use serde_json::Value;
use tracing::info;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::extract::{ApiPath, ApiQuery};
use crate::schemas::v1::task::{
    DatasetQuery, HotspotQuery, JobKindQuery, JobSummary, NetworkQuery, SubmitResponse,
};
use crate::state::AppState;

const DEFAULT_RADIUS_KM: f64 = 1.0;

#[derive(OpenApi)]
#[openapi(
    paths(
        process_dataset,
        calculate_network_metrics,
        cache_spatial_data,
        task_status,
        list_tasks,
        spatial_statistics,
        detect_hotspots
    ),
    components(schemas(SubmitResponse, JobSummary))
)]
pub struct TasksApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks", get(list_tasks))
        .route("/tasks/process-dataset", post(process_dataset))
        .route(
            "/tasks/calculate-network-metrics",
            post(calculate_network_metrics),
        )
        .route(
            "/tasks/cache-spatial-data/{spatial_id}",
            post(cache_spatial_data),
        )
        .route("/tasks/task-status/{job_id}", get(task_status))
        .route("/tasks/spatial-statistics", get(spatial_statistics))
        .route("/tasks/detect-hotspots", get(detect_hotspots))
}

#[utoipa::path(
    post,
    path = "/api/v1/tasks/process-dataset",
    tag = "tasks",
    params(DatasetQuery),
    responses(
        (status = 200, description = "Job accepted", body = SubmitResponse),
        (status = 400, description = "Missing or empty dataset_id"),
        (status = 503, description = "Task queue unavailable"),
    )
)]
pub async fn process_dataset(
    State(state): State<Arc<AppState>>,
    ApiQuery(q): ApiQuery<DatasetQuery>,
) -> Result<Json<SubmitResponse>, ServerError> {
    let request = SubmitRequest::Dataset {
        dataset_id: q.dataset_id.unwrap_or_default(),
    };
    let receipt = state.jobs.submit(request).await?;
    info!(job_id = %receipt.job_id, "dataset processing submitted");
    Ok(Json(receipt.into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/tasks/calculate-network-metrics",
    tag = "tasks",
    params(NetworkQuery),
    responses(
        (status = 200, description = "Job accepted", body = SubmitResponse),
        (status = 400, description = "Missing or empty network_id"),
        (status = 503, description = "Task queue unavailable"),
    )
)]
pub async fn calculate_network_metrics(
    State(state): State<Arc<AppState>>,
    ApiQuery(q): ApiQuery<NetworkQuery>,
) -> Result<Json<SubmitResponse>, ServerError> {
    let request = SubmitRequest::Network {
        network_id: q.network_id.unwrap_or_default(),
    };
    let receipt = state.jobs.submit(request).await?;
    info!(job_id = %receipt.job_id, "network metrics submitted");
    Ok(Json(receipt.into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/tasks/cache-spatial-data/{spatial_id}",
    tag = "tasks",
    params(
        ("spatial_id" = i64, Path, description = "Spatial record to copy into the cache")
    ),
    responses(
        (status = 200, description = "Job accepted", body = SubmitResponse),
        (status = 400, description = "Invalid spatial_id"),
        (status = 503, description = "Task queue unavailable"),
    )
)]
pub async fn cache_spatial_data(
    State(state): State<Arc<AppState>>,
    ApiPath(spatial_id): ApiPath<String>,
) -> Result<Json<SubmitResponse>, ServerError> {
    let spatial_id: i64 = spatial_id
        .parse()
        .map_err(|_| ServerError::BadRequest(format!("invalid spatial_id: {spatial_id}")))?;
    let receipt = state
        .jobs
        .submit(SubmitRequest::CacheWarm { spatial_id })
        .await?;
    info!(job_id = %receipt.job_id, spatial_id, "cache warm submitted");
    Ok(Json(receipt.into()))
}

/// Current state of one job.
///
/// The body shape depends on `state`: `running` carries step progress,
/// `succeeded` the result and `failed` the error message.
#[utoipa::path(
    get,
    path = "/api/v1/tasks/task-status/{job_id}",
    tag = "tasks",
    params(
        ("job_id" = String, Path, description = "Identifier returned on submission")
    ),
    responses(
        (status = 200, description = "Job status", body = Value),
        (status = 404, description = "Unknown job"),
    )
)]
pub async fn task_status(
    State(state): State<Arc<AppState>>,
    ApiPath(job_id): ApiPath<String>,
) -> Result<Json<JobStatusView>, ServerError> {
    Ok(Json(state.jobs.status(&job_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/tasks",
    tag = "tasks",
    params(JobKindQuery),
    responses(
        (status = 200, description = "Jobs, newest first", body = [JobSummary]),
        (status = 400, description = "Unknown job kind"),
    )
)]
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    ApiQuery(q): ApiQuery<JobKindQuery>,
) -> Result<Json<Vec<JobSummary>>, ServerError> {
    let kind = match q.kind.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        Some(k) => Some(
            JobKind::from_str(k)
                .map_err(|_| ServerError::BadRequest(format!("unknown job kind: {k}")))?,
        ),
        None => None,
    };
    let jobs = state.jobs.list(kind).await?;
    Ok(Json(jobs.into_iter().map(JobSummary::from).collect()))
}

#[utoipa::path(
    get,
    path = "/api/v1/tasks/spatial-statistics",
    tag = "tasks",
    responses(
        (status = 200, description = "Record count and property keys", body = Value),
    )
)]
pub async fn spatial_statistics(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ServerError> {
    Ok(Json(state.analyzer.spatial_statistics().await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/tasks/detect-hotspots",
    tag = "tasks",
    params(HotspotQuery),
    responses(
        (status = 200, description = "Detected hotspots", body = Value),
        (status = 400, description = "radius_km is not a positive number"),
    )
)]
pub async fn detect_hotspots(
    State(state): State<Arc<AppState>>,
    ApiQuery(q): ApiQuery<HotspotQuery>,
) -> Result<Json<Value>, ServerError> {
    let radius_km = q.radius_km.unwrap_or(DEFAULT_RADIUS_KM);
    if !radius_km.is_finite() || radius_km <= 0.0 {
        return Err(ServerError::BadRequest(
            "radius_km must be a positive number".to_owned(),
        ));
    }
    Ok(Json(state.analyzer.detect_hotspots(radius_km).await?))
}
