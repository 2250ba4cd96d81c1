//! Spatial record endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tracing::{debug, info, warn};
use utoipa::OpenApi;
use validator::Validate;

use crate::db::{Envelope, SpatialStore};
use crate::error::ServerError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::schemas::v1::spatial::{BoundsQuery, PageQuery, SpatialDataCreate, SpatialDataResponse};
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

#[derive(OpenApi)]
#[openapi(
    paths(create_spatial_data, list_spatial_data, spatial_data_within, get_spatial_data),
    components(schemas(SpatialDataCreate, SpatialDataResponse))
)]
pub struct SpatialApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/spatial/spatial-data",
            get(list_spatial_data).post(create_spatial_data),
        )
        .route("/spatial/spatial-data/within", get(spatial_data_within))
        .route("/spatial/spatial-data/{id}", get(get_spatial_data))
}

#[utoipa::path(
    post,
    path = "/api/v1/spatial/spatial-data",
    tag = "spatial",
    request_body = SpatialDataCreate,
    responses(
        (status = 200, description = "Record created", body = SpatialDataResponse),
        (status = 400, description = "Invalid name or coordinates"),
    )
)]
pub async fn create_spatial_data(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<SpatialDataCreate>,
) -> Result<Json<SpatialDataResponse>, ServerError> {
    req.validate()?;
    if req.name.trim().is_empty() {
        return Err(ServerError::BadRequest("name must not be blank".to_owned()));
    }
    let record = state.store.insert_spatial(req.into()).await?;
    info!(id = record.id, name = %record.name, "spatial record created");
    Ok(Json(record.into()))
}

#[utoipa::path(
    get,
    path = "/api/v1/spatial/spatial-data",
    tag = "spatial",
    params(PageQuery),
    responses(
        (status = 200, description = "Records in id order", body = [SpatialDataResponse]),
        (status = 400, description = "Negative skip or limit"),
    )
)]
pub async fn list_spatial_data(
    State(state): State<Arc<AppState>>,
    ApiQuery(q): ApiQuery<PageQuery>,
) -> Result<Json<Vec<SpatialDataResponse>>, ServerError> {
    let skip = q.skip.unwrap_or(0);
    let limit = q.limit.unwrap_or(DEFAULT_LIMIT);
    if skip < 0 || limit < 0 {
        return Err(ServerError::BadRequest(
            "skip and limit must not be negative".to_owned(),
        ));
    }
    let records = state.store.list_spatial(skip, limit.min(MAX_LIMIT)).await?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    get,
    path = "/api/v1/spatial/spatial-data/within",
    tag = "spatial",
    params(BoundsQuery),
    responses(
        (status = 200, description = "Records inside the envelope", body = [SpatialDataResponse]),
        (status = 400, description = "Inverted envelope"),
    )
)]
pub async fn spatial_data_within(
    State(state): State<Arc<AppState>>,
    ApiQuery(q): ApiQuery<BoundsQuery>,
) -> Result<Json<Vec<SpatialDataResponse>>, ServerError> {
    if q.minx > q.maxx || q.miny > q.maxy {
        return Err(ServerError::BadRequest(
            "envelope minimum exceeds maximum".to_owned(),
        ));
    }
    let envelope = Envelope {
        min_x: q.minx,
        min_y: q.miny,
        max_x: q.maxx,
        max_y: q.maxy,
    };
    let records = state.store.spatial_within(envelope).await?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

/// One record, served from the cache when a warm copy exists.
#[utoipa::path(
    get,
    path = "/api/v1/spatial/spatial-data/{id}",
    tag = "spatial",
    params(
        ("id" = i64, Path, description = "Spatial record id")
    ),
    responses(
        (status = 200, description = "Record found", body = SpatialDataResponse),
        (status = 404, description = "Record not found"),
    )
)]
pub async fn get_spatial_data(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<SpatialDataResponse>, ServerError> {
    if let Some(cached) = state.cache.cached_spatial_data(id).await {
        match serde_json::from_value::<SpatialDataResponse>(cached) {
            Ok(record) => {
                debug!(id, "spatial record served from cache");
                return Ok(Json(record));
            }
            Err(e) => {
                warn!(id, error = %e, "evicting malformed cached record");
                state.cache.clear_spatial_data(id).await;
            }
        }
    }

    let record = state
        .store
        .get_spatial(id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("spatial record {id} not found")))?;
    Ok(Json(record.into()))
}
