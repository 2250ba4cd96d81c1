use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::db::{NewSpatialRecord, SpatialRecord};

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct SpatialDataCreate {
    /// Name of the spatial data point.
    #[validate(length(min = 1, max = 255, message = "name must be 1-255 characters"))]
    pub name: String,
    #[validate(range(min = -90.0, max = 90.0, message = "latitude must be within [-90, 90]"))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0, message = "longitude must be within [-180, 180]"))]
    pub longitude: f64,
    /// Additional free-form properties.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub properties: Map<String, Value>,
}

impl From<SpatialDataCreate> for NewSpatialRecord {
    fn from(req: SpatialDataCreate) -> Self {
        Self {
            name: req.name.trim().to_owned(),
            latitude: req.latitude,
            longitude: req.longitude,
            properties: req.properties,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SpatialDataResponse {
    pub id: i64,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// `[latitude, longitude]`.
    #[schema(value_type = Vec<f64>)]
    pub coordinates: (f64, f64),
    #[schema(value_type = Object)]
    pub properties: Map<String, Value>,
    pub created_at: String,
}

impl From<SpatialRecord> for SpatialDataResponse {
    fn from(record: SpatialRecord) -> Self {
        Self {
            coordinates: record.coordinates(),
            id: record.id,
            name: record.name,
            latitude: record.latitude,
            longitude: record.longitude,
            properties: record.properties,
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema, IntoParams)]
pub struct PageQuery {
    /// Records to skip (default 0).
    pub skip: Option<i64>,
    /// Maximum records to return (default 100).
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema, IntoParams)]
pub struct BoundsQuery {
    /// Minimum longitude.
    pub minx: f64,
    /// Minimum latitude.
    pub miny: f64,
    /// Maximum longitude.
    pub maxx: f64,
    /// Maximum latitude.
    pub maxy: f64,
}
