//! Database abstraction layer.
//!
//! [`SpatialStore`] defines the interface for persisting geotagged records;
//! job persistence goes through [`octa_core::JobStore`].  The default
//! implementation of both is [`sqlite::SqliteStore`].  To swap to another
//! database, implement the traits for your new type and change the concrete
//! type in [`crate::state::AppState`].
//!
//! All trait methods use `impl Future` in their signatures so no extra
//! `async-trait` crate is required.

pub mod sqlite;

use std::future::Future;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// A single row in the `spatial_data` table.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialRecord {
    pub id: i64,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Free-form JSON object.
    pub properties: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl SpatialRecord {
    /// `(latitude, longitude)`.
    pub fn coordinates(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }
}

/// Input for [`SpatialStore::insert_spatial`].
#[derive(Debug, Clone)]
pub struct NewSpatialRecord {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub properties: Map<String, Value>,
}

/// Axis-aligned envelope: `x` is longitude, `y` is latitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

/// Trait for persisting geotagged records.
pub trait SpatialStore: Send + Sync + 'static {
    /// Persist a new record and return it with its assigned id.
    fn insert_spatial(
        &self,
        record: NewSpatialRecord,
    ) -> impl Future<Output = Result<SpatialRecord, sqlx::Error>> + Send;

    fn get_spatial(
        &self,
        id: i64,
    ) -> impl Future<Output = Result<Option<SpatialRecord>, sqlx::Error>> + Send;

    /// Records in id order with offset pagination.
    fn list_spatial(
        &self,
        skip: i64,
        limit: i64,
    ) -> impl Future<Output = Result<Vec<SpatialRecord>, sqlx::Error>> + Send;

    /// Records whose point lies inside `envelope` (edges inclusive).
    fn spatial_within(
        &self,
        envelope: Envelope,
    ) -> impl Future<Output = Result<Vec<SpatialRecord>, sqlx::Error>> + Send;
}
