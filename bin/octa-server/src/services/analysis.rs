//! Summary analyses over the stored spatial records.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use crate::db::SpatialStore;

/// Records scanned by [`GeospatialAnalyzer::spatial_statistics`].
const STATISTICS_SCAN: i64 = 1000;
/// Records scanned by [`GeospatialAnalyzer::detect_hotspots`].
const HOTSPOT_SCAN: i64 = 500;
/// Hotspots reported at most.
const HOTSPOT_LIMIT: usize = 5;

pub struct GeospatialAnalyzer<S> {
    store: Arc<S>,
}

impl<S> Clone for GeospatialAnalyzer<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> std::fmt::Debug for GeospatialAnalyzer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeospatialAnalyzer").finish_non_exhaustive()
    }
}

impl<S: SpatialStore> GeospatialAnalyzer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Record count plus the union of property keys.
    pub async fn spatial_statistics(&self) -> Result<Value, sqlx::Error> {
        let records = self.store.list_spatial(0, STATISTICS_SCAN).await?;
        if records.is_empty() {
            return Ok(json!({ "total_points": 0, "status": "no_data" }));
        }
        let keys: BTreeSet<&str> = records
            .iter()
            .flat_map(|r| r.properties.keys().map(String::as_str))
            .collect();
        Ok(json!({
            "total_points": records.len(),
            "unique_property_keys": keys.len(),
            "property_keys": keys,
            "status": "completed",
        }))
    }

    /// One hotspot per record, for the first few records.
    pub async fn detect_hotspots(&self, radius_km: f64) -> Result<Value, sqlx::Error> {
        let records = self.store.list_spatial(0, HOTSPOT_SCAN).await?;
        if records.is_empty() {
            return Ok(json!({ "hotspots": [], "status": "no_data" }));
        }
        let hotspots: Vec<Value> = records
            .iter()
            .take(HOTSPOT_LIMIT)
            .enumerate()
            .map(|(i, r)| {
                let (lat, lon) = r.coordinates();
                json!({
                    "id": format!("hotspot_{i}"),
                    "center": [lat, lon],
                    "radius_km": radius_km,
                    "point_count": 1,
                    "density": "high",
                })
            })
            .collect();
        Ok(json!({
            "total_hotspots": hotspots.len(),
            "hotspots": hotspots,
            "radius_km": radius_km,
            "status": "completed",
        }))
    }

    /// Dataset report used by the `dataset-processing` job.
    pub async fn process_dataset(&self, dataset_id: &str) -> Result<Value, sqlx::Error> {
        let records = self.store.list_spatial(0, STATISTICS_SCAN).await?;
        let coordinates: Vec<(f64, f64)> = records.iter().map(|r| r.coordinates()).collect();
        info!(%dataset_id, points = coordinates.len(), "processing dataset");
        let mut report = analyze_patterns(&coordinates);
        if let Value::Object(map) = &mut report {
            map.insert("dataset_id".into(), json!(dataset_id));
        }
        Ok(report)
    }
}

/// Point count, bounding box and a naive density for `(lat, lon)` pairs.
pub fn analyze_patterns(coordinates: &[(f64, f64)]) -> Value {
    if coordinates.is_empty() {
        return json!({
            "point_count": 0,
            "analysis_type": "pattern_detection",
            "status": "no_data",
            "bounding_box": null,
            "density": 0.0,
        });
    }
    let (mut min_lat, mut max_lat) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut min_lon, mut max_lon) = (f64::INFINITY, f64::NEG_INFINITY);
    for &(lat, lon) in coordinates {
        min_lat = min_lat.min(lat);
        max_lat = max_lat.max(lat);
        min_lon = min_lon.min(lon);
        max_lon = max_lon.max(lon);
    }
    json!({
        "point_count": coordinates.len(),
        "analysis_type": "pattern_detection",
        "status": "completed",
        "bounding_box": {
            "min_lat": min_lat,
            "max_lat": max_lat,
            "min_lon": min_lon,
            "max_lon": max_lon,
        },
        "density": coordinates.len() as f64 / 100.0,
    })
}
