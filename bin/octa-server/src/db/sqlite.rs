//! SQLite implementation of [`JobStore`] and [`SpatialStore`].
//!
//! Uses [`sqlx`] with the `sqlite` feature.  Migrations are run automatically
//! on startup via [`SqliteStore::connect`].
//!
//! # Migrations path
//!
//! `sqlx::migrate!("./migrations")` resolves the path at compile time
//! relative to `CARGO_MANIFEST_DIR`, so the directory is embedded into the
//! binary.  The database file location is determined at runtime by
//! `OCTA_DATABASE_URL`.
//!
//! # Queries
//!
//! The `sqlx::query` (runtime-verified) form is used so that no
//! `DATABASE_URL` environment variable is needed at compile time.  Every job
//! transition is a single conditional `UPDATE`; `rows_affected() == 0` means
//! the precondition did not hold and the current row is read back to tell a
//! missing job from a conflicting one.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use octa_core::{Job, JobKind, JobState, JobStore, Progress, StoreError};
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::warn;

use super::{Envelope, NewSpatialRecord, SpatialRecord, SpatialStore};

/// SQLite-backed job and spatial record store.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the SQLite database at `url` and run pending
    /// migrations.
    ///
    /// `url` should be a sqlx-compatible SQLite URL, e.g. `"sqlite://octa.db"`
    /// or `"sqlite::memory:"` for tests.  An in-memory database lives as long
    /// as its single pooled connection, so the pool is pinned to one
    /// connection that never expires.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(max_connections.max(1))
                .connect_with(options)
                .await?
        };
        // Path is resolved relative to CARGO_MANIFEST_DIR at compile time.
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Current state of a job, used to classify a rejected transition.
    async fn rejection(&self, id: &str) -> StoreError {
        match sqlx::query_scalar::<_, String>("SELECT state FROM jobs WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
        {
            Ok(None) => StoreError::NotFound(id.to_owned()),
            Ok(Some(state)) => match state.parse::<JobState>() {
                Ok(state) => StoreError::Conflict {
                    id: id.to_owned(),
                    state,
                },
                Err(_) => StoreError::Backend(format!("job {id} has unknown state '{state}'")),
            },
            Err(e) => backend(e),
        }
    }

    async fn fetch_job(&self, id: &str) -> Result<Option<Job>, StoreError> {
        let row: Option<JobRow> = sqlx::query_as(
            "SELECT id, kind, payload, state, progress_current, progress_total, progress_step, \
             result, error, created_at, updated_at FROM jobs WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(Job::try_from).transpose()
    }
}

// ── jobs ─────────────────────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    kind: String,
    payload: String,
    state: String,
    progress_current: Option<i64>,
    progress_total: Option<i64>,
    progress_step: Option<String>,
    result: Option<String>,
    error: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let kind = row
            .kind
            .parse::<JobKind>()
            .map_err(|_| StoreError::Backend(format!("job {} has unknown kind '{}'", row.id, row.kind)))?;
        let state = row
            .state
            .parse::<JobState>()
            .map_err(|_| StoreError::Backend(format!("job {} has unknown state '{}'", row.id, row.state)))?;
        let payload = serde_json::from_str(&row.payload)
            .map_err(|e| StoreError::Backend(format!("job {} payload is not JSON: {e}", row.id)))?;
        let progress = match (row.progress_current, row.progress_total) {
            (Some(current), Some(total)) => Some(Progress {
                current: u32::try_from(current).unwrap_or(0),
                total: u32::try_from(total).unwrap_or(0),
                step: row.progress_step.unwrap_or_default(),
            }),
            _ => None,
        };
        let result = row
            .result
            .map(|s| serde_json::from_str(&s).unwrap_or(Value::String(s)));
        Ok(Job {
            created_at: parse_timestamp(&row.created_at, "created_at"),
            updated_at: parse_timestamp(&row.updated_at, "updated_at"),
            id: row.id,
            kind,
            payload,
            state,
            progress,
            result,
            error: row.error,
        })
    }
}

impl JobStore for SqliteStore {
    async fn insert(&self, job: Job) -> Result<(), StoreError> {
        let result = job.result.as_ref().map(Value::to_string);
        let (current, total, step) = match &job.progress {
            Some(p) => (Some(i64::from(p.current)), Some(i64::from(p.total)), Some(p.step.as_str())),
            None => (None, None, None),
        };
        sqlx::query(
            "INSERT INTO jobs (id, kind, payload, state, progress_current, progress_total, \
             progress_step, result, error, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )
        .bind(&job.id)
        .bind(job.kind.as_ref())
        .bind(job.payload.to_string())
        .bind(job.state.as_ref())
        .bind(current)
        .bind(total)
        .bind(step)
        .bind(result)
        .bind(&job.error)
        .bind(timestamp(job.created_at))
        .bind(timestamp(job.updated_at))
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Job>, StoreError> {
        self.fetch_job(id).await
    }

    async fn list(&self, kind: Option<JobKind>) -> Result<Vec<Job>, StoreError> {
        const COLUMNS: &str = "SELECT id, kind, payload, state, progress_current, progress_total, \
                               progress_step, result, error, created_at, updated_at FROM jobs";
        let rows: Vec<JobRow> = match kind {
            Some(kind) => {
                sqlx::query_as(&format!(
                    "{COLUMNS} WHERE kind = ?1 ORDER BY created_at DESC, rowid DESC"
                ))
                .bind(kind.as_ref())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as(&format!("{COLUMNS} ORDER BY created_at DESC, rowid DESC"))
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(backend)?;
        rows.into_iter().map(Job::try_from).collect()
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        let done = sqlx::query("DELETE FROM jobs WHERE id = ?1 AND state = 'pending'")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if done.rows_affected() == 0 {
            return Err(self.rejection(id).await);
        }
        Ok(())
    }

    async fn claim(&self, id: &str, total_steps: u32) -> Result<Job, StoreError> {
        let started = Progress::started(total_steps);
        let done = sqlx::query(
            "UPDATE jobs SET state = 'running', progress_current = ?1, progress_total = ?2, \
             progress_step = ?3, updated_at = ?4 WHERE id = ?5 AND state = 'pending'",
        )
        .bind(i64::from(started.current))
        .bind(i64::from(started.total))
        .bind(&started.step)
        .bind(timestamp(Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        if done.rows_affected() == 0 {
            return Err(self.rejection(id).await);
        }
        self.fetch_job(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))
    }

    async fn record_progress(&self, id: &str, progress: Progress) -> Result<(), StoreError> {
        let done = sqlx::query(
            "UPDATE jobs SET progress_current = ?1, progress_total = ?2, progress_step = ?3, \
             updated_at = ?4 \
             WHERE id = ?5 AND state = 'running' AND COALESCE(progress_current, 0) <= ?1",
        )
        .bind(i64::from(progress.current))
        .bind(i64::from(progress.total))
        .bind(&progress.step)
        .bind(timestamp(Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        if done.rows_affected() == 0 {
            return Err(self.rejection(id).await);
        }
        Ok(())
    }

    async fn complete(&self, id: &str, result: Value) -> Result<(), StoreError> {
        let done = sqlx::query(
            "UPDATE jobs SET state = 'succeeded', result = ?1, error = NULL, updated_at = ?2 \
             WHERE id = ?3 AND state = 'running'",
        )
        .bind(result.to_string())
        .bind(timestamp(Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        if done.rows_affected() == 0 {
            return Err(self.rejection(id).await);
        }
        Ok(())
    }

    async fn fail(&self, id: &str, error: &str) -> Result<(), StoreError> {
        let done = sqlx::query(
            "UPDATE jobs SET state = 'failed', error = ?1, result = NULL, updated_at = ?2 \
             WHERE id = ?3 AND state = 'running'",
        )
        .bind(error)
        .bind(timestamp(Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        if done.rows_affected() == 0 {
            return Err(self.rejection(id).await);
        }
        Ok(())
    }
}

// ── spatial records ──────────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct SpatialRow {
    id: i64,
    name: String,
    latitude: f64,
    longitude: f64,
    properties: String,
    created_at: String,
}

impl From<SpatialRow> for SpatialRecord {
    fn from(row: SpatialRow) -> Self {
        let properties = match serde_json::from_str::<Value>(&row.properties) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                warn!(id = row.id, "spatial record properties are not a JSON object; using {{}}");
                Map::new()
            }
        };
        SpatialRecord {
            id: row.id,
            name: row.name,
            latitude: row.latitude,
            longitude: row.longitude,
            properties,
            created_at: parse_timestamp(&row.created_at, "created_at"),
        }
    }
}

const SPATIAL_COLUMNS: &str =
    "SELECT id, name, latitude, longitude, properties, created_at FROM spatial_data";

impl SpatialStore for SqliteStore {
    async fn insert_spatial(&self, record: NewSpatialRecord) -> Result<SpatialRecord, sqlx::Error> {
        let created_at = Utc::now();
        let properties = Value::Object(record.properties.clone()).to_string();
        let done = sqlx::query(
            "INSERT INTO spatial_data (name, latitude, longitude, properties, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&record.name)
        .bind(record.latitude)
        .bind(record.longitude)
        .bind(&properties)
        .bind(timestamp(created_at))
        .execute(&self.pool)
        .await?;
        Ok(SpatialRecord {
            id: done.last_insert_rowid(),
            name: record.name,
            latitude: record.latitude,
            longitude: record.longitude,
            properties: record.properties,
            created_at,
        })
    }

    async fn get_spatial(&self, id: i64) -> Result<Option<SpatialRecord>, sqlx::Error> {
        let row: Option<SpatialRow> = sqlx::query_as(&format!("{SPATIAL_COLUMNS} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(SpatialRecord::from))
    }

    async fn list_spatial(&self, skip: i64, limit: i64) -> Result<Vec<SpatialRecord>, sqlx::Error> {
        let rows: Vec<SpatialRow> =
            sqlx::query_as(&format!("{SPATIAL_COLUMNS} ORDER BY id LIMIT ?1 OFFSET ?2"))
                .bind(limit.max(0))
                .bind(skip.max(0))
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(SpatialRecord::from).collect())
    }

    async fn spatial_within(&self, envelope: Envelope) -> Result<Vec<SpatialRecord>, sqlx::Error> {
        let rows: Vec<SpatialRow> = sqlx::query_as(&format!(
            "{SPATIAL_COLUMNS} WHERE longitude BETWEEN ?1 AND ?3 AND latitude BETWEEN ?2 AND ?4 \
             ORDER BY id"
        ))
        .bind(envelope.min_x)
        .bind(envelope.min_y)
        .bind(envelope.max_x)
        .bind(envelope.max_y)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SpatialRecord::from).collect())
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Fixed-width RFC 3339 so lexical order matches chronological order.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str, column: &str) -> DateTime<Utc> {
    raw.parse().unwrap_or_else(|e: chrono::ParseError| {
        warn!(raw = %raw, column, error = %e, "failed to parse timestamp; using now");
        Utc::now()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:", 1).await.unwrap()
    }

    async fn pending(store: &SqliteStore, kind: JobKind) -> String {
        let job = Job::pending(kind, json!({ "dataset_id": "ds-42" }));
        let id = job.id.clone();
        store.insert(job).await.unwrap();
        id
    }

    // ── jobs ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn inserted_job_round_trips() {
        let store = store().await;
        let id = pending(&store, JobKind::DatasetProcessing).await;
        let job = store.get(&id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.kind, JobKind::DatasetProcessing);
        assert_eq!(job.payload, json!({ "dataset_id": "ds-42" }));
        assert!(job.progress.is_none());
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_claims_on_separate_connections_pick_one_winner() {
        let dir = std::env::temp_dir().join(format!("octa-claims-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let url = format!("sqlite://{}", dir.join("jobs.db").display());
        let store = SqliteStore::connect(&url, 2).await.unwrap();

        for _ in 0..10 {
            let id = pending(&store, JobKind::NetworkMetrics).await;
            let (a, b) = tokio::join!(store.claim(&id, 100), store.claim(&id, 100));
            let results = [a, b];
            assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
            assert!(results.iter().any(|r| matches!(
                r,
                Err(StoreError::Conflict {
                    state: JobState::Running,
                    ..
                })
            )));
        }

        store.pool.close().await;
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn claim_is_first_wins() {
        let store = store().await;
        let id = pending(&store, JobKind::DatasetProcessing).await;
        let job = store.claim(&id, 100).await.unwrap();
        assert_eq!(job.state, JobState::Running);
        assert_eq!(job.progress.unwrap().current, 0);

        let err = store.claim(&id, 100).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict {
                state: JobState::Running,
                ..
            }
        ));
        assert!(matches!(
            store.claim("missing", 100).await.unwrap_err(),
            StoreError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn progress_is_monotonic() {
        let store = store().await;
        let id = pending(&store, JobKind::DatasetProcessing).await;
        store.claim(&id, 100).await.unwrap();
        let at = |current| Progress {
            current,
            total: 100,
            step: format!("step {current}"),
        };
        store.record_progress(&id, at(50)).await.unwrap();
        assert!(store.record_progress(&id, at(25)).await.is_err());
        store.record_progress(&id, at(50)).await.unwrap();

        let job = store.get(&id).await.unwrap().unwrap();
        assert_eq!(job.progress.unwrap(), at(50));
    }

    #[tokio::test]
    async fn terminal_writes_are_final() {
        let store = store().await;
        let id = pending(&store, JobKind::NetworkMetrics).await;
        store.claim(&id, 100).await.unwrap();
        store.complete(&id, json!({ "ok": true })).await.unwrap();

        assert!(matches!(
            store.fail(&id, "late").await.unwrap_err(),
            StoreError::Conflict {
                state: JobState::Succeeded,
                ..
            }
        ));
        let job = store.get(&id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Succeeded);
        assert_eq!(job.result, Some(json!({ "ok": true })));
        assert!(job.error.is_none());
    }

    #[tokio::test]
    async fn failure_stores_message_only() {
        let store = store().await;
        let id = pending(&store, JobKind::NetworkMetrics).await;
        store.claim(&id, 100).await.unwrap();
        store.fail(&id, "graph database unreachable").await.unwrap();
        let job = store.get(&id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.error.as_deref(), Some("graph database unreachable"));
        assert!(job.result.is_none());
    }

    #[tokio::test]
    async fn remove_only_rolls_back_pending() {
        let store = store().await;
        let id = pending(&store, JobKind::CacheWarm).await;
        store.remove(&id).await.unwrap();
        assert!(store.get(&id).await.unwrap().is_none());

        let id = pending(&store, JobKind::CacheWarm).await;
        store.claim(&id, 100).await.unwrap();
        assert!(store.remove(&id).await.is_err());
    }

    #[tokio::test]
    async fn list_is_newest_first_and_filterable() {
        let store = store().await;
        let first = pending(&store, JobKind::DatasetProcessing).await;
        let second = pending(&store, JobKind::NetworkMetrics).await;
        let third = pending(&store, JobKind::DatasetProcessing).await;

        let all: Vec<String> = store.list(None).await.unwrap().into_iter().map(|j| j.id).collect();
        assert_eq!(all, vec![third.clone(), second, first.clone()]);

        let datasets: Vec<String> = store
            .list(Some(JobKind::DatasetProcessing))
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.id)
            .collect();
        assert_eq!(datasets, vec![third, first]);
    }

    // ── spatial records ─────────────────────────────────────────────────────

    fn point(name: &str, latitude: f64, longitude: f64) -> NewSpatialRecord {
        let mut properties = Map::new();
        properties.insert("source".into(), json!("survey"));
        NewSpatialRecord {
            name: name.to_owned(),
            latitude,
            longitude,
            properties,
        }
    }

    #[tokio::test]
    async fn spatial_records_round_trip() {
        let store = store().await;
        let created = store.insert_spatial(point("depot", 52.52, 13.405)).await.unwrap();
        assert!(created.id > 0);
        let fetched = store.get_spatial(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "depot");
        assert_eq!(fetched.coordinates(), (52.52, 13.405));
        assert_eq!(fetched.properties["source"], "survey");
        assert!(store.get_spatial(created.id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn spatial_listing_paginates() {
        let store = store().await;
        for i in 0..5 {
            store
                .insert_spatial(point(&format!("p{i}"), 10.0 + f64::from(i), 20.0))
                .await
                .unwrap();
        }
        let page: Vec<String> = store
            .list_spatial(1, 2)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(page, vec!["p1", "p2"]);
    }

    #[tokio::test]
    async fn envelope_query_is_inclusive() {
        let store = store().await;
        store.insert_spatial(point("inside", 10.0, 20.0)).await.unwrap();
        store.insert_spatial(point("edge", 12.0, 22.0)).await.unwrap();
        store.insert_spatial(point("outside", 30.0, 20.0)).await.unwrap();

        let envelope = Envelope {
            min_x: 19.0,
            min_y: 9.0,
            max_x: 22.0,
            max_y: 12.0,
        };
        let names: Vec<String> = store
            .spatial_within(envelope)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["inside", "edge"]);
    }
}
