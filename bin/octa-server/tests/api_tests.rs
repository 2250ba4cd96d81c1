//! End-to-end tests over the full router with an in-process worker pool.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use octa_core::{MemoryQueue, WorkerConfig, WorkerPool};
use serde_json::{json, Value};
use tower::ServiceExt;

use octa_server::cache::{spatial_key, Cache, MemoryCache};
use octa_server::config::Config;
use octa_server::db::sqlite::SqliteStore;
use octa_server::graph::{GraphClient, GraphError, Row};
use octa_server::routes;
use octa_server::state::AppState;

/// Three nodes on a line, two of them in community 1.
struct LineGraph;

#[async_trait]
impl GraphClient for LineGraph {
    async fn query(&self, statement: &str, params: Value) -> Result<Vec<Row>, GraphError> {
        let rows = if statement.contains("shortestPath") {
            json!([{ "path": [params["start_node"], "b", params["end_node"]] }])
        } else if statement.contains("degree") {
            json!([{ "node": "b", "degree": 2 }, { "node": "a", "degree": 1 }, { "node": "c", "degree": 1 }])
        } else if statement.contains("community") {
            json!([{ "community": 1, "members": ["a", "b"] }])
        } else {
            json!([{ "nodes": 3, "edges": 2 }])
        };
        Ok(serde_json::from_value(rows).unwrap())
    }
}

struct DownGraph;

#[async_trait]
impl GraphClient for DownGraph {
    async fn query(&self, _: &str, _: Value) -> Result<Vec<Row>, GraphError> {
        Err(GraphError::Unreachable("connection refused".into()))
    }
}

struct Harness {
    app: Router,
    pool: WorkerPool,
    cache: Arc<MemoryCache>,
}

impl Harness {
    async fn new(graph: Arc<dyn GraphClient>) -> Self {
        let config = Config::from_lookup(|key| match key {
            "OCTA_STEP_DELAY_MS" => Some("0".to_owned()),
            "OCTA_DATABASE_URL" => Some("sqlite::memory:".to_owned()),
            _ => None,
        });
        let store = Arc::new(SqliteStore::connect(&config.database_url, 1).await.unwrap());
        let queue = Arc::new(MemoryQueue::new(64, Duration::from_millis(5)));
        let cache = Arc::new(MemoryCache::new());
        let state = Arc::new(AppState::new(
            config,
            store,
            queue.clone(),
            cache.clone(),
            graph,
        ));
        let pool = WorkerPool::start(
            &WorkerConfig {
                concurrency: 2,
                error_backoff: Duration::from_millis(10),
            },
            Arc::clone(&state.store),
            queue,
            Arc::new(state.job_registry()),
        );
        Self {
            app: routes::build(state),
            pool,
            cache,
        }
    }

    async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let response = self
            .app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, None).await
    }

    async fn post(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::POST, uri, None).await
    }

    async fn create_point(&self, name: &str, latitude: f64, longitude: f64) -> i64 {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/v1/spatial/spatial-data",
                Some(json!({
                    "name": name,
                    "latitude": latitude,
                    "longitude": longitude,
                    "properties": { "kind": "sensor" },
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["id"].as_i64().unwrap()
    }

    /// Poll the status endpoint until the job reaches a terminal state.
    async fn wait_terminal(&self, job_id: &str) -> Value {
        for _ in 0..200 {
            let (status, body) = self.get(&format!("/api/v1/tasks/task-status/{job_id}")).await;
            assert_eq!(status, StatusCode::OK);
            if body["state"] == "succeeded" || body["state"] == "failed" {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {job_id} did not finish");
    }
}

#[tokio::test]
async fn meta_endpoints_respond() {
    let h = Harness::new(Arc::new(LineGraph)).await;

    let (status, body) = h.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    for root in ["/api/v1", "/api/v1/"] {
        let (status, body) = h.get(root).await;
        assert_eq!(status, StatusCode::OK, "{root}");
        assert_eq!(body["message"], "OCTA API");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    let (_, body) = h.get("/api/v1/health").await;
    assert_eq!(body, json!({ "status": "healthy", "service": "OCTA API" }));

    let (status, doc) = h.get("/api-docs/openapi.json").await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/api/v1/tasks/process-dataset"].is_object());
    assert!(doc["paths"]["/api/v1/tasks/task-status/{job_id}"].is_object());
    h.pool.shutdown().await;
}

#[tokio::test]
async fn malformed_requests_get_json_errors() {
    let h = Harness::new(Arc::new(LineGraph)).await;

    let (status, body) = h.post("/api/v1/network/shortest-path?end_node=c").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("start_node"), "{body}");

    let (status, body) = h.get("/api/v1/network/centrality").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("network_id"), "{body}");

    let (status, body) = h.get("/api/v1/spatial/spatial-data/within?minx=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("miny"), "{body}");

    let (status, body) = h.get("/api/v1/spatial/spatial-data?limit=many").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string(), "{body}");

    let (status, body) = h.get("/api/v1/spatial/spatial-data/abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("abc"), "{body}");

    let (status, body) = h.get("/api/v1/tasks/detect-hotspots?radius_km=wide").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string(), "{body}");

    let (status, body) = h
        .send(
            Method::POST,
            "/api/v1/spatial/spatial-data",
            Some(json!({ "name": "no coordinates" })),
        )
        .await;
    assert!(status.is_client_error());
    assert!(body["error"].as_str().unwrap().contains("latitude"), "{body}");

    h.pool.shutdown().await;
}

#[tokio::test]
async fn dataset_job_runs_to_success() {
    let h = Harness::new(Arc::new(LineGraph)).await;
    h.create_point("north", 10.0, 20.0).await;
    h.create_point("south", -10.0, 30.0).await;

    let (status, receipt) = h.post("/api/v1/tasks/process-dataset?dataset_id=ds-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["state"], "pending");
    let job_id = receipt["job_id"].as_str().unwrap().to_owned();

    let done = h.wait_terminal(&job_id).await;
    assert_eq!(done["state"], "succeeded", "{done}");
    assert_eq!(done["job_id"], job_id.as_str());
    assert_eq!(done["result"]["dataset_id"], "ds-1");
    assert_eq!(done["result"]["processed_points"], 2);
    assert_eq!(done["result"]["bounding_box"]["min_lat"], -10.0);
    assert_eq!(done["result"]["unique_property_keys"], 1);

    let (_, listed) = h.get("/api/v1/tasks?kind=dataset-processing").await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["job_id"], job_id.as_str());
    assert_eq!(listed[0]["state"], "succeeded");
    h.pool.shutdown().await;
}

#[tokio::test]
async fn missing_identifiers_are_rejected_without_creating_jobs() {
    let h = Harness::new(Arc::new(LineGraph)).await;

    let (status, body) = h.post("/api/v1/tasks/process-dataset").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("dataset_id"));

    let (status, _) = h.post("/api/v1/tasks/calculate-network-metrics?network_id=%20").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h.post("/api/v1/tasks/cache-spatial-data/abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, listed) = h.get("/api/v1/tasks").await;
    assert_eq!(listed, json!([]));
    h.pool.shutdown().await;
}

#[tokio::test]
async fn unknown_job_and_kind() {
    let h = Harness::new(Arc::new(LineGraph)).await;

    let (status, body) = h.get("/api/v1/tasks/task-status/no-such-job").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let (status, _) = h.get("/api/v1/tasks?kind=video-render").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    h.pool.shutdown().await;
}

#[tokio::test]
async fn network_job_reports_metrics() {
    let h = Harness::new(Arc::new(LineGraph)).await;

    let (_, receipt) = h.post("/api/v1/tasks/calculate-network-metrics?network_id=roads").await;
    let done = h.wait_terminal(receipt["job_id"].as_str().unwrap()).await;
    assert_eq!(done["state"], "succeeded", "{done}");
    let result = &done["result"];
    assert_eq!(result["network_id"], "roads");
    assert_eq!(result["metrics"]["nodes"], 3);
    assert_eq!(result["metrics"]["edges"], 2);
    let density = result["metrics"]["density"].as_f64().unwrap();
    assert!((density - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(result["centrality_scores"][0]["node"], "b");
    assert_eq!(result["communities"][0]["members"], json!(["a", "b"]));
    h.pool.shutdown().await;
}

#[tokio::test]
async fn unreachable_graph_fails_the_job_and_the_request() {
    let h = Harness::new(Arc::new(DownGraph)).await;

    let (status, receipt) = h.post("/api/v1/tasks/calculate-network-metrics?network_id=roads").await;
    assert_eq!(status, StatusCode::OK);
    let done = h.wait_terminal(receipt["job_id"].as_str().unwrap()).await;
    assert_eq!(done["state"], "failed");
    assert!(done["error"].as_str().unwrap().contains("graph database unreachable"));

    let (status, body) = h.get("/api/v1/network/centrality?network_id=roads").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("unreachable"));
    h.pool.shutdown().await;
}

#[tokio::test]
async fn network_queries_pass_through() {
    let h = Harness::new(Arc::new(LineGraph)).await;

    let (status, body) = h.post("/api/v1/network/shortest-path?start_node=a&end_node=c").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["path"][0]["path"], json!(["a", "b", "c"]));

    let (status, body) = h.get("/api/v1/network/centrality?network_id=roads").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["network_id"], "roads");
    assert_eq!(body["centrality_scores"].as_array().unwrap().len(), 3);

    let (status, _) = h.post("/api/v1/network/shortest-path?start_node=&end_node=c").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    h.pool.shutdown().await;
}

#[tokio::test]
async fn cache_warm_job_fills_the_cache() {
    let h = Harness::new(Arc::new(LineGraph)).await;
    let id = h.create_point("depot", 51.5, -0.125).await;

    let (_, receipt) = h.post(&format!("/api/v1/tasks/cache-spatial-data/{id}")).await;
    let done = h.wait_terminal(receipt["job_id"].as_str().unwrap()).await;
    assert_eq!(done["state"], "succeeded", "{done}");
    assert_eq!(done["result"]["key"], format!("spatial_data:{id}"));
    assert_eq!(done["result"]["ttl_secs"], 1800);

    let (status, record) = h.get(&format!("/api/v1/spatial/spatial-data/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record, done["result"]["data"]);

    let (_, receipt) = h.post("/api/v1/tasks/cache-spatial-data/9999").await;
    let done = h.wait_terminal(receipt["job_id"].as_str().unwrap()).await;
    assert_eq!(done["state"], "failed");
    assert!(done["error"].as_str().unwrap().contains("spatial record 9999"));
    h.pool.shutdown().await;
}

#[tokio::test]
async fn malformed_cached_record_is_evicted() {
    let h = Harness::new(Arc::new(LineGraph)).await;
    let id = h.create_point("depot", 51.5, -0.125).await;
    let key = spatial_key(id);
    h.cache
        .set(&key, &json!({ "id": "not-a-record" }), Duration::from_secs(60))
        .await
        .unwrap();

    let (status, record) = h.get(&format!("/api/v1/spatial/spatial-data/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["name"], "depot");
    assert!(!h.cache.exists(&key).await.unwrap());
    h.pool.shutdown().await;
}

#[tokio::test]
async fn spatial_records_crud() {
    let h = Harness::new(Arc::new(LineGraph)).await;
    let inside = h.create_point("inside", 5.0, 5.0).await;
    h.create_point("outside", 50.0, 50.0).await;

    let (status, _) = h
        .send(
            Method::POST,
            "/api/v1/spatial/spatial-data",
            Some(json!({ "name": "bad", "latitude": 91.0, "longitude": 0.0 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h
        .send(
            Method::POST,
            "/api/v1/spatial/spatial-data",
            Some(json!({ "name": "   ", "latitude": 0.0, "longitude": 0.0 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, page) = h.get("/api/v1/spatial/spatial-data?skip=1&limit=10").await;
    assert_eq!(page.as_array().unwrap().len(), 1);
    assert_eq!(page[0]["name"], "outside");

    let (_, within) = h
        .get("/api/v1/spatial/spatial-data/within?minx=0&miny=0&maxx=10&maxy=10")
        .await;
    assert_eq!(within.as_array().unwrap().len(), 1);
    assert_eq!(within[0]["id"], inside);
    assert_eq!(within[0]["coordinates"], json!([5.0, 5.0]));

    let (status, _) = h
        .get("/api/v1/spatial/spatial-data/within?minx=10&miny=0&maxx=0&maxy=10")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h.get("/api/v1/spatial/spatial-data/4242").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    h.pool.shutdown().await;
}

#[tokio::test]
async fn synchronous_analyses() {
    let h = Harness::new(Arc::new(LineGraph)).await;

    let (_, stats) = h.get("/api/v1/tasks/spatial-statistics").await;
    assert_eq!(stats["status"], "no_data");

    h.create_point("a", 1.0, 2.0).await;
    let (_, stats) = h.get("/api/v1/tasks/spatial-statistics").await;
    assert_eq!(stats["total_points"], 1);
    assert_eq!(stats["property_keys"], json!(["kind"]));

    let (_, hotspots) = h.get("/api/v1/tasks/detect-hotspots").await;
    assert_eq!(hotspots["radius_km"], 1.0);
    assert_eq!(hotspots["hotspots"][0]["id"], "hotspot_0");

    let (status, _) = h.get("/api/v1/tasks/detect-hotspots?radius_km=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    h.pool.shutdown().await;
}
