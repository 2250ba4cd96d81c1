//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors are automatically converted
//! to a `{"error": message}` HTTP response with an appropriate status code.
//!
//! Internal errors (Database, Store, Internal) are logged with full detail
//! but only a generic message is returned to the caller so that SQL, file
//! paths or broker addresses never leak to clients.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use octa_core::JobError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::graph::GraphError;

/// All errors that can occur in the octa-server request lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Propagated from the SQLite store.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The caller referenced a resource that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// An extractor could not read the request (query string, path segment
    /// or body); carries the extractor's own status code.
    #[error("rejected request: {message}")]
    Rejected { status: StatusCode, message: String },

    /// A collaborator (task queue, graph database) is unavailable.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// An unclassified internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message) = match &self {
            // Client-facing errors: expose the message directly.
            ServerError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ServerError::Rejected { status, message } => (*status, message.clone()),
            ServerError::ServiceUnavailable(m) => {
                error!(message = %m, "collaborator unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, m.clone())
            }

            // Internal errors: log the full detail, return a generic message.
            ServerError::Database(e) => {
                error!(error = %e, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
            ServerError::Internal(m) => {
                error!(message = %m, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
        };
        (status, Json(json!({ "error": client_message }))).into_response()
    }
}

impl From<JobError> for ServerError {
    fn from(e: JobError) -> Self {
        match e {
            JobError::Validation(m) => ServerError::BadRequest(m),
            JobError::NotFound(m) => ServerError::NotFound(m),
            JobError::Enqueue(q) => ServerError::ServiceUnavailable(format!(
                "job could not be queued: {q}"
            )),
            other @ (JobError::DomainExecution(_) | JobError::Store(_)) => {
                ServerError::Internal(other.to_string())
            }
        }
    }
}

impl From<GraphError> for ServerError {
    fn from(e: GraphError) -> Self {
        match e {
            GraphError::Unreachable(_) | GraphError::PoolClosed => {
                ServerError::ServiceUnavailable(e.to_string())
            }
            GraphError::Query { .. } | GraphError::Protocol(_) => {
                ServerError::Internal(e.to_string())
            }
        }
    }
}

macro_rules! from_rejection {
    ($($rejection:ty),+) => {$(
        impl From<$rejection> for ServerError {
            fn from(rejection: $rejection) -> Self {
                ServerError::Rejected {
                    status: rejection.status(),
                    message: rejection.body_text(),
                }
            }
        }
    )+};
}

from_rejection!(QueryRejection, PathRejection, JsonRejection);

impl From<validator::ValidationErrors> for ServerError {
    fn from(e: validator::ValidationErrors) -> Self {
        ServerError::BadRequest(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use octa_core::{QueueError, StoreError};

    async fn render(e: ServerError) -> (StatusCode, serde_json::Value) {
        let response = e.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn job_errors_map_to_status_codes() {
        let (status, body) = render(JobError::Validation("dataset_id must not be empty".into()).into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "dataset_id must not be empty");

        let (status, _) = render(JobError::NotFound("job x not found".into()).into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = render(JobError::Enqueue(QueueError::Closed).into()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().unwrap().contains("could not be queued"));
    }

    #[tokio::test]
    async fn internal_details_are_hidden() {
        let e: ServerError = JobError::Store(StoreError::Backend("disk I/O error at /var/db".into())).into();
        let (status, body) = render(e).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "internal server error");
    }

    #[tokio::test]
    async fn unreachable_graph_is_unavailable() {
        let (status, body) = render(GraphError::Unreachable("connection refused".into()).into()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().unwrap().starts_with("graph database unreachable"));
    }

    #[tokio::test]
    async fn query_rejections_render_as_json() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Nodes {
            start_node: String,
            end_node: String,
        }

        let uri: axum::http::Uri = "/network/shortest-path?end_node=c".parse().unwrap();
        let rejection = axum::extract::Query::<Nodes>::try_from_uri(&uri).unwrap_err();
        let (status, body) = render(rejection.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("start_node"));
    }
}
