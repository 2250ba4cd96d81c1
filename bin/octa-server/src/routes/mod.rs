//! Axum router construction.
//!
//! [`build`] assembles the complete application router:
//! - top-level `/health` and the `/api/v1/` banner
//! - the REST API nested under `/api/v1`
//! - the OpenAPI document at `/api-docs/openapi.json` (disable with
//!   `OCTA_ENABLE_OPENAPI=false`)
//! - CORS and per-request trace-ID middleware

pub mod doc;
mod meta;
mod v1;

use std::sync::Arc;

use axum::routing::get;
use axum::{middleware, Json, Router};
use tower::ServiceBuilder;

use crate::middleware::{cors, trace};
use crate::state::AppState;

// ── Router builder ────────────────────────────────────────────────────────────

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .merge(meta::router())
        .nest("/api/v1", v1::router());

    if state.config.enable_openapi {
        let api_doc = doc::get_docs();
        app = app.route(
            "/api-docs/openapi.json",
            get(move || {
                let api_doc = api_doc.clone();
                async move { Json(api_doc) }
            }),
        );
    }

    app
        // Outermost layers execute first on the way in.
        .layer(ServiceBuilder::new().layer(cors::cors_layer(&state.config)))
        .layer(middleware::from_fn(trace::trace_middleware))
        .with_state(state)
}
