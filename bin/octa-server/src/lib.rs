//! octa-server: HTTP API and workers for geospatial and network analysis
//! jobs.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod graph;
pub mod jobs;
pub mod middleware;
pub mod queue;
pub mod routes;
pub mod schemas;
pub mod services;
pub mod state;
