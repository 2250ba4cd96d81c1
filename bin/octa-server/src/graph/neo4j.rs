//! Neo4j over the HTTP transactional endpoint.
//!
//! Every query is a single auto-committed transaction:
//! `POST {uri}/db/{database}/tx/commit` with
//! `{"statements": [{"statement": ..., "parameters": ...}]}`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{GraphClient, GraphError, Row};

#[derive(Debug, Clone)]
pub struct Neo4jHttpClient {
    http: reqwest::Client,
    endpoint: String,
    user: String,
    password: String,
}

impl Neo4jHttpClient {
    pub fn new(
        uri: &str,
        database: &str,
        user: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, GraphError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GraphError::Unreachable(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: format!("{}/db/{database}/tx/commit", uri.trim_end_matches('/')),
            user: user.to_owned(),
            password: password.to_owned(),
        })
    }
}

#[derive(Serialize)]
struct Statements<'a> {
    statements: [Statement<'a>; 1],
}

#[derive(Serialize)]
struct Statement<'a> {
    statement: &'a str,
    parameters: Value,
}

#[derive(Deserialize)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<Neo4jError>,
}

#[derive(Deserialize)]
struct StatementResult {
    columns: Vec<String>,
    data: Vec<DataRow>,
}

#[derive(Deserialize)]
struct DataRow {
    row: Vec<Value>,
}

#[derive(Deserialize)]
struct Neo4jError {
    code: String,
    message: String,
}

#[async_trait]
impl GraphClient for Neo4jHttpClient {
    async fn query(&self, statement: &str, params: Value) -> Result<Vec<Row>, GraphError> {
        let parameters = match params {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        let body = Statements {
            statements: [Statement {
                statement,
                parameters,
            }],
        };

        let response = self
            .http
            .post(&self.endpoint)
            .basic_auth(&self.user, Some(&self.password))
            .json(&body)
            .send()
            .await
            .map_err(|e| GraphError::Unreachable(e.to_string()))?
            .error_for_status()
            .map_err(|e| GraphError::Unreachable(e.to_string()))?;

        let parsed: CommitResponse = response
            .json()
            .await
            .map_err(|e| GraphError::Protocol(e.to_string()))?;

        if let Some(err) = parsed.errors.into_iter().next() {
            return Err(GraphError::Query {
                code: err.code,
                message: err.message,
            });
        }

        let result = parsed
            .results
            .into_iter()
            .next()
            .ok_or_else(|| GraphError::Protocol("response carried no result".to_owned()))?;
        let rows: Vec<Row> = result
            .data
            .into_iter()
            .map(|data| result.columns.iter().cloned().zip(data.row).collect())
            .collect();
        debug!(rows = rows.len(), "graph query finished");
        Ok(rows)
    }
}
