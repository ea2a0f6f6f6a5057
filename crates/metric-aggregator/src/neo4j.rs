//! Neo4j driver over the HTTP transactional endpoint.
//!
//! A batch is sent as one `POST /db/{database}/tx/commit` carrying one
//! statement per query, so the store answers the whole batch in a single
//! round trip. Concurrent calls are bounded by a permit pool sized to
//! `max_connections`; a permit is held for exactly the duration of one call.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, SemaphorePermit};
use url::Url;

use crate::driver::{GraphDriver, ResultSet};
use crate::error::StoreError;
use crate::query::ParameterizedQuery;

const CONNECTIVITY_STATEMENT: &str = "RETURN 1";

#[derive(Debug, Clone)]
pub struct Neo4jConfig {
    /// Base URL of the Neo4j HTTP API, e.g. `http://localhost:7474`.
    pub endpoint: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub max_connections: usize,
    /// How long a call waits for a free connection before failing.
    pub acquire_timeout: Duration,
    /// Upper bound on one HTTP round trip.
    pub request_timeout: Duration,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:7474".to_string(),
            database: "neo4j".to_string(),
            username: None,
            password: None,
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(12),
        }
    }
}

pub struct Neo4jHttpDriver {
    client: Client,
    commit_url: Url,
    auth: Option<(String, Option<String>)>,
    permits: Arc<Semaphore>,
    acquire_timeout: Duration,
}

#[derive(Serialize)]
struct TxRequest<'a, T: Serialize> {
    statements: &'a [T],
}

#[derive(Serialize)]
struct BareStatement {
    statement: &'static str,
}

#[derive(Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Deserialize)]
struct TxResult {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<TxRow>,
}

#[derive(Deserialize)]
struct TxRow {
    row: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct TxError {
    code: String,
    message: String,
}

/// Builds `{endpoint}/db/{database}/tx/commit`.
pub fn commit_url(endpoint: &str, database: &str) -> Result<Url, StoreError> {
    let base = Url::parse(endpoint)
        .map_err(|e| StoreError::Connection(format!("invalid Neo4j endpoint `{endpoint}`: {e}")))?;
    match base.scheme() {
        "http" | "https" => {}
        other => {
            return Err(StoreError::Connection(format!(
                "unsupported Neo4j endpoint scheme `{other}` (expected http or https)"
            )))
        }
    }
    let joined = format!(
        "{}/db/{}/tx/commit",
        base.as_str().trim_end_matches('/'),
        database
    );
    Url::parse(&joined)
        .map_err(|e| StoreError::Connection(format!("invalid Neo4j commit URL `{joined}`: {e}")))
}

/// Decodes a transactional endpoint response body.
pub fn decode_tx_response(body: &[u8]) -> Result<Vec<ResultSet>, StoreError> {
    let resp: TxResponse = serde_json::from_slice(body)
        .map_err(|e| StoreError::ResultShape(format!("unreadable Neo4j response: {e}")))?;

    if !resp.errors.is_empty() {
        let msg = resp
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.code, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(StoreError::Execution(msg));
    }

    Ok(resp
        .results
        .into_iter()
        .map(|r| ResultSet {
            columns: r.columns,
            rows: r.data.into_iter().map(|d| d.row).collect(),
        })
        .collect())
}

fn classify(err: reqwest::Error) -> StoreError {
    if err.is_connect() {
        StoreError::Connection(err.to_string())
    } else if err.is_timeout() {
        StoreError::Execution(format!("Neo4j request timed out: {err}"))
    } else {
        StoreError::Execution(err.to_string())
    }
}

impl Neo4jHttpDriver {
    pub fn new(config: &Neo4jConfig) -> Result<Self, StoreError> {
        let commit_url = commit_url(&config.endpoint, &config.database)?;
        let max_connections = config.max_connections.max(1);
        let client = Client::builder()
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(max_connections)
            .build()
            .map_err(|e| StoreError::Connection(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            commit_url,
            auth: config
                .username
                .clone()
                .map(|u| (u, config.password.clone())),
            permits: Arc::new(Semaphore::new(max_connections)),
            acquire_timeout: config.acquire_timeout,
        })
    }

    async fn acquire(&self) -> Result<SemaphorePermit<'_>, StoreError> {
        match tokio::time::timeout(self.acquire_timeout, self.permits.acquire()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(StoreError::Connection("connection pool is closed".to_string())),
            Err(_) => Err(StoreError::Connection(format!(
                "no Neo4j connection available within {:?}",
                self.acquire_timeout
            ))),
        }
    }

    async fn commit<T: Serialize + Sync>(&self, statements: &[T]) -> Result<Vec<ResultSet>, StoreError> {
        let _permit = self.acquire().await?;

        let mut req = self
            .client
            .post(self.commit_url.clone())
            .header(ACCEPT, "application/json;charset=UTF-8")
            .json(&TxRequest { statements });
        if let Some((user, pass)) = &self.auth {
            req = req.basic_auth(user, pass.as_ref());
        }

        let resp = req.send().await.map_err(classify)?;
        let status = resp.status();
        let body = resp.bytes().await.map_err(classify)?;
        if !status.is_success() {
            return Err(StoreError::Execution(format!(
                "Neo4j answered HTTP {status}: {}",
                String::from_utf8_lossy(&body).trim()
            )));
        }

        let results = decode_tx_response(&body)?;
        tracing::debug!(
            statements = statements.len(),
            results = results.len(),
            "neo4j transaction committed"
        );
        Ok(results)
    }
}

#[async_trait]
impl GraphDriver for Neo4jHttpDriver {
    async fn run_batch(&self, queries: &[ParameterizedQuery]) -> Result<Vec<ResultSet>, StoreError> {
        self.commit(queries).await
    }

    async fn verify_connectivity(&self) -> Result<(), StoreError> {
        let results = self
            .commit(&[BareStatement {
                statement: CONNECTIVITY_STATEMENT,
            }])
            .await?;
        if results.len() != 1 {
            return Err(StoreError::ResultShape(format!(
                "connectivity check expected 1 result, got {}",
                results.len()
            )));
        }
        Ok(())
    }
}
