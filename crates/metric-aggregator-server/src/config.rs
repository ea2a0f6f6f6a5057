//! Command-line flags (with environment fallbacks) and the resolved server
//! configuration.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, ValueEnum};
use metric_aggregator::{Neo4jConfig, DEFAULT_RECENT_WINDOW};

pub(crate) const SYSTEM_CODE: &str = "neo4j-metric-aggregator";
pub(crate) const APP_DESCRIPTION: &str = "An app to compute metrics on Neo4j knowledge base";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum LogFormat {
    Json,
    Text,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "neo4j-metric-aggregator", version, about = APP_DESCRIPTION)]
pub(crate) struct Cli {
    /// System code of the application.
    #[arg(long, env = "APP_SYSTEM_CODE", default_value = SYSTEM_CODE)]
    pub app_system_code: String,

    /// Application name.
    #[arg(long, env = "APP_NAME", default_value = SYSTEM_CODE)]
    pub app_name: String,

    /// Port to listen on (`0` picks a free port; see `--ready-file`).
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Base URL of the Neo4j HTTP API.
    #[arg(long, env = "NEO4J_ENDPOINT", default_value = "http://localhost:7474")]
    pub neo4j_endpoint: String,

    /// Neo4j database name.
    #[arg(long, env = "NEO4J_DATABASE", default_value = "neo4j")]
    pub neo4j_database: String,

    #[arg(long, env = "NEO4J_USERNAME")]
    pub neo4j_username: Option<String>,

    #[arg(long, env = "NEO4J_PASSWORD", hide_env_values = true)]
    pub neo4j_password: Option<String>,

    /// Maximum concurrent connections to Neo4j.
    #[arg(long, env = "NEO4J_MAX_CONNECTIONS", default_value_t = 10)]
    pub neo4j_max_connections: usize,

    /// The maximum number of concepts per request.
    #[arg(long, env = "MAX_REQUEST_BATCH_SIZE", default_value_t = 1000)]
    pub max_request_batch_size: usize,

    /// Content published within this many seconds counts as recent.
    #[arg(long, env = "RECENT_WINDOW_SECONDS", default_value_t = DEFAULT_RECENT_WINDOW.as_secs())]
    pub recent_window_secs: u64,

    /// Wall-clock limit for one `/concepts/metrics` request.
    #[arg(long, env = "HANDLER_TIMEOUT_SECONDS", default_value_t = 14)]
    pub handler_timeout_secs: u64,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// If set, write a small JSON file once the server is listening.
    ///
    /// Useful for scripts/tests to learn the chosen port when `--port 0`.
    #[arg(long)]
    pub ready_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub(crate) struct ServerConfig {
    pub listen: SocketAddr,
    pub app_system_code: String,
    pub app_name: String,
    pub neo4j: Neo4jConfig,
    pub max_request_batch_size: usize,
    pub recent_window: Duration,
    pub handler_timeout: Duration,
    pub ready_file: Option<PathBuf>,
}

impl Cli {
    pub fn into_config(self) -> Result<ServerConfig> {
        if self.max_request_batch_size == 0 {
            return Err(anyhow!("--max-request-batch-size must be at least 1"));
        }
        if self.neo4j_max_connections == 0 {
            return Err(anyhow!("--neo4j-max-connections must be at least 1"));
        }
        if self.handler_timeout_secs == 0 {
            return Err(anyhow!("--handler-timeout-secs must be at least 1"));
        }
        metric_aggregator::neo4j::commit_url(&self.neo4j_endpoint, &self.neo4j_database)
            .map_err(|e| anyhow!("--neo4j-endpoint: {e}"))?;

        let handler_timeout = Duration::from_secs(self.handler_timeout_secs);
        Ok(ServerConfig {
            listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port)),
            app_system_code: self.app_system_code,
            app_name: self.app_name,
            neo4j: Neo4jConfig {
                endpoint: self.neo4j_endpoint,
                database: self.neo4j_database,
                username: self.neo4j_username,
                password: self.neo4j_password,
                max_connections: self.neo4j_max_connections,
                // Keep the store call inside the handler deadline.
                request_timeout: handler_timeout.saturating_sub(Duration::from_secs(1)).max(Duration::from_secs(1)),
                ..Neo4jConfig::default()
            },
            max_request_batch_size: self.max_request_batch_size,
            recent_window: Duration::from_secs(self.recent_window_secs),
            handler_timeout,
            ready_file: self.ready_file,
        })
    }
}

#[cfg(test)]
pub(crate) fn test_config(max_request_batch_size: usize) -> ServerConfig {
    ServerConfig {
        listen: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
        app_system_code: "test-system-code".to_string(),
        app_name: "test-neo4j-metric-aggregator".to_string(),
        neo4j: Neo4jConfig::default(),
        max_request_batch_size,
        recent_window: DEFAULT_RECENT_WINDOW,
        handler_timeout: Duration::from_secs(5),
        ready_file: None,
    }
}
