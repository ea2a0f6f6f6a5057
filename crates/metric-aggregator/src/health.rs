use std::sync::Arc;

use crate::driver::GraphDriver;
use crate::error::StoreError;

pub const HEALTHY_MESSAGE: &str = "Neo4J is healthy";

/// Why the probe failed, with the message reported as check output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ProbeFailure {
    pub message: String,
    #[source]
    pub error: StoreError,
}

/// Graph store connectivity probe. Every call goes to the store.
#[derive(Clone)]
pub struct HealthProbe {
    driver: Arc<dyn GraphDriver>,
}

impl HealthProbe {
    pub fn new(driver: Arc<dyn GraphDriver>) -> Self {
        Self { driver }
    }

    pub async fn check(&self) -> Result<String, ProbeFailure> {
        match self.driver.verify_connectivity().await {
            Ok(()) => Ok(HEALTHY_MESSAGE.to_string()),
            Err(error) => {
                tracing::warn!(error = %error, "neo4j connectivity check failed");
                Err(ProbeFailure {
                    message: format!("Neo4j connectivity error: {error}"),
                    error,
                })
            }
        }
    }
}
