use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::aggregate::aggregate;
use crate::driver::GraphDriver;
use crate::error::StoreError;
use crate::executor::execute_batch;
use crate::model::Metrics;
use crate::query::build_queries;

/// Annotation counts for a batch of concepts, keyed by uuid.
///
/// Concepts the store does not know are absent from the map.
#[async_trait]
pub trait AnnotationsCounter: Send + Sync {
    async fn count(&self, uuids: &[String]) -> Result<HashMap<String, Metrics>, StoreError>;
}

/// Counts annotations with one batched round trip per call.
pub struct GraphAnnotationsCounter {
    driver: Arc<dyn GraphDriver>,
    recent_window: Duration,
}

impl GraphAnnotationsCounter {
    pub fn new(driver: Arc<dyn GraphDriver>, recent_window: Duration) -> Self {
        Self {
            driver,
            recent_window,
        }
    }
}

#[async_trait]
impl AnnotationsCounter for GraphAnnotationsCounter {
    async fn count(&self, uuids: &[String]) -> Result<HashMap<String, Metrics>, StoreError> {
        let queries = build_queries(uuids, self.recent_window);
        let rows = execute_batch(self.driver.as_ref(), &queries).await?;
        Ok(aggregate(rows))
    }
}
