use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::counter::AnnotationsCounter;
use crate::error::MetricsError;
use crate::model::ConceptResult;

/// Request-scoped metadata carried into log lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub transaction_id: String,
}

impl RequestContext {
    pub fn new(transaction_id: impl Into<String>) -> Self {
        Self {
            transaction_id: transaction_id.into(),
        }
    }
}

/// Metrics for a batch of concepts, in request order.
#[async_trait]
pub trait ConceptMetricsSource: Send + Sync {
    async fn concept_metrics(
        &self,
        ctx: &RequestContext,
        uuids: &[String],
    ) -> Result<Vec<ConceptResult>, MetricsError>;
}

pub struct ConceptMetricsService {
    counter: Arc<dyn AnnotationsCounter>,
}

impl ConceptMetricsService {
    pub fn new(counter: Arc<dyn AnnotationsCounter>) -> Self {
        Self { counter }
    }
}

#[async_trait]
impl ConceptMetricsSource for ConceptMetricsService {
    async fn concept_metrics(
        &self,
        ctx: &RequestContext,
        uuids: &[String],
    ) -> Result<Vec<ConceptResult>, MetricsError> {
        info!(
            transaction_id = %ctx.transaction_id,
            batch_size = uuids.len(),
            "computing annotations count for concept batch"
        );

        let counts = self.counter.count(uuids).await.map_err(|source| {
            error!(
                transaction_id = %ctx.transaction_id,
                batch_size = uuids.len(),
                error = %source,
                "error in getting annotations count for batch"
            );
            MetricsError::AnnotationsCount {
                batch_size: uuids.len(),
                source,
            }
        })?;

        Ok(uuids
            .iter()
            .filter_map(|uuid| {
                counts
                    .get(uuid)
                    .map(|metrics| ConceptResult::new(uuid.clone(), *metrics))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::model::Metrics;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Returns a canned answer and records what it was asked.
    struct MockCounter {
        answer: Result<HashMap<String, Metrics>, StoreError>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl MockCounter {
        fn new(answer: Result<HashMap<String, Metrics>, StoreError>) -> Arc<Self> {
            Arc::new(Self {
                answer,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl AnnotationsCounter for MockCounter {
        async fn count(&self, uuids: &[String]) -> Result<HashMap<String, Metrics>, StoreError> {
            self.calls.lock().unwrap().push(uuids.to_vec());
            self.answer.clone()
        }
    }

    const A: &str = "601a5957-74ab-4eab-8a43-4596355c9420";
    const B: &str = "082a9fcc-5a88-48c5-bd60-64ba154204df";
    const C: &str = "f7885509-c029-496b-87dd-aecf1ca138d7";

    fn uuids() -> Vec<String> {
        vec![A.to_string(), B.to_string(), C.to_string()]
    }

    fn counts(entries: &[(&str, i64, i64)]) -> HashMap<String, Metrics> {
        entries
            .iter()
            .map(|(u, t, r)| (u.to_string(), Metrics::new(*t, *r)))
            .collect()
    }

    #[tokio::test]
    async fn results_follow_request_order() {
        let counter = MockCounter::new(Ok(counts(&[(C, 4, 1024), (A, 3, 5), (B, 123, 1000)])));
        let svc = ConceptMetricsService::new(counter.clone());

        let got = svc.concept_metrics(&RequestContext::default(), &uuids()).await.unwrap();
        assert_eq!(
            got,
            vec![
                ConceptResult::new(A, Metrics::new(3, 5)),
                ConceptResult::new(B, Metrics::new(123, 1000)),
                ConceptResult::new(C, Metrics::new(4, 1024)),
            ]
        );
        assert_eq!(*counter.calls.lock().unwrap(), vec![uuids()]);
    }

    #[tokio::test]
    async fn missing_concepts_are_omitted() {
        let counter = MockCounter::new(Ok(counts(&[(A, 3, 113), (C, 4, 1024)])));
        let svc = ConceptMetricsService::new(counter);

        let got = svc.concept_metrics(&RequestContext::default(), &uuids()).await.unwrap();
        assert_eq!(
            got,
            vec![
                ConceptResult::new(A, Metrics::new(3, 113)),
                ConceptResult::new(C, Metrics::new(4, 1024)),
            ]
        );
    }

    #[tokio::test]
    async fn no_results_is_an_empty_list() {
        let svc = ConceptMetricsService::new(MockCounter::new(Ok(HashMap::new())));
        let got = svc.concept_metrics(&RequestContext::default(), &uuids()).await.unwrap();
        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn duplicate_requests_produce_duplicate_entries() {
        let svc = ConceptMetricsService::new(MockCounter::new(Ok(counts(&[(A, 1, 0)]))));
        let req = vec![A.to_string(), B.to_string(), A.to_string()];
        let got = svc.concept_metrics(&RequestContext::default(), &req).await.unwrap();
        assert_eq!(got.len(), 2);
        assert!(got.iter().all(|c| c.uuid == A));
    }

    #[tokio::test]
    async fn counter_failure_is_wrapped_with_batch_context() {
        let counter = MockCounter::new(Err(StoreError::Execution("computer says no".into())));
        let svc = ConceptMetricsService::new(counter);

        let err = svc
            .concept_metrics(&RequestContext::new("tid_test"), &uuids())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            MetricsError::AnnotationsCount {
                batch_size: 3,
                source: StoreError::Execution("computer says no".into()),
            }
        );
        assert!(err.to_string().contains("computer says no"));
    }
}
