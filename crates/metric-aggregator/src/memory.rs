//! In-memory concept graph implementing [`GraphDriver`].
//!
//! It evaluates the annotations-count template directly against a small
//! graph of canonical concepts, equivalent source concepts and content, so
//! the whole pipeline can run without a database. Failure modes can be
//! switched on to exercise error paths.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::json;

use crate::driver::{GraphDriver, ResultSet};
use crate::error::StoreError;
use crate::query::{
    ParameterizedQuery, COUNT_ANNOTATIONS_QUERY, RECENT_COUNT_COLUMN, TOTAL_COUNT_COLUMN,
    UUID_COLUMN,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailureMode {
    #[default]
    None,
    /// Every call fails as if the store could not be reached.
    Unreachable,
    /// The store answers but rejects every batch.
    RejectQueries,
    /// Counts come back as strings instead of integers.
    MalformedRows,
}

#[derive(Default)]
struct Graph {
    /// canonical prefUUID -> equivalent source concept uuids
    canonical: HashMap<String, Vec<String>>,
    /// source concept uuid -> annotating content ids
    annotations: HashMap<String, Vec<u64>>,
    /// content id -> publishedDateEpoch
    content: HashMap<u64, i64>,
}

#[derive(Default)]
pub struct InMemoryGraph {
    graph: RwLock<Graph>,
    failure: RwLock<FailureMode>,
    next_id: AtomicU64,
    batches: AtomicUsize,
}

fn now_unix_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failure_mode(&self, mode: FailureMode) {
        *self.failure.write().unwrap_or_else(|e| e.into_inner()) = mode;
    }

    /// Number of `run_batch` calls served so far.
    pub fn batches_served(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    pub fn add_concept(&self, pref_uuid: &str) {
        let mut g = self.graph.write().unwrap_or_else(|e| e.into_inner());
        g.canonical.entry(pref_uuid.to_string()).or_default();
    }

    /// Adds a source concept `EQUIVALENT_TO` the canonical `pref_uuid`.
    pub fn add_equivalent(&self, pref_uuid: &str, source_uuid: &str) {
        let mut g = self.graph.write().unwrap_or_else(|e| e.into_inner());
        g.canonical
            .entry(pref_uuid.to_string())
            .or_default()
            .push(source_uuid.to_string());
    }

    /// Adds one content node annotating every listed source concept.
    /// Returns the content id.
    pub fn add_content(&self, published_epoch: i64, annotates: &[&str]) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut g = self.graph.write().unwrap_or_else(|e| e.into_inner());
        g.content.insert(id, published_epoch);
        for source in annotates {
            g.annotations.entry(source.to_string()).or_default().push(id);
        }
        id
    }

    /// Creates a canonical concept with `equivalents` source concepts and
    /// `total` annotations spread across them, `recent` of which are
    /// published now and the rest eight days ago.
    pub fn add_concept_with_annotations(
        &self,
        pref_uuid: &str,
        equivalents: usize,
        total: usize,
        recent: usize,
    ) {
        self.add_concept(pref_uuid);
        let sources: Vec<String> = (0..equivalents.max(1))
            .map(|i| format!("{pref_uuid}-source-{i}"))
            .collect();
        for source in &sources {
            self.add_equivalent(pref_uuid, source);
        }

        let now = now_unix_secs();
        let old = now - 8 * 24 * 3600;
        for i in 0..total {
            let published = if i < recent { now } else { old };
            let source = &sources[i % sources.len()];
            self.add_content(published, &[source.as_str()]);
        }
    }

    fn evaluate(&self, query: &ParameterizedQuery) -> Result<ResultSet, StoreError> {
        if query.statement != COUNT_ANNOTATIONS_QUERY {
            return Err(StoreError::Execution(
                "Neo.ClientError.Statement.SyntaxError: unsupported statement".to_string(),
            ));
        }

        let g = self.graph.read().unwrap_or_else(|e| e.into_inner());
        let columns = [UUID_COLUMN, RECENT_COUNT_COLUMN, TOTAL_COUNT_COLUMN];
        let uuid = &query.parameters.uuid;

        let Some(sources) = g.canonical.get(uuid) else {
            return Ok(ResultSet::new(&columns, vec![vec![json!(""), json!(0), json!(0)]]));
        };

        let distinct: BTreeSet<u64> = sources
            .iter()
            .filter_map(|s| g.annotations.get(s))
            .flatten()
            .copied()
            .collect();
        let recent = distinct
            .iter()
            .filter(|id| g.content.get(*id).is_some_and(|p| *p > query.parameters.since))
            .count();

        Ok(ResultSet::new(
            &columns,
            vec![vec![json!(uuid), json!(recent), json!(distinct.len())]],
        ))
    }

    fn failure_mode(&self) -> FailureMode {
        *self.failure.read().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl GraphDriver for InMemoryGraph {
    async fn run_batch(&self, queries: &[ParameterizedQuery]) -> Result<Vec<ResultSet>, StoreError> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        match self.failure_mode() {
            FailureMode::Unreachable => {
                return Err(StoreError::Connection("in-memory graph is unreachable".to_string()))
            }
            FailureMode::RejectQueries => {
                return Err(StoreError::Execution(
                    "Neo.TransientError.General.DatabaseUnavailable".to_string(),
                ))
            }
            FailureMode::MalformedRows => {
                return Ok(queries
                    .iter()
                    .map(|q| {
                        ResultSet::new(
                            &[UUID_COLUMN, RECENT_COUNT_COLUMN, TOTAL_COUNT_COLUMN],
                            vec![vec![json!(q.parameters.uuid), json!("0"), json!("0")]],
                        )
                    })
                    .collect())
            }
            FailureMode::None => {}
        }

        queries.iter().map(|q| self.evaluate(q)).collect()
    }

    async fn verify_connectivity(&self) -> Result<(), StoreError> {
        match self.failure_mode() {
            FailureMode::Unreachable => {
                Err(StoreError::Connection("in-memory graph is unreachable".to_string()))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::build_queries_at;
    use std::time::Duration;

    fn one(graph: &InMemoryGraph, uuid: &str, since_window: u64, now: i64) -> Vec<serde_json::Value> {
        let q = build_queries_at(&[uuid.to_string()], Duration::from_secs(since_window), now);
        graph.evaluate(&q[0]).unwrap().rows.remove(0)
    }

    #[test]
    fn content_shared_by_equivalents_is_counted_once() {
        let g = InMemoryGraph::new();
        g.add_equivalent("canon", "s1");
        g.add_equivalent("canon", "s2");
        g.add_content(100, &["s1", "s2"]);
        g.add_content(50, &["s2"]);

        assert_eq!(one(&g, "canon", 25, 100), vec![json!("canon"), json!(1), json!(2)]);
    }

    #[test]
    fn cutoff_is_strictly_greater() {
        let g = InMemoryGraph::new();
        g.add_equivalent("canon", "s1");
        g.add_content(75, &["s1"]);

        assert_eq!(one(&g, "canon", 25, 100)[1], json!(0));
        assert_eq!(one(&g, "canon", 26, 100)[1], json!(1));
    }

    #[test]
    fn unknown_concept_yields_empty_uuid_row() {
        let g = InMemoryGraph::new();
        assert_eq!(one(&g, "nope", 1, 1), vec![json!(""), json!(0), json!(0)]);
    }

    #[test]
    fn concept_without_equivalents_reports_zero() {
        let g = InMemoryGraph::new();
        g.add_concept("lonely");
        assert_eq!(one(&g, "lonely", 1, 1), vec![json!("lonely"), json!(0), json!(0)]);
    }

    #[tokio::test]
    async fn unreachable_fails_connectivity() {
        let g = InMemoryGraph::new();
        assert!(g.verify_connectivity().await.is_ok());
        g.set_failure_mode(FailureMode::Unreachable);
        assert!(matches!(
            g.verify_connectivity().await,
            Err(StoreError::Connection(_))
        ));
    }
}
