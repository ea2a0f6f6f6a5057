//! The store seam: everything the aggregator needs from a graph database.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::StoreError;
use crate::query::ParameterizedQuery;

/// Raw tabular answer to one statement.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl ResultSet {
    pub fn new(columns: &[&str], rows: Vec<Vec<serde_json::Value>>) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// A graph store client.
///
/// Implementations own their connection handling; each call acquires what it
/// needs and releases it before returning.
#[async_trait]
pub trait GraphDriver: Send + Sync {
    /// Runs every query in one round trip, returning one result set per query
    /// in the same order.
    async fn run_batch(&self, queries: &[ParameterizedQuery]) -> Result<Vec<ResultSet>, StoreError>;

    /// Cheap round trip proving the store is reachable and answering.
    async fn verify_connectivity(&self) -> Result<(), StoreError>;
}
