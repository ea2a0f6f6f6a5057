//! Error taxonomy.
//!
//! Store-side failures (`StoreError`) surface to callers wrapped in a
//! `MetricsError`; caller input problems are `ValidationError`s and never
//! reach the store.

/// Failures talking to, or interpreting answers from, the graph store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("cannot connect to the graph store: {0}")]
    Connection(String),
    #[error("failed executing queries: {0}")]
    Execution(String),
    #[error("failed parsing query results: {0}")]
    ResultShape(String),
}

/// Failure of one metrics computation over a whole batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetricsError {
    #[error("error in getting annotations count for a batch of {batch_size} concepts: {source}")]
    AnnotationsCount {
        batch_size: usize,
        #[source]
        source: StoreError,
    },
}

impl MetricsError {
    pub fn store_error(&self) -> &StoreError {
        match self {
            Self::AnnotationsCount { source, .. } => source,
        }
    }
}

/// Rejected caller input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("uuids URL query parameter is missing or empty")]
    MissingUuids,
    #[error("max concept UUIDs batch size is {max}")]
    BatchTooLarge { max: usize },
}
