use serde::{Deserialize, Serialize};

/// Annotation counts for one concept, computed per request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    /// Distinct content items annotating the concept or any equivalent node.
    #[serde(rename = "annotationsCount")]
    pub total: i64,
    /// Subset of `total` published after the recent-window cutoff.
    #[serde(rename = "prevWeekAnnotationsCount")]
    pub recent: i64,
}

impl Metrics {
    pub fn new(total: i64, recent: i64) -> Self {
        Self { total, recent }
    }
}

/// One entry of the `/concepts/metrics` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptResult {
    pub uuid: String,
    pub metrics: Metrics,
}

impl ConceptResult {
    pub fn new(uuid: impl Into<String>, metrics: Metrics) -> Self {
        Self {
            uuid: uuid.into(),
            metrics,
        }
    }
}

/// A decoded result row, one per executed query.
///
/// `uuid` is empty when the store holds no canonical concept for the
/// requested identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub uuid: String,
    pub recent_count: i64,
    pub total_count: i64,
}

impl RawRow {
    pub fn new(uuid: impl Into<String>, recent_count: i64, total_count: i64) -> Self {
        Self {
            uuid: uuid.into(),
            recent_count,
            total_count,
        }
    }

    /// The row produced for an identifier that matched no concept.
    pub fn not_found() -> Self {
        Self::new("", 0, 0)
    }

    pub fn is_not_found(&self) -> bool {
        self.uuid.is_empty()
    }
}
