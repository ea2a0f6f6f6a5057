//! Per-concept query construction.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// Default span of the "recent" count: one week.
pub const DEFAULT_RECENT_WINDOW: Duration = Duration::from_secs(7 * 24 * 3600);

/// Counts the distinct content annotating a canonical concept through any of
/// its equivalent source concepts, plus the subset newer than `$since`.
///
/// Always yields exactly one row: when no canonical concept matches `$uuid`
/// the row carries an empty `uuid`.
pub const COUNT_ANNOTATIONS_QUERY: &str = "\
OPTIONAL MATCH (canonical:Concept {prefUUID: $uuid})
OPTIONAL MATCH (canonical)<-[:EQUIVALENT_TO]-(:Concept)--(content:Content)
WITH canonical, collect(DISTINCT content) AS contents
RETURN coalesce(canonical.prefUUID, '') AS uuid,
       size([c IN contents WHERE c.publishedDateEpoch > $since]) AS recentCount,
       size(contents) AS totalCount";

/// Column names `COUNT_ANNOTATIONS_QUERY` returns.
pub const UUID_COLUMN: &str = "uuid";
pub const RECENT_COUNT_COLUMN: &str = "recentCount";
pub const TOTAL_COUNT_COLUMN: &str = "totalCount";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryParameters {
    pub uuid: String,
    /// Unix epoch seconds; content published strictly after this is recent.
    pub since: i64,
}

/// One statement of a batch, in the shape the Neo4j transactional endpoint
/// accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterizedQuery {
    pub statement: &'static str,
    pub parameters: QueryParameters,
}

/// Builds one query per identifier with a cutoff of `now - recent_window`.
pub fn build_queries(uuids: &[String], recent_window: Duration) -> Vec<ParameterizedQuery> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    build_queries_at(uuids, recent_window, now as i64)
}

/// Same as [`build_queries`] with an explicit `now` (unix seconds).
pub fn build_queries_at(
    uuids: &[String],
    recent_window: Duration,
    now_epoch: i64,
) -> Vec<ParameterizedQuery> {
    let window = i64::try_from(recent_window.as_secs()).unwrap_or(i64::MAX);
    let since = now_epoch.saturating_sub(window);

    uuids
        .iter()
        .map(|uuid| ParameterizedQuery {
            statement: COUNT_ANNOTATIONS_QUERY,
            parameters: QueryParameters {
                uuid: uuid.clone(),
                since,
            },
        })
        .collect()
}
