use std::collections::HashMap;

use crate::model::{Metrics, RawRow};

/// Folds rows into `uuid -> Metrics`, dropping rows for concepts that were not
/// found. A later row for the same uuid replaces an earlier one.
pub fn aggregate(rows: Vec<RawRow>) -> HashMap<String, Metrics> {
    let mut out = HashMap::with_capacity(rows.len());
    for row in rows {
        if row.is_not_found() {
            continue;
        }
        out.insert(row.uuid, Metrics::new(row.total_count, row.recent_count));
    }
    out
}
