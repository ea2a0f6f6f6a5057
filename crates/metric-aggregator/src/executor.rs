//! Executes a query batch and decodes each answer into a [`RawRow`].

use serde_json::Value;

use crate::driver::{GraphDriver, ResultSet};
use crate::error::StoreError;
use crate::model::RawRow;
use crate::query::{ParameterizedQuery, RECENT_COUNT_COLUMN, TOTAL_COUNT_COLUMN, UUID_COLUMN};

/// Sends `queries` to the store in one call and returns one row per query,
/// in query order.
pub async fn execute_batch(
    driver: &dyn GraphDriver,
    queries: &[ParameterizedQuery],
) -> Result<Vec<RawRow>, StoreError> {
    if queries.is_empty() {
        return Ok(Vec::new());
    }

    let results = driver.run_batch(queries).await?;
    if results.len() != queries.len() {
        return Err(StoreError::ResultShape(format!(
            "expected {} result sets, store returned {}",
            queries.len(),
            results.len()
        )));
    }

    results
        .iter()
        .zip(queries)
        .map(|(rs, q)| decode_row(rs, &q.parameters.uuid))
        .collect()
}

fn decode_row(rs: &ResultSet, requested: &str) -> Result<RawRow, StoreError> {
    let row = match rs.rows.as_slice() {
        [row] => row,
        rows => {
            return Err(StoreError::ResultShape(format!(
                "expected one row for concept `{requested}`, got {}",
                rows.len()
            )))
        }
    };

    let uuid = match cell(rs, row, UUID_COLUMN, requested)? {
        Value::String(s) => s.clone(),
        other => {
            return Err(StoreError::ResultShape(format!(
                "column `{UUID_COLUMN}` for concept `{requested}` is not a string: {other}"
            )))
        }
    };
    let recent_count = count(rs, row, RECENT_COUNT_COLUMN, requested)?;
    let total_count = count(rs, row, TOTAL_COUNT_COLUMN, requested)?;

    Ok(RawRow {
        uuid,
        recent_count,
        total_count,
    })
}

fn cell<'a>(
    rs: &ResultSet,
    row: &'a [Value],
    column: &str,
    requested: &str,
) -> Result<&'a Value, StoreError> {
    let idx = rs.column_index(column).ok_or_else(|| {
        StoreError::ResultShape(format!(
            "result for concept `{requested}` has no `{column}` column (columns: {:?})",
            rs.columns
        ))
    })?;
    row.get(idx).ok_or_else(|| {
        StoreError::ResultShape(format!(
            "row for concept `{requested}` is missing column `{column}`"
        ))
    })
}

fn count(rs: &ResultSet, row: &[Value], column: &str, requested: &str) -> Result<i64, StoreError> {
    let value = cell(rs, row, column, requested)?;
    match value.as_i64() {
        Some(n) if n >= 0 => Ok(n),
        _ => Err(StoreError::ResultShape(format!(
            "column `{column}` for concept `{requested}` is not a non-negative integer: {value}"
        ))),
    }
}
