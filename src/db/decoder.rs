//! Row decoding for schema-unknown result sets.
//!
//! [`decode_rows`] drains a cursor of [`ScannedRow`]s into ordered [`Row`]s,
//! stopping at an optional row cap. The cursor is taken by value and dropped
//! on every exit path, which releases the underlying statement.

use crate::db::types::{ColumnInfo, Row, ScannedRow, TypeCategory, Value};
use crate::error::{DbError, DbResult};
use futures_util::{Stream, StreamExt};
use std::sync::Arc;
use tracing::debug;

/// Column layout shared by every row of one result set.
///
/// Duplicate column names collapse onto the position of their first
/// occurrence; the later column's value wins.
struct ResultShape {
    names: Arc<[String]>,
    positions: Vec<usize>,
    categories: Vec<TypeCategory>,
}

impl ResultShape {
    fn new(columns: &[ColumnInfo]) -> Self {
        let mut names: Vec<String> = Vec::with_capacity(columns.len());
        let mut positions = Vec::with_capacity(columns.len());

        for col in columns {
            let position = match names.iter().position(|n| *n == col.name) {
                Some(existing) => existing,
                None => {
                    names.push(col.name.clone());
                    names.len() - 1
                }
            };
            positions.push(position);
        }

        Self {
            names: names.into(),
            positions,
            categories: columns.iter().map(|c| c.category).collect(),
        }
    }

    fn build(&self, scanned: ScannedRow) -> DbResult<Row> {
        if scanned.slots.len() != self.positions.len() {
            return Err(DbError::decode(format!(
                "row has {} columns, expected {}",
                scanned.slots.len(),
                self.positions.len()
            )));
        }

        let mut values = vec![Value::Null; self.names.len()];
        for ((slot, &position), &category) in scanned
            .slots
            .into_iter()
            .zip(&self.positions)
            .zip(&self.categories)
        {
            values[position] = slot.normalize(category);
        }
        Ok(Row::new(Arc::clone(&self.names), values))
    }
}

/// Decode rows from `cursor`, reading at most `row_cap` rows when given.
///
/// Errors before the first row keep their kind. Once rows have been
/// produced, driver faults are reported as decode failures and the partial
/// result is discarded.
pub async fn decode_rows<S>(cursor: S, row_cap: Option<usize>) -> DbResult<Vec<Row>>
where
    S: Stream<Item = DbResult<ScannedRow>> + Unpin,
{
    let mut cursor = cursor;
    let mut rows = Vec::new();
    let mut shape: Option<ResultShape> = None;

    loop {
        if row_cap.is_some_and(|cap| rows.len() >= cap) {
            debug!(row_cap = ?row_cap, "Row cap reached, releasing cursor");
            break;
        }

        let scanned = match cursor.next().await {
            Some(Ok(scanned)) => scanned,
            Some(Err(e)) if rows.is_empty() => return Err(e),
            Some(Err(e)) => return Err(e.into_mid_stream(rows.len())),
            None => break,
        };

        let shape = shape.get_or_insert_with(|| ResultShape::new(&scanned.columns));
        let row = shape.build(scanned).map_err(|e| e.into_mid_stream(rows.len()))?;
        rows.push(row);
    }

    Ok(rows)
}

/// First column of every row as a string, for single-column listings like
/// `SHOW DATABASES`.
pub fn first_column_strings(rows: Vec<Row>) -> DbResult<Vec<String>> {
    rows.into_iter()
        .map(|row| match row.into_values().into_iter().next() {
            Some(Value::Text(name)) => Ok(name),
            Some(Value::Bytes(bytes)) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Some(other) => Err(DbError::decode(format!(
                "expected a name, got {}",
                other.type_name()
            ))),
            None => Err(DbError::decode("result set has no columns")),
        })
        .collect()
}
