//! Typed row delivery over a session.

use std::sync::Arc;
use std::time::Duration;

use supersql_protocol::RawRow;
use tokio::time::Instant;

use crate::column::ColumnDescriptor;
use crate::error::{ClientError, ClientResult};
use crate::registry::{LogicalType, TypeRegistry};
use crate::session::{RowFetch, Session};
use crate::value::{decode_cell, Value};

/// One decoded row, positionally aligned with its columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[ColumnDescriptor]>,
    values: Vec<Value>,
}

impl Row {
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// First column with a matching name.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .and_then(|i| self.values.get(i))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Rows of one statement in engine order, decoded by column type.
///
/// Borrows the session mutably; only one stream can drive a session at a time.
pub struct ResultStream<'a> {
    session: &'a mut Session,
    registry: &'a TypeRegistry,
    page_timeout: Duration,
}

impl<'a> ResultStream<'a> {
    pub fn new(session: &'a mut Session) -> Self {
        let registry = session.registry();
        let page_timeout = session.config().request_timeout();
        Self {
            session,
            registry,
            page_timeout,
        }
    }

    /// Deadline for each wait on the engine.
    pub fn with_page_timeout(mut self, timeout: Duration) -> Self {
        self.page_timeout = timeout;
        self
    }

    /// Next row, waiting for the engine as needed. `Ok(None)` once the
    /// statement has finished and every row was delivered.
    pub async fn next(&mut self) -> ClientResult<Option<Row>> {
        let deadline = Instant::now() + self.page_timeout;
        loop {
            match self.session.next_raw_row()? {
                RowFetch::Row(raw) => return self.decode(raw).await.map(Some),
                RowFetch::Done => return Ok(None),
                RowFetch::Pending => {
                    self.session
                        .advance(deadline, "fetch", self.page_timeout)
                        .await?
                }
            }
        }
    }

    /// Up to `n` rows; fewer only at the end of the result.
    pub async fn next_batch(&mut self, n: usize) -> ClientResult<Vec<Row>> {
        let mut rows = Vec::with_capacity(n.min(1024));
        while rows.len() < n {
            match self.next().await? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        Ok(rows)
    }

    /// Every remaining row.
    pub async fn collect_all(&mut self) -> ClientResult<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    async fn decode(&mut self, raw: RawRow) -> ClientResult<Row> {
        let columns = match self.session.columns() {
            Some(c) => c.clone(),
            None => {
                return Err(ClientError::InvalidState {
                    operation: "decode a row without column metadata",
                    state: self.session.state(),
                })
            }
        };
        match decode_row(&columns, raw, self.registry) {
            Ok(values) => Ok(Row { columns, values }),
            Err(e) => Err(self.session.fail_decode(e).await),
        }
    }
}

/// Decode raw cells against their columns. A column of unrecognized type
/// fails even for NULL cells.
pub fn decode_row(
    columns: &[ColumnDescriptor],
    raw: RawRow,
    registry: &TypeRegistry,
) -> ClientResult<Vec<Value>> {
    let mut values = Vec::with_capacity(columns.len());
    for (index, (column, cell)) in columns.iter().zip(raw.cells).enumerate() {
        let decode_error = |detail: String| ClientError::Decode {
            column_index: index,
            column_name: column.name.clone(),
            wire_type: column.wire_type,
            detail,
        };
        if column.logical_type == LogicalType::Unknown {
            return Err(decode_error(format!(
                "unrecognized wire type {} ({})",
                column.wire_type,
                registry.wire_type_name(column.wire_type)
            )));
        }
        let value = match cell {
            None => Value::Null,
            Some(bytes) => decode_cell(column.logical_type, &bytes).map_err(decode_error)?,
        };
        values.push(value);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use supersql_protocol::{ColumnMeta, TYPE_ARRAY};

    use crate::memory;

    fn columns(metas: &[ColumnMeta]) -> Arc<[ColumnDescriptor]> {
        metas
            .iter()
            .map(|m| ColumnDescriptor::from_meta(m, TypeRegistry::global()))
            .collect::<Vec<_>>()
            .into()
    }

    #[test]
    fn test_decode_row_with_nulls() {
        let cols = columns(&[
            memory::column("id", LogicalType::Long),
            memory::column("name", LogicalType::Varchar),
        ]);
        let raw = memory::row(vec![Value::Long(7), Value::Null]);
        let values = decode_row(&cols, raw, TypeRegistry::global()).unwrap();
        assert_eq!(values, vec![Value::Long(7), Value::Null]);
    }

    #[test]
    fn test_unknown_type_fails_even_for_null() {
        let cols = columns(&[
            memory::column("id", LogicalType::Long),
            ColumnMeta {
                name: "tags".into(),
                type_id: TYPE_ARRAY,
                type_name: "array(varchar)".into(),
            },
        ]);
        let raw = RawRow::new(vec![Some(1i64.to_le_bytes().to_vec()), None]);
        match decode_row(&cols, raw, TypeRegistry::global()) {
            Err(ClientError::Decode {
                column_index,
                column_name,
                wire_type,
                ..
            }) => {
                assert_eq!(column_index, 1);
                assert_eq!(column_name, "tags");
                assert_eq!(wire_type, TYPE_ARRAY);
            }
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_cell_names_column() {
        let cols = columns(&[memory::column("flag", LogicalType::Boolean)]);
        let raw = RawRow::new(vec![Some(vec![7])]);
        let err = decode_row(&cols, raw, TypeRegistry::global()).unwrap_err();
        assert!(err.to_string().contains("'flag'"), "{}", err);
    }

    #[test]
    fn test_row_lookup_by_name() {
        let cols = columns(&[
            memory::column("a", LogicalType::Integer),
            memory::column("b", LogicalType::Varchar),
        ]);
        let row = Row {
            columns: cols,
            values: vec![Value::Integer(1), Value::Varchar("x".into())],
        };
        assert_eq!(row.get_by_name("b"), Some(&Value::Varchar("x".into())));
        assert_eq!(row.get_by_name("c"), None);
        assert_eq!(row.len(), 2);
    }
}
