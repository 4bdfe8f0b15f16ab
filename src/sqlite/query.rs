use std::sync::Arc;

use rusqlite::types::Value;
use rusqlite::{Statement, params_from_iter};

use crate::driver::{BufferedRows, ExecOutcome};
use crate::error::SqlRingError;
use crate::types::RowValues;

use super::params::Binding;

/// Extract a `RowValues` from a `SQLite` row.
///
/// # Errors
///
/// Returns `SqlRingError` if the value cannot be read.
pub fn sqlite_extract_value_sync(
    row: &rusqlite::Row,
    idx: usize,
) -> Result<RowValues, SqlRingError> {
    let value: Value = row.get(idx)?;
    Ok(match value {
        Value::Null => RowValues::Null,
        Value::Integer(i) => RowValues::Int(i),
        Value::Real(f) => RowValues::Float(f),
        Value::Text(s) => RowValues::Text(s),
        Value::Blob(b) => RowValues::Blob(b),
    })
}

fn column_names(stmt: &Statement<'_>) -> Arc<Vec<String>> {
    Arc::new(
        stmt.column_names()
            .iter()
            .map(std::string::ToString::to_string)
            .collect(),
    )
}

fn drain(
    mut rows: rusqlite::Rows<'_>,
    columns: Arc<Vec<String>>,
) -> Result<BufferedRows, SqlRingError> {
    let mut buffered = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            values.push(sqlite_extract_value_sync(row, i)?);
        }
        buffered.push(values);
    }
    Ok(BufferedRows::new(columns, buffered))
}

/// Run `stmt` with positional `params` and buffer every row.
///
/// # Errors
/// Returns the rusqlite error raised while stepping the statement.
pub fn query_rows(stmt: &mut Statement<'_>, params: &[Value]) -> Result<BufferedRows, SqlRingError> {
    let columns = column_names(stmt);
    let rows = stmt.query(params_from_iter(params.iter()))?;
    drain(rows, columns)
}

/// Run `stmt` with positional `params` as DML.
///
/// # Errors
/// Returns the rusqlite error raised while executing the statement.
pub fn exec_rows(
    conn: &rusqlite::Connection,
    stmt: &mut Statement<'_>,
    params: &[Value],
) -> Result<ExecOutcome, SqlRingError> {
    let affected = stmt.execute(params_from_iter(params.iter()))?;
    Ok(ExecOutcome {
        rows_affected: affected as u64,
        last_insert_id: Some(conn.last_insert_rowid()),
    })
}

fn bind(stmt: &mut Statement<'_>, bindings: &[(Binding, Value)]) -> Result<(), SqlRingError> {
    for (binding, value) in bindings {
        let idx = match binding {
            Binding::Index(i) => *i,
            Binding::Name(name) => stmt.parameter_index(name)?.ok_or_else(|| {
                SqlRingError::ParameterError(format!("no parameter named {name}"))
            })?,
        };
        stmt.raw_bind_parameter(idx, value)?;
    }
    Ok(())
}

/// Bind positional and named arguments, then buffer every row.
///
/// # Errors
/// Returns `SqlRingError::ParameterError` for an unknown name, or the rusqlite error.
pub fn query_bound(
    stmt: &mut Statement<'_>,
    bindings: &[(Binding, Value)],
) -> Result<BufferedRows, SqlRingError> {
    let columns = column_names(stmt);
    bind(stmt, bindings)?;
    drain(stmt.raw_query(), columns)
}

/// Bind positional and named arguments, then execute as DML.
///
/// # Errors
/// Returns `SqlRingError::ParameterError` for an unknown name, or the rusqlite error.
pub fn exec_bound(
    conn: &rusqlite::Connection,
    stmt: &mut Statement<'_>,
    bindings: &[(Binding, Value)],
) -> Result<ExecOutcome, SqlRingError> {
    bind(stmt, bindings)?;
    let affected = stmt.raw_execute()?;
    Ok(ExecOutcome {
        rows_affected: affected as u64,
        last_insert_id: Some(conn.last_insert_rowid()),
    })
}
