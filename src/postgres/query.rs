use std::sync::Arc;

use chrono::NaiveDateTime;
use serde_json::Value;
use tokio_postgres::{Row, Statement};

use crate::driver::BufferedRows;
use crate::error::SqlRingError;
use crate::types::RowValues;

/// Extracts a `RowValues` from a `tokio_postgres` Row at the given index.
///
/// # Errors
/// Returns `SqlRingError` if the column cannot be retrieved.
pub fn postgres_extract_value(row: &Row, idx: usize) -> Result<RowValues, SqlRingError> {
    let type_info = row.columns()[idx].type_();

    Ok(match type_info.name() {
        "int2" => {
            let val: Option<i16> = row.try_get(idx)?;
            val.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v)))
        }
        "int4" => {
            let val: Option<i32> = row.try_get(idx)?;
            val.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v)))
        }
        "int8" => {
            let val: Option<i64> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::Int)
        }
        "float4" => {
            let val: Option<f32> = row.try_get(idx)?;
            val.map_or(RowValues::Null, |v| RowValues::Float(f64::from(v)))
        }
        "float8" => {
            let val: Option<f64> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::Float)
        }
        "bool" => {
            let val: Option<bool> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::Bool)
        }
        "timestamp" => {
            let val: Option<NaiveDateTime> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::Timestamp)
        }
        "timestamptz" => {
            let val: Option<chrono::DateTime<chrono::Utc>> = row.try_get(idx)?;
            val.map_or(RowValues::Null, |v| RowValues::Timestamp(v.naive_utc()))
        }
        "json" | "jsonb" => {
            let val: Option<Value> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::JSON)
        }
        "bytea" => {
            let val: Option<Vec<u8>> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::Blob)
        }
        // text, varchar, char, name and anything else readable as a string
        _ => {
            let val: Option<String> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::Text)
        }
    })
}

/// Buffer `rows` using the statement's column metadata, so an empty result
/// still reports its columns.
///
/// # Errors
/// Returns errors from row value extraction.
pub fn buffer_rows(stmt: &Statement, rows: &[Row]) -> Result<BufferedRows, SqlRingError> {
    let columns: Arc<Vec<String>> = Arc::new(
        stmt.columns()
            .iter()
            .map(|col| col.name().to_string())
            .collect(),
    );
    let mut buffered = Vec::with_capacity(rows.len());
    for row in rows {
        let mut values = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            values.push(postgres_extract_value(row, idx)?);
        }
        buffered.push(values);
    }
    Ok(BufferedRows::new(columns, buffered))
}
