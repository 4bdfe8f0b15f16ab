use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde_json::Value as JsonValue;

use crate::error::SqlRingError;

/// Values that travel through the ring as statement arguments and row cells.
///
/// Every backend converts to and from this one enum, so a statement prepared on
/// the primary and on each replica accepts the same argument slice:
/// ```rust
/// use sql_ring::prelude::*;
///
/// let args = vec![
///     RowValues::Int(1),
///     RowValues::Text("alice".into()),
///     RowValues::Bool(true),
/// ];
/// # let _ = args;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    /// SQLite stores booleans as 0/1 integers, so those read back as booleans too.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RowValues::Bool(value) => Some(*value),
            RowValues::Int(1) => Some(true),
            RowValues::Int(0) => Some(false),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            RowValues::Timestamp(value) => Some(*value),
            RowValues::Text(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
                .ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let RowValues::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }
}

/// Backend families bundled with this crate. Each is behind its own feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum BackendKind {
    /// `SQLite` via rusqlite
    Sqlite,
    /// `PostgreSQL` via tokio-postgres
    Postgres,
}

/// An argument as handed to a cancellation-aware entry point.
///
/// `ordinal` is 1-based. `name` is set only when the caller used a named
/// parameter (`:id`, `@id`); most backends only understand positions.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedValue {
    pub name: Option<String>,
    pub ordinal: usize,
    pub value: RowValues,
}

impl NamedValue {
    #[must_use]
    pub fn positional(ordinal: usize, value: RowValues) -> Self {
        Self {
            name: None,
            ordinal,
            value,
        }
    }

    #[must_use]
    pub fn named(name: impl Into<String>, ordinal: usize, value: RowValues) -> Self {
        Self {
            name: Some(name.into()),
            ordinal,
            value,
        }
    }

    /// Wrap plain positional values, numbering them from 1.
    #[must_use]
    pub fn from_values(values: &[RowValues]) -> Vec<NamedValue> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| NamedValue::positional(i + 1, v.clone()))
            .collect()
    }
}

/// Translate named arguments to plain positional values.
///
/// # Errors
/// Returns [`SqlRingError::NamedParameter`] as soon as any argument carries a name.
pub fn named_values_to_values(named: &[NamedValue]) -> Result<Vec<RowValues>, SqlRingError> {
    let mut values = Vec::with_capacity(named.len());
    for param in named {
        if let Some(name) = param.name.as_deref().filter(|n| !n.is_empty()) {
            return Err(SqlRingError::NamedParameter(name.to_string()));
        }
        values.push(param.value.clone());
    }
    Ok(values)
}
