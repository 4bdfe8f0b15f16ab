use std::fmt::Write;

use rusqlite::types::Value;

use crate::types::{NamedValue, RowValues};

thread_local! {
    static TIMESTAMP_BUF: std::cell::RefCell<String> = std::cell::RefCell::new(String::with_capacity(32));
}

/// Convert a single `RowValues` to a rusqlite `Value`.
#[must_use]
pub fn row_value_to_sqlite_value(value: &RowValues) -> Value {
    match value {
        RowValues::Int(i) => Value::Integer(*i),
        RowValues::Float(f) => Value::Real(*f),
        RowValues::Text(s) => Value::Text(s.clone()),
        RowValues::Bool(b) => Value::Integer(i64::from(*b)),
        RowValues::Timestamp(dt) => TIMESTAMP_BUF.with(|buf| {
            let mut borrow = buf.borrow_mut();
            borrow.clear();
            // writing into a String cannot fail
            let _ = write!(borrow, "{}", dt.format("%F %T%.f"));
            Value::Text(borrow.clone())
        }),
        RowValues::Null => Value::Null,
        RowValues::JSON(jval) => Value::Text(jval.to_string()),
        RowValues::Blob(bytes) => Value::Blob(bytes.clone()),
    }
}

/// Unified `SQLite` parameter container.
#[derive(Debug, Clone)]
pub struct Params(pub Vec<Value>);

impl Params {
    /// Convert row values into `SQLite` values.
    #[must_use]
    pub fn convert(params: &[RowValues]) -> Self {
        Params(params.iter().map(row_value_to_sqlite_value).collect())
    }

    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.0
    }
}

/// Where a bound argument goes in a `SQLite` statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// 1-based parameter index.
    Index(usize),
    /// Parameter name including its sigil (`:id`, `@id`, `$id`).
    Name(String),
}

/// Split context arguments into bindings. `SQLite` understands named
/// parameters natively; a bare name is looked up as `:name`.
#[must_use]
pub fn bindings(args: &[NamedValue]) -> Vec<(Binding, Value)> {
    args.iter()
        .map(|arg| {
            let value = row_value_to_sqlite_value(&arg.value);
            let binding = match arg.name.as_deref() {
                Some(name) if !name.is_empty() => {
                    if name.starts_with([':', '@', '$']) {
                        Binding::Name(name.to_string())
                    } else {
                        Binding::Name(format!(":{name}"))
                    }
                }
                _ => Binding::Index(arg.ordinal),
            };
            (binding, value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn bools_and_timestamps_become_sqlite_primitives() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .and_then(|d| d.and_hms_opt(3, 4, 5))
            .map(RowValues::Timestamp)
            .unwrap_or(RowValues::Null);
        let params = Params::convert(&[RowValues::Bool(true), ts, RowValues::Null]);
        assert_eq!(
            params.into_values(),
            vec![
                Value::Integer(1),
                Value::Text("2024-01-02 03:04:05".into()),
                Value::Null
            ]
        );
    }

    #[test]
    fn named_arguments_get_a_sigil() {
        let args = vec![
            NamedValue::positional(1, RowValues::Int(1)),
            NamedValue::named("id", 2, RowValues::Int(2)),
            NamedValue::named("@tag", 3, RowValues::Text("x".into())),
        ];
        let bound: Vec<_> = bindings(&args).into_iter().map(|(b, _)| b).collect();
        assert_eq!(
            bound,
            vec![
                Binding::Index(1),
                Binding::Name(":id".into()),
                Binding::Name("@tag".into())
            ]
        );
    }
}
