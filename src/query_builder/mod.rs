use std::borrow::Cow;

use tokio_util::sync::CancellationToken;

use crate::ring::RingConnection;
use crate::types::{NamedValue, RowValues};

mod dml;
mod select;

/// Fluent builder for one-off statements on a ring.
///
/// `select` reads through the next replica; `dml` / `execute` run on the primary.
/// ```rust,no_run
/// use sql_ring::prelude::*;
///
/// # async fn demo(ring: &RingConnection) -> Result<(), SqlRingError> {
/// let rows = ring
///     .sql("SELECT name FROM users WHERE id = ?1")
///     .params(&[RowValues::Int(1)])
///     .select()
///     .await?;
/// # let _ = rows;
/// # Ok(()) }
/// ```
pub struct QueryBuilder<'conn, 'q> {
    pub(crate) conn: &'conn RingConnection,
    pub(crate) sql: &'q str,
    pub(crate) params: Cow<'q, [RowValues]>,
    pub(crate) cancel: Option<CancellationToken>,
}

impl<'conn, 'q> QueryBuilder<'conn, 'q> {
    pub(crate) fn new(conn: &'conn RingConnection, sql: &'q str) -> Self {
        Self {
            conn,
            sql,
            params: Cow::Borrowed(&[]),
            cancel: None,
        }
    }

    /// Provide parameters for this statement.
    #[must_use]
    pub fn params(mut self, params: &'q [RowValues]) -> Self {
        self.params = Cow::Borrowed(params);
        self
    }

    /// Run through the cancellation-aware entry points, observing `token`.
    #[must_use]
    pub fn cancel_with(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub(crate) fn named_params(&self) -> Vec<NamedValue> {
        NamedValue::from_values(&self.params)
    }
}
