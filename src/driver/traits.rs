use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::SqlRingError;
use crate::types::{NamedValue, RowValues};

/// Outcome of a statement that does not return rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    pub rows_affected: u64,
    pub last_insert_id: Option<i64>,
}

/// Opens physical connections from a DSN.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn open(&self, dsn: &str) -> Result<Arc<dyn Conn>, SqlRingError>;
}

/// One connection. Implementations must tolerate concurrent in-flight calls.
///
/// The `as_*` accessors expose optional capabilities; a backend that returns
/// `None` simply does not offer that entry point.
#[async_trait]
pub trait Conn: Send + Sync {
    /// Prepare `query`, bound to this connection.
    async fn prepare(&self, query: &str) -> Result<Arc<dyn Stmt>, SqlRingError>;

    async fn close(&self) -> Result<(), SqlRingError>;

    async fn begin(&self) -> Result<Box<dyn Tx>, SqlRingError>;

    fn as_queryer(&self) -> Option<&dyn Queryer> {
        None
    }

    fn as_queryer_context(&self) -> Option<&dyn QueryerContext> {
        None
    }

    fn as_execer(&self) -> Option<&dyn Execer> {
        None
    }

    fn as_execer_context(&self) -> Option<&dyn ExecerContext> {
        None
    }
}

/// Direct (unprepared) query on a connection.
#[async_trait]
pub trait Queryer: Send + Sync {
    async fn query(&self, query: &str, args: &[RowValues])
    -> Result<Box<dyn Rows>, SqlRingError>;
}

#[async_trait]
pub trait QueryerContext: Send + Sync {
    async fn query_context(
        &self,
        ctx: &CancellationToken,
        query: &str,
        args: &[NamedValue],
    ) -> Result<Box<dyn Rows>, SqlRingError>;
}

/// Direct (unprepared) exec on a connection.
#[async_trait]
pub trait Execer: Send + Sync {
    async fn exec(&self, query: &str, args: &[RowValues]) -> Result<ExecOutcome, SqlRingError>;
}

#[async_trait]
pub trait ExecerContext: Send + Sync {
    async fn exec_context(
        &self,
        ctx: &CancellationToken,
        query: &str,
        args: &[NamedValue],
    ) -> Result<ExecOutcome, SqlRingError>;
}

/// A prepared statement.
#[async_trait]
pub trait Stmt: Send + Sync {
    async fn close(&self) -> Result<(), SqlRingError>;

    /// Number of placeholders, or `None` when the backend cannot tell. `None`
    /// means "skip local validation", never "zero arguments".
    fn num_input(&self) -> Option<usize>;

    async fn exec(&self, args: &[RowValues]) -> Result<ExecOutcome, SqlRingError>;

    async fn query(&self, args: &[RowValues]) -> Result<Box<dyn Rows>, SqlRingError>;

    fn as_exec_context(&self) -> Option<&dyn StmtExecContext> {
        None
    }

    fn as_query_context(&self) -> Option<&dyn StmtQueryContext> {
        None
    }
}

#[async_trait]
pub trait StmtExecContext: Send + Sync {
    async fn exec_context(
        &self,
        ctx: &CancellationToken,
        args: &[NamedValue],
    ) -> Result<ExecOutcome, SqlRingError>;
}

#[async_trait]
pub trait StmtQueryContext: Send + Sync {
    async fn query_context(
        &self,
        ctx: &CancellationToken,
        args: &[NamedValue],
    ) -> Result<Box<dyn Rows>, SqlRingError>;
}

#[async_trait]
pub trait Tx: Send {
    async fn commit(self: Box<Self>) -> Result<(), SqlRingError>;
    async fn rollback(self: Box<Self>) -> Result<(), SqlRingError>;
}

/// Row iterator returned by a query.
#[async_trait]
pub trait Rows: Send {
    fn columns(&self) -> &[String];

    /// Copy the next row into `dest`. Returns `Ok(false)` once the rows are
    /// exhausted; `dest` is left untouched in that case.
    async fn next(&mut self, dest: &mut [RowValues]) -> Result<bool, SqlRingError>;

    async fn close(&mut self) -> Result<(), SqlRingError>;
}

/// Check `args` against the statement's reported placeholder count.
///
/// # Errors
/// Returns [`SqlRingError::ParameterError`] when the count is known and differs.
pub fn check_arg_count(stmt: &dyn Stmt, given: usize) -> Result<(), SqlRingError> {
    match stmt.num_input() {
        Some(expected) if expected != given => Err(SqlRingError::ParameterError(format!(
            "statement expects {expected} arguments, got {given}"
        ))),
        _ => Ok(()),
    }
}
