use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::driver::{ExecOutcome, Rows, Stmt, StmtExecContext, StmtQueryContext};
use crate::error::SqlRingError;
use crate::types::{NamedValue, RowValues};

use super::connection::SqliteHandle;
use super::params::{Params, bindings};
use super::query::{exec_bound, exec_rows, query_bound, query_rows};

/// Prepared statement on one `SQLite` connection.
///
/// The compiled statement lives in rusqlite's per-connection cache; this
/// handle keeps the SQL and the placeholder count taken at prepare time.
pub struct SqliteStatement {
    handle: SqliteHandle,
    sql: Arc<String>,
    num_input: usize,
    closed: AtomicBool,
}

impl SqliteStatement {
    pub(crate) fn new(handle: SqliteHandle, sql: Arc<String>, num_input: usize) -> Self {
        Self {
            handle,
            sql,
            num_input,
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        self.sql.as_str()
    }

    fn ensure_open(&self) -> Result<(), SqlRingError> {
        if self.closed.load(Ordering::Acquire) {
            Err(SqlRingError::Closed("statement"))
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for SqliteStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStatement")
            .field("sql", &self.sql)
            .field("num_input", &self.num_input)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stmt for SqliteStatement {
    async fn close(&self) -> Result<(), SqlRingError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn num_input(&self) -> Option<usize> {
        Some(self.num_input)
    }

    async fn exec(&self, args: &[RowValues]) -> Result<ExecOutcome, SqlRingError> {
        self.ensure_open()?;
        let sql = Arc::clone(&self.sql);
        let params = Params::convert(args).into_values();
        self.handle
            .run(move |conn| {
                let mut stmt = conn.prepare_cached(&sql)?;
                exec_rows(&*conn, &mut stmt, &params)
            })
            .await
    }

    async fn query(&self, args: &[RowValues]) -> Result<Box<dyn Rows>, SqlRingError> {
        self.ensure_open()?;
        let sql = Arc::clone(&self.sql);
        let params = Params::convert(args).into_values();
        let rows = self
            .handle
            .run(move |conn| {
                let mut stmt = conn.prepare_cached(&sql)?;
                query_rows(&mut stmt, &params)
            })
            .await?;
        Ok(Box::new(rows))
    }

    fn as_exec_context(&self) -> Option<&dyn StmtExecContext> {
        Some(self)
    }

    fn as_query_context(&self) -> Option<&dyn StmtQueryContext> {
        Some(self)
    }
}

#[async_trait]
impl StmtExecContext for SqliteStatement {
    async fn exec_context(
        &self,
        ctx: &CancellationToken,
        args: &[NamedValue],
    ) -> Result<ExecOutcome, SqlRingError> {
        self.ensure_open()?;
        let sql = Arc::clone(&self.sql);
        let bound = bindings(args);
        self.handle
            .run_cancellable(ctx, move |conn| {
                let mut stmt = conn.prepare_cached(&sql)?;
                exec_bound(&*conn, &mut stmt, &bound)
            })
            .await
    }
}

#[async_trait]
impl StmtQueryContext for SqliteStatement {
    async fn query_context(
        &self,
        ctx: &CancellationToken,
        args: &[NamedValue],
    ) -> Result<Box<dyn Rows>, SqlRingError> {
        self.ensure_open()?;
        let sql = Arc::clone(&self.sql);
        let bound = bindings(args);
        let rows = self
            .handle
            .run_cancellable(ctx, move |conn| {
                let mut stmt = conn.prepare_cached(&sql)?;
                query_bound(&mut stmt, &bound)
            })
            .await?;
        Ok(Box::new(rows))
    }
}
