use std::fmt;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use rusqlite::InterruptHandle;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::driver::{
    Conn, ExecOutcome, Execer, ExecerContext, Queryer, QueryerContext, Rows, Stmt, Tx,
    ensure_live,
};
use crate::error::SqlRingError;
use crate::types::{NamedValue, RowValues};

use super::params::{Params, bindings};
use super::query::{exec_bound, exec_rows, query_bound, query_rows};
use super::statement::SqliteStatement;
use super::transaction::SqliteTx;

/// Shared access to one rusqlite connection. `None` once closed.
#[derive(Clone)]
pub(crate) struct SqliteHandle {
    conn: Arc<Mutex<Option<rusqlite::Connection>>>,
    interrupt: Arc<InterruptHandle>,
}

impl SqliteHandle {
    fn new(conn: rusqlite::Connection) -> Self {
        let interrupt = Arc::new(conn.get_interrupt_handle());
        Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            interrupt,
        }
    }

    /// Run `func` on a blocking thread with the connection locked.
    pub(crate) async fn run<F, R>(&self, func: F) -> Result<R, SqlRingError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, SqlRingError> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.blocking_lock();
            let conn = guard.as_mut().ok_or(SqlRingError::Closed("connection"))?;
            func(conn)
        })
        .await?
    }

    /// As [`SqliteHandle::run`], but `ctx` can stop the call.
    ///
    /// A call still waiting for the connection when `ctx` fires never runs and
    /// fails with [`SqlRingError::Cancelled`]. A running call is interrupted and
    /// fails with [`SqlRingError::Interrupted`], unless it completes first, in
    /// which case its real outcome is returned. The interrupt is only raised
    /// while this call holds the connection, so other callers' statements are
    /// never hit.
    pub(crate) async fn run_cancellable<F, R>(
        &self,
        ctx: &CancellationToken,
        func: F,
    ) -> Result<R, SqlRingError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, SqlRingError> + Send + 'static,
        R: Send + 'static,
    {
        ensure_live(ctx)?;
        let phase = Arc::new(StdMutex::new(Phase::Queued));
        let conn = Arc::clone(&self.conn);
        let token = ctx.clone();
        let running = Arc::clone(&phase);
        let work = tokio::task::spawn_blocking(move || {
            let mut guard = conn.blocking_lock();
            {
                let mut phase = running.lock().unwrap_or_else(PoisonError::into_inner);
                if token.is_cancelled() {
                    *phase = Phase::Done;
                    return Err(SqlRingError::Cancelled);
                }
                *phase = Phase::Running;
            }
            let outcome = match guard.as_mut() {
                Some(conn) => func(conn),
                None => Err(SqlRingError::Closed("connection")),
            };
            // flip before the connection lock is released
            *running.lock().unwrap_or_else(PoisonError::into_inner) = Phase::Done;
            drop(guard);
            outcome
        });
        tokio::pin!(work);
        let outcome = tokio::select! {
            joined = &mut work => joined?,
            () = ctx.cancelled() => {
                {
                    let phase = phase.lock().unwrap_or_else(PoisonError::into_inner);
                    if *phase == Phase::Running {
                        self.interrupt.interrupt();
                    }
                }
                work.await?
            }
        };
        interrupted(outcome)
    }

    async fn close(&self) -> Result<(), SqlRingError> {
        let taken = self.conn.lock().await.take();
        match taken {
            Some(conn) => tokio::task::spawn_blocking(move || conn.close().map_err(|(_, e)| e))
                .await?
                .map_err(SqlRingError::from),
            None => Ok(()),
        }
    }
}

/// Where a cancellable call stands relative to the connection lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Queued,
    Running,
    Done,
}

fn interrupted<R>(outcome: Result<R, SqlRingError>) -> Result<R, SqlRingError> {
    match outcome {
        Err(SqlRingError::SqliteError(rusqlite::Error::SqliteFailure(err, _)))
            if err.code == rusqlite::ErrorCode::OperationInterrupted =>
        {
            debug!("sqlite call interrupted by cancellation");
            Err(SqlRingError::Interrupted)
        }
        other => other,
    }
}

/// One rusqlite connection exposed through the driver contract.
///
/// Every capability is supported; context entry points bind named
/// parameters natively.
pub struct SqliteConnection {
    handle: SqliteHandle,
}

impl SqliteConnection {
    pub(crate) fn new(conn: rusqlite::Connection) -> Self {
        Self {
            handle: SqliteHandle::new(conn),
        }
    }

    /// Run synchronous rusqlite logic against the connection.
    ///
    /// # Errors
    /// Returns [`SqlRingError::Closed`] after `close`, or whatever `func` returns.
    pub async fn with_connection<F, R>(&self, func: F) -> Result<R, SqlRingError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, SqlRingError> + Send + 'static,
        R: Send + 'static,
    {
        self.handle.run(func).await
    }

    /// Execute a batch of statements, e.g. schema setup.
    ///
    /// # Errors
    /// Returns the rusqlite error for the first failing statement.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), SqlRingError> {
        let sql = sql.to_owned();
        self.handle
            .run(move |conn| conn.execute_batch(&sql).map_err(SqlRingError::from))
            .await
    }
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection").finish_non_exhaustive()
    }
}

#[async_trait]
impl Conn for SqliteConnection {
    async fn prepare(&self, query: &str) -> Result<Arc<dyn Stmt>, SqlRingError> {
        let sql = Arc::new(query.to_owned());
        let probe = Arc::clone(&sql);
        let num_input = self
            .handle
            .run(move |conn| Ok(conn.prepare_cached(&probe)?.parameter_count()))
            .await?;
        Ok(Arc::new(SqliteStatement::new(
            self.handle.clone(),
            sql,
            num_input,
        )))
    }

    async fn close(&self) -> Result<(), SqlRingError> {
        self.handle.close().await
    }

    async fn begin(&self) -> Result<Box<dyn Tx>, SqlRingError> {
        self.handle
            .run(|conn| conn.execute_batch("BEGIN").map_err(SqlRingError::from))
            .await?;
        Ok(Box::new(SqliteTx::new(self.handle.clone())))
    }

    fn as_queryer(&self) -> Option<&dyn Queryer> {
        Some(self)
    }

    fn as_queryer_context(&self) -> Option<&dyn QueryerContext> {
        Some(self)
    }

    fn as_execer(&self) -> Option<&dyn Execer> {
        Some(self)
    }

    fn as_execer_context(&self) -> Option<&dyn ExecerContext> {
        Some(self)
    }
}

#[async_trait]
impl Queryer for SqliteConnection {
    async fn query(&self, query: &str, args: &[RowValues]) -> Result<Box<dyn Rows>, SqlRingError> {
        let sql = query.to_owned();
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
}

#[async_trait]
impl QueryerContext for SqliteConnection {
    async fn query_context(
        &self,
        ctx: &CancellationToken,
        query: &str,
        args: &[NamedValue],
    ) -> Result<Box<dyn Rows>, SqlRingError> {
        let sql = query.to_owned();
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

#[async_trait]
impl Execer for SqliteConnection {
    async fn exec(&self, query: &str, args: &[RowValues]) -> Result<ExecOutcome, SqlRingError> {
        let sql = query.to_owned();
        let params = Params::convert(args).into_values();
        self.handle
            .run(move |conn| {
                let mut stmt = conn.prepare_cached(&sql)?;
                exec_rows(&*conn, &mut stmt, &params)
            })
            .await
    }
}

#[async_trait]
impl ExecerContext for SqliteConnection {
    async fn exec_context(
        &self,
        ctx: &CancellationToken,
        query: &str,
        args: &[NamedValue],
    ) -> Result<ExecOutcome, SqlRingError> {
        let sql = query.to_owned();
        let bound = bindings(args);
        self.handle
            .run_cancellable(ctx, move |conn| {
                let mut stmt = conn.prepare_cached(&sql)?;
                exec_bound(&*conn, &mut stmt, &bound)
            })
            .await
    }
}
