use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::driver::{
    Conn, ExecOutcome, Execer, ExecerContext, Queryer, QueryerContext, Rows, Stmt, Tx,
    ensure_live,
};
use crate::error::SqlRingError;
use crate::types::{NamedValue, RowValues, named_values_to_values};

use super::params::Params;
use super::query::buffer_rows;
use super::statement::PostgresStatement;
use super::transaction::PostgresTx;

/// One `tokio-postgres` client plus the task driving its socket.
///
/// Postgres only understands `$n` placeholders, so named arguments are
/// rejected with [`SqlRingError::NamedParameter`].
pub struct PostgresConnection {
    client: Arc<Client>,
    in_flight: Arc<InFlight>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PostgresConnection {
    pub(crate) fn new(client: Client, task: JoinHandle<()>) -> Self {
        Self {
            client: Arc::new(client),
            in_flight: Arc::default(),
            task: Mutex::new(Some(task)),
        }
    }

    /// Execute a batch of statements, e.g. schema setup.
    ///
    /// # Errors
    /// Returns the Postgres error for the first failing statement.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), SqlRingError> {
        self.in_flight
            .track(async { Ok(self.client.batch_execute(sql).await?) })
            .await
    }

    pub(crate) fn ensure_open(&self) -> Result<(), SqlRingError> {
        if self.client.is_closed() {
            Err(SqlRingError::Closed("connection"))
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for PostgresConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConnection")
            .field("closed", &self.client.is_closed())
            .finish_non_exhaustive()
    }
}

/// Requests outstanding on one client.
///
/// tokio-postgres pipelines concurrent callers over a single session and a
/// server-side cancel stops whatever that session is running. A cancel is only
/// sent while the cancelling call is the sole request in flight; otherwise the
/// token stays advisory and the request runs to completion.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    count: AtomicUsize,
    // held while a cancel request is delivered; new requests wait behind it
    cancelling: tokio::sync::Mutex<()>,
}

struct Entered<'a>(&'a AtomicUsize);

impl Drop for Entered<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl InFlight {
    async fn enter(&self) -> Entered<'_> {
        let _cancelling = self.cancelling.lock().await;
        self.count.fetch_add(1, Ordering::AcqRel);
        Entered(&self.count)
    }

    /// Run `work` counted as in flight.
    pub(crate) async fn track<T, F>(&self, work: F) -> Result<T, SqlRingError>
    where
        F: Future<Output = Result<T, SqlRingError>>,
    {
        let _entered = self.enter().await;
        work.await
    }

    /// Race `work` against `ctx`. On cancellation the server is asked to stop
    /// the query when nothing else shares the session, and the outcome of
    /// `work` is still awaited: a query the server cancelled reports
    /// [`SqlRingError::Interrupted`], anything that completed reports its own
    /// result.
    pub(crate) async fn cancellable<T, F>(
        &self,
        client: &Client,
        ctx: &CancellationToken,
        work: F,
    ) -> Result<T, SqlRingError>
    where
        F: Future<Output = Result<T, SqlRingError>>,
    {
        ensure_live(ctx)?;
        let _entered = self.enter().await;
        tokio::pin!(work);
        tokio::select! {
            outcome = &mut work => outcome,
            () = ctx.cancelled() => {
                self.cancel_if_alone(client).await;
                interrupted(work.await)
            }
        }
    }

    async fn cancel_if_alone(&self, client: &Client) {
        let _cancelling = self.cancelling.lock().await;
        let in_flight = self.count.load(Ordering::Acquire);
        if in_flight != 1 {
            debug!(in_flight, "session shared by other requests; not cancelling");
            return;
        }
        if let Err(err) = client.cancel_token().cancel_query(NoTls).await {
            warn!(error = %err, "postgres cancel request failed");
        }
    }

    #[cfg(test)]
    fn in_flight(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}

fn interrupted<T>(outcome: Result<T, SqlRingError>) -> Result<T, SqlRingError> {
    match outcome {
        Err(SqlRingError::PostgresError(err)) if err.code() == Some(&SqlState::QUERY_CANCELED) => {
            Err(SqlRingError::Interrupted)
        }
        other => other,
    }
}

pub(crate) async fn query_direct(
    client: &Client,
    query: &str,
    args: &[RowValues],
) -> Result<Box<dyn Rows>, SqlRingError> {
    let stmt = client.prepare(query).await?;
    let params = Params::convert(args);
    let rows = client.query(&stmt, params.as_refs()).await?;
    Ok(Box::new(buffer_rows(&stmt, &rows)?))
}

pub(crate) async fn exec_direct(
    client: &Client,
    query: &str,
    args: &[RowValues],
) -> Result<ExecOutcome, SqlRingError> {
    let params = Params::convert(args);
    let rows_affected = client.execute(query, params.as_refs()).await?;
    Ok(ExecOutcome {
        rows_affected,
        last_insert_id: None,
    })
}

#[async_trait]
impl Conn for PostgresConnection {
    async fn prepare(&self, query: &str) -> Result<Arc<dyn Stmt>, SqlRingError> {
        self.ensure_open()?;
        let stmt = self
            .in_flight
            .track(async { Ok(self.client.prepare(query).await?) })
            .await?;
        Ok(Arc::new(PostgresStatement::new(
            Arc::clone(&self.client),
            Arc::clone(&self.in_flight),
            stmt,
        )))
    }

    /// Stops the connection task; the client reports closed afterwards.
    async fn close(&self) -> Result<(), SqlRingError> {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
            // a cancelled join is the expected outcome
            if let Err(err) = task.await {
                if !err.is_cancelled() {
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn Tx>, SqlRingError> {
        self.ensure_open()?;
        self.in_flight
            .track(async { Ok(self.client.batch_execute("BEGIN").await?) })
            .await?;
        Ok(Box::new(PostgresTx::new(
            Arc::clone(&self.client),
            Arc::clone(&self.in_flight),
        )))
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
impl Queryer for PostgresConnection {
    async fn query(&self, query: &str, args: &[RowValues]) -> Result<Box<dyn Rows>, SqlRingError> {
        self.ensure_open()?;
        self.in_flight
            .track(query_direct(&self.client, query, args))
            .await
    }
}

#[async_trait]
impl QueryerContext for PostgresConnection {
    async fn query_context(
        &self,
        ctx: &CancellationToken,
        query: &str,
        args: &[NamedValue],
    ) -> Result<Box<dyn Rows>, SqlRingError> {
        self.ensure_open()?;
        let values = named_values_to_values(args)?;
        self.in_flight
            .cancellable(&self.client, ctx, query_direct(&self.client, query, &values))
            .await
    }
}

#[async_trait]
impl Execer for PostgresConnection {
    async fn exec(&self, query: &str, args: &[RowValues]) -> Result<ExecOutcome, SqlRingError> {
        self.ensure_open()?;
        self.in_flight
            .track(exec_direct(&self.client, query, args))
            .await
    }
}

#[async_trait]
impl ExecerContext for PostgresConnection {
    async fn exec_context(
        &self,
        ctx: &CancellationToken,
        query: &str,
        args: &[NamedValue],
    ) -> Result<ExecOutcome, SqlRingError> {
        self.ensure_open()?;
        let values = named_values_to_values(args)?;
        self.in_flight
            .cancellable(&self.client, ctx, exec_direct(&self.client, query, &values))
            .await
    }
}
