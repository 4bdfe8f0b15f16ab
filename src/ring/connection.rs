use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::driver::{
    Conn, Driver, ExecOutcome, ExecPath, Execer, ExecerContext, QueryPath, Queryer,
    QueryerContext, Rows, Stmt, Tx, ensure_live,
};
use crate::error::SqlRingError;
use crate::query_builder::QueryBuilder;
use crate::types::{NamedValue, RowValues, named_values_to_values};

use super::cursor::ResultCursor;
use super::dsn::{RingConfig, redact_dsn};
use super::fanout::{first_error, on_each, partition};
use super::selector::{ReplicaSelector, Route};
use super::statement::{RingStatement, close_statements};

/// Driver that opens a [`RingConnection`] from a `;`-separated DSN list,
/// opening every backend through `inner`.
#[derive(Clone)]
pub struct RingDriver {
    inner: Arc<dyn Driver>,
}

impl RingDriver {
    #[must_use]
    pub fn new(inner: Arc<dyn Driver>) -> Self {
        Self { inner }
    }

    /// # Errors
    /// Returns [`SqlRingError::ConfigError`] for a malformed list, or the first
    /// backend open failure.
    pub async fn open_ring(&self, dsn_list: &str) -> Result<RingConnection, SqlRingError> {
        let cfg = RingConfig::parse(dsn_list)?;
        self.connect(&cfg).await
    }

    /// Open the primary, then every replica concurrently.
    ///
    /// If any replica fails, every backend opened by this call is closed again
    /// before the first error is returned.
    ///
    /// # Errors
    /// Returns the primary's open error, or the first replica open error.
    pub async fn connect(&self, cfg: &RingConfig) -> Result<RingConnection, SqlRingError> {
        cfg.validate()?;
        let primary = self.inner.open(&cfg.primary).await?;

        let outcomes = on_each(cfg.replicas.len(), |i| {
            let inner = Arc::clone(&self.inner);
            let dsn = cfg.replicas[i].clone();
            async move { inner.open(&dsn).await }
        })
        .await;

        let (replicas, err) = partition(outcomes);
        if let Some(err) = err {
            warn!(
                ring = %cfg,
                opened = replicas.len() + 1,
                error = %err,
                "replica open failed; closing opened backends"
            );
            let opened: Vec<_> = std::iter::once(primary).chain(replicas).collect();
            if let Err(close_err) = close_connections(&opened).await {
                warn!(error = %close_err, "closing backends after failed open");
            }
            return Err(err);
        }

        info!(
            primary = %redact_dsn(&cfg.primary),
            replicas = replicas.len(),
            "ring opened"
        );
        Ok(RingConnection::new(primary, replicas))
    }
}

#[async_trait]
impl Driver for RingDriver {
    async fn open(&self, dsn: &str) -> Result<Arc<dyn Conn>, SqlRingError> {
        Ok(Arc::new(self.open_ring(dsn).await?))
    }
}

impl fmt::Debug for RingDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingDriver").finish_non_exhaustive()
    }
}

/// One logical connection over a primary and an ordered replica list.
///
/// Reads (direct queries, prepared `query`) are spread round-robin over the
/// replicas, or served by the primary when there are none. Everything else -
/// exec, transactions - goes to the primary.
pub struct RingConnection {
    primary: Arc<dyn Conn>,
    replicas: Vec<Arc<dyn Conn>>,
    selector: Arc<ReplicaSelector>,
}

impl RingConnection {
    /// Assemble a ring from already-open backends. Replica order is routing order.
    #[must_use]
    pub fn new(primary: Arc<dyn Conn>, replicas: Vec<Arc<dyn Conn>>) -> Self {
        let selector = Arc::new(ReplicaSelector::new(replicas.len()));
        Self {
            primary,
            replicas,
            selector,
        }
    }

    #[must_use]
    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }

    #[must_use]
    pub fn selector(&self) -> &ReplicaSelector {
        &self.selector
    }

    /// Backend for the next read.
    fn read_backend(&self) -> &dyn Conn {
        let route = self.selector.next();
        debug!(?route, "read routed");
        match route {
            Route::Primary => self.primary.as_ref(),
            Route::Replica(i) => self.replicas[i].as_ref(),
        }
    }

    /// Prepare `query` on the primary, then on every replica concurrently.
    ///
    /// All-or-nothing: if any backend fails, the handles obtained so far are
    /// closed and the first error is returned.
    ///
    /// # Errors
    /// Returns the primary's prepare error or the first replica prepare error.
    pub async fn prepare_ring(&self, query: &str) -> Result<RingStatement, SqlRingError> {
        let primary_stmt = self.primary.prepare(query).await?;

        let outcomes = on_each(self.replicas.len(), |i| {
            let replica = Arc::clone(&self.replicas[i]);
            let query = query.to_owned();
            async move { replica.prepare(&query).await }
        })
        .await;

        let (replica_stmts, err) = partition(outcomes);
        let stmts: Vec<Arc<dyn Stmt>> = std::iter::once(primary_stmt).chain(replica_stmts).collect();
        if let Some(err) = err {
            warn!(prepared = stmts.len(), error = %err, "prepare failed on a replica; discarding handles");
            if let Err(close_err) = close_statements(&stmts).await {
                warn!(error = %close_err, "closing handles after failed prepare");
            }
            return Err(err);
        }

        Ok(RingStatement::new(stmts, Arc::clone(&self.selector)))
    }

    /// Direct read routed to the next replica.
    ///
    /// # Errors
    /// Returns [`SqlRingError::CapabilityUnsupported`] if the chosen backend has
    /// no direct-query entry point, otherwise the backend's error.
    pub async fn query_rows(
        &self,
        query: &str,
        args: &[RowValues],
    ) -> Result<ResultCursor, SqlRingError> {
        let rows = match QueryPath::of_plain(self.read_backend()) {
            QueryPath::Plain(q) => q.query(query, args).await?,
            QueryPath::Context(q) => {
                q.query_context(&CancellationToken::new(), query, &NamedValue::from_values(args))
                    .await?
            }
            QueryPath::Unsupported => return Err(SqlRingError::CapabilityUnsupported("direct query")),
        };
        Ok(ResultCursor::new(rows))
    }

    /// Cancellation-aware direct read.
    ///
    /// A token that already fired fails with [`SqlRingError::Cancelled`] before
    /// any backend is chosen.
    ///
    /// # Errors
    /// As [`RingConnection::query_rows`], plus [`SqlRingError::Cancelled`] and
    /// [`SqlRingError::NamedParameter`].
    pub async fn query_rows_context(
        &self,
        ctx: &CancellationToken,
        query: &str,
        args: &[NamedValue],
    ) -> Result<ResultCursor, SqlRingError> {
        ensure_live(ctx)?;
        let rows = match QueryPath::of(self.read_backend()) {
            QueryPath::Context(q) => q.query_context(ctx, query, args).await?,
            QueryPath::Plain(q) => {
                let values = named_values_to_values(args)?;
                ensure_live(ctx)?;
                q.query(query, &values).await?
            }
            QueryPath::Unsupported => return Err(SqlRingError::CapabilityUnsupported("direct query")),
        };
        Ok(ResultCursor::new(rows))
    }

    /// Start a fluent builder for a one-off statement on this ring.
    #[must_use]
    pub fn sql<'a>(&'a self, sql: &'a str) -> QueryBuilder<'a, 'a> {
        QueryBuilder::new(self, sql)
    }

    /// Close every backend. `close` is a no-op, so this is the only physical teardown.
    ///
    /// # Errors
    /// Returns the first close failure; the remaining backends are still closed.
    pub async fn shutdown(&self) -> Result<(), SqlRingError> {
        let all: Vec<_> = std::iter::once(Arc::clone(&self.primary))
            .chain(self.replicas.iter().cloned())
            .collect();
        close_connections(&all).await
    }
}

#[async_trait]
impl Conn for RingConnection {
    async fn prepare(&self, query: &str) -> Result<Arc<dyn Stmt>, SqlRingError> {
        Ok(Arc::new(self.prepare_ring(query).await?))
    }

    /// Idle rings are torn down by whoever pools them; see [`RingConnection::shutdown`].
    async fn close(&self) -> Result<(), SqlRingError> {
        Ok(())
    }

    /// Opens the transaction on the primary and returns the primary's handle.
    /// That handle only commits or rolls back; the statements it covers are
    /// whatever reaches the primary connection before it finishes, including
    /// writes sent through this ring by other callers.
    async fn begin(&self) -> Result<Box<dyn Tx>, SqlRingError> {
        self.primary.begin().await
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
impl Queryer for RingConnection {
    async fn query(
        &self,
        query: &str,
        args: &[RowValues],
    ) -> Result<Box<dyn Rows>, SqlRingError> {
        Ok(Box::new(self.query_rows(query, args).await?))
    }
}

#[async_trait]
impl QueryerContext for RingConnection {
    async fn query_context(
        &self,
        ctx: &CancellationToken,
        query: &str,
        args: &[NamedValue],
    ) -> Result<Box<dyn Rows>, SqlRingError> {
        Ok(Box::new(self.query_rows_context(ctx, query, args).await?))
    }
}

#[async_trait]
impl Execer for RingConnection {
    async fn exec(&self, query: &str, args: &[RowValues]) -> Result<ExecOutcome, SqlRingError> {
        match ExecPath::of_plain(self.primary.as_ref()) {
            ExecPath::Plain(e) => e.exec(query, args).await,
            ExecPath::Context(e) => {
                e.exec_context(&CancellationToken::new(), query, &NamedValue::from_values(args))
                    .await
            }
            ExecPath::Unsupported => Err(SqlRingError::CapabilityUnsupported("direct exec")),
        }
    }
}

#[async_trait]
impl ExecerContext for RingConnection {
    async fn exec_context(
        &self,
        ctx: &CancellationToken,
        query: &str,
        args: &[NamedValue],
    ) -> Result<ExecOutcome, SqlRingError> {
        ensure_live(ctx)?;
        match ExecPath::of(self.primary.as_ref()) {
            ExecPath::Context(e) => e.exec_context(ctx, query, args).await,
            ExecPath::Plain(e) => {
                let values = named_values_to_values(args)?;
                ensure_live(ctx)?;
                e.exec(query, &values).await
            }
            ExecPath::Unsupported => Err(SqlRingError::CapabilityUnsupported("direct exec")),
        }
    }
}

impl fmt::Debug for RingConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingConnection")
            .field("replicas", &self.replicas.len())
            .field("selector", &self.selector)
            .finish_non_exhaustive()
    }
}

async fn close_connections(conns: &[Arc<dyn Conn>]) -> Result<(), SqlRingError> {
    let outcomes = on_each(conns.len(), |i| {
        let conn = Arc::clone(&conns[i]);
        async move { conn.close().await }
    })
    .await;
    first_error(outcomes)
}
