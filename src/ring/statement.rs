use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::driver::{
    ExecOutcome, Rows, Stmt, StmtExecContext, StmtExecPath, StmtQueryContext, StmtQueryPath,
    check_arg_count, ensure_live,
};
use crate::error::SqlRingError;
use crate::types::{NamedValue, RowValues, named_values_to_values};

use super::cursor::ResultCursor;
use super::fanout::{first_error, on_each};
use super::selector::{ReplicaSelector, Route};

/// A statement prepared on the primary (handle 0) and on every replica
/// (handles 1..=N, in replica order).
///
/// `exec` always runs on the primary. `query` runs on whichever handle the
/// ring's shared selector picks, so every replica must already hold a
/// prepared handle.
pub struct RingStatement {
    stmts: Vec<Arc<dyn Stmt>>,
    selector: Arc<ReplicaSelector>,
    closed: AtomicBool,
}

impl RingStatement {
    pub(crate) fn new(stmts: Vec<Arc<dyn Stmt>>, selector: Arc<ReplicaSelector>) -> Self {
        debug_assert_eq!(stmts.len(), selector.replicas() + 1);
        Self {
            stmts,
            selector,
            closed: AtomicBool::new(false),
        }
    }

    /// Primary plus one handle per replica.
    #[must_use]
    pub fn handle_count(&self) -> usize {
        self.stmts.len()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn primary(&self) -> &dyn Stmt {
        self.stmts[0].as_ref()
    }

    fn read_stmt(&self) -> &dyn Stmt {
        let route = self.selector.next();
        debug!(?route, "prepared read routed");
        match route {
            Route::Primary => self.primary(),
            Route::Replica(i) => self.stmts[i + 1].as_ref(),
        }
    }

    fn ensure_open(&self) -> Result<(), SqlRingError> {
        if self.is_closed() {
            Err(SqlRingError::Closed("statement"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Stmt for RingStatement {
    /// Close every handle. All handles are attempted even when one fails; the
    /// first failure is returned. Closing twice is a no-op.
    async fn close(&self) -> Result<(), SqlRingError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        close_statements(&self.stmts).await
    }

    fn num_input(&self) -> Option<usize> {
        self.primary().num_input()
    }

    async fn exec(&self, args: &[RowValues]) -> Result<ExecOutcome, SqlRingError> {
        self.ensure_open()?;
        check_arg_count(self.primary(), args.len())?;
        self.primary().exec(args).await
    }

    async fn query(&self, args: &[RowValues]) -> Result<Box<dyn Rows>, SqlRingError> {
        self.ensure_open()?;
        check_arg_count(self.primary(), args.len())?;
        let rows = self.read_stmt().query(args).await?;
        Ok(Box::new(ResultCursor::new(rows)))
    }

    fn as_exec_context(&self) -> Option<&dyn StmtExecContext> {
        Some(self)
    }

    fn as_query_context(&self) -> Option<&dyn StmtQueryContext> {
        Some(self)
    }
}

#[async_trait]
impl StmtExecContext for RingStatement {
    async fn exec_context(
        &self,
        ctx: &CancellationToken,
        args: &[NamedValue],
    ) -> Result<ExecOutcome, SqlRingError> {
        ensure_live(ctx)?;
        self.ensure_open()?;
        check_arg_count(self.primary(), args.len())?;
        match StmtExecPath::of(self.primary()) {
            StmtExecPath::Context(s) => s.exec_context(ctx, args).await,
            StmtExecPath::Plain(s) => {
                let values = named_values_to_values(args)?;
                ensure_live(ctx)?;
                s.exec(&values).await
            }
        }
    }
}

#[async_trait]
impl StmtQueryContext for RingStatement {
    async fn query_context(
        &self,
        ctx: &CancellationToken,
        args: &[NamedValue],
    ) -> Result<Box<dyn Rows>, SqlRingError> {
        ensure_live(ctx)?;
        self.ensure_open()?;
        check_arg_count(self.primary(), args.len())?;
        let rows = match StmtQueryPath::of(self.read_stmt()) {
            StmtQueryPath::Context(s) => s.query_context(ctx, args).await?,
            StmtQueryPath::Plain(s) => {
                let values = named_values_to_values(args)?;
                ensure_live(ctx)?;
                s.query(&values).await?
            }
        };
        Ok(Box::new(ResultCursor::new(rows)))
    }
}

impl fmt::Debug for RingStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingStatement")
            .field("handles", &self.stmts.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Close every handle concurrently; first error wins, none are skipped.
pub(crate) async fn close_statements(stmts: &[Arc<dyn Stmt>]) -> Result<(), SqlRingError> {
    let outcomes = on_each(stmts.len(), |i| {
        let stmt = Arc::clone(&stmts[i]);
        async move { stmt.close().await }
    })
    .await;
    first_error(outcomes)
}
