//! Scripted in-memory backend.
//!
//! Every DSN is its own fake database. Each call is recorded as a
//! [`MockEvent`], live connection/statement handles are counted per DSN, and
//! failures or missing capabilities can be scripted per DSN before opening.
//! Query results are a single row with a `backend` column holding the DSN that
//! served the read.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::driver::{
    BufferedRows, Conn, Driver, ExecOutcome, Execer, ExecerContext, Queryer, QueryerContext, Rows,
    Stmt, StmtExecContext, StmtQueryContext, Tx,
};
use crate::error::SqlRingError;
use crate::types::{NamedValue, RowValues};

/// Which entry point served a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    Plain,
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Open(String),
    CloseConn(String),
    Prepare { dsn: String, query: String },
    CloseStmt(String),
    Query { dsn: String, entry: Entry },
    Exec { dsn: String, entry: Entry },
    StmtQuery { dsn: String, entry: Entry },
    StmtExec { dsn: String, entry: Entry },
    Begin(String),
    Commit(String),
    Rollback(String),
}

impl MockEvent {
    /// DSN of a read served by a backend, if this event is one.
    #[must_use]
    pub fn read_dsn(&self) -> Option<&str> {
        match self {
            MockEvent::Query { dsn, .. } | MockEvent::StmtQuery { dsn, .. } => Some(dsn),
            _ => None,
        }
    }

    /// DSN of an exec served by a backend, if this event is one.
    #[must_use]
    pub fn exec_dsn(&self) -> Option<&str> {
        match self {
            MockEvent::Exec { dsn, .. } | MockEvent::StmtExec { dsn, .. } => Some(dsn),
            _ => None,
        }
    }
}

/// Per-DSN script. Captured when the connection is opened.
#[derive(Debug, Clone)]
pub struct MockBehavior {
    pub fail_open: bool,
    pub fail_prepare: bool,
    pub fail_conn_close: bool,
    pub fail_stmt_close: bool,
    pub queryer: bool,
    pub queryer_context: bool,
    pub execer: bool,
    pub execer_context: bool,
    pub stmt_context: bool,
    pub num_input: Option<usize>,
    /// Applied to query and exec calls.
    pub delay: Option<Duration>,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            fail_open: false,
            fail_prepare: false,
            fail_conn_close: false,
            fail_stmt_close: false,
            queryer: true,
            queryer_context: true,
            execer: true,
            execer_context: true,
            stmt_context: true,
            num_input: None,
            delay: None,
        }
    }
}

#[derive(Default)]
struct MockState {
    events: Mutex<Vec<MockEvent>>,
    behaviors: Mutex<HashMap<String, MockBehavior>>,
    open_conns: Mutex<HashMap<String, usize>>,
    open_stmts: Mutex<HashMap<String, usize>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockState {
    fn record(&self, event: MockEvent) {
        lock(&self.events).push(event);
    }

    fn behavior(&self, dsn: &str) -> MockBehavior {
        lock(&self.behaviors).get(dsn).cloned().unwrap_or_default()
    }

    fn adjust(map: &Mutex<HashMap<String, usize>>, dsn: &str, delta: isize) {
        let mut guard = lock(map);
        let slot = guard.entry(dsn.to_string()).or_insert(0);
        *slot = slot.saturating_add_signed(delta);
    }
}

/// Handle on the shared mock state; clone freely.
#[derive(Clone, Default)]
pub struct MockDriver {
    state: Arc<MockState>,
}

impl MockDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn driver(&self) -> Arc<dyn Driver> {
        Arc::new(self.clone())
    }

    /// Script the behaviour of `dsn` for connections opened from now on.
    pub fn behave(&self, dsn: &str, script: impl FnOnce(&mut MockBehavior)) {
        let mut behaviors = lock(&self.state.behaviors);
        script(behaviors.entry(dsn.to_string()).or_default());
    }

    #[must_use]
    pub fn events(&self) -> Vec<MockEvent> {
        lock(&self.state.events).clone()
    }

    pub fn clear_events(&self) {
        lock(&self.state.events).clear();
    }

    #[must_use]
    pub fn count(&self, pred: impl Fn(&MockEvent) -> bool) -> usize {
        lock(&self.state.events).iter().filter(|e| pred(e)).count()
    }

    /// DSNs that served reads, in the order the reads were dispatched.
    #[must_use]
    pub fn served_reads(&self) -> Vec<String> {
        lock(&self.state.events)
            .iter()
            .filter_map(|e| e.read_dsn().map(str::to_string))
            .collect()
    }

    #[must_use]
    pub fn open_connections(&self) -> usize {
        lock(&self.state.open_conns).values().sum()
    }

    #[must_use]
    pub fn open_connections_for(&self, dsn: &str) -> usize {
        lock(&self.state.open_conns).get(dsn).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn open_statements(&self) -> usize {
        lock(&self.state.open_stmts).values().sum()
    }

    #[must_use]
    pub fn open_statements_for(&self, dsn: &str) -> usize {
        lock(&self.state.open_stmts).get(dsn).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn open(&self, dsn: &str) -> Result<Arc<dyn Conn>, SqlRingError> {
        let behavior = self.state.behavior(dsn);
        self.state.record(MockEvent::Open(dsn.to_string()));
        if behavior.fail_open {
            return Err(SqlRingError::ConnectionError(format!(
                "mock open failed: {dsn}"
            )));
        }
        MockState::adjust(&self.state.open_conns, dsn, 1);
        Ok(Arc::new(MockConn {
            dsn: dsn.to_string(),
            behavior,
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }))
    }
}

async fn pause(delay: Option<Duration>) {
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

/// Sleep for the scripted delay unless `ctx` fires first.
async fn pause_or_cancel(ctx: &CancellationToken, delay: Option<Duration>) -> Result<(), SqlRingError> {
    if ctx.is_cancelled() {
        return Err(SqlRingError::Cancelled);
    }
    tokio::select! {
        () = ctx.cancelled() => Err(SqlRingError::Interrupted),
        () = pause(delay) => Ok(()),
    }
}

fn rows_for(dsn: &str) -> Box<dyn Rows> {
    Box::new(BufferedRows::new(
        Arc::new(vec!["backend".to_string()]),
        vec![vec![RowValues::Text(dsn.to_string())]],
    ))
}

struct MockConn {
    dsn: String,
    behavior: MockBehavior,
    state: Arc<MockState>,
    closed: AtomicBool,
}

#[async_trait]
impl Conn for MockConn {
    async fn prepare(&self, query: &str) -> Result<Arc<dyn Stmt>, SqlRingError> {
        self.state.record(MockEvent::Prepare {
            dsn: self.dsn.clone(),
            query: query.to_string(),
        });
        if self.behavior.fail_prepare {
            return Err(SqlRingError::ExecutionError(format!(
                "mock prepare failed on {}",
                self.dsn
            )));
        }
        MockState::adjust(&self.state.open_stmts, &self.dsn, 1);
        Ok(Arc::new(MockStmt {
            dsn: self.dsn.clone(),
            behavior: self.behavior.clone(),
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }))
    }

    async fn close(&self) -> Result<(), SqlRingError> {
        self.state.record(MockEvent::CloseConn(self.dsn.clone()));
        if !self.closed.swap(true, Ordering::AcqRel) {
            MockState::adjust(&self.state.open_conns, &self.dsn, -1);
        }
        if self.behavior.fail_conn_close {
            return Err(SqlRingError::ConnectionError(format!(
                "mock close failed on {}",
                self.dsn
            )));
        }
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn Tx>, SqlRingError> {
        self.state.record(MockEvent::Begin(self.dsn.clone()));
        Ok(Box::new(MockTx {
            dsn: self.dsn.clone(),
            state: Arc::clone(&self.state),
        }))
    }

    fn as_queryer(&self) -> Option<&dyn Queryer> {
        self.behavior.queryer.then_some(self as &dyn Queryer)
    }

    fn as_queryer_context(&self) -> Option<&dyn QueryerContext> {
        self.behavior
            .queryer_context
            .then_some(self as &dyn QueryerContext)
    }

    fn as_execer(&self) -> Option<&dyn Execer> {
        self.behavior.execer.then_some(self as &dyn Execer)
    }

    fn as_execer_context(&self) -> Option<&dyn ExecerContext> {
        self.behavior
            .execer_context
            .then_some(self as &dyn ExecerContext)
    }
}

#[async_trait]
impl Queryer for MockConn {
    async fn query(
        &self,
        _query: &str,
        _args: &[RowValues],
    ) -> Result<Box<dyn Rows>, SqlRingError> {
        self.state.record(MockEvent::Query {
            dsn: self.dsn.clone(),
            entry: Entry::Plain,
        });
        pause(self.behavior.delay).await;
        Ok(rows_for(&self.dsn))
    }
}

#[async_trait]
impl QueryerContext for MockConn {
    async fn query_context(
        &self,
        ctx: &CancellationToken,
        _query: &str,
        _args: &[NamedValue],
    ) -> Result<Box<dyn Rows>, SqlRingError> {
        self.state.record(MockEvent::Query {
            dsn: self.dsn.clone(),
            entry: Entry::Context,
        });
        pause_or_cancel(ctx, self.behavior.delay).await?;
        Ok(rows_for(&self.dsn))
    }
}

#[async_trait]
impl Execer for MockConn {
    async fn exec(&self, _query: &str, _args: &[RowValues]) -> Result<ExecOutcome, SqlRingError> {
        self.state.record(MockEvent::Exec {
            dsn: self.dsn.clone(),
            entry: Entry::Plain,
        });
        pause(self.behavior.delay).await;
        Ok(ExecOutcome {
            rows_affected: 1,
            last_insert_id: None,
        })
    }
}

#[async_trait]
impl ExecerContext for MockConn {
    async fn exec_context(
        &self,
        ctx: &CancellationToken,
        _query: &str,
        _args: &[NamedValue],
    ) -> Result<ExecOutcome, SqlRingError> {
        self.state.record(MockEvent::Exec {
            dsn: self.dsn.clone(),
            entry: Entry::Context,
        });
        pause_or_cancel(ctx, self.behavior.delay).await?;
        Ok(ExecOutcome {
            rows_affected: 1,
            last_insert_id: None,
        })
    }
}

struct MockStmt {
    dsn: String,
    behavior: MockBehavior,
    state: Arc<MockState>,
    closed: AtomicBool,
}

#[async_trait]
impl Stmt for MockStmt {
    async fn close(&self) -> Result<(), SqlRingError> {
        self.state.record(MockEvent::CloseStmt(self.dsn.clone()));
        if !self.closed.swap(true, Ordering::AcqRel) {
            MockState::adjust(&self.state.open_stmts, &self.dsn, -1);
        }
        if self.behavior.fail_stmt_close {
            return Err(SqlRingError::ExecutionError(format!(
                "mock statement close failed on {}",
                self.dsn
            )));
        }
        Ok(())
    }

    fn num_input(&self) -> Option<usize> {
        self.behavior.num_input
    }

    async fn exec(&self, _args: &[RowValues]) -> Result<ExecOutcome, SqlRingError> {
        self.state.record(MockEvent::StmtExec {
            dsn: self.dsn.clone(),
            entry: Entry::Plain,
        });
        pause(self.behavior.delay).await;
        Ok(ExecOutcome {
            rows_affected: 1,
            last_insert_id: Some(1),
        })
    }

    async fn query(&self, _args: &[RowValues]) -> Result<Box<dyn Rows>, SqlRingError> {
        self.state.record(MockEvent::StmtQuery {
            dsn: self.dsn.clone(),
            entry: Entry::Plain,
        });
        pause(self.behavior.delay).await;
        Ok(rows_for(&self.dsn))
    }

    fn as_exec_context(&self) -> Option<&dyn StmtExecContext> {
        self.behavior
            .stmt_context
            .then_some(self as &dyn StmtExecContext)
    }

    fn as_query_context(&self) -> Option<&dyn StmtQueryContext> {
        self.behavior
            .stmt_context
            .then_some(self as &dyn StmtQueryContext)
    }
}

#[async_trait]
impl StmtExecContext for MockStmt {
    async fn exec_context(
        &self,
        ctx: &CancellationToken,
        _args: &[NamedValue],
    ) -> Result<ExecOutcome, SqlRingError> {
        self.state.record(MockEvent::StmtExec {
            dsn: self.dsn.clone(),
            entry: Entry::Context,
        });
        pause_or_cancel(ctx, self.behavior.delay).await?;
        Ok(ExecOutcome {
            rows_affected: 1,
            last_insert_id: Some(1),
        })
    }
}

#[async_trait]
impl StmtQueryContext for MockStmt {
    async fn query_context(
        &self,
        ctx: &CancellationToken,
        _args: &[NamedValue],
    ) -> Result<Box<dyn Rows>, SqlRingError> {
        self.state.record(MockEvent::StmtQuery {
            dsn: self.dsn.clone(),
            entry: Entry::Context,
        });
        pause_or_cancel(ctx, self.behavior.delay).await?;
        Ok(rows_for(&self.dsn))
    }
}

struct MockTx {
    dsn: String,
    state: Arc<MockState>,
}

#[async_trait]
impl Tx for MockTx {
    async fn commit(self: Box<Self>) -> Result<(), SqlRingError> {
        self.state.record(MockEvent::Commit(self.dsn.clone()));
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), SqlRingError> {
        self.state.record(MockEvent::Rollback(self.dsn.clone()));
        Ok(())
    }
}
