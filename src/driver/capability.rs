//! One-shot capability resolution.
//!
//! Each routed call resolves the backend's optional entry points exactly once
//! and then dispatches on the resulting variant.

use tokio_util::sync::CancellationToken;

use crate::error::SqlRingError;

use super::traits::{
    Conn, Execer, ExecerContext, Queryer, QueryerContext, Stmt, StmtExecContext,
    StmtQueryContext,
};

/// How a connection can serve a direct query.
pub enum QueryPath<'a> {
    Context(&'a dyn QueryerContext),
    Plain(&'a dyn Queryer),
    Unsupported,
}

impl<'a> QueryPath<'a> {
    #[must_use]
    pub fn of(conn: &'a dyn Conn) -> Self {
        if let Some(q) = conn.as_queryer_context() {
            QueryPath::Context(q)
        } else if let Some(q) = conn.as_queryer() {
            QueryPath::Plain(q)
        } else {
            QueryPath::Unsupported
        }
    }

    /// As [`QueryPath::of`], but for plain calls: the plain entry point wins
    /// and the context one is the fallback.
    #[must_use]
    pub fn of_plain(conn: &'a dyn Conn) -> Self {
        match conn.as_queryer() {
            Some(q) => QueryPath::Plain(q),
            None => Self::of(conn),
        }
    }
}

/// How a connection can serve a direct exec.
pub enum ExecPath<'a> {
    Context(&'a dyn ExecerContext),
    Plain(&'a dyn Execer),
    Unsupported,
}

impl<'a> ExecPath<'a> {
    #[must_use]
    pub fn of(conn: &'a dyn Conn) -> Self {
        if let Some(e) = conn.as_execer_context() {
            ExecPath::Context(e)
        } else if let Some(e) = conn.as_execer() {
            ExecPath::Plain(e)
        } else {
            ExecPath::Unsupported
        }
    }

    #[must_use]
    pub fn of_plain(conn: &'a dyn Conn) -> Self {
        match conn.as_execer() {
            Some(e) => ExecPath::Plain(e),
            None => Self::of(conn),
        }
    }
}

/// How a prepared statement can serve a cancellation-aware exec.
pub enum StmtExecPath<'a> {
    Context(&'a dyn StmtExecContext),
    Plain(&'a dyn Stmt),
}

impl<'a> StmtExecPath<'a> {
    #[must_use]
    pub fn of(stmt: &'a dyn Stmt) -> Self {
        match stmt.as_exec_context() {
            Some(e) => StmtExecPath::Context(e),
            None => StmtExecPath::Plain(stmt),
        }
    }
}

/// How a prepared statement can serve a cancellation-aware query.
pub enum StmtQueryPath<'a> {
    Context(&'a dyn StmtQueryContext),
    Plain(&'a dyn Stmt),
}

impl<'a> StmtQueryPath<'a> {
    #[must_use]
    pub fn of(stmt: &'a dyn Stmt) -> Self {
        match stmt.as_query_context() {
            Some(q) => StmtQueryPath::Context(q),
            None => StmtQueryPath::Plain(stmt),
        }
    }
}

/// Fail with [`SqlRingError::Cancelled`] if `ctx` already fired.
///
/// # Errors
/// Returns [`SqlRingError::Cancelled`] when the token is cancelled.
pub fn ensure_live(ctx: &CancellationToken) -> Result<(), SqlRingError> {
    if ctx.is_cancelled() {
        Err(SqlRingError::Cancelled)
    } else {
        Ok(())
    }
}
