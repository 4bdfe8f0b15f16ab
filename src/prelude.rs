//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::driver::{
    BufferedRows, Conn, Driver, DriverRegistry, ExecOutcome, Execer, ExecerContext, Queryer,
    QueryerContext, Rows, Stmt, StmtExecContext, StmtQueryContext, Tx,
};
pub use crate::error::SqlRingError;
pub use crate::query_builder::QueryBuilder;
pub use crate::results::{CustomDbRow, ResultSet};
pub use crate::ring::{
    ReplicaSelector, ResultCursor, RingConfig, RingConnection, RingDriver, RingStatement, Route,
    redact_dsn,
};
pub use crate::types::{BackendKind, NamedValue, RowValues};

pub use tokio_util::sync::CancellationToken;

#[cfg(feature = "sqlite")]
pub use crate::sqlite::{SqliteConnection, SqliteDriver, SqliteOptions};

#[cfg(feature = "postgres")]
pub use crate::postgres::{PostgresConnection, PostgresDriver};
