//! Read/write splitting over one primary and any number of replicas.
//!
//! A [`RingConnection`] looks like a single connection. Writes, transactions
//! and prepared `exec` go to the primary; reads rotate round-robin over the
//! replicas. Statements are prepared on every backend at once so a prepared
//! read can land anywhere.
//!
//! ```rust,no_run
//! use sql_ring::prelude::*;
//!
//! # async fn demo() -> Result<(), SqlRingError> {
//! let ring = RingDriver::new(std::sync::Arc::new(SqliteDriver::default()))
//!     .open_ring("primary.db;replica1.db;replica2.db")
//!     .await?;
//! ring.sql("CREATE TABLE IF NOT EXISTS t (id INTEGER)").dml().await?;
//! let rows = ring.sql("SELECT id FROM t").select().await?;
//! println!("{} rows", rows.results.len());
//! ring.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod driver;
pub mod error;
pub mod prelude;
pub mod query_builder;
pub mod results;
pub mod ring;
pub mod types;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use driver::{Conn, Driver, DriverRegistry, Rows, Stmt, Tx};
pub use error::SqlRingError;
pub use query_builder::QueryBuilder;
pub use results::{CustomDbRow, ResultSet};
pub use ring::{RingConfig, RingConnection, RingDriver, RingStatement, ResultCursor};
pub use types::{BackendKind, NamedValue, RowValues};
