// PostgreSQL backend over tokio-postgres:
// - config: driver and DSN handling
// - connection: client plus connection task, direct query/exec, cancellation
// - statement: server-side prepared statements
// - params: `ToSql` for row values
// - query: row extraction and buffering
// - transaction: BEGIN/COMMIT/ROLLBACK

pub mod config;
pub mod connection;
pub mod params;
pub mod query;
pub mod statement;
pub mod transaction;

pub use config::PostgresDriver;
pub use connection::PostgresConnection;
pub use params::Params as PostgresParams;
pub use statement::PostgresStatement;
pub use transaction::PostgresTx;
