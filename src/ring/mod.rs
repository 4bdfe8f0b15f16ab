// Read/write splitting ring - one logical connection over a primary and replicas:
// - dsn: ring topology and `;`-separated connection strings
// - selector: round-robin replica choice over a shared atomic counter
// - fanout: concurrent per-backend operations joined with first-error semantics
// - connection: the driver and multiplexed connection
// - statement: statements prepared on every backend in lock-step
// - cursor: passthrough over backend rows

pub mod connection;
pub mod cursor;
pub mod dsn;
pub(crate) mod fanout;
pub mod selector;
pub mod statement;

pub use connection::{RingConnection, RingDriver};
pub use cursor::ResultCursor;
pub use dsn::{DSN_SEPARATOR, RingConfig, redact_dsn};
pub use selector::{ReplicaSelector, Route};
pub use statement::RingStatement;
