// Backend contract - the surface every physical connection offers and the ring
// re-exposes unchanged:
// - traits: connection / statement / transaction / rows traits and the optional capabilities
// - capability: per-call resolution of optional entry points
// - rows: materialised row iterator shared by the bundled backends
// - registry: explicit name -> driver map

pub mod capability;
pub mod registry;
pub mod rows;
pub mod traits;

pub use capability::{ExecPath, QueryPath, StmtExecPath, StmtQueryPath, ensure_live};
pub use registry::DriverRegistry;
pub use rows::BufferedRows;
pub use traits::{
    Conn, Driver, ExecOutcome, Execer, ExecerContext, Queryer, QueryerContext, Rows, Stmt,
    StmtExecContext, StmtQueryContext, Tx, check_arg_count,
};
