use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqlRingError {
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Unimplemented feature: {0}")]
    Unimplemented(String),

    /// The chosen backend lacks an optional capability. Higher layers may retry
    /// through a different entry point (e.g. prepare + query instead of a direct query).
    #[error("backend does not support {0}; retry through another entry point")]
    CapabilityUnsupported(&'static str),

    /// Cancellation was observed before the operation was dispatched to any backend.
    #[error("operation cancelled before dispatch")]
    Cancelled,

    /// Cancellation stopped a statement the backend had already started.
    #[error("operation interrupted by cancellation")]
    Interrupted,

    #[error("sql: driver does not support the use of named parameters (got {0:?})")]
    NamedParameter(String),

    #[error("{0} is closed")]
    Closed(&'static str),

    #[error("Other database error: {0}")]
    Other(String),
}

impl SqlRingError {
    /// True when the error asks the caller to take a different path rather than
    /// reporting a failed execution.
    #[must_use]
    pub fn is_skip(&self) -> bool {
        matches!(self, SqlRingError::CapabilityUnsupported(_))
    }

    /// True for both flavours of cancellation: refused before dispatch, or
    /// interrupted while running.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SqlRingError::Cancelled | SqlRingError::Interrupted)
    }
}

impl From<tokio::task::JoinError> for SqlRingError {
    fn from(err: tokio::task::JoinError) -> Self {
        SqlRingError::ExecutionError(format!("backend task join error: {err}"))
    }
}
