use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::driver::{Conn, Driver};
use crate::error::SqlRingError;

use super::connection::SqliteConnection;

/// Options applied to every `SQLite` file a [`SqliteDriver`] opens.
#[derive(Debug, Clone)]
pub struct SqliteOptions {
    /// Switch the file to write-ahead logging on open.
    pub wal: bool,
    pub busy_timeout: Option<Duration>,
    /// Size of rusqlite's per-connection prepared statement cache.
    pub statement_cache_capacity: usize,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            wal: true,
            busy_timeout: Some(Duration::from_secs(5)),
            statement_cache_capacity: 64,
        }
    }
}

/// Fluent builder for `SQLite` options.
#[derive(Debug, Clone, Default)]
pub struct SqliteOptionsBuilder {
    opts: SqliteOptions,
}

impl SqliteOptionsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn wal(mut self, wal: bool) -> Self {
        self.opts.wal = wal;
        self
    }

    #[must_use]
    pub fn busy_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.opts.busy_timeout = timeout;
        self
    }

    #[must_use]
    pub fn statement_cache_capacity(mut self, capacity: usize) -> Self {
        self.opts.statement_cache_capacity = capacity;
        self
    }

    #[must_use]
    pub fn finish(self) -> SqliteOptions {
        self.opts
    }

    #[must_use]
    pub fn build(self) -> SqliteDriver {
        SqliteDriver::new(self.finish())
    }
}

/// Backend driver over rusqlite. The DSN is a database path (or `:memory:`).
#[derive(Debug, Clone, Default)]
pub struct SqliteDriver {
    opts: SqliteOptions,
}

impl SqliteDriver {
    #[must_use]
    pub fn new(opts: SqliteOptions) -> Self {
        Self { opts }
    }

    #[must_use]
    pub fn builder() -> SqliteOptionsBuilder {
        SqliteOptionsBuilder::new()
    }

    #[must_use]
    pub fn options(&self) -> &SqliteOptions {
        &self.opts
    }

    /// Open `path` and apply the configured pragmas.
    ///
    /// # Errors
    /// Returns `SqlRingError::ConfigError` for an empty path, or the rusqlite error
    /// raised while opening the file or applying pragmas.
    pub async fn open_sqlite(&self, path: &str) -> Result<SqliteConnection, SqlRingError> {
        if path.trim().is_empty() {
            return Err(SqlRingError::ConfigError("empty SQLite path".into()));
        }
        let path = path.to_owned();
        let opts = self.opts.clone();
        let conn = tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&path)?;
            if let Some(timeout) = opts.busy_timeout {
                conn.busy_timeout(timeout)?;
            }
            if opts.wal {
                // in-memory databases answer "memory" and stay that way
                let mode: String =
                    conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
                debug!(path = %path, journal_mode = %mode, "sqlite journal mode");
            }
            conn.set_prepared_statement_cache_capacity(opts.statement_cache_capacity);
            Ok::<_, SqlRingError>(conn)
        })
        .await??;
        Ok(SqliteConnection::new(conn))
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    async fn open(&self, dsn: &str) -> Result<Arc<dyn Conn>, SqlRingError> {
        Ok(Arc::new(self.open_sqlite(dsn).await?))
    }
}
