use async_trait::async_trait;
use tracing::warn;

use crate::driver::Tx;
use crate::error::SqlRingError;

use super::connection::SqliteHandle;

/// Transaction opened with `BEGIN` on a `SQLite` connection.
///
/// The handle only ends the transaction. It is not a scope for statements:
/// anything run on the same connection between `BEGIN` and `commit`/`rollback`
/// joins the transaction, whichever caller issued it, and nothing else does.
///
/// Dropping it without `commit`/`rollback` schedules a rollback on the
/// current runtime.
pub struct SqliteTx {
    handle: Option<SqliteHandle>,
}

impl SqliteTx {
    pub(crate) fn new(handle: SqliteHandle) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    async fn finish(mut self: Box<Self>, sql: &'static str) -> Result<(), SqlRingError> {
        let handle = self.handle.take().ok_or_else(|| {
            SqlRingError::ExecutionError("SQLite transaction already completed".into())
        })?;
        handle
            .run(move |conn| conn.execute_batch(sql).map_err(SqlRingError::from))
            .await
    }
}

#[async_trait]
impl Tx for SqliteTx {
    async fn commit(self: Box<Self>) -> Result<(), SqlRingError> {
        self.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> Result<(), SqlRingError> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for SqliteTx {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        warn!("SQLite transaction dropped without commit or rollback; rolling back");
        if let Ok(rt) = tokio::runtime::Handle::try_current() {
            rt.spawn(async move {
                if let Err(err) = handle
                    .run(|conn| conn.execute_batch("ROLLBACK").map_err(SqlRingError::from))
                    .await
                {
                    warn!(error = %err, "rollback after drop failed");
                }
            });
        }
    }
}
