use crate::driver::{ExecOutcome, Execer, ExecerContext};
use crate::error::SqlRingError;

use super::QueryBuilder;

impl QueryBuilder<'_, '_> {
    /// Execute on the primary and return rows affected.
    ///
    /// # Errors
    /// Returns cancellation or backend errors, or a capability error if the
    /// primary has no direct-exec entry point.
    pub async fn dml(self) -> Result<u64, SqlRingError> {
        Ok(self.execute().await?.rows_affected)
    }

    /// Execute on the primary and return the full outcome.
    ///
    /// # Errors
    /// See [`QueryBuilder::dml`].
    pub async fn execute(self) -> Result<ExecOutcome, SqlRingError> {
        match &self.cancel {
            Some(token) => {
                ExecerContext::exec_context(self.conn, token, self.sql, &self.named_params()).await
            }
            None => Execer::exec(self.conn, self.sql, &self.params).await,
        }
    }
}
