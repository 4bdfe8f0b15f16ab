use crate::error::SqlRingError;
use crate::results::ResultSet;

use super::QueryBuilder;

impl QueryBuilder<'_, '_> {
    /// Run the statement on the next read backend and collect its rows.
    ///
    /// # Errors
    /// Returns routing, cancellation, or backend errors.
    pub async fn select(self) -> Result<ResultSet, SqlRingError> {
        let cursor = match &self.cancel {
            Some(token) => {
                self.conn
                    .query_rows_context(token, self.sql, &self.named_params())
                    .await?
            }
            None => self.conn.query_rows(self.sql, &self.params).await?,
        };
        cursor.into_result_set().await
    }
}
