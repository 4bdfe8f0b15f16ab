use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::driver::Rows;
use crate::error::SqlRingError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// Passthrough over the row iterator a backend returned.
///
/// Owns the iterator exclusively and releases it on `close` or as soon as it
/// reports exhaustion. Values are never buffered or transformed here.
pub struct ResultCursor {
    columns: Arc<Vec<String>>,
    inner: Option<Box<dyn Rows>>,
}

impl ResultCursor {
    #[must_use]
    pub fn new(rows: Box<dyn Rows>) -> Self {
        Self {
            columns: Arc::new(rows.columns().to_vec()),
            inner: Some(rows),
        }
    }

    /// True once the backend iterator has been released.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.inner.is_none()
    }

    /// Drain the remaining rows into a [`ResultSet`].
    ///
    /// # Errors
    /// Returns the first error reported while advancing the backend iterator.
    pub async fn into_result_set(mut self) -> Result<ResultSet, SqlRingError> {
        let mut result_set = ResultSet::with_capacity(16);
        result_set.set_column_names(Arc::clone(&self.columns));
        let mut dest = vec![RowValues::Null; self.columns.len()];
        while self.next(&mut dest).await? {
            result_set.add_row_values(dest.clone());
        }
        Ok(result_set)
    }

    async fn release(&mut self) -> Result<(), SqlRingError> {
        match self.inner.take() {
            Some(mut rows) => rows.close().await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Rows for ResultCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    async fn next(&mut self, dest: &mut [RowValues]) -> Result<bool, SqlRingError> {
        let Some(rows) = self.inner.as_mut() else {
            return Ok(false);
        };
        let advanced = rows.next(dest).await?;
        if !advanced {
            if let Err(err) = self.release().await {
                warn!(error = %err, "closing exhausted rows failed");
            }
        }
        Ok(advanced)
    }

    async fn close(&mut self) -> Result<(), SqlRingError> {
        self.release().await
    }
}

impl std::fmt::Debug for ResultCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCursor")
            .field("columns", &self.columns)
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::BufferedRows;

    fn two_rows() -> Box<dyn Rows> {
        Box::new(BufferedRows::new(
            Arc::new(vec!["id".into(), "name".into()]),
            vec![
                vec![RowValues::Int(1), RowValues::Text("a".into())],
                vec![RowValues::Int(2), RowValues::Text("b".into())],
            ],
        ))
    }

    #[tokio::test]
    async fn exhaustion_releases_the_backend_rows() -> Result<(), SqlRingError> {
        let mut cursor = ResultCursor::new(two_rows());
        let mut dest = vec![RowValues::Null, RowValues::Null];
        assert!(cursor.next(&mut dest).await?);
        assert!(cursor.next(&mut dest).await?);
        assert!(!cursor.is_released());
        assert!(!cursor.next(&mut dest).await?);
        assert!(cursor.is_released());
        // still answers after release
        assert!(!cursor.next(&mut dest).await?);
        assert_eq!(cursor.columns(), ["id", "name"]);
        cursor.close().await
    }

    #[tokio::test]
    async fn drains_into_result_set() -> Result<(), SqlRingError> {
        let rs = ResultCursor::new(two_rows()).into_result_set().await?;
        assert_eq!(rs.results.len(), 2);
        assert_eq!(rs.results[1].get("name").and_then(RowValues::as_text), Some("b"));
        Ok(())
    }
}
