use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SqlRingError;
use crate::types::RowValues;

use super::traits::Rows;

/// Fully materialised rows, as produced by backends that cannot hold a
/// cursor open across an `.await` (rusqlite statements borrow their connection).
#[derive(Debug, Clone)]
pub struct BufferedRows {
    columns: Arc<Vec<String>>,
    pending: VecDeque<Vec<RowValues>>,
    closed: bool,
}

impl BufferedRows {
    #[must_use]
    pub fn new(columns: Arc<Vec<String>>, rows: Vec<Vec<RowValues>>) -> Self {
        Self {
            columns,
            pending: rows.into(),
            closed: false,
        }
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl Rows for BufferedRows {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    async fn next(&mut self, dest: &mut [RowValues]) -> Result<bool, SqlRingError> {
        if self.closed {
            return Err(SqlRingError::Closed("rows"));
        }
        if dest.len() != self.columns.len() {
            return Err(SqlRingError::ParameterError(format!(
                "destination holds {} values but the row has {} columns",
                dest.len(),
                self.columns.len()
            )));
        }
        let Some(row) = self.pending.pop_front() else {
            return Ok(false);
        };
        for (slot, value) in dest.iter_mut().zip(row) {
            *slot = value;
        }
        Ok(true)
    }

    async fn close(&mut self) -> Result<(), SqlRingError> {
        self.closed = true;
        self.pending.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rows_drain_then_report_end() -> Result<(), SqlRingError> {
        let mut rows = BufferedRows::new(
            Arc::new(vec!["id".into()]),
            vec![vec![RowValues::Int(1)], vec![RowValues::Int(2)]],
        );
        let mut dest = vec![RowValues::Null];
        assert!(rows.next(&mut dest).await?);
        assert_eq!(dest[0], RowValues::Int(1));
        assert!(rows.next(&mut dest).await?);
        assert!(!rows.next(&mut dest).await?);
        assert_eq!(dest[0], RowValues::Int(2));
        Ok(())
    }

    #[tokio::test]
    async fn wrong_destination_width_is_a_parameter_error() {
        let mut rows = BufferedRows::new(Arc::new(vec!["a".into(), "b".into()]), vec![]);
        let mut dest = vec![RowValues::Null];
        let err = rows.next(&mut dest).await.unwrap_err();
        assert!(matches!(err, SqlRingError::ParameterError(_)));
    }
}
