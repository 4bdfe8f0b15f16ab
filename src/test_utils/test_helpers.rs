//! Helper utilities for testing and development.

use crate::driver::Rows;
use crate::error::SqlRingError;
use crate::types::RowValues;

/// Drain `rows` and collect the text in its first column.
///
/// Mock backends answer every read with their own DSN, so this names the
/// backend(s) that served a read.
///
/// # Errors
/// Returns the first error reported while advancing or closing `rows`.
pub async fn read_backends(mut rows: Box<dyn Rows>) -> Result<Vec<String>, SqlRingError> {
    let mut dest = vec![RowValues::Null; rows.columns().len()];
    let mut out = Vec::new();
    while rows.next(&mut dest).await? {
        if let Some(text) = dest.first().and_then(RowValues::as_text) {
            out.push(text.to_string());
        }
    }
    rows.close().await?;
    Ok(out)
}
