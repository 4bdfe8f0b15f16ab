use std::future::Future;

use tracing::{debug, warn};

use crate::error::SqlRingError;

/// Run `op(i)` for every `i in 0..count` as its own task and wait for all of them.
///
/// Outcomes come back in index order. A failure never cancels its siblings:
/// every task is joined before this returns, and the tasks are detached rather
/// than aborted if the caller stops polling, so no backend call is abandoned
/// half-way.
pub(crate) async fn on_each<T, F, Fut>(count: usize, op: F) -> Vec<Result<T, SqlRingError>>
where
    F: Fn(usize) -> Fut,
    Fut: Future<Output = Result<T, SqlRingError>> + Send + 'static,
    T: Send + 'static,
{
    debug!(count, "fan-out start");
    let handles: Vec<_> = (0..count).map(|i| tokio::spawn(op(i))).collect();

    let mut outcomes = Vec::with_capacity(count);
    for (i, handle) in handles.into_iter().enumerate() {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(join_err) => {
                warn!(index = i, error = %join_err, "fan-out task did not complete");
                Err(SqlRingError::from(join_err))
            }
        };
        outcomes.push(outcome);
    }
    outcomes
}

/// Split fan-out outcomes into the successes (index order) and the first error.
///
/// When the error is `None` the success vector holds every outcome.
pub(crate) fn partition<T>(outcomes: Vec<Result<T, SqlRingError>>) -> (Vec<T>, Option<SqlRingError>) {
    let mut ok = Vec::with_capacity(outcomes.len());
    let mut first_err = None;
    for outcome in outcomes {
        match outcome {
            Ok(value) => ok.push(value),
            Err(err) => {
                if first_err.is_none() {
                    first_err = Some(err);
                } else {
                    debug!(error = %err, "additional fan-out failure");
                }
            }
        }
    }
    (ok, first_err)
}

/// Reduce unit outcomes to the first error, if any.
pub(crate) fn first_error(outcomes: Vec<Result<(), SqlRingError>>) -> Result<(), SqlRingError> {
    match partition(outcomes).1 {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
