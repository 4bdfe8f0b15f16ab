use std::sync::Arc;

use async_trait::async_trait;
use tokio_postgres::Client;
use tracing::warn;

use crate::driver::Tx;
use crate::error::SqlRingError;

use super::connection::InFlight;

/// Transaction opened with `BEGIN` on the primary's client.
///
/// Dropping it unfinished schedules a `ROLLBACK` on the current runtime.
pub struct PostgresTx {
    client: Option<Arc<Client>>,
    in_flight: Arc<InFlight>,
}

impl PostgresTx {
    pub(crate) fn new(client: Arc<Client>, in_flight: Arc<InFlight>) -> Self {
        Self {
            client: Some(client),
            in_flight,
        }
    }

    async fn finish(mut self: Box<Self>, sql: &'static str) -> Result<(), SqlRingError> {
        let client = self.client.take().ok_or_else(|| {
            SqlRingError::ExecutionError("Postgres transaction already completed".into())
        })?;
        self.in_flight
            .track(async { Ok(client.batch_execute(sql).await?) })
            .await
    }
}

#[async_trait]
impl Tx for PostgresTx {
    async fn commit(self: Box<Self>) -> Result<(), SqlRingError> {
        self.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> Result<(), SqlRingError> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for PostgresTx {
    fn drop(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        let in_flight = Arc::clone(&self.in_flight);
        warn!("Postgres transaction dropped without commit or rollback; rolling back");
        if let Ok(rt) = tokio::runtime::Handle::try_current() {
            rt.spawn(async move {
                let rollback = async { Ok(client.batch_execute("ROLLBACK").await?) };
                if let Err(err) = in_flight.track(rollback).await {
                    warn!(error = %err, "rollback after drop failed");
                }
            });
        }
    }
}
