use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio_postgres::{Client, Statement};
use tokio_util::sync::CancellationToken;

use crate::driver::{ExecOutcome, Rows, Stmt, StmtExecContext, StmtQueryContext};
use crate::error::SqlRingError;
use crate::types::{NamedValue, RowValues, named_values_to_values};

use super::connection::InFlight;
use super::params::Params;
use super::query::buffer_rows;

/// Server-side prepared statement. Deallocated when the last clone of the
/// underlying `Statement` is dropped.
pub struct PostgresStatement {
    client: Arc<Client>,
    in_flight: Arc<InFlight>,
    stmt: Statement,
    closed: AtomicBool,
}

impl PostgresStatement {
    pub(crate) fn new(client: Arc<Client>, in_flight: Arc<InFlight>, stmt: Statement) -> Self {
        Self {
            client,
            in_flight,
            stmt,
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), SqlRingError> {
        if self.closed.load(Ordering::Acquire) {
            Err(SqlRingError::Closed("statement"))
        } else {
            Ok(())
        }
    }

    async fn run_exec(&self, args: &[RowValues]) -> Result<ExecOutcome, SqlRingError> {
        let params = Params::convert(args);
        let rows_affected = self.client.execute(&self.stmt, params.as_refs()).await?;
        Ok(ExecOutcome {
            rows_affected,
            last_insert_id: None,
        })
    }

    async fn run_query(&self, args: &[RowValues]) -> Result<Box<dyn Rows>, SqlRingError> {
        let params = Params::convert(args);
        let rows = self.client.query(&self.stmt, params.as_refs()).await?;
        Ok(Box::new(buffer_rows(&self.stmt, &rows)?))
    }
}

impl fmt::Debug for PostgresStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresStatement")
            .field("params", &self.stmt.params().len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stmt for PostgresStatement {
    async fn close(&self) -> Result<(), SqlRingError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn num_input(&self) -> Option<usize> {
        Some(self.stmt.params().len())
    }

    async fn exec(&self, args: &[RowValues]) -> Result<ExecOutcome, SqlRingError> {
        self.ensure_open()?;
        self.in_flight.track(self.run_exec(args)).await
    }

    async fn query(&self, args: &[RowValues]) -> Result<Box<dyn Rows>, SqlRingError> {
        self.ensure_open()?;
        self.in_flight.track(self.run_query(args)).await
    }

    fn as_exec_context(&self) -> Option<&dyn StmtExecContext> {
        Some(self)
    }

    fn as_query_context(&self) -> Option<&dyn StmtQueryContext> {
        Some(self)
    }
}

#[async_trait]
impl StmtExecContext for PostgresStatement {
    async fn exec_context(
        &self,
        ctx: &CancellationToken,
        args: &[NamedValue],
    ) -> Result<ExecOutcome, SqlRingError> {
        self.ensure_open()?;
        let values = named_values_to_values(args)?;
        self.in_flight
            .cancellable(&self.client, ctx, self.run_exec(&values))
            .await
    }
}

#[async_trait]
impl StmtQueryContext for PostgresStatement {
    async fn query_context(
        &self,
        ctx: &CancellationToken,
        args: &[NamedValue],
    ) -> Result<Box<dyn Rows>, SqlRingError> {
        self.ensure_open()?;
        let values = named_values_to_values(args)?;
        self.in_flight
            .cancellable(&self.client, ctx, self.run_query(&values))
            .await
    }
}
