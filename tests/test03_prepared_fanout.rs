use std::sync::Arc;

use sql_ring::prelude::*;
use sql_ring::test_utils::{MockDriver, MockEvent, read_backends};

async fn open(mock: &MockDriver, dsn_list: &str) -> Result<RingConnection, SqlRingError> {
    RingDriver::new(mock.driver()).open_ring(dsn_list).await
}

fn prepares(mock: &MockDriver, dsn: &str) -> usize {
    mock.count(|e| matches!(e, MockEvent::Prepare { dsn: d, .. } if d == dsn))
}

fn stmt_closes(mock: &MockDriver, dsn: &str) -> usize {
    mock.count(|e| *e == MockEvent::CloseStmt(dsn.into()))
}

#[tokio::test]
async fn prepare_reaches_every_backend() -> Result<(), SqlRingError> {
    let mock = MockDriver::new();
    let ring = open(&mock, "a;b;c").await?;

    let stmt = ring.prepare_ring("SELECT backend").await?;
    assert_eq!(stmt.handle_count(), 3);
    assert_eq!(mock.open_statements(), 3);
    for dsn in ["a", "b", "c"] {
        assert_eq!(prepares(&mock, dsn), 1);
    }
    stmt.close().await?;
    assert_eq!(mock.open_statements(), 0);
    Ok(())
}

#[tokio::test]
async fn prepared_reads_share_the_rotation_with_direct_reads() -> Result<(), SqlRingError> {
    let mock = MockDriver::new();
    let ring = open(&mock, "A;B;C").await?;
    let stmt = ring.prepare_ring("SELECT backend").await?;

    let mut served = Vec::new();
    served.extend(read_backends(stmt.query(&[]).await?).await?);
    served.extend(read_backends(Box::new(ring.query_rows("SELECT backend", &[]).await?)).await?);
    served.extend(read_backends(stmt.query(&[]).await?).await?);
    assert_eq!(served, vec!["B", "C", "B"]);
    assert_eq!(ring.selector().routed(), 3);
    Ok(())
}

#[tokio::test]
async fn prepared_exec_always_runs_on_the_primary() -> Result<(), SqlRingError> {
    let mock = MockDriver::new();
    let ring = open(&mock, "p;r1;r2").await?;
    let stmt = ring.prepare_ring("INSERT INTO t VALUES (1)").await?;

    for _ in 0..5 {
        let outcome = stmt.exec(&[]).await?;
        assert_eq!(outcome.rows_affected, 1);
    }
    assert_eq!(mock.count(|e| e.exec_dsn() == Some("p")), 5);
    assert_eq!(mock.count(|e| e.exec_dsn().is_some()), 5);
    assert_eq!(ring.selector().routed(), 0);
    Ok(())
}

#[tokio::test]
async fn failed_replica_prepare_discards_every_handle() -> Result<(), SqlRingError> {
    // first replica, then last: handles prepared on either side are closed
    for failing in ["b", "c"] {
        let mock = MockDriver::new();
        mock.behave(failing, |b| b.fail_prepare = true);
        let ring = open(&mock, "a;b;c").await?;

        let err = ring.prepare_ring("SELECT 1").await.unwrap_err();
        let suffix = format!(" {failing}");
        assert!(matches!(err, SqlRingError::ExecutionError(ref msg) if msg.ends_with(&suffix)));
        assert_eq!(mock.open_statements(), 0);
        for dsn in ["a", "b", "c"] {
            let expected = usize::from(dsn != failing);
            assert_eq!(stmt_closes(&mock, dsn), expected, "{failing} failed, {dsn} closed");
        }
    }
    Ok(())
}

#[tokio::test]
async fn failed_primary_prepare_skips_the_replicas() -> Result<(), SqlRingError> {
    let mock = MockDriver::new();
    mock.behave("a", |b| b.fail_prepare = true);
    let ring = open(&mock, "a;b;c").await?;

    assert!(ring.prepare_ring("SELECT 1").await.is_err());
    assert_eq!(prepares(&mock, "b") + prepares(&mock, "c"), 0);
    assert_eq!(mock.open_statements(), 0);
    Ok(())
}

#[tokio::test]
async fn closing_twice_closes_each_handle_once() -> Result<(), SqlRingError> {
    let mock = MockDriver::new();
    let ring = open(&mock, "a;b;c").await?;
    let stmt = ring.prepare_ring("SELECT backend").await?;

    stmt.close().await?;
    stmt.close().await?;
    assert!(stmt.is_closed());
    for dsn in ["a", "b", "c"] {
        assert_eq!(stmt_closes(&mock, dsn), 1);
    }

    let err = stmt.query(&[]).await.err();
    assert!(matches!(err, Some(SqlRingError::Closed(_))));
    let err = stmt.exec(&[]).await.unwrap_err();
    assert!(matches!(err, SqlRingError::Closed(_)));
    // closed statements never route
    assert_eq!(ring.selector().routed(), 0);
    Ok(())
}

#[tokio::test]
async fn close_reports_the_first_failure_but_closes_the_rest() -> Result<(), SqlRingError> {
    let mock = MockDriver::new();
    mock.behave("b", |b| b.fail_stmt_close = true);
    let ring = open(&mock, "a;b;c").await?;
    let stmt = ring.prepare_ring("SELECT backend").await?;

    let err = stmt.close().await.unwrap_err();
    assert!(matches!(err, SqlRingError::ExecutionError(_)));
    assert_eq!(mock.open_statements(), 0);
    for dsn in ["a", "b", "c"] {
        assert_eq!(stmt_closes(&mock, dsn), 1);
    }
    Ok(())
}

#[tokio::test]
async fn argument_count_is_checked_before_dispatch() -> Result<(), SqlRingError> {
    let mock = MockDriver::new();
    for dsn in ["a", "b"] {
        mock.behave(dsn, |b| b.num_input = Some(2));
    }
    let ring = open(&mock, "a;b").await?;
    let stmt = ring.prepare_ring("SELECT ?, ?").await?;
    assert_eq!(stmt.num_input(), Some(2));

    let err = stmt.exec(&[RowValues::Int(1)]).await.unwrap_err();
    assert!(matches!(err, SqlRingError::ParameterError(_)));
    assert!(stmt.query(&[RowValues::Int(1)]).await.is_err());
    assert_eq!(mock.count(|e| e.exec_dsn().is_some() || e.read_dsn().is_some()), 0);

    let rows = stmt.query(&[RowValues::Int(1), RowValues::Int(2)]).await?;
    assert_eq!(read_backends(rows).await?, vec!["b"]);
    Ok(())
}

#[tokio::test]
async fn prepare_through_the_connection_trait() -> Result<(), SqlRingError> {
    let mock = MockDriver::new();
    let ring = open(&mock, "a;b").await?;
    let conn: &dyn Conn = &ring;

    let stmt = conn.prepare("SELECT backend").await?;
    assert_eq!(read_backends(stmt.query(&[]).await?).await?, vec!["b"]);
    stmt.close().await?;
    assert_eq!(mock.open_statements(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exec_stays_on_the_primary_under_concurrent_reads() -> Result<(), SqlRingError> {
    let mock = MockDriver::new();
    let ring = open(&mock, "p;r1;r2").await?;
    let stmt = Arc::new(ring.prepare_ring("UPDATE t SET seen = seen + 1").await?);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let stmt = Arc::clone(&stmt);
        handles.push(tokio::spawn(async move {
            for _ in 0..25 {
                read_backends(stmt.query(&[]).await?).await?;
                stmt.exec(&[]).await?;
            }
            Ok::<(), SqlRingError>(())
        }));
    }
    for handle in handles {
        handle.await??;
    }

    assert_eq!(mock.count(|e| e.exec_dsn().is_some()), 200);
    assert_eq!(
        mock.count(|e| matches!(e, MockEvent::StmtExec { dsn, .. } if dsn == "p")),
        200
    );
    let served = mock.served_reads();
    assert_eq!(served.len(), 200);
    assert_eq!(served.iter().filter(|d| *d == "r1").count(), 100);
    assert_eq!(served.iter().filter(|d| *d == "r2").count(), 100);
    assert_eq!(ring.selector().routed(), 200);
    Ok(())
}
