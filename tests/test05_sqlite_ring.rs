#![cfg(feature = "sqlite")]

use std::sync::Arc;
use std::time::Duration;

use sql_ring::prelude::*;
use sql_ring::test_utils::read_backends;
use tempfile::{TempDir, tempdir};

struct Files {
    _dir: TempDir,
    primary: String,
    replicas: Vec<String>,
}

impl Files {
    fn dsn_list(&self) -> String {
        std::iter::once(self.primary.clone())
            .chain(self.replicas.iter().cloned())
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// Three independent databases. Each knows its own name, so a read shows
/// which file served it.
async fn seeded_files() -> Result<Files, Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = |name: &str| dir.path().join(format!("{name}.db")).to_string_lossy().into_owned();
    let files = Files {
        primary: path("primary"),
        replicas: vec![path("replica1"), path("replica2")],
        _dir: dir,
    };

    let driver = SqliteDriver::default();
    let named = [
        ("primary", &files.primary),
        ("replica1", &files.replicas[0]),
        ("replica2", &files.replicas[1]),
    ];
    for (name, file) in named {
        let conn = driver.open_sqlite(file).await?;
        conn.execute_batch(&format!(
            "CREATE TABLE whoami (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
             INSERT INTO whoami (id, name) VALUES (1, '{name}');
             CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT NOT NULL);"
        ))
        .await?;
        conn.close().await?;
    }
    Ok(files)
}

async fn open_ring(files: &Files) -> Result<RingConnection, SqlRingError> {
    RingDriver::new(Arc::new(SqliteDriver::default()))
        .open_ring(&files.dsn_list())
        .await
}

async fn item_count(path: &str) -> Result<i64, SqlRingError> {
    let conn = SqliteDriver::default().open_sqlite(path).await?;
    let mut rows = conn.query("SELECT COUNT(*) FROM items", &[]).await?;
    let mut dest = vec![RowValues::Null];
    rows.next(&mut dest).await?;
    conn.close().await?;
    Ok(dest[0].as_int().copied().unwrap_or_default())
}

async fn whoami(ring: &RingConnection) -> Result<String, SqlRingError> {
    let rows = ring.sql("SELECT name FROM whoami").select().await?;
    Ok(rows.results[0]
        .get("name")
        .and_then(RowValues::as_text)
        .unwrap_or_default()
        .to_string())
}

#[tokio::test]
async fn reads_rotate_over_replica_files() -> Result<(), Box<dyn std::error::Error>> {
    let files = seeded_files().await?;
    let ring = open_ring(&files).await?;

    let mut served = Vec::new();
    for _ in 0..4 {
        served.push(whoami(&ring).await?);
    }
    assert_eq!(served, vec!["replica1", "replica2", "replica1", "replica2"]);
    ring.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn writes_land_on_the_primary_file_only() -> Result<(), Box<dyn std::error::Error>> {
    let files = seeded_files().await?;
    let ring = open_ring(&files).await?;

    let label = [RowValues::Text("hello".into())];
    let affected = ring
        .sql("INSERT INTO items (label) VALUES (?1)")
        .params(&label)
        .dml()
        .await?;
    assert_eq!(affected, 1);
    ring.shutdown().await?;

    assert_eq!(item_count(&files.primary).await?, 1);
    for replica in &files.replicas {
        assert_eq!(item_count(replica).await?, 0);
    }
    Ok(())
}

#[tokio::test]
async fn prepared_statements_span_every_file() -> Result<(), Box<dyn std::error::Error>> {
    let files = seeded_files().await?;
    let ring = open_ring(&files).await?;

    let select = ring
        .prepare_ring("SELECT name FROM whoami WHERE id = ?1")
        .await?;
    assert_eq!(select.handle_count(), 3);
    assert_eq!(select.num_input(), Some(1));

    let mut served = Vec::new();
    for _ in 0..2 {
        served.extend(read_backends(select.query(&[RowValues::Int(1)]).await?).await?);
    }
    assert_eq!(served, vec!["replica1", "replica2"]);

    let arity = select.query(&[]).await.err();
    assert!(matches!(arity, Some(SqlRingError::ParameterError(_))));

    let insert = ring
        .prepare_ring("INSERT INTO items (label) VALUES (?1)")
        .await?;
    let outcome = insert.exec(&[RowValues::Text("a".into())]).await?;
    assert_eq!(outcome.rows_affected, 1);
    assert_eq!(outcome.last_insert_id, Some(1));

    select.close().await?;
    insert.close().await?;
    ring.shutdown().await?;
    assert_eq!(item_count(&files.primary).await?, 1);
    Ok(())
}

#[tokio::test]
async fn sqlite_binds_named_arguments_natively() -> Result<(), Box<dyn std::error::Error>> {
    let files = seeded_files().await?;
    let ring = open_ring(&files).await?;

    let args = vec![NamedValue::named("id", 1, RowValues::Int(1))];
    let rows = ring
        .query_rows_context(
            &CancellationToken::new(),
            "SELECT name FROM whoami WHERE id = :id",
            &args,
        )
        .await?;
    assert_eq!(read_backends(Box::new(rows)).await?, vec!["replica1"]);
    ring.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn rolled_back_transaction_leaves_the_primary_untouched()
-> Result<(), Box<dyn std::error::Error>> {
    let files = seeded_files().await?;
    let ring = open_ring(&files).await?;

    // writes on the primary join whatever transaction is open there
    let tx = ring.begin().await?;
    ring.exec(
        "INSERT INTO items (label) VALUES (?1)",
        &[RowValues::Text("gone".into())],
    )
    .await?;
    tx.rollback().await?;

    let tx = ring.begin().await?;
    ring.exec(
        "INSERT INTO items (label) VALUES (?1)",
        &[RowValues::Text("kept".into())],
    )
    .await?;
    tx.commit().await?;
    ring.shutdown().await?;

    assert_eq!(item_count(&files.primary).await?, 1);
    Ok(())
}

#[tokio::test]
async fn prepare_failing_on_one_file_fails_the_ring() -> Result<(), Box<dyn std::error::Error>> {
    let files = seeded_files().await?;
    let primary = SqliteDriver::default().open_sqlite(&files.primary).await?;
    primary
        .execute_batch("CREATE TABLE primary_only (id INTEGER)")
        .await?;
    primary.close().await?;

    let ring = open_ring(&files).await?;
    let err = ring
        .prepare_ring("SELECT id FROM primary_only")
        .await
        .unwrap_err();
    assert!(matches!(err, SqlRingError::SqliteError(_)));

    // the ring stays usable
    assert_eq!(whoami(&ring).await?, "replica1");
    ring.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn cancelled_token_and_shutdown_stop_work() -> Result<(), Box<dyn std::error::Error>> {
    let files = seeded_files().await?;
    let ring = open_ring(&files).await?;

    let token = CancellationToken::new();
    token.cancel();
    let err = ring
        .sql("SELECT name FROM whoami")
        .cancel_with(token)
        .select()
        .await
        .unwrap_err();
    assert!(err.is_cancelled());

    ring.shutdown().await?;
    let err = ring.query_rows("SELECT 1", &[]).await.unwrap_err();
    assert!(matches!(err, SqlRingError::Closed(_)));
    Ok(())
}

const SLOW_COUNT: &str = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 10000000) \
     SELECT COUNT(*) AS n FROM c";

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancelling_a_queued_write_leaves_the_running_read_alone()
-> Result<(), Box<dyn std::error::Error>> {
    let files = seeded_files().await?;
    // primary only, so the read and the write share one connection
    let ring = Arc::new(
        RingDriver::new(Arc::new(SqliteDriver::default()))
            .open_ring(&files.primary)
            .await?,
    );

    let reader = Arc::clone(&ring);
    let slow_read = tokio::spawn(async move {
        reader.sql(SLOW_COUNT).select().await
    });
    // give the read time to take the connection
    tokio::time::sleep(Duration::from_millis(100)).await;

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });
    let label = [RowValues::Text("queued".into())];
    let write = ring
        .sql("INSERT INTO items (label) VALUES (?1)")
        .params(&label)
        .cancel_with(token)
        .dml()
        .await;
    assert!(matches!(write, Err(SqlRingError::Cancelled)));

    let rows = slow_read.await??;
    assert_eq!(rows.results[0].get("n").and_then(RowValues::as_int), Some(&10_000_000));

    ring.shutdown().await?;
    assert_eq!(item_count(&files.primary).await?, 0);
    Ok(())
}

#[tokio::test]
async fn cancelling_a_running_write_reports_the_interrupt()
-> Result<(), Box<dyn std::error::Error>> {
    let files = seeded_files().await?;
    let ring = open_ring(&files).await?;

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });
    let write = ring
        .sql(
            "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 50000000) \
             INSERT INTO items (label) SELECT 'bulk' FROM c",
        )
        .cancel_with(token)
        .dml()
        .await;
    assert!(matches!(write, Err(SqlRingError::Interrupted)));
    ring.shutdown().await?;

    // the interrupted statement left nothing behind
    assert_eq!(item_count(&files.primary).await?, 0);
    Ok(())
}

#[tokio::test]
async fn live_token_returns_the_real_outcome() -> Result<(), Box<dyn std::error::Error>> {
    let files = seeded_files().await?;
    let ring = open_ring(&files).await?;

    let token = CancellationToken::new();
    let label = [RowValues::Text("kept".into())];
    let affected = ring
        .sql("INSERT INTO items (label) VALUES (?1)")
        .params(&label)
        .cancel_with(token.clone())
        .dml()
        .await?;
    // firing after completion changes nothing
    token.cancel();
    assert_eq!(affected, 1);
    ring.shutdown().await?;
    assert_eq!(item_count(&files.primary).await?, 1);
    Ok(())
}
