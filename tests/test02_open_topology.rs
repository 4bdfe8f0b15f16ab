use sql_ring::prelude::*;
use sql_ring::test_utils::{MockDriver, MockEvent};

fn opens(mock: &MockDriver) -> usize {
    mock.count(|e| matches!(e, MockEvent::Open(_)))
}

#[tokio::test]
async fn opens_one_primary_and_every_replica() -> Result<(), SqlRingError> {
    let mock = MockDriver::new();
    let ring = RingDriver::new(mock.driver()).open_ring("a;b;c").await?;

    assert_eq!(ring.replica_count(), 2);
    assert_eq!(mock.open_connections(), 3);
    for dsn in ["a", "b", "c"] {
        assert_eq!(mock.open_connections_for(dsn), 1);
    }
    // the primary is always opened first
    assert_eq!(mock.events().first(), Some(&MockEvent::Open("a".into())));
    Ok(())
}

#[tokio::test]
async fn failed_replica_open_closes_everything_opened() -> Result<(), SqlRingError> {
    let mock = MockDriver::new();
    mock.behave("c", |b| b.fail_open = true);

    let err = RingDriver::new(mock.driver())
        .open_ring("a;b;c;d")
        .await
        .unwrap_err();
    assert!(matches!(err, SqlRingError::ConnectionError(ref msg) if msg.ends_with(": c")));
    assert_eq!(opens(&mock), 4);
    assert_eq!(mock.open_connections(), 0);
    for dsn in ["a", "b", "d"] {
        assert_eq!(
            mock.count(|e| *e == MockEvent::CloseConn(dsn.into())),
            1,
            "{dsn} should be closed exactly once"
        );
    }
    Ok(())
}

#[tokio::test]
async fn failed_primary_open_skips_the_replicas() -> Result<(), SqlRingError> {
    let mock = MockDriver::new();
    mock.behave("a", |b| b.fail_open = true);

    let result = RingDriver::new(mock.driver()).open_ring("a;b;c").await;
    assert!(result.is_err());
    assert_eq!(opens(&mock), 1);
    assert_eq!(mock.open_connections(), 0);
    Ok(())
}

#[tokio::test]
async fn first_error_wins_when_several_replicas_fail() -> Result<(), SqlRingError> {
    let mock = MockDriver::new();
    mock.behave("b", |b| b.fail_open = true);
    mock.behave("c", |b| b.fail_open = true);

    let err = RingDriver::new(mock.driver())
        .open_ring("a;b;c")
        .await
        .unwrap_err();
    assert!(matches!(err, SqlRingError::ConnectionError(ref msg) if msg.ends_with(": b")));
    assert_eq!(mock.open_connections(), 0);
    Ok(())
}

#[tokio::test]
async fn malformed_lists_are_rejected_before_any_open() -> Result<(), SqlRingError> {
    let mock = MockDriver::new();
    let driver = RingDriver::new(mock.driver());
    for bad in ["", "a;;b", "a;b;", " ; b"] {
        let err = driver.open_ring(bad).await.unwrap_err();
        assert!(matches!(err, SqlRingError::ConfigError(_)), "{bad:?}");
    }
    assert_eq!(opens(&mock), 0);
    Ok(())
}

#[tokio::test]
async fn close_is_a_no_op_and_shutdown_tears_down() -> Result<(), SqlRingError> {
    let mock = MockDriver::new();
    let ring = RingDriver::new(mock.driver()).open_ring("a;b;c").await?;

    ring.close().await?;
    assert_eq!(mock.open_connections(), 3);

    ring.shutdown().await?;
    assert_eq!(mock.open_connections(), 0);
    Ok(())
}

#[tokio::test]
async fn shutdown_closes_every_backend_even_when_one_fails() -> Result<(), SqlRingError> {
    let mock = MockDriver::new();
    mock.behave("b", |b| b.fail_conn_close = true);
    let ring = RingDriver::new(mock.driver()).open_ring("a;b;c").await?;

    let err = ring.shutdown().await.unwrap_err();
    assert!(matches!(err, SqlRingError::ConnectionError(_)));
    assert_eq!(mock.open_connections(), 0);
    Ok(())
}

#[tokio::test]
async fn connects_from_a_serialized_config() -> Result<(), Box<dyn std::error::Error>> {
    let mock = MockDriver::new();
    let cfg: RingConfig = serde_json::from_str(r#"{"primary":"a","replicas":["b","c"]}"#)?;
    assert_eq!(cfg.to_dsn_list(), "a;b;c");

    let ring = RingDriver::new(mock.driver()).connect(&cfg).await?;
    assert_eq!(ring.replica_count(), 2);

    let primary_only: RingConfig = serde_json::from_str(r#"{"primary":"solo"}"#)?;
    let ring = RingDriver::new(mock.driver()).connect(&primary_only).await?;
    assert_eq!(ring.replica_count(), 0);
    assert_eq!(mock.open_connections(), 4);
    Ok(())
}

#[tokio::test]
async fn registry_opens_rings_by_name() -> Result<(), SqlRingError> {
    let mock = MockDriver::new();
    let registry = DriverRegistry::new();
    registry.register("mock", mock.driver())?;
    registry.register_ring("mock-ring", mock.driver())?;

    let conn = registry.open("mock-ring", "p;r").await?;
    assert_eq!(mock.open_connections(), 2);
    conn.close().await?;
    assert_eq!(mock.open_connections(), 2);

    let Err(err) = registry.open("nope", "p").await else {
        panic!("unknown driver name must not open");
    };
    assert!(matches!(err, SqlRingError::ConfigError(_)));
    Ok(())
}
