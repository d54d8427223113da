//! Transaction bookkeeping against an in-memory backend.

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use clients_service::postgres::{
    ConnectionPool, DbError, IsoLevel, NamedArgs, QueryOutcome, Record, RegisterMetricsOptions,
    SqlValue, TransactionError, TransactionOutcome, TxOptions,
};

use common::{Call, FakeBackend, RecordingMetrics};

fn pool_with(backend: FakeBackend, metrics: Arc<RecordingMetrics>) -> ConnectionPool {
    let mut pool = ConnectionPool::with_backend(
        Arc::new(backend),
        metrics.clone(),
        Duration::from_millis(200),
    );
    pool.register_metrics(RegisterMetricsOptions {
        query: Some(metrics.clone()),
        transaction: Some(metrics),
    });
    pool
}

#[tokio::test]
async fn test_committed_transaction() {
    let backend = FakeBackend::new();
    backend.push_rows(vec![Record::from_pairs([("id", SqlValue::Int(7))])]);
    let metrics = Arc::new(RecordingMetrics::default());
    let pool = pool_with(backend.clone(), metrics.clone());

    let id = pool
        .with_transaction(
            &CancellationToken::new(),
            "CreateClientTx",
            TxOptions::default(),
            |tx| {
                async move {
                    let row = tx
                        .query_row(
                            "CreateClient",
                            "INSERT INTO client (name) VALUES (@name) RETURNING id",
                            NamedArgs::new().with("name", "Ada"),
                        )
                        .await;
                    row.scan()?.get::<i64>("id")
                }
                .boxed()
            },
        )
        .await
        .unwrap();

    assert_eq!(id, 7);
    assert_eq!(metrics.transactions(TransactionOutcome::Commit, "CreateClientTx"), 1);
    assert_eq!(metrics.transactions(TransactionOutcome::Rollback, "CreateClientTx"), 0);
    assert_eq!(metrics.transaction_durations("CreateClientTx"), 1);
    assert_eq!(metrics.queries(QueryOutcome::Success, "CreateClient"), 1);

    let calls = backend.calls();
    assert_eq!(calls.first(), Some(&Call::Begin("BEGIN".to_string())));
    assert_eq!(calls.last(), Some(&Call::Commit));
    assert!(!calls.contains(&Call::Rollback));
}

#[tokio::test]
async fn test_failed_unit_of_work_rolls_back() {
    let backend = FakeBackend::new();
    let metrics = Arc::new(RecordingMetrics::default());
    let pool = pool_with(backend.clone(), metrics.clone());

    let err = pool
        .with_transaction(
            &CancellationToken::new(),
            "Transfer",
            TxOptions::default(),
            |_tx| async move { Err::<(), _>("insufficient funds".to_string()) }.boxed(),
        )
        .await
        .unwrap_err();

    assert!(matches!(&err, TransactionError::Aborted(cause) if cause == "insufficient funds"));
    assert_eq!(metrics.transactions(TransactionOutcome::Rollback, "Transfer"), 1);
    assert_eq!(metrics.transactions(TransactionOutcome::Commit, "Transfer"), 0);
    assert_eq!(metrics.transaction_durations("Transfer"), 0);
    assert_eq!(backend.calls().last(), Some(&Call::Rollback));
}

#[tokio::test]
async fn test_rollback_failure_keeps_cause() {
    let backend = FakeBackend::new();
    backend.fail_rollback(DbError::Database {
        code: Some("08006".to_string()),
        constraint: None,
        message: "connection failure".to_string(),
    });
    let metrics = Arc::new(RecordingMetrics::default());
    let pool = pool_with(backend, metrics.clone());

    let err = pool
        .with_transaction(
            &CancellationToken::new(),
            "Transfer",
            TxOptions::default(),
            |_tx| async move { Err::<(), _>("boom".to_string()) }.boxed(),
        )
        .await
        .unwrap_err();

    match &err {
        TransactionError::RollbackFailed { rollback, cause } => {
            assert_eq!(rollback.code(), Some("08006"));
            assert_eq!(cause, "boom");
        }
        other => panic!("expected rollback failure, got {other:?}"),
    }
    assert_eq!(err.db_error().and_then(|e| e.code()), Some("08006"));
    assert_eq!(err.into_cause().as_deref(), Some("boom"));
    assert_eq!(metrics.transactions(TransactionOutcome::Rollback, "Transfer"), 1);
}

#[tokio::test]
async fn test_rollback_of_closed_transaction_is_ignored() {
    let backend = FakeBackend::new();
    backend.fail_rollback(DbError::TransactionClosed);
    let pool = pool_with(backend, Arc::new(RecordingMetrics::default()));

    let err = pool
        .with_transaction(
            &CancellationToken::new(),
            "Transfer",
            TxOptions::default(),
            |_tx| async move { Err::<(), _>("boom".to_string()) }.boxed(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, TransactionError::Aborted(_)));
}

#[tokio::test]
async fn test_begin_failure() {
    let backend = FakeBackend::new();
    backend.fail_begin(DbError::Cancelled);
    let metrics = Arc::new(RecordingMetrics::default());
    let pool = pool_with(backend, metrics.clone());

    let err = pool
        .with_transaction(
            &CancellationToken::new(),
            "Transfer",
            TxOptions::default(),
            |_tx| async move { Ok::<_, String>(()) }.boxed(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, TransactionError::Begin(DbError::Cancelled)));
    assert_eq!(metrics.transactions(TransactionOutcome::Commit, "Transfer"), 0);
    assert_eq!(metrics.transactions(TransactionOutcome::Rollback, "Transfer"), 0);
}

#[tokio::test]
async fn test_commit_failure_is_reported() {
    let backend = FakeBackend::new();
    backend.fail_commit(DbError::Database {
        code: Some("40001".to_string()),
        constraint: None,
        message: "could not serialize access".to_string(),
    });
    let metrics = Arc::new(RecordingMetrics::default());
    let pool = pool_with(backend, metrics.clone());

    let options = TxOptions {
        iso_level: Some(IsoLevel::Serializable),
        ..TxOptions::default()
    };
    let err = pool
        .with_transaction(
            &CancellationToken::new(),
            "Transfer",
            options,
            |_tx| async move { Ok::<_, String>(()) }.boxed(),
        )
        .await
        .unwrap_err();

    assert!(matches!(&err, TransactionError::Commit(e) if e.code() == Some("40001")));
    assert_eq!(metrics.transactions(TransactionOutcome::Commit, "Transfer"), 1);
}

#[tokio::test]
async fn test_transaction_queries_share_deadline() {
    let backend = FakeBackend::new().with_delay(Duration::from_millis(120));
    let metrics = Arc::new(RecordingMetrics::default());
    let pool = pool_with(backend.clone(), metrics.clone());

    let err = pool
        .with_transaction(
            &CancellationToken::new(),
            "Slow",
            TxOptions::default(),
            |tx| {
                async move {
                    tx.query("First", "SELECT 1", NamedArgs::new()).await?;
                    tx.query("Second", "SELECT 2", NamedArgs::new()).await?;
                    Ok::<_, DbError>(())
                }
                .boxed()
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, TransactionError::Aborted(DbError::Timeout(_))));
    assert_eq!(metrics.queries(QueryOutcome::Success, "First"), 1);
    assert_eq!(metrics.queries(QueryOutcome::Error, "Second"), 1);
    assert_eq!(backend.calls().last(), Some(&Call::Rollback));
}

#[tokio::test]
async fn test_stalled_rollback_is_bounded() {
    let backend = FakeBackend::new();
    backend.stall_rollback(Duration::from_secs(30));
    let metrics = Arc::new(RecordingMetrics::default());
    let pool = pool_with(backend.clone(), metrics.clone());

    let err = tokio::time::timeout(
        Duration::from_secs(2),
        pool.with_transaction(
            &CancellationToken::new(),
            "Transfer",
            TxOptions::default(),
            |_tx| async move { Err::<(), _>("boom".to_string()) }.boxed(),
        ),
    )
    .await
    .expect("rollback was not bounded")
    .unwrap_err();

    match err {
        TransactionError::RollbackFailed { rollback, cause } => {
            assert!(matches!(rollback, DbError::Timeout(_)));
            assert_eq!(cause, "boom");
        }
        other => panic!("expected rollback failure, got {other:?}"),
    }
    assert_eq!(metrics.transactions(TransactionOutcome::Rollback, "Transfer"), 1);
    assert_eq!(backend.calls().last(), Some(&Call::Rollback));
}

#[tokio::test]
async fn test_rollback_after_transaction_deadline() {
    let backend = FakeBackend::new().with_delay(Duration::from_millis(300));
    let pool = pool_with(backend.clone(), Arc::new(RecordingMetrics::default()));

    let err = pool
        .with_transaction(
            &CancellationToken::new(),
            "Slow",
            TxOptions::default(),
            |tx| {
                async move {
                    tx.query("Slow", "SELECT pg_sleep(1)", NamedArgs::new()).await?;
                    Ok::<_, DbError>(())
                }
                .boxed()
            },
        )
        .await
        .unwrap_err();

    // the rollback itself succeeded despite the spent deadline
    assert!(matches!(err, TransactionError::Aborted(DbError::Timeout(_))));
    assert_eq!(backend.calls().last(), Some(&Call::Rollback));
}
