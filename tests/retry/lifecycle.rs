//! Attempt Lifecycle Tests
//!
//! Tests for the begin/body/commit/rollback sequence:
//! - Successful first attempt
//! - Retry after a conflict in the body or in the commit
//! - Non-retryable errors returned unchanged
//! - Begin failures never retried

use std::sync::Arc;

use crate::common::*;
use sqltx::{CommitError, PgError};

// ============================================================================
// Success
// ============================================================================

#[test]
fn first_attempt_success_commits_once() {
    let db = MockDb::new();
    let ctx = Context::background();

    let id = postgres_retrier()
        .run(&ctx, &db, &Options::new(), |tx| {
            tx.insert("alice");
            Ok::<_, MockError>(7)
        })
        .unwrap();

    assert_eq!(id, 7);
    assert_eq!(
        db.calls(),
        Calls {
            begins: 1,
            commits: 1,
            rollbacks: 0
        }
    );
    assert_eq!(db.committed_rows(), vec!["alice".to_string()]);
}

#[test]
fn conflict_in_body_is_retried_with_a_fresh_transaction() {
    let db = MockDb::new();
    let sleeper = Arc::new(RecordingSleeper::default());
    let ctx = Context::background();

    postgres_retrier()
        .run(&ctx, &db, &recorded(&sleeper), |tx| {
            tx.insert(&format!("row-{}", tx.attempt));
            if tx.attempt < 3 {
                return Err(MockError::serialization());
            }
            Ok(())
        })
        .unwrap();

    // Writes of the failed attempts were rolled back with their handle
    assert_eq!(db.committed_rows(), vec!["row-3".to_string()]);
    assert_eq!(
        db.calls(),
        Calls {
            begins: 3,
            commits: 1,
            rollbacks: 2
        }
    );
    assert_eq!(sleeper.delays().len(), 2);
}

#[test]
fn conflict_at_commit_is_retried() {
    let db = MockDb::new().fail_commits([MockError::deadlock(), MockError::serialization()]);
    let ctx = Context::background();

    postgres_retrier()
        .run(&ctx, &db, &Options::new(), |tx| {
            tx.insert("bob");
            Ok::<_, MockError>(())
        })
        .unwrap();

    assert_eq!(
        db.calls(),
        Calls {
            begins: 3,
            commits: 3,
            rollbacks: 2
        }
    );
    assert_eq!(db.committed_rows(), vec!["bob".to_string()]);
}

// ============================================================================
// Non-retryable Errors
// ============================================================================

#[test]
fn non_retryable_body_error_is_returned_unchanged() {
    let db = MockDb::new();
    let ctx = Context::background();

    let err = postgres_retrier()
        .run(&ctx, &db, &Options::new(), |_tx| {
            Err::<(), _>(MockError::Server(PgError::new("23505", "duplicate key")))
        })
        .unwrap_err();

    assert!(matches!(err, TxError::Failed { .. }));
    assert_eq!(err.to_string(), "pq: duplicate key (SQLSTATE 23505)");
    assert_eq!(
        err.downcast_ref::<MockError>(),
        Some(&MockError::Server(PgError::new("23505", "duplicate key")))
    );
    assert_eq!(
        db.calls(),
        Calls {
            begins: 1,
            commits: 0,
            rollbacks: 1
        }
    );
}

#[test]
fn non_retryable_commit_error_is_marked_as_commit_failure() {
    let db = MockDb::new().fail_commits([MockError::other("connection reset")]);
    let ctx = Context::background();

    let err = postgres_retrier()
        .run(&ctx, &db, &Options::new().name("save"), |_tx| Ok::<_, MockError>(()))
        .unwrap_err();

    assert!(err.is_commit_failure());
    assert!(err.downcast_ref::<CommitError>().is_some());
    assert_eq!(
        err.to_string(),
        "transaction 'save': commit error: connection reset"
    );
    assert_eq!(db.calls().rollbacks, 1);
}

#[test]
fn retryable_looking_error_from_begin_is_not_retried() {
    let db = MockDb::new().fail_begin(MockError::serialization());
    let ctx = Context::background();
    let mut body_calls = 0;

    let err = postgres_retrier()
        .run(&ctx, &db, &Options::new().name("1"), |_tx| {
            body_calls += 1;
            Ok::<_, MockError>(())
        })
        .unwrap_err();

    assert!(matches!(err, TxError::Begin { .. }));
    assert_eq!(
        err.to_string(),
        "failed to start transaction '1': pq: could not serialize access (SQLSTATE 40001)"
    );
    assert_eq!(body_calls, 0);
    assert_eq!(db.calls(), Calls::default());
}

// ============================================================================
// Options
// ============================================================================

#[test]
fn start_options_reach_every_attempt() {
    let db = MockDb::new();
    let ctx = Context::background();
    let opts = Options::new()
        .isolation(IsolationLevel::Serializable)
        .read_only(true);

    postgres_retrier()
        .run(&ctx, &db, &opts, |tx| {
            if tx.attempt == 1 {
                return Err(MockError::deadlock());
            }
            Ok(())
        })
        .unwrap();

    let expected = TxOptions::new(IsolationLevel::Serializable, true);
    assert_eq!(db.options_seen(), vec![expected, expected]);
}

#[test]
fn custom_classifier_extends_the_registry() {
    let config = TxConfig::new()
        .with_backoff(ZeroBackoff)
        .with_sleeper(NoopSleeper)
        .with_classifier(PostgresClassifier)
        .with_classifier(sqltx::FnClassifier::new("restart", |err| {
            err.to_string().contains("restart transaction")
        }));
    let retrier = Retrier::new(Arc::new(config));
    let db = MockDb::new();
    let ctx = Context::background();

    retrier
        .run(&ctx, &db, &Options::new(), |tx| {
            if tx.attempt == 1 {
                return Err(MockError::other("restart transaction: read too old"));
            }
            Ok(())
        })
        .unwrap();

    assert_eq!(db.calls().begins, 2);
}
