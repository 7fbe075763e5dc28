//! Exhaustion Tests
//!
//! Tests for the two ways a run can give up on a retryable error:
//! - The attempt limit is reached
//! - The backoff schedule stops

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use crate::common::*;
use sqltx::{ConstantBackoff, ExponentialBackoff, FnClassifier, DEFAULT_MAX_RETRIES};

fn try_again_retrier() -> Retrier {
    let config = TxConfig::new()
        .with_backoff(ZeroBackoff)
        .with_classifier(FnClassifier::new("try-again", |err| {
            err.to_string().to_lowercase().contains("try again")
        }));
    Retrier::new(Arc::new(config))
}

// ============================================================================
// Attempt Limit
// ============================================================================

#[test]
fn retry_count_exhausted_message_names_limit_and_last_error() {
    for retries in 1..=5 {
        let db = MockDb::new();
        let sleeper = Arc::new(RecordingSleeper::default());
        let ctx = Context::background();
        let opts = recorded(&sleeper).name(format!("3-{}", retries)).max_retries(retries);

        let err = try_again_retrier()
            .run(&ctx, &db, &opts, |_tx| Err::<(), _>(MockError::other("try again")))
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            format!(
                "transaction '3-{}' max retry count ({}) exceeded. Last error: try again",
                retries, retries
            )
        );
        assert!(err.is_exhausted());
        assert_eq!(db.calls().begins, retries);
        assert_eq!(db.calls().rollbacks, retries);
        // No pause after the final attempt
        assert_eq!(sleeper.delays().len(), retries - 1);
    }
}

#[test]
fn last_error_is_the_one_reported() {
    let db = MockDb::new();
    let ctx = Context::background();
    let opts = Options::new().max_retries(3);

    let err = try_again_retrier()
        .run(&ctx, &db, &opts, |tx| {
            Err::<(), _>(MockError::other(&format!("attempt {}: try again", tx.attempt)))
        })
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "transaction max retry count (3) exceeded. Last error: attempt 3: try again"
    );
}

#[test]
fn default_limit_applies_without_override() {
    let db = MockDb::new();
    let ctx = Context::background();

    let err = postgres_retrier()
        .run(&ctx, &db, &Options::new(), |_tx| {
            Err::<(), _>(MockError::serialization())
        })
        .unwrap_err();

    assert!(matches!(
        err,
        TxError::RetriesExhausted { retries, .. } if retries == DEFAULT_MAX_RETRIES
    ));
    assert_eq!(db.calls().begins, DEFAULT_MAX_RETRIES);
}

#[test]
fn configured_limit_applies_when_override_is_zero() {
    let config = TxConfig::new()
        .with_max_retries(NonZeroUsize::new(2).unwrap())
        .with_backoff(ZeroBackoff)
        .with_sleeper(NoopSleeper)
        .with_classifier(PostgresClassifier);
    let retrier = Retrier::new(Arc::new(config));
    let db = MockDb::new();
    let ctx = Context::background();

    let err = retrier
        .run(&ctx, &db, &Options::new().max_retries(0), |_tx| {
            Err::<(), _>(MockError::deadlock())
        })
        .unwrap_err();

    assert!(matches!(err, TxError::RetriesExhausted { retries: 2, .. }));
    assert_eq!(db.calls().begins, 2);
}

// ============================================================================
// Backoff Budget
// ============================================================================

#[test]
fn backoff_budget_stops_the_run() {
    // Every delay exceeds the elapsed-time budget, so the schedule stops
    // as soon as the first retry is requested.
    let backoff = ExponentialBackoff::new()
        .with_initial_interval(Duration::from_millis(50))
        .with_randomization_factor(0.0)
        .with_max_elapsed_time(Some(Duration::ZERO));
    let db = MockDb::new();
    let sleeper = Arc::new(RecordingSleeper::default());
    let ctx = Context::background();
    let opts = recorded(&sleeper).name("bo").backoff(backoff);

    let err = postgres_retrier()
        .run(&ctx, &db, &opts, |_tx| Err::<(), _>(MockError::deadlock()))
        .unwrap_err();

    assert!(matches!(err, TxError::BackoffExhausted { attempts: 1, .. }));
    assert_eq!(
        err.to_string(),
        "transaction 'bo' backoff max time reached. Last error: pq: deadlock detected (SQLSTATE 40P01)"
    );
    assert!(sleeper.delays().is_empty());
    assert_eq!(db.calls().begins, 1);
}

#[test]
fn constant_backoff_delays_are_passed_to_the_sleeper() {
    let db = MockDb::new();
    let sleeper = Arc::new(RecordingSleeper::default());
    let ctx = Context::background();
    let opts = recorded(&sleeper)
        .max_retries(4)
        .backoff(ConstantBackoff::new(Duration::from_millis(25)));

    let _ = postgres_retrier().run(&ctx, &db, &opts, |_tx| {
        Err::<(), _>(MockError::serialization())
    });

    assert_eq!(sleeper.delays(), vec![Duration::from_millis(25); 3]);
}

#[test]
fn exponential_delays_grow_within_bounds() {
    let backoff = ExponentialBackoff::new()
        .with_initial_interval(Duration::from_millis(10))
        .with_randomization_factor(0.0)
        .with_multiplier(2.0)
        .with_max_interval(Duration::from_millis(40))
        .with_max_elapsed_time(None);
    let db = MockDb::new();
    let sleeper = Arc::new(RecordingSleeper::default());
    let ctx = Context::background();
    let opts = recorded(&sleeper).max_retries(6).backoff(backoff);

    let _ = postgres_retrier().run(&ctx, &db, &opts, |_tx| {
        Err::<(), _>(MockError::deadlock())
    });

    let ms = |n| Duration::from_millis(n);
    assert_eq!(sleeper.delays(), vec![ms(10), ms(20), ms(40), ms(40), ms(40)]);
}
