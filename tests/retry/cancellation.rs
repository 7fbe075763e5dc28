//! Cancellation Tests
//!
//! Tests for runs whose context is cancelled or reaches its deadline:
//! - Before the first attempt
//! - While waiting between attempts
//! - Panics in the body

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

use crate::common::*;
use sqltx::{ConstantBackoff, ContextError, DefaultSleeper};

fn slow_retry_options() -> Options {
    Options::new()
        .backoff(ConstantBackoff::new(Duration::from_secs(60)))
        .sleeper(DefaultSleeper)
}

#[test]
fn cancelled_context_never_begins() {
    let db = MockDb::new();
    let ctx = Context::background();
    ctx.cancel();

    let err = postgres_retrier()
        .run(&ctx, &db, &Options::new().name("c"), |_tx| Ok::<_, MockError>(()))
        .unwrap_err();

    assert!(matches!(err, TxError::Begin { .. }));
    assert_eq!(err.to_string(), "failed to start transaction 'c': context canceled");
    assert_eq!(db.calls(), Calls::default());
}

#[test]
fn cancel_interrupts_backoff_wait() {
    let db = MockDb::new();
    let ctx = Context::background();
    let canceller = ctx.clone();

    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        canceller.cancel();
    });

    let start = Instant::now();
    let err = postgres_retrier()
        .run(&ctx, &db, &slow_retry_options(), |_tx| {
            Err::<(), _>(MockError::serialization())
        })
        .unwrap_err();
    let elapsed = start.elapsed();
    handle.join().unwrap();

    assert!(elapsed < Duration::from_secs(5), "run took {:?}", elapsed);
    assert_eq!(err.downcast_ref::<ContextError>(), Some(&ContextError::Canceled));
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
fn deadline_interrupts_backoff_wait() {
    let db = MockDb::new();
    let ctx = Context::with_timeout(Duration::from_millis(50));

    let start = Instant::now();
    let err = postgres_retrier()
        .run(&ctx, &db, &slow_retry_options(), |_tx| {
            Err::<(), _>(MockError::deadlock())
        })
        .unwrap_err();

    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(
        err.downcast_ref::<ContextError>(),
        Some(&ContextError::DeadlineExceeded)
    );
    assert_eq!(db.calls().begins, 1);
}

#[test]
fn panic_in_body_rolls_back_and_propagates() {
    let db = MockDb::new();
    let ctx = Context::background();

    let result = catch_unwind(AssertUnwindSafe(|| {
        postgres_retrier().run(&ctx, &db, &Options::new(), |tx| -> Result<(), MockError> {
            tx.insert("never");
            panic!("body exploded")
        })
    }));

    let payload = result.unwrap_err();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"body exploded"));
    assert_eq!(
        db.calls(),
        Calls {
            begins: 1,
            commits: 0,
            rollbacks: 1
        }
    );
    assert!(db.committed_rows().is_empty());
}
