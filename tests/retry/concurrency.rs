//! Concurrent Run Tests
//!
//! Independent runs share a retrier and a transaction source but never
//! share attempt state or backoff schedules.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::common::*;
use sqltx::{Backoff, BackoffPolicy};

const THREADS: usize = 8;
const FAILURES_PER_RUN: usize = 2;

#[test]
fn concurrent_runs_retry_independently() {
    let db = MockDb::new();
    let retrier = postgres_retrier();
    let ctx = Context::background();

    thread::scope(|s| {
        for i in 0..THREADS {
            let (db, retrier, ctx) = (&db, retrier.clone(), ctx.clone());
            s.spawn(move || {
                let mut failures = 0;
                retrier
                    .run(&ctx, db, &Options::new().name(format!("worker-{}", i)), |tx| {
                        if failures < FAILURES_PER_RUN {
                            failures += 1;
                            return Err(MockError::serialization());
                        }
                        tx.insert(&format!("worker-{}", i));
                        Ok(())
                    })
                    .unwrap();
            });
        }
    });

    let calls = db.calls();
    assert_eq!(calls.begins, THREADS * (FAILURES_PER_RUN + 1));
    assert_eq!(calls.commits, THREADS);
    assert_eq!(calls.rollbacks, THREADS * FAILURES_PER_RUN);

    let mut rows = db.committed_rows();
    rows.sort();
    let mut expected: Vec<String> = (0..THREADS).map(|i| format!("worker-{}", i)).collect();
    expected.sort();
    assert_eq!(rows, expected);
}

/// Schedule that allows exactly `budget` retries per run
#[derive(Debug)]
struct PerRunBudget {
    budget: usize,
    created: Arc<AtomicUsize>,
}

#[derive(Debug)]
struct Budget {
    remaining: usize,
}

impl Backoff for Budget {
    fn reset(&mut self) {}

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(Duration::ZERO)
    }
}

impl BackoffPolicy for PerRunBudget {
    fn new_backoff(&self) -> Box<dyn Backoff> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Box::new(Budget {
            remaining: self.budget,
        })
    }
}

#[test]
fn each_run_gets_a_fresh_backoff_schedule() {
    let created = Arc::new(AtomicUsize::new(0));
    let mut opts = Options::new();
    opts.backoff = Some(Arc::new(PerRunBudget {
        budget: 3,
        created: Arc::clone(&created),
    }));
    let db = MockDb::new();
    let retrier = postgres_retrier();
    let ctx = Context::background();

    thread::scope(|s| {
        for _ in 0..THREADS {
            let (db, retrier, ctx, opts) = (&db, retrier.clone(), ctx.clone(), opts.clone());
            s.spawn(move || {
                let err = retrier
                    .run(&ctx, db, &opts, |_tx| Err::<(), _>(MockError::deadlock()))
                    .unwrap_err();
                // A shared schedule would run dry long before every run
                // used its own three retries.
                assert!(matches!(err, TxError::BackoffExhausted { attempts: 4, .. }));
            });
        }
    });

    assert_eq!(created.load(Ordering::SeqCst), THREADS);
    assert_eq!(db.calls().begins, THREADS * 4);
}
