//! Integration tests for cancellation-aware pools and tokens

use conpats::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn cancel_pool(parent: &CancellationToken, workers: usize, cancel_on_error: bool) -> CancelPool {
    WorkerPool::new(workers)
        .expect("Failed to create pool")
        .with_errors(false)
        .with_cancellation(parent, cancel_on_error)
}

#[test]
fn test_every_job_receives_the_token() {
    let root = CancellationToken::new();
    let pool = cancel_pool(&root, 7, false);
    let completed = Arc::new(AtomicUsize::new(0));

    for i in 0..50 {
        let completed = Arc::clone(&completed);
        pool.go(move |token| {
            token.check()?;
            thread::sleep(Duration::from_millis(1));
            completed.fetch_add(1, Ordering::Relaxed);
            if i % 7 == 0 {
                return Err(PoolError::other(format!("err{}", i)));
            }
            Ok(())
        });
    }

    // Drain before closing so no job sees the shutdown cancel
    let mut errors = pool.collect();
    errors.extend(pool.close_and_wait());
    assert_eq!(completed.load(Ordering::Relaxed), 50);
    assert_eq!(errors.len(), 8);
    assert!(!errors.iter().any(PoolError::is_cancelled));
    // The pool's own token fired; the parent did not
    assert!(!root.is_cancelled());
}

#[test]
fn test_external_cancellation_reaches_waiting_jobs() {
    let root = CancellationToken::new();
    let pool = cancel_pool(&root, 6, false);
    let finished_early = Arc::new(AtomicUsize::new(0));

    // Two jobs complete before the trigger
    for _ in 0..2 {
        let finished_early = Arc::clone(&finished_early);
        pool.go(move |_| {
            finished_early.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }
    pool.collect();

    let started = Arc::new(AtomicUsize::new(0));
    for _ in 0..4 {
        let started = Arc::clone(&started);
        pool.go(move |token| {
            started.fetch_add(1, Ordering::SeqCst);
            token.wait();
            token.check()
        });
    }
    while started.load(Ordering::SeqCst) < 4 {
        thread::yield_now();
    }

    root.cancel();
    let errors = pool.wait();

    assert_eq!(finished_early.load(Ordering::SeqCst), 2);
    assert_eq!(errors.len(), 4);
    assert!(errors.iter().all(PoolError::is_cancelled));
}

#[test]
fn test_job_cancelling_parent_observes_cancellation() {
    let root = CancellationToken::new();
    let pool = cancel_pool(&root, 4, false);
    let saw_cancel = Arc::new(AtomicBool::new(false));

    let parent = root.clone();
    let saw_cancel_clone = Arc::clone(&saw_cancel);
    pool.go(move |token| {
        parent.cancel();
        token.wait();
        saw_cancel_clone.store(true, Ordering::SeqCst);
        token.check()
    });

    let errors = pool.close_and_wait();
    assert!(saw_cancel.load(Ordering::SeqCst));
    assert_eq!(errors.len(), 1);
    assert!(errors[0].is_cancelled());
}

#[test]
fn test_wait_triggers_internal_cancel() {
    let root = CancellationToken::new();
    let pool = cancel_pool(&root, 2, false);
    let seen_cancel = Arc::new(AtomicBool::new(false));

    let seen = Arc::clone(&seen_cancel);
    pool.go(move |token| {
        token.wait();
        seen.store(true, Ordering::SeqCst);
        Ok(())
    });

    let errors = pool.close_and_wait();
    assert!(errors.is_empty());
    assert!(seen_cancel.load(Ordering::SeqCst));
    assert_eq!(pool.token().reason(), Some(CancellationReason::Shutdown));
}

#[test]
fn test_cancel_on_error_stops_siblings() {
    let root = CancellationToken::new();
    let pool = cancel_pool(&root, 4, true);
    let finished = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let finished = Arc::clone(&finished);
        pool.go(move |token| {
            // Long job that polls its token
            for _ in 0..500 {
                token.check()?;
                thread::sleep(Duration::from_millis(2));
            }
            finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }
    pool.go(|_| Err(PoolError::job_failed("broken input")));

    let errors = pool.wait();
    assert_eq!(finished.load(Ordering::SeqCst), 0);
    assert_eq!(errors.len(), 4);
    assert_eq!(errors[0].to_string(), "job failed: broken input");
    assert!(errors[1..].iter().all(PoolError::is_cancelled));
    assert_eq!(
        pool.token().reason(),
        Some(CancellationReason::Error(
            "job failed: broken input".to_string()
        ))
    );
}

#[test]
fn test_wait_races_with_cancel_on_error() {
    for _ in 0..20 {
        let root = CancellationToken::new();
        let pool = cancel_pool(&root, 2, true);
        pool.go(|_| Err(PoolError::job_failed("fail")));
        // Either reason may win; both triggers are no-ops once fired
        let errors = pool.wait();
        assert_eq!(errors.len(), 1);
        assert!(pool.is_cancelled());
    }
}

#[test]
fn test_timeout_token_as_deadline() {
    let deadline = CancellationToken::with_timeout(Duration::from_millis(30));
    let pool = cancel_pool(&deadline, 1, false);

    pool.go(|token| {
        token.wait();
        token.check()
    });
    let errors = pool.collect();

    assert_eq!(errors.len(), 1);
    assert!(errors[0].is_cancelled());
    assert!(matches!(
        deadline.reason(),
        Some(CancellationReason::Timeout(_))
    ));
    pool.wait();
}

#[test]
fn test_token_callbacks_fire_once() {
    let token = CancellationToken::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let calls_clone = Arc::clone(&calls);
    token.on_cancel_always(move || {
        calls_clone.fetch_add(1, Ordering::SeqCst);
    });

    token.cancel();
    token.cancel_with_reason(CancellationReason::Custom("again".to_string()));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(token.reason(), Some(CancellationReason::Manual));
}

#[test]
fn test_concurrent_cancel_single_transition() {
    let token = CancellationToken::new();
    let winners = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let token = token.clone();
            let winners = Arc::clone(&winners);
            thread::spawn(move || {
                if token.try_cancel(CancellationReason::Custom(format!("t{}", i))) {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }
    assert_eq!(winners.load(Ordering::SeqCst), 1);
}
