//! Integration tests for error aggregation

use conpats::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn error_index(error: &PoolError) -> usize {
    error
        .to_string()
        .trim_start_matches("err")
        .parse()
        .expect("unexpected error message")
}

fn submit_wave(pool: &ErrorPool, completed: &Arc<AtomicUsize>, jobs: usize) {
    for i in 0..jobs {
        let completed = Arc::clone(completed);
        pool.go(move || {
            thread::sleep(Duration::from_millis(2));
            completed.fetch_add(1, Ordering::Relaxed);
            if i % 5 == 0 {
                return Err(PoolError::other(format!("err{}", i)));
            }
            Ok(())
        });
    }
}

#[test]
fn test_all_errors_returned() {
    let pool = WorkerPool::new(7)
        .expect("Failed to create pool")
        .with_errors(false);
    let completed = Arc::new(AtomicUsize::new(0));

    submit_wave(&pool, &completed, 50);
    let mut errors: Vec<usize> = pool.wait().iter().map(error_index).collect();
    errors.sort_unstable();

    assert_eq!(completed.load(Ordering::Relaxed), 50);
    assert_eq!(errors, (0..50).step_by(5).collect::<Vec<_>>());
}

#[test]
fn test_no_errors_returns_empty() {
    let pool = WorkerPool::new(7)
        .expect("Failed to create pool")
        .with_errors(false);
    let completed = Arc::new(AtomicUsize::new(0));

    for _ in 0..50 {
        let completed = Arc::clone(&completed);
        pool.go(move || {
            completed.fetch_add(1, Ordering::Relaxed);
            Ok(())
        });
    }

    assert!(pool.wait().is_empty());
    assert_eq!(completed.load(Ordering::Relaxed), 50);
}

#[test]
fn test_first_only_single_worker_keeps_earliest() {
    let pool = WorkerPool::new(1)
        .expect("Failed to create pool")
        .with_errors(true);
    let completed = Arc::new(AtomicUsize::new(0));

    submit_wave(&pool, &completed, 50);
    let errors = pool.wait();

    assert_eq!(completed.load(Ordering::Relaxed), 50);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].to_string(), "err0");
}

#[test]
fn test_first_only_many_workers_keeps_one() {
    let pool = WorkerPool::new(7)
        .expect("Failed to create pool")
        .with_errors(true);
    let completed = Arc::new(AtomicUsize::new(0));

    submit_wave(&pool, &completed, 50);
    let errors = pool.wait();

    assert_eq!(completed.load(Ordering::Relaxed), 50);
    assert_eq!(errors.len(), 1);
    assert_eq!(error_index(&errors[0]) % 5, 0);
}

#[test]
fn test_collect_per_wave() {
    let pool = WorkerPool::new(4)
        .expect("Failed to create pool")
        .with_errors(false);
    let completed = Arc::new(AtomicUsize::new(0));

    submit_wave(&pool, &completed, 20);
    assert_eq!(pool.collect().len(), 4);
    assert_eq!(completed.load(Ordering::Relaxed), 20);

    // Errors are never reported twice
    assert!(pool.collect().is_empty());

    submit_wave(&pool, &completed, 10);
    assert_eq!(pool.wait().len(), 2);
    assert_eq!(completed.load(Ordering::Relaxed), 30);
}

#[test]
fn test_joined_errors_display() {
    let pool = WorkerPool::new(1)
        .expect("Failed to create pool")
        .with_errors(false);
    for i in 0..3 {
        pool.go(move || Err(PoolError::other(format!("err{}", i))));
    }

    let joined = PoolError::join(pool.wait()).expect("expected errors");
    assert_eq!(joined.to_string(), "err0\nerr1\nerr2");
}

#[test]
fn test_concurrent_collectors_never_double_report() {
    let pool = Arc::new(
        WorkerPool::new(4)
            .expect("Failed to create pool")
            .with_errors(false),
    );
    let completed = Arc::new(AtomicUsize::new(0));
    submit_wave(&pool, &completed, 100);

    let collectors: Vec<_> = (0..4)
        .map(|_| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.collect().len())
        })
        .collect();
    let collected: usize = collectors
        .into_iter()
        .map(|c| c.join().expect("Collector panicked"))
        .sum();

    assert_eq!(collected + pool.wait().len(), 20);
}
