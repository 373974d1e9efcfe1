//! Property-based tests for conpats using proptest

use conpats::prelude::*;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// PoolConfig Tests
// ============================================================================

proptest! {
    /// Worker counts are normalized to at least one
    #[test]
    fn test_config_worker_count(workers in 0usize..64) {
        let config = PoolConfig::new(workers);
        prop_assert_eq!(config.workers(), workers.max(1));
        prop_assert!(config.validate().is_ok());
    }

    /// Builder settings survive a serde round trip through JSON
    #[test]
    fn test_config_serde(
        workers in 1usize..32,
        capacity in 0usize..1024,
        prefix in "[a-z]{3,10}",
        lazy in any::<bool>()
    ) {
        let config = PoolConfig::new(workers)
            .with_queue_capacity(capacity)
            .with_thread_name_prefix(prefix)
            .with_lazy_spawn(lazy);
        let json = serde_json::to_string(&config).expect("serialize");
        let decoded: PoolConfig = serde_json::from_str(&json).expect("deserialize");
        prop_assert_eq!(decoded, config);
    }
}

// ============================================================================
// Pool Execution Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Every submitted job runs exactly once
    #[test]
    fn test_all_jobs_execute(workers in 0usize..8, jobs in 0usize..200) {
        let pool = WorkerPool::new(workers).expect("Failed to create pool");
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..jobs {
            let counter = Arc::clone(&counter);
            pool.go(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }
        pool.wait();

        prop_assert_eq!(counter.load(Ordering::Relaxed), jobs);
        prop_assert_eq!(pool.stats().completed, jobs as u64);
    }

    /// All-errors policy surfaces ceil(N/k) failures, first-only exactly one
    #[test]
    fn test_error_policies(workers in 1usize..6, jobs in 1usize..80, k in 1usize..10) {
        let expected = (jobs + k - 1) / k;

        for first_only in [false, true] {
            let pool = WorkerPool::new(workers)
                .expect("Failed to create pool")
                .with_errors(first_only);
            for i in 0..jobs {
                pool.go(move || {
                    if i % k == 0 {
                        Err(PoolError::other(format!("err{}", i)))
                    } else {
                        Ok(())
                    }
                });
            }
            let errors = pool.wait();
            if first_only {
                prop_assert_eq!(errors.len(), 1);
            } else {
                prop_assert_eq!(errors.len(), expected);
            }
        }
    }

    /// Multi-wave reuse accumulates across collect() calls
    #[test]
    fn test_waves(workers in 1usize..6, waves in prop::collection::vec(0usize..40, 1..5)) {
        let pool = WorkerPool::new(workers).expect("Failed to create pool");
        let counter = Arc::new(AtomicUsize::new(0));
        let mut total = 0;

        for wave in waves {
            for _ in 0..wave {
                let counter = Arc::clone(&counter);
                pool.go(move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                });
            }
            pool.collect();
            total += wave;
            prop_assert_eq!(counter.load(Ordering::Relaxed), total);
        }
        pool.wait();
    }
}

// ============================================================================
// Stream Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Width-1 stages preserve order
    #[test]
    fn test_single_width_order(items in prop::collection::vec(any::<i32>(), 0..100)) {
        let out = Pipeline::from_iter(items.clone())
            .expect("Failed to start pipeline")
            .stage(1, |x: i32| x.wrapping_mul(3))
            .expect("Failed to add stage")
            .collect_vec();
        let expected: Vec<i32> = items.iter().map(|x| x.wrapping_mul(3)).collect();
        prop_assert_eq!(out, expected);
    }

    /// Wider stages preserve the multiset
    #[test]
    fn test_wide_multiset(items in prop::collection::vec(0u16..1000, 0..100), width in 2usize..6) {
        let mut out = Pipeline::from_iter(items.clone())
            .expect("Failed to start pipeline")
            .stage(width, |x: u16| u32::from(x) + 1)
            .expect("Failed to add stage")
            .collect_vec();
        out.sort_unstable();
        let mut expected: Vec<u32> = items.iter().map(|&x| u32::from(x) + 1).collect();
        expected.sort_unstable();
        prop_assert_eq!(out, expected);
    }

    /// Every tee output sees the whole input in order
    #[test]
    fn test_tee_replicas(
        items in prop::collection::vec(any::<u8>(), 0..60),
        outputs in 0usize..5,
        buffer in 0usize..4
    ) {
        let (tx, rx) = handoff(buffer);
        let source = items.clone();
        std::thread::spawn(move || {
            for item in source {
                if tx.send(item).is_err() {
                    break;
                }
            }
        });

        let readers: Vec<_> = tee(rx, outputs, buffer)
            .expect("Failed to start tee")
            .into_iter()
            .map(|out| std::thread::spawn(move || out.iter().collect::<Vec<_>>()))
            .collect();

        prop_assert_eq!(readers.len(), outputs.max(1));
        for reader in readers {
            prop_assert_eq!(reader.join().expect("Reader panicked"), items.clone());
        }
    }
}
