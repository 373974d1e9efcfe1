//! Configuration for worker pools.

use crate::core::{PoolError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for a [`WorkerPool`](crate::pool::WorkerPool)
///
/// Missing fields take their defaults when deserialized, so an embedding
/// application can load a partial configuration:
///
/// ```rust
/// use conpats::pool::PoolConfig;
///
/// let config: PoolConfig = serde_json::from_str(r#"{ "num_workers": 8 }"#).unwrap();
/// assert_eq!(config.num_workers, 8);
/// assert_eq!(config.queue_capacity, 0);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of worker threads (0 is treated as 1)
    pub num_workers: usize,
    /// Submission buffer size (0 = synchronous hand-off to an idle worker)
    pub queue_capacity: usize,
    /// Thread name prefix
    pub thread_name_prefix: String,
    /// Spawn workers on demand instead of at construction
    pub lazy_spawn: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_workers: 1,
            queue_capacity: 0,
            thread_name_prefix: "worker".to_string(),
            lazy_spawn: false,
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with the given number of workers
    #[must_use]
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers: num_workers.max(1),
            ..Default::default()
        }
    }

    /// Set the submission buffer size
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set thread name prefix
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Spawn workers lazily, up to `num_workers`, as submissions find no idle worker
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_lazy_spawn(mut self, lazy: bool) -> Self {
        self.lazy_spawn = lazy;
        self
    }

    /// Worker count after normalization
    pub fn workers(&self) -> usize {
        self.num_workers.max(1)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.thread_name_prefix.is_empty() {
            return Err(PoolError::invalid_config(
                "thread_name_prefix",
                "Thread name prefix must not be empty",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_workers_normalized() {
        assert_eq!(PoolConfig::new(0).num_workers, 1);
        assert_eq!(PoolConfig::new(0).workers(), 1);

        let config = PoolConfig {
            num_workers: 0,
            ..Default::default()
        };
        assert_eq!(config.workers(), 1);
    }

    #[test]
    fn test_builder() {
        let config = PoolConfig::new(4)
            .with_queue_capacity(16)
            .with_thread_name_prefix("ingest")
            .with_lazy_spawn(true);

        assert_eq!(config.workers(), 4);
        assert_eq!(config.queue_capacity, 16);
        assert_eq!(config.thread_name_prefix, "ingest");
        assert!(config.lazy_spawn);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_prefix() {
        let config = PoolConfig::new(2).with_thread_name_prefix("");
        assert!(matches!(
            config.validate(),
            Err(PoolError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_serialized_fields() {
        let value = serde_json::to_value(PoolConfig::new(2)).unwrap();
        let mut keys: Vec<&str> = value
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec!["lazy_spawn", "num_workers", "queue_capacity", "thread_name_prefix"]
        );
    }

    #[test]
    fn test_deserialize_partial() {
        let config: PoolConfig =
            serde_json::from_str(r#"{ "num_workers": 3, "lazy_spawn": true }"#).unwrap();
        assert_eq!(config.workers(), 3);
        assert!(config.lazy_spawn);
        assert_eq!(config.thread_name_prefix, "worker");
    }
}
