//! Error types for pools, pipelines and jobs

/// Result type for pool and job operations
pub type Result<T> = std::result::Result<T, PoolError>;

/// Errors produced by jobs and by the pools that run them
///
/// Job failures are collected by [`ErrorPool`](crate::pool::ErrorPool) and
/// returned from `collect()`/`wait()`, never raised. Submitting to a closed
/// pool is not an error at all.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PoolError {
    /// A job reported a failure
    #[error("job failed: {message}")]
    JobFailed {
        /// Failure message
        message: String,
    },

    /// A job stopped because its cancellation scope was triggered
    #[error("job cancelled: {reason}")]
    Cancelled {
        /// Reason the scope was cancelled
        reason: String,
    },

    /// A job panicked while running on a worker
    #[error("job panicked: {message}")]
    Panicked {
        /// Panic payload rendered as text
        message: String,
    },

    /// Failed to spawn a worker thread
    #[error("failed to spawn worker thread #{thread_id}: {message}")]
    SpawnError {
        /// ID of the worker that failed to spawn
        thread_id: usize,
        /// Error message
        message: String,
        /// Source IO error
        #[source]
        source: Option<std::io::Error>,
    },

    /// Failed to join a worker thread
    #[error("failed to join worker thread #{thread_id}: {message}")]
    JoinError {
        /// ID of the worker that failed to join
        thread_id: usize,
        /// Error message
        message: String,
    },

    /// Invalid configuration value
    #[error("invalid configuration for '{parameter}': {message}")]
    InvalidConfig {
        /// Configuration parameter name
        parameter: String,
        /// Error message
        message: String,
    },

    /// Several errors folded into one value, see [`PoolError::join`]
    #[error("{}", join_messages(.0))]
    Multiple(Vec<PoolError>),

    /// General error
    #[error("{0}")]
    Other(String),
}

fn join_messages(errors: &[PoolError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

impl PoolError {
    /// Create a job failure
    pub fn job_failed(message: impl Into<String>) -> Self {
        PoolError::JobFailed {
            message: message.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(reason: impl Into<String>) -> Self {
        PoolError::Cancelled {
            reason: reason.into(),
        }
    }

    /// Create a panic error
    pub fn panicked(message: impl Into<String>) -> Self {
        PoolError::Panicked {
            message: message.into(),
        }
    }

    /// Create a spawn error
    pub fn spawn(thread_id: usize, message: impl Into<String>) -> Self {
        PoolError::SpawnError {
            thread_id,
            message: message.into(),
            source: None,
        }
    }

    /// Create a spawn error with source
    pub fn spawn_with_source(
        thread_id: usize,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        PoolError::SpawnError {
            thread_id,
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a join error
    pub fn join_failed(thread_id: usize, message: impl Into<String>) -> Self {
        PoolError::JoinError {
            thread_id,
            message: message.into(),
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        PoolError::InvalidConfig {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        PoolError::Other(msg.into())
    }

    /// Fold a list of collected errors into a single value.
    ///
    /// Returns `None` for an empty list and the error itself for a list of one.
    pub fn join(mut errors: Vec<PoolError>) -> Option<PoolError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(PoolError::Multiple(errors)),
        }
    }

    /// Whether this error (or any error folded into it) is a cancellation
    pub fn is_cancelled(&self) -> bool {
        match self {
            PoolError::Cancelled { .. } => true,
            PoolError::Multiple(errors) => errors.iter().any(PoolError::is_cancelled),
            _ => false,
        }
    }
}
