//! Error types for batch delivery and producer operations.

use std::sync::Arc;

use thiserror::Error;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// E001: Batch executor failed or panicked
    E001ExecutorFailure,
    /// E002: Producer shut down before the batch completed
    E002Shutdown,
    /// E003: Internal invariant violated
    E003ContractViolation,
    /// E004: Configuration missing or invalid
    E004InvalidConfig,
    /// E005: Outstanding records reached the configured limit
    E005Backpressure,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::E001ExecutorFailure => "E001",
            Self::E002Shutdown => "E002",
            Self::E003ContractViolation => "E003",
            Self::E004InvalidConfig => "E004",
            Self::E005Backpressure => "E005",
        }
    }
}

/// Failure outcome of a batch, observed through its completion handle.
///
/// Cloneable so every waiter on a shared handle sees the same error.
#[derive(Debug, Clone, Error)]
pub enum BatchError {
    /// The injected executor returned an error (or panicked) for this batch.
    #[error("[E001] batch executor failed: {error:#}")]
    Executor { error: Arc<anyhow::Error> },

    /// The producer was shut down before this batch could be delivered.
    #[error("[E002] producer shut down before the batch completed")]
    Shutdown,

    /// A core invariant was broken, e.g. a handle resolved twice.
    #[error("[E003] contract violation: {message}")]
    ContractViolation { message: String },
}

impl BatchError {
    pub fn executor(error: anyhow::Error) -> Self {
        Self::Executor {
            error: Arc::new(error),
        }
    }

    pub fn contract_violation(message: impl Into<String>) -> Self {
        Self::ContractViolation {
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Executor { .. } => ErrorCode::E001ExecutorFailure,
            Self::Shutdown => ErrorCode::E002Shutdown,
            Self::ContractViolation { .. } => ErrorCode::E003ContractViolation,
        }
    }
}

/// Errors returned by producer operations themselves.
///
/// Executor failures never surface here; they only reach the batch's handle.
#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("[E005] backpressure: {outstanding} outstanding records reached limit {limit}")]
    Backpressure { outstanding: usize, limit: usize },

    #[error("[E002] producer is shut down")]
    ShutDown,

    #[error("[E004] invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("[E004] no tokio runtime available to host the dispatcher: {message}")]
    Runtime { message: String },

    #[error("dispatcher worker {worker} stopped: {source}")]
    Worker {
        worker: usize,
        #[source]
        source: BatchError,
    },

    /// An undelivered batch could not be failed during shutdown.
    #[error("aborting batch {batch_id} on shutdown failed: {source}")]
    Abort {
        batch_id: u64,
        #[source]
        source: BatchError,
    },
}

impl ProducerError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Backpressure { .. } => ErrorCode::E005Backpressure,
            Self::ShutDown => ErrorCode::E002Shutdown,
            Self::InvalidConfig { .. } | Self::Runtime { .. } => ErrorCode::E004InvalidConfig,
            Self::Worker { source, .. } | Self::Abort { source, .. } => source.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_error_keeps_context_chain() {
        let err = anyhow::anyhow!("throttled").context("batch write to orders");
        let batch_err = BatchError::executor(err);

        let rendered = batch_err.to_string();
        assert!(rendered.starts_with("[E001]"));
        assert!(rendered.contains("batch write to orders"));
        assert!(rendered.contains("throttled"));
        assert_eq!(batch_err.code(), ErrorCode::E001ExecutorFailure);
    }

    #[test]
    fn test_worker_error_reports_source_code() {
        let err = ProducerError::Worker {
            worker: 2,
            source: BatchError::contract_violation("resolved twice"),
        };
        assert_eq!(err.code().as_str(), "E003");
        assert!(err.to_string().contains("worker 2"));
    }
}
