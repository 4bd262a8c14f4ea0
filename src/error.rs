//! Process-level error taxonomy.
//!
//! ```text
//! ConfigError          → fatal, before any task starts (exit 1)
//! TaskError::Cancelled → expected shutdown, swallowed by the supervisor
//! MaintenanceError     → logged per loop, never escalated
//! TaskError::Failed    → a top-level task died, surfaces as SeedError::TaskFailure
//! ```

use thiserror::Error;

use crate::config::ConfigError;

/// Outcome of a top-level supervised task that did not finish cleanly.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The shared cancellation signal fired. Not an error condition.
    #[error("cancelled")]
    Cancelled,

    /// The task stopped for any other reason.
    #[error("task '{task}' failed: {reason}")]
    Failed { task: String, reason: String },
}

impl TaskError {
    pub fn failed(task: impl Into<String>, reason: impl ToString) -> Self {
        TaskError::Failed {
            task: task.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled)
    }
}

/// Errors that end the `seed-node` process.
#[derive(Debug, Error)]
pub enum SeedError {
    /// Bad configuration, detected before anything started.
    #[error("{0}")]
    Configuration(#[from] ConfigError),

    /// A top-level task failed with a non-cancellation error.
    #[error("unexpected failure: {0}")]
    TaskFailure(TaskError),
}

impl SeedError {
    /// Exit code the binary reports for this error.
    pub fn exit_code(&self) -> i32 {
        1
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, SeedError::Configuration(_))
    }
}

pub type SeedResult<T> = Result<T, SeedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_display_names_task() {
        let err = TaskError::failed("query-api", "address in use");
        assert_eq!(err.to_string(), "task 'query-api' failed: address in use");
        assert!(!err.is_cancelled());
        assert!(TaskError::Cancelled.is_cancelled());
    }

    #[test]
    fn test_task_failure_is_not_configuration() {
        let err = SeedError::TaskFailure(TaskError::failed("transport", "boom"));
        assert!(!err.is_configuration());
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().starts_with("unexpected failure"));
    }
}
