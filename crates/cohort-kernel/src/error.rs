//! Kernel error types.
//!
//! All background-execution subsystems surface errors through
//! [`KernelError`], the single error type returned by every public API in
//! this crate. Worker faults are never errors to the caller: they are
//! captured into the task record's output (see [`crate::manager`]).

/// Unified error type for the Cohort background execution core.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// The referenced task does not exist in the manager.
    #[error("task not found: {task_id}")]
    TaskNotFound {
        /// The ID that was looked up.
        task_id: String,
    },

    /// Catch-all for unexpected internal errors that don't fit a specific
    /// variant. Prefer a typed variant whenever possible.
    #[error("internal kernel error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the kernel crate.
pub type Result<T> = std::result::Result<T, KernelError>;
