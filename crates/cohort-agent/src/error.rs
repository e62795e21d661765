//! Agent error types.

use thiserror::Error;

/// Unified error type for the teammate runtime.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The model driver failed to produce a turn.
    #[error("model driver error: {reason}")]
    Driver { reason: String },

    /// The model asked for a tool no adapter exposes.
    #[error("unknown tool: {tool_name}")]
    UnknownTool { tool_name: String },

    /// A tool call's arguments did not match its schema.
    #[error("invalid tool arguments for {tool_name}: {reason}")]
    InvalidArguments { tool_name: String, reason: String },

    /// Loading or saving the runtime configuration failed.
    #[error("config error: {reason}")]
    Config { reason: String },

    /// Background execution error.
    #[error(transparent)]
    Kernel(#[from] cohort_kernel::KernelError),

    /// Task board error.
    #[error(transparent)]
    Board(#[from] cohort_board::BoardError),

    /// Teammate fabric error.
    #[error(transparent)]
    Team(#[from] cohort_team::TeamError),

    /// JSON encoding/decoding error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for unexpected internal errors.
    #[error("internal agent error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the agent crate.
pub type Result<T> = std::result::Result<T, AgentError>;
