//! Cohort teammate runtime.
//!
//! The model-driven worker that animates a spawned teammate, plus the tool
//! surface the model coordinates through:
//!
//! - **[`types`]** -- Conversation types ([`Message`], [`ToolCall`], ...)
//!   and the [`ModelDriver`] seam the model transport plugs into.
//! - **[`compaction`]** -- Context compaction so long-running teammates
//!   keep their history bounded; the summarizer is a trait.
//! - **[`teammate_loop`]** -- [`TeammateLoop`]: drains background
//!   notifications into the prompt, compacts (re-injecting identity),
//!   invokes the model, applies tool calls, and polls inbox + task board
//!   during idle phases.
//! - **[`tools`]** -- [`CoordinationTools`]: the board/messaging tool set
//!   for teammates, with lead-only extensions for team administration and
//!   background task control.
//! - **[`config`]** -- [`RuntimeConfig`]: TOML-backed directories and loop
//!   tuning, fully defaulted.
//! - **[`error`]** -- Agent error types via [`thiserror`].

pub mod compaction;
pub mod config;
pub mod error;
pub mod teammate_loop;
pub mod tools;
pub mod types;

pub use compaction::{CompactionConfig, ContextCompactor, TruncatingCompactor, needs_compaction};
pub use config::{IdleConfig, RuntimeConfig};
pub use error::{AgentError, Result};
pub use teammate_loop::{LoopConfig, TeammateLoop, TeammateLoopRunner, ToolAdapter};
pub use tools::CoordinationTools;
pub use types::{Message, ModelDriver, ModelTurn, Role, ToolCall, ToolDefinition, ToolResult};
