//! Cohort background execution core.
//!
//! This crate lets an agent dispatch long-running work — shell commands,
//! subordinate agent sessions — without blocking its own reasoning loop:
//!
//! - **[`ident`]** -- Short prefixed task IDs (`b` = shell, `a` = sub-agent,
//!   `t` = teammate) from a process-wide atomic counter.
//! - **[`task`]** -- Per-task record: status machine, output buffer,
//!   cooperative cancellation, and a [`tokio::sync::watch`]-based completion
//!   signal that blocking retrievals wait on.
//! - **[`manager`]** -- [`BackgroundManager`]: launches work on detached
//!   workers, tracks records by ID, routes terminal outcomes to the bus.
//! - **[`notify`]** -- Drain-once FIFO [`NotificationBus`] built on
//!   [`crossbeam::queue::SegQueue`]; the owning agent drains it before every
//!   model call.
//! - **[`error`]** -- Kernel error types via [`thiserror`].
//!
//! All public types are `Send + Sync` and designed for use within a
//! multi-threaded tokio runtime.

pub mod error;
pub mod ident;
pub mod manager;
pub mod notify;
pub mod task;

// Re-export the most commonly used types at the crate root for convenience.
pub use error::{KernelError, Result};
pub use ident::{IdAllocator, TaskKind};
pub use manager::BackgroundManager;
pub use notify::{NotificationBus, SUMMARY_MAX_CHARS, TaskNotification};
pub use task::{CancelToken, TaskId, TaskSnapshot, TaskStatus, WorkFn, WorkFuture};
