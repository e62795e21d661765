//! Cohort shared task board.
//!
//! A durable, directory-backed registry of work items shared by every agent
//! and teammate pointing at the same directory:
//!
//! - **[`db`]** -- SQLite handle with WAL mode and a busy timeout, driven
//!   through `tokio::task::spawn_blocking`.
//! - **[`board`]** -- [`TaskBoard`]: create/get/list/update with ownership
//!   rules, blocker tracking, and cascading unblock on completion.
//! - **[`error`]** -- Board error types via [`thiserror`].
//!
//! Two boards opened on the same directory (even from different processes)
//! observe each other's writes on the next read; every query goes back to
//! the database, so no in-memory state can go stale.

pub mod board;
pub mod db;
pub mod error;

pub use board::{BoardItem, ItemStatus, ItemUpdate, TaskBoard};
pub use db::Database;
pub use error::{BoardError, BoardResult};
