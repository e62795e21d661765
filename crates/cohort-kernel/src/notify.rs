//! Drain-once notification bus.
//!
//! Workers publish one [`TaskNotification`] per `completed` or `error`
//! outcome (`stopped` tasks publish nothing — the canceller already holds
//! the terminal snapshot). The owning agent calls
//! [`NotificationBus::drain`] between model calls and folds the returned
//! events into its prompt.
//!
//! The bus is FIFO by publish time and unbounded; it is drained at model
//! timescales, so back-pressure is not a concern. Each event is returned by
//! exactly one drain.

use std::sync::Arc;

use crossbeam::queue::SegQueue;
use serde::{Deserialize, Serialize};

use crate::task::{TaskId, TaskStatus};

/// Maximum length, in characters, of a notification summary.
pub const SUMMARY_MAX_CHARS: usize = 500;

// ---------------------------------------------------------------------------
// Notification event
// ---------------------------------------------------------------------------

/// A small event summarizing a background task's terminal outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskNotification {
    /// The task that finished.
    pub task_id: TaskId,
    /// Terminal status (`completed` or `error`).
    pub status: TaskStatus,
    /// First [`SUMMARY_MAX_CHARS`] characters of the task's output.
    pub summary: String,
}

impl TaskNotification {
    /// Build a notification for `task_id`, truncating `output` to the
    /// summary limit.
    #[must_use]
    pub fn new(task_id: impl Into<TaskId>, status: TaskStatus, output: &str) -> Self {
        Self {
            task_id: task_id.into(),
            status,
            summary: output.chars().take(SUMMARY_MAX_CHARS).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

/// Thread-safe drain-once queue of completion events.
///
/// Cheaply cloneable (`Arc`-backed); clones share the same queue.
#[derive(Clone, Default)]
pub struct NotificationBus {
    queue: Arc<SegQueue<TaskNotification>>,
}

impl NotificationBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue one event. Lock-free; safe from any worker.
    pub fn publish(&self, event: TaskNotification) {
        tracing::debug!(task_id = %event.task_id, status = %event.status, "notification published");
        self.queue.push(event);
    }

    /// Remove and return every queued event in publish order.
    ///
    /// Events arriving concurrently with the drain land in either this
    /// call's result or the next; none is returned twice.
    pub fn drain(&self) -> Vec<TaskNotification> {
        let mut events = Vec::new();
        while let Some(event) = self.queue.pop() {
            events.push(event);
        }
        if !events.is_empty() {
            tracing::debug!(count = events.len(), "notifications drained");
        }
        events
    }

    /// Number of events currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether the queue is currently empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
