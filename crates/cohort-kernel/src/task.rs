//! Background task records.
//!
//! A [`TaskRecord`] holds the mutable state of one background work unit:
//! its status, accumulated output, cooperative cancel flag, and the
//! completion signal that blocking retrievals wait on.
//!
//! # Status machine
//!
//! ```text
//! running --success--> completed --+
//!         --failure--> error     --+--> (done signaled)
//!         --cancel --> stopped   --+
//! ```
//!
//! Progress is monotone: the only transitions are out of `Running`, and a
//! terminal status is never overwritten. A worker racing a `stop_task`
//! therefore cannot resurrect a stopped record; whichever transition wins
//! the test-and-set owns the terminal state.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::ident::TaskKind;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Short prefixed task identifier (see [`crate::ident`]).
pub type TaskId = String;

/// Lifecycle state of a background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// The worker has the task; output is still accumulating.
    Running,
    /// Finished successfully.
    Completed,
    /// The work faulted; output carries the `Error:`-prefixed message.
    Error,
    /// Cancelled via `stop_task`.
    Stopped,
}

impl TaskStatus {
    /// Whether this status is terminal (no further transitions).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// Cooperative cancellation flag handed to every work unit.
///
/// `stop_task` raises the flag; long-running work is expected to poll
/// [`CancelToken::is_cancelled`] and bail out. Work that never checks simply
/// runs to completion — its result is discarded because the record is
/// already terminal.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create an unraised token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// The boxed future a work unit resolves to: the task's output on success,
/// or a fault message (captured, never propagated) on failure.
pub type WorkFuture = Pin<Box<dyn Future<Output = std::result::Result<String, String>> + Send>>;

/// An opaque unit of background work.
///
/// The closure receives the task's [`CancelToken`] so long-running work can
/// observe `stop_task`. Tool-specific state (working directory, environment)
/// belongs in the closure's captures.
pub type WorkFn = Box<dyn FnOnce(CancelToken) -> WorkFuture + Send>;

/// Point-in-time view of a task, returned by `get_output` and `stop_task`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    /// The task's ID.
    pub task_id: TaskId,
    /// Status at snapshot time; `running` means output may still grow.
    pub status: TaskStatus,
    /// Output accumulated so far (complete once status is terminal).
    pub output: String,
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

struct TaskState {
    status: TaskStatus,
    output: String,
}

/// Per-task state shared between the manager, its worker, and any waiters.
pub(crate) struct TaskRecord {
    id: TaskId,
    kind: TaskKind,
    state: Mutex<TaskState>,
    /// One-shot completion signal. `watch` rather than `Notify` so a waiter
    /// subscribing after the terminal transition still observes it.
    done: watch::Sender<bool>,
    cancel: CancelToken,
}

impl TaskRecord {
    pub(crate) fn new(id: TaskId, kind: TaskKind) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            id,
            kind,
            state: Mutex::new(TaskState {
                status: TaskStatus::Running,
                output: String::new(),
            }),
            done,
            cancel: CancelToken::new(),
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn kind(&self) -> TaskKind {
        self.kind
    }

    pub(crate) fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Current snapshot of status and output.
    pub(crate) fn snapshot(&self) -> TaskSnapshot {
        let state = self.state.lock().expect("task state poisoned");
        TaskSnapshot {
            task_id: self.id.clone(),
            status: state.status,
            output: state.output.clone(),
        }
    }

    /// `running -> completed`, storing the work's output.
    /// Returns `false` if the record was already terminal.
    pub(crate) fn try_complete(&self, output: String) -> bool {
        self.try_transition(TaskStatus::Completed, Some(output))
    }

    /// `running -> error`, storing the `Error:`-prefixed fault message.
    /// Returns `false` if the record was already terminal.
    pub(crate) fn try_fail(&self, message: &str) -> bool {
        self.try_transition(TaskStatus::Error, Some(format!("Error: {message}")))
    }

    /// `running -> stopped`, leaving partial output in place.
    /// Returns `false` if the record was already terminal.
    pub(crate) fn try_stop(&self) -> bool {
        self.try_transition(TaskStatus::Stopped, None)
    }

    fn try_transition(&self, status: TaskStatus, output: Option<String>) -> bool {
        let mut state = self.state.lock().expect("task state poisoned");
        if state.status.is_terminal() {
            return false;
        }
        state.status = status;
        if let Some(output) = output {
            state.output = output;
        }
        true
    }

    /// Release every current and future waiter. Invariant: called exactly
    /// once, after the terminal transition (and, for notifying statuses,
    /// after the notification is enqueued).
    pub(crate) fn signal_done(&self) {
        let _ = self.done.send(true);
    }

    /// A receiver for the completion signal. Checking the current value
    /// first means subscribing after completion does not miss the signal.
    pub(crate) fn subscribe_done(&self) -> watch::Receiver<bool> {
        self.done.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
