//! Background task manager.
//!
//! The [`BackgroundManager`] accepts opaque work units, runs each on a
//! detached tokio worker, and tracks the per-task records. Completion flows
//! in a fixed order — terminal state flip, notification enqueue, done
//! signal — so any caller that observes a terminal snapshot is guaranteed
//! the matching notification is already queued for the next drain.
//!
//! Workers are fully detached: the manager never joins them and outstanding
//! tasks do not keep the process alive. On process exit, in-flight work is
//! abandoned and its notification is lost.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::error::{KernelError, Result};
use crate::ident::{IdAllocator, TaskKind};
use crate::notify::{NotificationBus, TaskNotification};
use crate::task::{TaskId, TaskRecord, TaskSnapshot, WorkFn};

/// Launches and tracks background work units.
///
/// Cheaply cloneable (`Arc`-backed) and safe to share across threads and
/// async tasks. Worker faults never propagate to callers; they are captured
/// into the record's output with an `Error:` prefix.
#[derive(Clone, Default)]
pub struct BackgroundManager {
    inner: Arc<ManagerInner>,
}

#[derive(Default)]
struct ManagerInner {
    ids: IdAllocator,
    tasks: DashMap<TaskId, Arc<TaskRecord>>,
    bus: NotificationBus,
}

impl BackgroundManager {
    /// Create a manager with no tasks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch `work` on a fresh detached worker and return its task ID.
    ///
    /// Returns immediately; the ID is valid for `get_output` and
    /// `stop_task` from the moment this returns. The worker captures the
    /// work's outcome into the record: `Ok(out)` completes the task with
    /// `out` as output, `Err(msg)` marks it errored with `Error: <msg>`.
    /// `completed` and `error` outcomes enqueue exactly one notification;
    /// a task stopped first enqueues none.
    pub fn run_in_background(&self, kind: TaskKind, work: WorkFn) -> TaskId {
        let id = self.inner.ids.next(kind);
        let record = Arc::new(TaskRecord::new(id.clone(), kind));
        self.inner.tasks.insert(id.clone(), Arc::clone(&record));

        tracing::debug!(task_id = %id, kind = %kind, "background task submitted");

        let bus = self.inner.bus.clone();
        let token = record.cancel_token();
        tokio::spawn(async move {
            let outcome = work(token).await;

            // The transition is a test-and-set: if stop_task already made
            // the record terminal, the work's outcome is discarded and no
            // notification is emitted.
            let finished = match outcome {
                Ok(output) => record.try_complete(output),
                Err(message) => {
                    tracing::warn!(task_id = %record.id(), error = %message, "background work faulted");
                    record.try_fail(&message)
                }
            };

            if finished {
                let snapshot = record.snapshot();
                tracing::info!(
                    task_id = %record.id(),
                    kind = %record.kind(),
                    status = %snapshot.status,
                    "background task finished"
                );
                // Enqueue before signaling done: a blocking caller released
                // by the signal must find the notification already queued.
                bus.publish(TaskNotification::new(
                    snapshot.task_id,
                    snapshot.status,
                    &snapshot.output,
                ));
                record.signal_done();
            }
        });

        id
    }

    /// Snapshot a task's status and output.
    ///
    /// With `block = false` the current snapshot is returned immediately
    /// (status may be `running`). With `block = true` the call waits on the
    /// record's completion signal for up to `timeout`; on expiry it returns
    /// the live snapshot, which is a normal result, not an error. Multiple
    /// concurrent blocking callers are all released by the single signal.
    pub async fn get_output(
        &self,
        task_id: &str,
        block: bool,
        timeout: Duration,
    ) -> Result<TaskSnapshot> {
        let record = self.lookup(task_id)?;

        if block {
            let mut rx = record.subscribe_done();
            // Signal-driven wait: no polling. `wait_for` checks the current
            // value first, so a task already terminal returns at once.
            let _ = tokio::time::timeout(timeout, rx.wait_for(|done| *done)).await;
        }

        Ok(record.snapshot())
    }

    /// Request cancellation of a task.
    ///
    /// Raises the cooperative cancel flag and transitions `running ->
    /// stopped`; the worker is not forcibly interrupted. Idempotent:
    /// stopping an already-terminal task changes nothing and returns the
    /// existing terminal snapshot. Stopped tasks emit no notification.
    pub fn stop_task(&self, task_id: &str) -> Result<TaskSnapshot> {
        let record = self.lookup(task_id)?;

        record.cancel_token().cancel();
        if record.try_stop() {
            tracing::info!(task_id = %task_id, "background task stopped");
            record.signal_done();
        }

        Ok(record.snapshot())
    }

    /// Atomically remove and return every queued completion event in
    /// arrival order. Each event is returned by exactly one drain.
    pub fn drain_notifications(&self) -> Vec<TaskNotification> {
        self.inner.bus.drain()
    }

    /// Number of tasks the manager currently tracks (any status).
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.inner.tasks.len()
    }

    fn lookup(&self, task_id: &str) -> Result<Arc<TaskRecord>> {
        self.inner
            .tasks
            .get(task_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| KernelError::TaskNotFound {
                task_id: task_id.to_owned(),
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;

    fn immediate(result: std::result::Result<String, String>) -> WorkFn {
        Box::new(move |_token| Box::pin(async move { result }))
    }

    #[tokio::test]
    async fn id_prefix_follows_kind() {
        let manager = BackgroundManager::new();
        let b = manager.run_in_background(TaskKind::Shell, immediate(Ok(String::new())));
        let a = manager.run_in_background(TaskKind::SubAgent, immediate(Ok(String::new())));
        let t = manager.run_in_background(TaskKind::Teammate, immediate(Ok(String::new())));
        assert!(b.starts_with('b'));
        assert!(a.starts_with('a'));
        assert!(t.starts_with('t'));
        assert_eq!(manager.task_count(), 3);
    }

    #[tokio::test]
    async fn blocking_get_returns_completed_output() {
        let manager = BackgroundManager::new();
        let id = manager.run_in_background(TaskKind::Shell, immediate(Ok("done".into())));

        let snap = manager
            .get_output(&id, true, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(snap.status, TaskStatus::Completed);
        assert_eq!(snap.output, "done");
    }

    #[tokio::test]
    async fn failure_is_captured_with_error_prefix() {
        let manager = BackgroundManager::new();
        let id = manager.run_in_background(TaskKind::Shell, immediate(Err("boom".into())));

        let snap = manager
            .get_output(&id, true, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(snap.status, TaskStatus::Error);
        assert!(snap.output.starts_with("Error:"));
        assert_eq!(snap.output, "Error: boom");
    }

    #[tokio::test]
    async fn nonblocking_get_may_observe_running() {
        let manager = BackgroundManager::new();
        let id = manager.run_in_background(
            TaskKind::Shell,
            Box::new(|_token| {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok("never".into())
                })
            }),
        );

        let snap = manager.get_output(&id, false, Duration::ZERO).await.unwrap();
        assert_eq!(snap.status, TaskStatus::Running);
        assert!(snap.output.is_empty());
    }

    #[tokio::test]
    async fn blocking_get_times_out_with_running_snapshot() {
        let manager = BackgroundManager::new();
        let id = manager.run_in_background(
            TaskKind::Shell,
            Box::new(|_token| {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok("never".into())
                })
            }),
        );

        let started = std::time::Instant::now();
        let snap = manager
            .get_output(&id, true, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(snap.status, TaskStatus::Running);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn unknown_task_is_an_error() {
        let manager = BackgroundManager::new();
        let err = manager
            .get_output("b999", false, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, KernelError::TaskNotFound { .. }));
        assert!(manager.stop_task("b999").is_err());
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_silent() {
        let manager = BackgroundManager::new();
        let id = manager.run_in_background(
            TaskKind::Shell,
            Box::new(|token| {
                Box::pin(async move {
                    while !token.is_cancelled() {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                    }
                    Err("cancelled".into())
                })
            }),
        );

        let snap = manager.stop_task(&id).unwrap();
        assert_eq!(snap.status, TaskStatus::Stopped);

        // Stopping again is a no-op that still reports `stopped`.
        let again = manager.stop_task(&id).unwrap();
        assert_eq!(again.status, TaskStatus::Stopped);

        // Give the worker time to observe the flag and bail; its outcome
        // must neither overwrite the record nor enqueue a notification.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.get_output(&id, false, Duration::ZERO).await.unwrap().status, TaskStatus::Stopped);
        assert!(manager.drain_notifications().is_empty());
    }

    #[tokio::test]
    async fn stopping_a_completed_task_keeps_completed() {
        let manager = BackgroundManager::new();
        let id = manager.run_in_background(TaskKind::Shell, immediate(Ok("done".into())));
        manager
            .get_output(&id, true, Duration::from_secs(5))
            .await
            .unwrap();

        let snap = manager.stop_task(&id).unwrap();
        assert_eq!(snap.status, TaskStatus::Completed);
        assert_eq!(snap.output, "done");
    }

    #[tokio::test]
    async fn each_terminal_task_notifies_exactly_once() {
        let manager = BackgroundManager::new();
        let ok = manager.run_in_background(TaskKind::Shell, immediate(Ok("fine".into())));
        let bad = manager.run_in_background(TaskKind::SubAgent, immediate(Err("broke".into())));

        manager.get_output(&ok, true, Duration::from_secs(5)).await.unwrap();
        manager.get_output(&bad, true, Duration::from_secs(5)).await.unwrap();

        let events = manager.drain_notifications();
        assert_eq!(events.len(), 2);
        assert!(events.iter().any(|e| e.task_id == ok && e.status == TaskStatus::Completed));
        assert!(events.iter().any(|e| e.task_id == bad && e.status == TaskStatus::Error));

        // Drain-once across the process.
        assert!(manager.drain_notifications().is_empty());
    }

    #[tokio::test]
    async fn concurrent_blocking_waiters_all_release() {
        let manager = BackgroundManager::new();
        let id = manager.run_in_background(
            TaskKind::Shell,
            Box::new(|_token| {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok("shared".into())
                })
            }),
        );

        let mut handles = Vec::new();
        for _ in 0..4 {
            let manager = manager.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                manager.get_output(&id, true, Duration::from_secs(5)).await
            }));
        }

        for handle in handles {
            let snap = handle.await.unwrap().unwrap();
            assert_eq!(snap.status, TaskStatus::Completed);
            assert_eq!(snap.output, "shared");
        }
    }
}
