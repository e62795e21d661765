//! Task ID allocation.
//!
//! Every background work unit gets a short, prefixed, process-unique ID.
//! The first character encodes the kind of work (`b` = shell, `a` =
//! sub-agent, `t` = teammate); the remainder is a monotonically increasing
//! counter shared across all kinds, so an ID is unique for the lifetime of
//! the process regardless of its prefix.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// The kind of work a background task performs, keyed to its ID prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// A shell command running in the background.
    Shell,
    /// A subordinate agent session.
    SubAgent,
    /// A spawned teammate worker.
    Teammate,
}

impl TaskKind {
    /// The single-character ID prefix for this kind.
    #[must_use]
    pub fn prefix(self) -> char {
        match self {
            Self::Shell => 'b',
            Self::SubAgent => 'a',
            Self::Teammate => 't',
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Shell => "shell",
            Self::SubAgent => "sub-agent",
            Self::Teammate => "teammate",
        };
        write!(f, "{s}")
    }
}

/// Allocates `<prefix><counter>` task IDs.
///
/// The counter starts at 1 and is shared by all kinds. Allocation is a
/// single atomic fetch-add, safe to call from any thread.
#[derive(Debug, Default)]
pub struct IdAllocator {
    counter: AtomicU64,
}

impl IdAllocator {
    /// Create a fresh allocator with the counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// Allocate the next ID for `kind`.
    pub fn next(&self, kind: TaskKind) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}{n}", kind.prefix())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn prefix_matches_kind() {
        let ids = IdAllocator::new();
        assert!(ids.next(TaskKind::Shell).starts_with('b'));
        assert!(ids.next(TaskKind::SubAgent).starts_with('a'));
        assert!(ids.next(TaskKind::Teammate).starts_with('t'));
    }

    #[test]
    fn ids_are_unique_across_kinds() {
        let ids = IdAllocator::new();
        let mut seen = HashSet::new();
        for _ in 0..100 {
            assert!(seen.insert(ids.next(TaskKind::Shell)));
            assert!(seen.insert(ids.next(TaskKind::SubAgent)));
            assert!(seen.insert(ids.next(TaskKind::Teammate)));
        }
        assert_eq!(seen.len(), 300);
    }

    #[test]
    fn ids_are_unique_under_concurrency() {
        let ids = Arc::new(IdAllocator::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let ids = Arc::clone(&ids);
            handles.push(std::thread::spawn(move || {
                (0..250).map(|_| ids.next(TaskKind::Shell)).collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().expect("allocator thread") {
                assert!(seen.insert(id), "duplicate id allocated");
            }
        }
        assert_eq!(seen.len(), 2000);
    }
}
