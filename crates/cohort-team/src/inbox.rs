//! Durable per-teammate inbox.
//!
//! An inbox is a JSONL file under `<teams-dir>/<team>/<name>.jsonl`: one
//! self-delimited JSON message per line, appended by senders and consumed
//! by the owning teammate with drain-on-read (read everything in write
//! order, then truncate). The file persists across process restarts.
//!
//! Appends hold a short per-inbox lock and write the complete
//! `line + '\n'` in a single call, so concurrent senders never interleave
//! partial lines. Drains hold the same lock across the read and the
//! truncate; a message arriving during a drain lands in either that drain's
//! result or the next one, never both.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::Result;

// ---------------------------------------------------------------------------
// Message types
// ---------------------------------------------------------------------------

/// The kind of an inbox message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// A direct message from another agent or teammate.
    Message,
    /// A team-wide message fanned out to every member but the sender.
    Broadcast,
    /// The recipient should exit its loop promptly.
    ShutdownRequest,
    /// A teammate's answer to a shutdown request.
    ShutdownResponse,
    /// A lead's verdict on a teammate's proposed plan.
    PlanApprovalResponse,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Message => "message",
            Self::Broadcast => "broadcast",
            Self::ShutdownRequest => "shutdown_request",
            Self::ShutdownResponse => "shutdown_response",
            Self::PlanApprovalResponse => "plan_approval_response",
        };
        write!(f, "{s}")
    }
}

/// One message as stored on an inbox line.
///
/// Wire schema: `{"type", "content", "sender"?, "timestamp"?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxMessage {
    /// Message kind.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Message body.
    pub content: String,
    /// Name of the sending teammate, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    /// When the message was sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl InboxMessage {
    /// Create a message with no sender and no timestamp.
    #[must_use]
    pub fn new(kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            sender: None,
            timestamp: None,
        }
    }

    /// Builder: attach the sending teammate's name.
    #[must_use]
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Builder: stamp the message with the current UTC time.
    #[must_use]
    pub fn stamped(mut self) -> Self {
        self.timestamp = Some(Utc::now());
        self
    }
}

// ---------------------------------------------------------------------------
// Inbox
// ---------------------------------------------------------------------------

/// Handle to one teammate's durable message log.
///
/// Cheaply cloneable (`Arc`-backed); clones share the same lock, so every
/// append and drain on the same inbox serializes through it.
#[derive(Clone)]
pub struct Inbox {
    inner: Arc<InboxInner>,
}

struct InboxInner {
    path: PathBuf,
    lock: Mutex<()>,
}

impl Inbox {
    /// Create a handle for the inbox file at `path`. The file is created
    /// lazily on first append.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(InboxInner {
                path: path.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    /// Path of the backing JSONL file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Append one message as a single JSON line.
    pub async fn append(&self, message: &InboxMessage) -> Result<()> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');

        let _guard = self.inner.lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)
            .await?;
        // One write of the full line: no partial-line interleaving.
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        tracing::trace!(path = %self.inner.path.display(), kind = %message.kind, "inbox append");
        Ok(())
    }

    /// Read every pending message in write order, then truncate the file.
    ///
    /// Malformed lines (e.g. a torn trailing write from a crash) are
    /// skipped with a warning rather than poisoning the inbox.
    pub async fn drain(&self) -> Result<Vec<InboxMessage>> {
        let _guard = self.inner.lock.lock().await;

        let content = match tokio::fs::read_to_string(&self.inner.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if content.is_empty() {
            return Ok(Vec::new());
        }

        tokio::fs::write(&self.inner.path, b"").await?;

        let mut messages = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<InboxMessage>(line) {
                Ok(message) => messages.push(message),
                Err(e) => {
                    warn!(path = %self.inner.path.display(), error = %e, "skipping malformed inbox line");
                }
            }
        }

        tracing::debug!(
            path = %self.inner.path.display(),
            count = messages.len(),
            "inbox drained"
        );
        Ok(messages)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
