//! Context compaction -- bound the conversation history of long-running
//! teammates.
//!
//! When the history exceeds [`CompactionConfig::max_messages`], the loop
//! asks its [`ContextCompactor`] to shrink it:
//!
//! 1. The leading system prompt (if any) is preserved.
//! 2. The most recent `keep_recent` messages are preserved.
//! 3. Everything in between is replaced by a single marker message.
//!
//! The bundled [`TruncatingCompactor`] elides without summarizing; a
//! model-backed summarizer belongs with the model transport and plugs in
//! through the same trait. Either way the teammate loop re-injects the
//! teammate's identity immediately after compaction, so "who am I" survives
//! history truncation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::types::{Message, Role};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for context compaction behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    /// Maximum number of messages before triggering compaction.
    pub max_messages: usize,
    /// Number of recent messages to preserve after compaction.
    pub keep_recent: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            max_messages: 50,
            keep_recent: 10,
        }
    }
}

/// Check whether compaction is needed based on the current message count.
pub fn needs_compaction(messages: &[Message], config: &CompactionConfig) -> bool {
    messages.len() > config.max_messages
}

// ---------------------------------------------------------------------------
// Compactor seam
// ---------------------------------------------------------------------------

/// Shrinks a conversation history that has outgrown its budget.
#[async_trait]
pub trait ContextCompactor: Send + Sync {
    /// Return a reduced history. Implementations must preserve the leading
    /// system prompt and the most recent `config.keep_recent` messages.
    async fn compact(
        &self,
        messages: &[Message],
        config: &CompactionConfig,
    ) -> Result<Vec<Message>>;
}

/// Compactor that elides older messages behind a single marker instead of
/// summarizing them.
#[derive(Debug, Clone, Copy, Default)]
pub struct TruncatingCompactor;

#[async_trait]
impl ContextCompactor for TruncatingCompactor {
    async fn compact(
        &self,
        messages: &[Message],
        config: &CompactionConfig,
    ) -> Result<Vec<Message>> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        // Separate the system prompt from conversation messages.
        let (system_prompt, conversation) = if messages[0].role == Role::System {
            (Some(&messages[0]), &messages[1..])
        } else {
            (None, messages)
        };

        // Not enough to justify compaction: return as-is.
        if conversation.len() <= config.keep_recent {
            debug!(
                total = messages.len(),
                keep_recent = config.keep_recent,
                "not enough messages to compact, returning as-is"
            );
            return Ok(messages.to_vec());
        }

        let split_point = conversation.len() - config.keep_recent;
        let (elided, recent) = conversation.split_at(split_point);

        let mut compacted = Vec::with_capacity(2 + recent.len());
        if let Some(sys) = system_prompt {
            compacted.push(sys.clone());
        }
        compacted.push(Message::system(format!(
            "[Earlier conversation elided: {} messages]",
            elided.len()
        )));
        compacted.extend_from_slice(recent);

        info!(
            original = messages.len(),
            compacted = compacted.len(),
            "conversation history compacted"
        );
        Ok(compacted)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_messages(count: usize) -> Vec<Message> {
        let mut msgs = vec![Message::system("You are a helpful teammate.")];
        for i in 0..count {
            if i % 2 == 0 {
                msgs.push(Message::user(format!("User message {i}")));
            } else {
                msgs.push(Message::assistant(format!("Assistant response {i}")));
            }
        }
        msgs
    }

    #[test]
    fn needs_compaction_below_threshold() {
        let config = CompactionConfig {
            max_messages: 50,
            keep_recent: 10,
        };
        assert!(!needs_compaction(&make_messages(10), &config));
    }

    #[test]
    fn needs_compaction_above_threshold() {
        let config = CompactionConfig {
            max_messages: 5,
            keep_recent: 3,
        };
        assert!(needs_compaction(&make_messages(20), &config));
    }

    #[tokio::test]
    async fn compact_empty_returns_empty() {
        let result = TruncatingCompactor
            .compact(&[], &CompactionConfig::default())
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn compact_below_keep_recent_returns_as_is() {
        let config = CompactionConfig {
            max_messages: 50,
            keep_recent: 20,
        };
        let messages = make_messages(5);
        let result = TruncatingCompactor.compact(&messages, &config).await.unwrap();
        assert_eq!(result.len(), messages.len());
    }

    #[tokio::test]
    async fn compact_preserves_system_prompt_and_tail() {
        let config = CompactionConfig {
            max_messages: 10,
            keep_recent: 4,
        };
        let messages = make_messages(20);
        let result = TruncatingCompactor.compact(&messages, &config).await.unwrap();

        // system prompt + marker + keep_recent tail
        assert_eq!(result.len(), 2 + config.keep_recent);
        assert_eq!(result[0].content, "You are a helpful teammate.");
        assert!(result[1].content.contains("elided"));
        assert_eq!(result.last().unwrap().content, messages.last().unwrap().content);
    }

    #[tokio::test]
    async fn compact_without_system_prompt() {
        let config = CompactionConfig {
            max_messages: 5,
            keep_recent: 2,
        };
        let messages: Vec<Message> = (0..8).map(|i| Message::user(format!("m{i}"))).collect();
        let result = TruncatingCompactor.compact(&messages, &config).await.unwrap();

        assert_eq!(result.len(), 3);
        assert!(result[0].content.contains("elided: 6 messages"));
        assert_eq!(result[1].content, "m6");
        assert_eq!(result[2].content, "m7");
    }

    #[test]
    fn default_config_values() {
        let config = CompactionConfig::default();
        assert_eq!(config.max_messages, 50);
        assert_eq!(config.keep_recent, 10);
    }
}
