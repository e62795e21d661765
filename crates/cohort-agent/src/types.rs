//! Core types for model interaction.
//!
//! These types model the data flowing between the teammate runtime and the
//! model transport. The transport itself — prompt construction, streaming,
//! provider wire formats — lives behind [`ModelDriver`], outside this
//! repository; tests drive the loop with scripted implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// The role of a participant in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions that shape model behavior.
    System,
    /// Input from the environment: prompts, inbox messages, notifications.
    User,
    /// Output from the model.
    Assistant,
    /// Result of a tool invocation, fed back to the model.
    Tool,
}

/// A single message in a conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Who produced this message.
    pub role: Role,

    /// The textual content of the message.
    #[serde(default)]
    pub content: String,

    /// Tool calls requested by the assistant (only present when
    /// `role == Role::Assistant`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Identifies which tool call this message is a response to
    /// (only present when `role == Role::Tool`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create an assistant text message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create an assistant message that contains tool calls.
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            tool_calls,
            tool_call_id: None,
        }
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tool calls
// ---------------------------------------------------------------------------

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier assigned by the model for correlating results.
    pub id: String,

    /// The name of the tool to invoke (must match a registered tool).
    pub name: String,

    /// Arguments as a JSON value. The structure depends on the tool's schema.
    pub arguments: Value,
}

/// The result of executing a tool, ready to feed back to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The [`ToolCall::id`] this result corresponds to.
    pub tool_call_id: String,

    /// Serialized result content.
    pub content: String,

    /// Whether the tool invocation failed.
    #[serde(default)]
    pub is_error: bool,
}

/// A tool definition exposed to the model so it knows what is available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,

    /// Human-readable description of what the tool does.
    pub description: String,

    /// JSON Schema describing the tool's input parameters.
    pub input_schema: Value,
}

// ---------------------------------------------------------------------------
// Model seam
// ---------------------------------------------------------------------------

/// The high-level outcome of one model turn.
#[derive(Debug, Clone)]
pub enum ModelTurn {
    /// The model produced a final text answer (quiescent — no tool calls).
    Text(String),

    /// The model wants to invoke one or more tools before continuing.
    ToolCalls(Vec<ToolCall>),
}

/// The model transport boundary.
///
/// Implementations take the current conversation plus the available tool
/// definitions and produce the model's next turn. Everything provider- or
/// wire-specific stays behind this trait.
#[async_trait]
pub trait ModelDriver: Send + Sync {
    /// Produce the model's next turn for this conversation.
    async fn complete(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<ModelTurn>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
