//! Coordination tool surface.
//!
//! [`CoordinationTools`] is the [`ToolAdapter`] that maps model tool calls
//! onto the board, the teammate manager, and (for leads) the background
//! manager. Teammates get the participation set — `TaskCreate`,
//! `TaskList`, `TaskUpdate`, `SendMessage` — while leads additionally get
//! `TaskOutput`, `TaskStop`, `TeamCreate`, and `TeamDelete`: teammates
//! participate but do not administer. File and shell tools are registered
//! by the embedding application as separate adapters.
//!
//! Structural failures (unknown task, unknown teammate, duplicate team)
//! surface as `Err` values here and reach the model as `Error: ...` result
//! strings; nothing is raised across the tool boundary.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use cohort_board::{ItemUpdate, TaskBoard};
use cohort_kernel::BackgroundManager;
use cohort_team::{MessageKind, TeammateManager};

use crate::error::{AgentError, Result};
use crate::teammate_loop::ToolAdapter;
use crate::types::ToolDefinition;

/// Default wait for a blocking `TaskOutput` call, in milliseconds.
const DEFAULT_OUTPUT_TIMEOUT_MS: u64 = 10_000;

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Tool adapter over the coordination managers.
pub struct CoordinationTools {
    board: TaskBoard,
    teams: TeammateManager,
    background: Option<BackgroundManager>,
    default_sender: Option<String>,
}

impl CoordinationTools {
    /// The teammate tool set: board participation and messaging only.
    #[must_use]
    pub fn for_teammate(board: TaskBoard, teams: TeammateManager) -> Self {
        Self {
            board,
            teams,
            background: None,
            default_sender: None,
        }
    }

    /// The lead tool set: everything a teammate gets, plus team
    /// administration and background task control.
    #[must_use]
    pub fn for_lead(
        board: TaskBoard,
        teams: TeammateManager,
        background: BackgroundManager,
    ) -> Self {
        Self {
            board,
            teams,
            background: Some(background),
            default_sender: None,
        }
    }

    /// Builder: the sender name stamped on messages that do not name one
    /// (a teammate's own name, typically).
    #[must_use]
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.default_sender = Some(sender.into());
        self
    }

    fn is_lead(&self) -> bool {
        self.background.is_some()
    }

    // -- Tool implementations -----------------------------------------------

    async fn task_create(&self, args: Value) -> Result<String> {
        let args: TaskCreateArgs = parse_args("TaskCreate", args)?;
        let item = self.board.create(&args.subject).await?;
        Ok(serde_json::to_string(&item)?)
    }

    async fn task_list(&self) -> Result<String> {
        let items = self.board.list_all().await?;
        Ok(serde_json::to_string(&items)?)
    }

    async fn task_update(&self, args: Value) -> Result<String> {
        let args: TaskUpdateArgs = parse_args("TaskUpdate", args)?;
        let status = match args.status.as_deref() {
            Some(s) => Some(s.parse()?),
            None => None,
        };
        let changes = ItemUpdate {
            status,
            owner: args.owner,
            add_blocked_by: args.add_blocked_by,
            remove_blocked_by: args.remove_blocked_by,
            add_depends_on: args.add_depends,
            remove_depends_on: args.remove_depends,
        };
        let item = self.board.update(&args.task_id, changes).await?;
        Ok(serde_json::to_string(&item)?)
    }

    async fn send_message(&self, args: Value) -> Result<String> {
        let args: SendMessageArgs = parse_args("SendMessage", args)?;
        let kind = parse_message_kind(args.kind.as_deref().unwrap_or("message"))?;
        let sender = args.sender.or_else(|| self.default_sender.clone());

        let reached = self
            .teams
            .send_message(
                args.recipient.as_deref().unwrap_or(""),
                &args.content,
                kind,
                sender.as_deref(),
                args.team_name.as_deref(),
            )
            .await?;
        Ok(format!("Delivered to {reached} inbox(es)"))
    }

    async fn task_output(&self, args: Value) -> Result<String> {
        let background = self.background_manager()?;
        let args: TaskOutputArgs = parse_args("TaskOutput", args)?;
        let timeout = Duration::from_millis(args.timeout_ms.unwrap_or(DEFAULT_OUTPUT_TIMEOUT_MS));
        let snapshot = background
            .get_output(&args.task_id, args.block.unwrap_or(false), timeout)
            .await?;
        Ok(serde_json::to_string(&snapshot)?)
    }

    async fn task_stop(&self, args: Value) -> Result<String> {
        let background = self.background_manager()?;
        let args: TaskStopArgs = parse_args("TaskStop", args)?;
        let snapshot = background.stop_task(&args.task_id)?;
        Ok(serde_json::to_string(&snapshot)?)
    }

    async fn team_create(&self, args: Value) -> Result<String> {
        let args: TeamNameArgs = parse_args("TeamCreate", args)?;
        let outcome = self.teams.create_team(&args.name).await?;
        Ok(outcome.to_string())
    }

    async fn team_delete(&self, args: Value) -> Result<String> {
        let args: TeamNameArgs = parse_args("TeamDelete", args)?;
        self.teams.delete_team(&args.name).await?;
        Ok("deleted".to_owned())
    }

    fn background_manager(&self) -> Result<&BackgroundManager> {
        self.background
            .as_ref()
            .ok_or_else(|| AgentError::Internal("background manager not wired".to_owned()))
    }
}

#[async_trait]
impl ToolAdapter for CoordinationTools {
    fn adapter_id(&self) -> &str {
        "coordination"
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut tools = vec![
            tool(
                "TaskCreate",
                "Create a task on the shared board.",
                json!({
                    "type": "object",
                    "properties": {
                        "subject": { "type": "string", "description": "What needs doing" }
                    },
                    "required": ["subject"]
                }),
            ),
            tool(
                "TaskList",
                "List every task on the shared board.",
                json!({ "type": "object", "properties": {} }),
            ),
            tool(
                "TaskUpdate",
                "Update a board task: status, owner, blockers, dependencies.",
                json!({
                    "type": "object",
                    "properties": {
                        "taskId": { "type": "string" },
                        "status": {
                            "type": "string",
                            "enum": ["pending", "in_progress", "completed", "cancelled"]
                        },
                        "owner": { "type": "string" },
                        "addBlockedBy": { "type": "array", "items": { "type": "string" } },
                        "removeBlockedBy": { "type": "array", "items": { "type": "string" } },
                        "addDepends": { "type": "array", "items": { "type": "string" } },
                        "removeDepends": { "type": "array", "items": { "type": "string" } }
                    },
                    "required": ["taskId"]
                }),
            ),
            tool(
                "SendMessage",
                "Send a message to a teammate, or broadcast to a team with an empty recipient.",
                json!({
                    "type": "object",
                    "properties": {
                        "recipient": { "type": "string" },
                        "content": { "type": "string" },
                        "type": {
                            "type": "string",
                            "enum": [
                                "message",
                                "broadcast",
                                "shutdown_request",
                                "shutdown_response",
                                "plan_approval_response"
                            ]
                        },
                        "sender": { "type": "string" },
                        "team_name": { "type": "string" }
                    },
                    "required": ["content"]
                }),
            ),
        ];

        if self.is_lead() {
            tools.extend([
                tool(
                    "TaskOutput",
                    "Retrieve a background task's status and output, optionally blocking until done.",
                    json!({
                        "type": "object",
                        "properties": {
                            "task_id": { "type": "string" },
                            "block": { "type": "boolean" },
                            "timeout_ms": { "type": "integer" }
                        },
                        "required": ["task_id"]
                    }),
                ),
                tool(
                    "TaskStop",
                    "Request cooperative cancellation of a background task.",
                    json!({
                        "type": "object",
                        "properties": { "task_id": { "type": "string" } },
                        "required": ["task_id"]
                    }),
                ),
                tool(
                    "TeamCreate",
                    "Register a new team.",
                    json!({
                        "type": "object",
                        "properties": { "name": { "type": "string" } },
                        "required": ["name"]
                    }),
                ),
                tool(
                    "TeamDelete",
                    "Gracefully shut a team down and remove it.",
                    json!({
                        "type": "object",
                        "properties": { "name": { "type": "string" } },
                        "required": ["name"]
                    }),
                ),
            ]);
        }

        tools
    }

    async fn execute(&self, tool_name: &str, arguments: Value) -> Result<String> {
        debug!(tool = %tool_name, "coordination tool invoked");
        match tool_name {
            "TaskCreate" => self.task_create(arguments).await,
            "TaskList" => self.task_list().await,
            "TaskUpdate" => self.task_update(arguments).await,
            "SendMessage" => self.send_message(arguments).await,
            "TaskOutput" if self.is_lead() => self.task_output(arguments).await,
            "TaskStop" if self.is_lead() => self.task_stop(arguments).await,
            "TeamCreate" if self.is_lead() => self.team_create(arguments).await,
            "TeamDelete" if self.is_lead() => self.team_delete(arguments).await,
            other => Err(AgentError::UnknownTool {
                tool_name: other.to_owned(),
            }),
        }
    }
}

fn tool(name: &str, description: &str, input_schema: Value) -> ToolDefinition {
    ToolDefinition {
        name: name.to_owned(),
        description: description.to_owned(),
        input_schema,
    }
}

// ---------------------------------------------------------------------------
// Argument decoding
// ---------------------------------------------------------------------------

fn parse_args<T: serde::de::DeserializeOwned>(tool_name: &str, args: Value) -> Result<T> {
    serde_json::from_value(args).map_err(|e| AgentError::InvalidArguments {
        tool_name: tool_name.to_owned(),
        reason: e.to_string(),
    })
}

fn parse_message_kind(kind: &str) -> Result<MessageKind> {
    match kind {
        "message" => Ok(MessageKind::Message),
        "broadcast" => Ok(MessageKind::Broadcast),
        "shutdown_request" => Ok(MessageKind::ShutdownRequest),
        "shutdown_response" => Ok(MessageKind::ShutdownResponse),
        "plan_approval_response" => Ok(MessageKind::PlanApprovalResponse),
        other => Err(AgentError::InvalidArguments {
            tool_name: "SendMessage".to_owned(),
            reason: format!("unknown message type: {other}"),
        }),
    }
}

#[derive(Deserialize)]
struct TaskCreateArgs {
    subject: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskUpdateArgs {
    #[serde(alias = "id")]
    task_id: String,
    status: Option<String>,
    owner: Option<String>,
    #[serde(default)]
    add_blocked_by: Vec<String>,
    #[serde(default)]
    remove_blocked_by: Vec<String>,
    #[serde(default)]
    add_depends: Vec<String>,
    #[serde(default)]
    remove_depends: Vec<String>,
}

#[derive(Deserialize)]
struct SendMessageArgs {
    recipient: Option<String>,
    content: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    sender: Option<String>,
    team_name: Option<String>,
}

#[derive(Deserialize)]
struct TaskOutputArgs {
    task_id: String,
    block: Option<bool>,
    timeout_ms: Option<u64>,
}

#[derive(Deserialize)]
struct TaskStopArgs {
    task_id: String,
}

#[derive(Deserialize)]
struct TeamNameArgs {
    name: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
