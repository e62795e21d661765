//! The teammate worker loop.
//!
//! One [`TeammateLoop`] animates each spawned teammate. It alternates
//! between responding to explicit stimuli — the spawn prompt, inbox
//! messages, background-task notifications — and autonomously claiming
//! work from the shared board:
//!
//! 1. Drain background notifications and fold them into the prompt.
//! 2. Compact the history if it outgrew its budget, then re-inject the
//!    teammate's identity so it survives truncation.
//! 3. Invoke the model; execute any tool calls it requests.
//! 4. When the model goes quiescent (no tool calls), enter the idle phase:
//!    poll the inbox, then the board's unclaimed items, for up to
//!    `ticks × tick_interval` before re-entering the outer loop.
//!
//! Shutdown is cooperative on two paths: a `shutdown_request` inbox message
//! exits promptly after the current model call, and the sticky status flip
//! from `delete_team` is observed on the next tick. No worker is killed.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use cohort_board::TaskBoard;
use cohort_kernel::{BackgroundManager, TaskNotification};
use cohort_team::{InboxMessage, MessageKind, TeammateManager, TeammateRecord, TeammateRunner, TeammateStatus};

use crate::compaction::{CompactionConfig, ContextCompactor, TruncatingCompactor, needs_compaction};
use crate::config::IdleConfig;
use crate::error::{AgentError, Result};
use crate::types::{Message, ModelDriver, ModelTurn, ToolCall, ToolDefinition, ToolResult};

// ---------------------------------------------------------------------------
// Tool adapter trait
// ---------------------------------------------------------------------------

/// Trait for components that execute tool calls on behalf of a teammate.
///
/// The coordination tools in this crate implement it; the embedding
/// application registers its own adapters (filesystem, shell, ...) through
/// the same trait.
#[async_trait]
pub trait ToolAdapter: Send + Sync {
    /// The unique identifier for this adapter.
    fn adapter_id(&self) -> &str;

    /// The tool definitions this adapter exposes to the model.
    fn tool_definitions(&self) -> Vec<ToolDefinition>;

    /// Execute a named tool with the given arguments.
    ///
    /// Returns the result as a string suitable for feeding back to the
    /// model.
    async fn execute(&self, tool_name: &str, arguments: Value) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Loop configuration
// ---------------------------------------------------------------------------

/// Tuning for one teammate loop.
#[derive(Debug, Clone, Default)]
pub struct LoopConfig {
    /// Idle-phase pacing.
    pub idle: IdleConfig,
    /// Context compaction thresholds.
    pub compaction: CompactionConfig,
}

/// Why an idle phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdleOutcome {
    /// A message arrived or a board item was claimed; new input is queued.
    Stimulus,
    /// All ticks elapsed with nothing to do.
    TimedOut,
    /// The teammate was told to stop.
    Shutdown,
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

/// The worker that drives one teammate.
pub struct TeammateLoop {
    session_id: Uuid,
    teammate: Arc<TeammateRecord>,
    driver: Arc<dyn ModelDriver>,
    adapters: Vec<Arc<dyn ToolAdapter>>,
    background: BackgroundManager,
    board: TaskBoard,
    compactor: Arc<dyn ContextCompactor>,
    config: LoopConfig,
    messages: Vec<Message>,
}

impl TeammateLoop {
    /// Create a loop for `teammate` with no tool adapters and the bundled
    /// truncating compactor.
    pub fn new(
        teammate: Arc<TeammateRecord>,
        driver: Arc<dyn ModelDriver>,
        background: BackgroundManager,
        board: TaskBoard,
        config: LoopConfig,
    ) -> Self {
        Self {
            session_id: Uuid::now_v7(),
            teammate,
            driver,
            adapters: Vec::new(),
            background,
            board,
            compactor: Arc::new(TruncatingCompactor),
            config,
            messages: Vec::new(),
        }
    }

    /// Builder: register tool adapters.
    #[must_use]
    pub fn with_adapters(mut self, adapters: Vec<Arc<dyn ToolAdapter>>) -> Self {
        self.adapters = adapters;
        self
    }

    /// Builder: replace the context compactor.
    #[must_use]
    pub fn with_compactor(mut self, compactor: Arc<dyn ContextCompactor>) -> Self {
        self.compactor = compactor;
        self
    }

    /// Run until the teammate shuts down.
    pub async fn run(mut self, prompt: String) {
        let name = self.teammate.name().to_owned();
        let team = self.teammate.team_name().to_owned();
        info!(
            session_id = %self.session_id,
            teammate = %name,
            team = %team,
            "teammate loop started"
        );

        self.messages.push(Message::system(identity_prompt(&name, &team)));
        self.messages.push(Message::user(prompt));

        while !self.teammate.is_shutdown() {
            // Fold completed background work into the model's context.
            for event in self.background.drain_notifications() {
                self.messages.push(Message::user(render_notification(&event)));
            }

            if needs_compaction(&self.messages, &self.config.compaction) {
                match self
                    .compactor
                    .compact(&self.messages, &self.config.compaction)
                    .await
                {
                    Ok(compacted) => {
                        self.messages = compacted;
                        // Identity must survive history truncation.
                        self.messages.push(Message::system(identity_prompt(&name, &team)));
                    }
                    Err(e) => {
                        warn!(teammate = %name, error = %e, "compaction failed, continuing uncompacted");
                    }
                }
            }

            let tools = self.all_tool_definitions();
            let turn = match self.driver.complete(&self.messages, &tools).await {
                Ok(turn) => turn,
                Err(e) => {
                    warn!(teammate = %name, error = %e, "model turn failed");
                    // Treat the failed turn as quiescence; the idle phase
                    // doubles as backoff.
                    if self.idle_phase().await == IdleOutcome::Shutdown {
                        break;
                    }
                    continue;
                }
            };

            match turn {
                ModelTurn::ToolCalls(calls) => {
                    debug!(teammate = %name, count = calls.len(), "model requested tool calls");
                    self.messages.push(Message::assistant_tool_calls(calls.clone()));
                    for call in &calls {
                        let result = self.execute_tool(call).await;
                        self.messages
                            .push(Message::tool_result(&result.tool_call_id, &result.content));
                    }
                }
                ModelTurn::Text(text) => {
                    self.messages.push(Message::assistant(text));
                    if self.idle_phase().await == IdleOutcome::Shutdown {
                        break;
                    }
                }
            }
        }

        self.teammate.mark_shutdown();
        info!(session_id = %self.session_id, teammate = %name, "teammate loop exited");
    }

    /// Quiescent polling: inbox first, then unclaimed board work.
    async fn idle_phase(&mut self) -> IdleOutcome {
        self.teammate.set_status(TeammateStatus::Idle);
        debug!(teammate = %self.teammate.name(), "entering idle phase");

        for _ in 0..self.config.idle.ticks {
            tokio::time::sleep(self.config.idle.tick_interval()).await;

            if self.teammate.is_shutdown() {
                return IdleOutcome::Shutdown;
            }

            let pending = match self.teammate.inbox().drain().await {
                Ok(pending) => pending,
                Err(e) => {
                    warn!(teammate = %self.teammate.name(), error = %e, "inbox drain failed");
                    Vec::new()
                }
            };
            if !pending.is_empty() {
                let mut shutdown_requested = false;
                for message in &pending {
                    if message.kind == MessageKind::ShutdownRequest {
                        shutdown_requested = true;
                    }
                    self.messages.push(Message::user(render_inbox_message(message)));
                }
                if shutdown_requested {
                    self.teammate.mark_shutdown();
                    return IdleOutcome::Shutdown;
                }
                self.teammate.set_status(TeammateStatus::Active);
                return IdleOutcome::Stimulus;
            }

            if let Some(claimed) = self.claim_next_item().await {
                self.messages.push(Message::user(format!(
                    "You claimed task {}: {}",
                    claimed.0, claimed.1
                )));
                self.teammate.set_status(TeammateStatus::Active);
                return IdleOutcome::Stimulus;
            }
        }

        IdleOutcome::TimedOut
    }

    /// Claim the lowest-ID pending, unowned, unblocked board item.
    async fn claim_next_item(&self) -> Option<(String, String)> {
        let unclaimed = match self.board.list_unclaimed().await {
            Ok(unclaimed) => unclaimed,
            Err(e) => {
                warn!(teammate = %self.teammate.name(), error = %e, "board query failed");
                return None;
            }
        };

        for item in unclaimed {
            match self.board.try_claim(&item.id, self.teammate.name()).await {
                Ok(Some(claimed)) => {
                    info!(
                        teammate = %self.teammate.name(),
                        item_id = %claimed.id,
                        "claimed board item"
                    );
                    return Some((claimed.id, claimed.subject));
                }
                // Another teammate won this one; try the next.
                Ok(None) => continue,
                Err(e) => {
                    warn!(teammate = %self.teammate.name(), error = %e, "claim failed");
                    return None;
                }
            }
        }
        None
    }

    fn all_tool_definitions(&self) -> Vec<ToolDefinition> {
        self.adapters
            .iter()
            .flat_map(|a| a.tool_definitions())
            .collect()
    }

    /// Execute one tool call. Failures are contained into an error
    /// [`ToolResult`] the model sees as an `Error:` string; they never
    /// escape the loop.
    async fn execute_tool(&self, call: &ToolCall) -> ToolResult {
        let adapter = self
            .adapters
            .iter()
            .find(|a| a.tool_definitions().iter().any(|td| td.name == call.name));

        let Some(adapter) = adapter else {
            warn!(tool = %call.name, "unknown tool requested");
            let e = AgentError::UnknownTool {
                tool_name: call.name.clone(),
            };
            return ToolResult {
                tool_call_id: call.id.clone(),
                content: format!("Error: {e}"),
                is_error: true,
            };
        };

        match adapter.execute(&call.name, call.arguments.clone()).await {
            Ok(content) => ToolResult {
                tool_call_id: call.id.clone(),
                content,
                is_error: false,
            },
            Err(e) => {
                warn!(tool = %call.name, error = %e, "tool execution failed");
                ToolResult {
                    tool_call_id: call.id.clone(),
                    content: format!("Error: {e}"),
                    is_error: true,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Production [`TeammateRunner`]: builds a [`TeammateLoop`] with the
/// coordination tool set for every teammate the manager spawns.
pub struct TeammateLoopRunner {
    driver: Arc<dyn ModelDriver>,
    background: BackgroundManager,
    board: TaskBoard,
    teams: TeammateManager,
    config: LoopConfig,
}

impl TeammateLoopRunner {
    /// Wire a runner over the shared managers.
    pub fn new(
        driver: Arc<dyn ModelDriver>,
        background: BackgroundManager,
        board: TaskBoard,
        teams: TeammateManager,
        config: LoopConfig,
    ) -> Self {
        Self {
            driver,
            background,
            board,
            teams,
            config,
        }
    }
}

#[async_trait]
impl TeammateRunner for TeammateLoopRunner {
    async fn run(&self, teammate: Arc<TeammateRecord>, prompt: String) {
        let tools = crate::tools::CoordinationTools::for_teammate(
            self.board.clone(),
            self.teams.clone(),
        )
        .with_sender(teammate.name());

        TeammateLoop::new(
            teammate,
            Arc::clone(&self.driver),
            self.background.clone(),
            self.board.clone(),
            self.config.clone(),
        )
        .with_adapters(vec![Arc::new(tools)])
        .run(prompt)
        .await;
    }
}

// ---------------------------------------------------------------------------
// Prompt rendering
// ---------------------------------------------------------------------------

fn identity_prompt(name: &str, team: &str) -> String {
    format!("You are {name} on team {team}.")
}

/// Render a completion event as the prompt block the model folds in.
fn render_notification(event: &TaskNotification) -> String {
    format!(
        "<task-notification><task-id>{}</task-id><status>{}</status><summary>{}</summary></task-notification>",
        event.task_id, event.status, event.summary
    )
}

fn render_inbox_message(message: &InboxMessage) -> String {
    match message.sender.as_deref() {
        Some(sender) => format!("[{}] from {sender}: {}", message.kind, message.content),
        None => format!("[{}] {}", message.kind, message.content),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_kernel::TaskStatus;

    #[test]
    fn identity_prompt_names_teammate_and_team() {
        let prompt = identity_prompt("alice", "alpha");
        assert_eq!(prompt, "You are alice on team alpha.");
    }

    #[test]
    fn notification_renders_as_tagged_block() {
        let event = TaskNotification::new("b3", TaskStatus::Completed, "done");
        let block = render_notification(&event);
        assert!(block.starts_with("<task-notification>"));
        assert!(block.contains("<task-id>b3</task-id>"));
        assert!(block.contains("<status>completed</status>"));
        assert!(block.contains("<summary>done</summary>"));
        assert!(block.ends_with("</task-notification>"));
    }

    #[test]
    fn inbox_message_rendering_includes_sender_when_present() {
        let message = InboxMessage::new(MessageKind::Message, "hello").with_sender("lead");
        assert_eq!(render_inbox_message(&message), "[message] from lead: hello");

        let anonymous = InboxMessage::new(MessageKind::Broadcast, "all hands");
        assert_eq!(render_inbox_message(&anonymous), "[broadcast] all hands");
    }
}
