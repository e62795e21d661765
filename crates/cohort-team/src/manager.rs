//! Teammate manager: team registry, routing, spawn, and shutdown.
//!
//! The [`TeammateManager`] owns the team map (team → name → record), the
//! teams directory that inbox files live under, and the spawn mechanism.
//! Team names are unique process-wide; teammate names are unique within a
//! team. Lookups without an explicit team scan teams in registration order
//! and return the first match.
//!
//! Spawned teammates are animated by a [`TeammateRunner`] installed on the
//! manager — the production idle loop lives in `cohort-agent`. The runner
//! executes as a detached tokio task; the manager never joins it, and
//! `delete_team` shuts teammates down cooperatively (inbox request plus a
//! sticky status flip) rather than killing workers.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::error::{Result, TeamError};
use crate::inbox::{Inbox, InboxMessage, MessageKind};
use crate::record::{TeammateDescriptor, TeammateRecord};

// ---------------------------------------------------------------------------
// Runner seam
// ---------------------------------------------------------------------------

/// The worker loop attached to every spawned teammate.
///
/// `spawn_teammate` invokes this on a detached tokio task with the fresh
/// record and the teammate's initial prompt. Implementations are expected
/// to exit once the record reports shutdown.
#[async_trait]
pub trait TeammateRunner: Send + Sync {
    /// Animate `teammate` until it shuts down.
    async fn run(&self, teammate: Arc<TeammateRecord>, prompt: String);
}

// ---------------------------------------------------------------------------
// Team
// ---------------------------------------------------------------------------

/// A named container of teammates sharing a broadcast scope.
///
/// Internal to the registry: callers go through [`TeammateManager`], which
/// never hands the container itself out.
pub(crate) struct Team {
    name: String,
    /// Members in spawn order.
    members: RwLock<Vec<Arc<TeammateRecord>>>,
}

impl Team {
    fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            members: RwLock::new(Vec::new()),
        })
    }

    /// Look up a member by name.
    fn member(&self, name: &str) -> Option<Arc<TeammateRecord>> {
        self.members
            .read()
            .expect("team members poisoned")
            .iter()
            .find(|m| m.name() == name)
            .cloned()
    }

    /// Snapshot of all members in spawn order.
    fn members(&self) -> Vec<Arc<TeammateRecord>> {
        self.members.read().expect("team members poisoned").clone()
    }

    fn add_member(&self, record: Arc<TeammateRecord>) -> Result<()> {
        let mut members = self.members.write().expect("team members poisoned");
        if members.iter().any(|m| m.name() == record.name()) {
            return Err(TeamError::TeammateExists {
                name: record.name().to_owned(),
                team: self.name.clone(),
            });
        }
        members.push(record);
        Ok(())
    }
}

/// Outcome of `create_team`; the "already exists" arm is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateTeamOutcome {
    /// A fresh team was registered.
    Created,
    /// A team with this name was already registered; nothing changed.
    AlreadyExists,
}

impl std::fmt::Display for CreateTeamOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::AlreadyExists => "already exists",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Team registry and message router.
///
/// Cheaply cloneable (`Arc`-backed) and safe to share across threads and
/// async tasks.
#[derive(Clone)]
pub struct TeammateManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    teams_dir: PathBuf,
    teams: DashMap<String, Arc<Team>>,
    /// Team names in registration order; the scan order for lookups
    /// without an explicit team.
    team_order: Mutex<Vec<String>>,
    runner: RwLock<Option<Arc<dyn TeammateRunner>>>,
}

impl TeammateManager {
    /// Create a manager rooted at `teams_dir` (created if absent).
    pub async fn new(teams_dir: impl AsRef<Path>) -> Result<Self> {
        let teams_dir = teams_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&teams_dir).await?;

        Ok(Self {
            inner: Arc::new(ManagerInner {
                teams_dir,
                teams: DashMap::new(),
                team_order: Mutex::new(Vec::new()),
                runner: RwLock::new(None),
            }),
        })
    }

    /// Install the worker loop used by `spawn_teammate`. Without one,
    /// spawned teammates are registered but not animated (useful in tests).
    pub fn set_runner(&self, runner: Arc<dyn TeammateRunner>) {
        *self.inner.runner.write().expect("runner poisoned") = Some(runner);
    }

    /// Directory inbox files live under.
    #[must_use]
    pub fn teams_dir(&self) -> &Path {
        &self.inner.teams_dir
    }

    /// Register a team. Idempotent: re-creating an existing team reports
    /// [`CreateTeamOutcome::AlreadyExists`] and changes nothing.
    pub async fn create_team(&self, name: &str) -> Result<CreateTeamOutcome> {
        use dashmap::mapref::entry::Entry;

        match self.inner.teams.entry(name.to_owned()) {
            Entry::Occupied(_) => {
                debug!(team = %name, "create_team: already exists");
                Ok(CreateTeamOutcome::AlreadyExists)
            }
            Entry::Vacant(entry) => {
                std::fs::create_dir_all(self.inner.teams_dir.join(name))?;
                entry.insert(Team::new(name));
                self.inner
                    .team_order
                    .lock()
                    .expect("team order poisoned")
                    .push(name.to_owned());
                info!(team = %name, "team created");
                Ok(CreateTeamOutcome::Created)
            }
        }
    }

    /// Tear a team down gracefully.
    ///
    /// For each member: append a `shutdown_request` to its inbox and flip
    /// its status to the sticky `Shutdown`, then remove the team entry.
    /// Outstanding loops observe the flip on their next idle tick and exit;
    /// no worker is killed.
    pub async fn delete_team(&self, name: &str) -> Result<()> {
        let (_, team) = self
            .inner
            .teams
            .remove(name)
            .ok_or_else(|| TeamError::NoSuchTeam {
                team: name.to_owned(),
            })?;
        self.inner
            .team_order
            .lock()
            .expect("team order poisoned")
            .retain(|t| t != name);

        for member in team.members() {
            let request = InboxMessage::new(
                MessageKind::ShutdownRequest,
                format!("Team {name} is being deleted; wrap up and exit."),
            )
            .stamped();
            member.inbox().append(&request).await?;
            member.mark_shutdown();
        }

        info!(team = %name, "team deleted");
        Ok(())
    }

    /// Team names in registration order.
    #[must_use]
    pub fn list_teams(&self) -> Vec<String> {
        self.inner
            .team_order
            .lock()
            .expect("team order poisoned")
            .clone()
    }

    /// Resolve a teammate by name.
    ///
    /// With `team_name` the lookup is scoped to that team. Without it,
    /// every team is scanned in registration order and the first match
    /// wins. Absence is not an error — the caller decides.
    #[must_use]
    pub fn find_teammate(
        &self,
        name: &str,
        team_name: Option<&str>,
    ) -> Option<Arc<TeammateRecord>> {
        if let Some(team_name) = team_name {
            return self.inner.teams.get(team_name)?.member(name);
        }

        for team_name in self.list_teams() {
            if let Some(team) = self.inner.teams.get(&team_name) {
                if let Some(record) = team.member(name) {
                    return Some(record);
                }
            }
        }
        None
    }

    /// Deliver a message.
    ///
    /// `kind == Broadcast` with an empty `recipient` fans out to every
    /// member of `team_name` except the one whose name equals `sender`
    /// (no sender → no exclusion). Anything else resolves the recipient
    /// (see [`Self::find_teammate`]) and appends to its inbox. Returns the
    /// number of inboxes reached.
    pub async fn send_message(
        &self,
        recipient: &str,
        content: &str,
        kind: MessageKind,
        sender: Option<&str>,
        team_name: Option<&str>,
    ) -> Result<usize> {
        let mut message = InboxMessage::new(kind, content).stamped();
        if let Some(sender) = sender {
            message = message.with_sender(sender);
        }

        if kind == MessageKind::Broadcast && recipient.is_empty() {
            let team_name = team_name.ok_or(TeamError::MissingTeamName)?;
            let team = self
                .inner
                .teams
                .get(team_name)
                .ok_or_else(|| TeamError::NoSuchTeam {
                    team: team_name.to_owned(),
                })?
                .clone();

            let mut reached = 0usize;
            for member in team.members() {
                if sender.is_some_and(|s| s == member.name()) {
                    continue;
                }
                member.inbox().append(&message).await?;
                reached += 1;
            }
            debug!(team = %team_name, reached, "broadcast delivered");
            return Ok(reached);
        }

        let record = self
            .find_teammate(recipient, team_name)
            .ok_or_else(|| TeamError::TeammateNotFound {
                name: recipient.to_owned(),
            })?;
        record.inbox().append(&message).await?;
        debug!(recipient = %recipient, kind = %message.kind, "message delivered");
        Ok(1)
    }

    /// Drain a teammate's inbox: every pending message in write order,
    /// leaving the inbox empty.
    pub async fn check_inbox(
        &self,
        name: &str,
        team_name: Option<&str>,
    ) -> Result<Vec<InboxMessage>> {
        let record = self
            .find_teammate(name, team_name)
            .ok_or_else(|| TeamError::TeammateNotFound {
                name: name.to_owned(),
            })?;
        record.inbox().drain().await
    }

    /// Register a teammate in `team_name` and start its worker.
    ///
    /// Fails with [`TeamError::NoSuchTeam`] if the team does not exist and
    /// [`TeamError::TeammateExists`] on a duplicate name. The worker (if a
    /// runner is installed) is detached; the returned descriptor is the
    /// record at spawn time.
    pub async fn spawn_teammate(
        &self,
        name: &str,
        team_name: &str,
        prompt: &str,
    ) -> Result<TeammateDescriptor> {
        let team = self
            .inner
            .teams
            .get(team_name)
            .ok_or_else(|| TeamError::NoSuchTeam {
                team: team_name.to_owned(),
            })?
            .clone();

        let inbox_path = self
            .inner
            .teams_dir
            .join(team_name)
            .join(format!("{name}.jsonl"));
        let record = TeammateRecord::new(name, team_name, Inbox::new(inbox_path));
        team.add_member(Arc::clone(&record))?;

        let descriptor = record.descriptor();
        info!(teammate = %name, team = %team_name, "teammate spawned");

        let runner = self
            .inner
            .runner
            .read()
            .expect("runner poisoned")
            .clone();
        if let Some(runner) = runner {
            let prompt = prompt.to_owned();
            tokio::spawn(async move {
                runner.run(record, prompt).await;
            });
        }

        Ok(descriptor)
    }

    /// Human-readable summary of a team: its name and every member with
    /// its current status.
    pub fn get_team_status(&self, name: &str) -> Result<String> {
        let team = self
            .inner
            .teams
            .get(name)
            .ok_or_else(|| TeamError::NoSuchTeam {
                team: name.to_owned(),
            })?
            .clone();

        let members = team.members();
        let mut summary = format!("Team {name}: {} member(s)", members.len());
        if !members.is_empty() {
            let list: Vec<String> = members
                .iter()
                .map(|m| format!("{} ({})", m.name(), m.status()))
                .collect();
            summary.push_str(" — ");
            summary.push_str(&list.join(", "));
        }
        Ok(summary)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::TeammateStatus;

    async fn manager() -> (tempfile::TempDir, TeammateManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = TeammateManager::new(dir.path()).await.unwrap();
        (dir, manager)
    }

    #[tokio::test]
    async fn create_team_is_idempotent() {
        let (_dir, manager) = manager().await;
        assert_eq!(
            manager.create_team("alpha").await.unwrap(),
            CreateTeamOutcome::Created
        );
        assert_eq!(
            manager.create_team("alpha").await.unwrap(),
            CreateTeamOutcome::AlreadyExists
        );
        assert_eq!(manager.list_teams(), vec!["alpha"]);
    }

    #[tokio::test]
    async fn spawn_into_missing_team_fails() {
        let (_dir, manager) = manager().await;
        let err = manager
            .spawn_teammate("alice", "ghost", "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, TeamError::NoSuchTeam { .. }));
    }

    #[tokio::test]
    async fn spawn_registers_record_and_inbox_path() {
        let (_dir, manager) = manager().await;
        manager.create_team("alpha").await.unwrap();

        let descriptor = manager
            .spawn_teammate("alice", "alpha", "work on it")
            .await
            .unwrap();
        assert_eq!(descriptor.name, "alice");
        assert_eq!(descriptor.team, "alpha");
        assert_eq!(descriptor.status, TeammateStatus::Active);

        let record = manager.find_teammate("alice", Some("alpha")).unwrap();
        assert!(record.inbox().path().ends_with("alpha/alice.jsonl"));
    }

    #[tokio::test]
    async fn duplicate_teammate_name_is_rejected() {
        let (_dir, manager) = manager().await;
        manager.create_team("alpha").await.unwrap();
        manager.spawn_teammate("alice", "alpha", "").await.unwrap();

        let err = manager
            .spawn_teammate("alice", "alpha", "")
            .await
            .unwrap_err();
        assert!(matches!(err, TeamError::TeammateExists { .. }));
    }

    #[tokio::test]
    async fn direct_send_and_drain_on_read() {
        let (_dir, manager) = manager().await;
        manager.create_team("alpha").await.unwrap();
        manager.spawn_teammate("alice", "alpha", "").await.unwrap();

        manager
            .send_message("alice", "First", MessageKind::Message, Some("lead"), None)
            .await
            .unwrap();
        manager
            .send_message("alice", "Second", MessageKind::Message, Some("lead"), None)
            .await
            .unwrap();

        let messages = manager.check_inbox("alice", None).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "First");
        assert_eq!(messages[1].content, "Second");
        assert_eq!(messages[0].sender.as_deref(), Some("lead"));

        assert!(manager.check_inbox("alice", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn send_to_unknown_teammate_fails() {
        let (_dir, manager) = manager().await;
        manager.create_team("alpha").await.unwrap();

        let err = manager
            .send_message("ghost", "hi", MessageKind::Message, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TeamError::TeammateNotFound { .. }));
    }

    #[tokio::test]
    async fn broadcast_excludes_the_sender() {
        let (_dir, manager) = manager().await;
        manager.create_team("alpha").await.unwrap();
        for name in ["lead", "worker1", "worker2"] {
            manager.spawn_teammate(name, "alpha", "").await.unwrap();
        }

        let reached = manager
            .send_message("", "hi team", MessageKind::Broadcast, Some("lead"), Some("alpha"))
            .await
            .unwrap();
        assert_eq!(reached, 2);

        assert!(manager.check_inbox("lead", None).await.unwrap().is_empty());
        for name in ["worker1", "worker2"] {
            let messages = manager.check_inbox(name, None).await.unwrap();
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].content, "hi team");
            assert_eq!(messages[0].kind, MessageKind::Broadcast);
        }
    }

    #[tokio::test]
    async fn broadcast_without_sender_reaches_everyone() {
        let (_dir, manager) = manager().await;
        manager.create_team("alpha").await.unwrap();
        for name in ["a", "b"] {
            manager.spawn_teammate(name, "alpha", "").await.unwrap();
        }

        let reached = manager
            .send_message("", "all hands", MessageKind::Broadcast, None, Some("alpha"))
            .await
            .unwrap();
        assert_eq!(reached, 2);
    }

    #[tokio::test]
    async fn broadcast_without_team_is_rejected() {
        let (_dir, manager) = manager().await;
        let err = manager
            .send_message("", "hi", MessageKind::Broadcast, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TeamError::MissingTeamName));
    }

    #[tokio::test]
    async fn find_teammate_scans_teams_in_registration_order() {
        let (_dir, manager) = manager().await;
        manager.create_team("first").await.unwrap();
        manager.create_team("second").await.unwrap();
        manager.spawn_teammate("dup", "second", "").await.unwrap();
        manager.spawn_teammate("dup", "first", "").await.unwrap();

        // Unscoped lookup returns the match from the earliest-registered team.
        let found = manager.find_teammate("dup", None).unwrap();
        assert_eq!(found.team_name(), "first");

        // Scoped lookup honors the explicit team.
        let found = manager.find_teammate("dup", Some("second")).unwrap();
        assert_eq!(found.team_name(), "second");

        assert!(manager.find_teammate("dup", Some("ghost")).is_none());
        assert!(manager.find_teammate("nobody", None).is_none());
    }

    #[tokio::test]
    async fn delete_team_requests_shutdown_everywhere() {
        let (_dir, manager) = manager().await;
        manager.create_team("alpha").await.unwrap();
        manager.spawn_teammate("a", "alpha", "").await.unwrap();
        manager.spawn_teammate("b", "alpha", "").await.unwrap();

        let a = manager.find_teammate("a", None).unwrap();
        let b = manager.find_teammate("b", None).unwrap();

        manager.delete_team("alpha").await.unwrap();

        assert!(a.is_shutdown());
        assert!(b.is_shutdown());
        assert!(manager.list_teams().is_empty());
        assert!(manager.find_teammate("a", None).is_none());

        // The shutdown request is durable in each inbox file.
        let pending = a.inbox().drain().await.unwrap();
        assert!(pending.iter().any(|m| m.kind == MessageKind::ShutdownRequest));
    }

    #[tokio::test]
    async fn delete_missing_team_fails() {
        let (_dir, manager) = manager().await;
        let err = manager.delete_team("ghost").await.unwrap_err();
        assert!(matches!(err, TeamError::NoSuchTeam { .. }));
    }

    #[tokio::test]
    async fn team_status_lists_members() {
        let (_dir, manager) = manager().await;
        manager.create_team("alpha").await.unwrap();
        manager.spawn_teammate("alice", "alpha", "").await.unwrap();
        manager.spawn_teammate("bob", "alpha", "").await.unwrap();

        let summary = manager.get_team_status("alpha").unwrap();
        assert!(summary.contains("alpha"));
        assert!(summary.contains("alice"));
        assert!(summary.contains("bob"));
    }

    #[tokio::test]
    async fn runner_is_invoked_on_spawn() {
        struct MarkerRunner(tokio::sync::mpsc::UnboundedSender<String>);

        #[async_trait]
        impl TeammateRunner for MarkerRunner {
            async fn run(&self, teammate: Arc<TeammateRecord>, prompt: String) {
                let _ = self.0.send(format!("{}:{prompt}", teammate.name()));
            }
        }

        let (_dir, manager) = manager().await;
        manager.create_team("alpha").await.unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        manager.set_runner(Arc::new(MarkerRunner(tx)));
        manager
            .spawn_teammate("alice", "alpha", "get started")
            .await
            .unwrap();

        let ran = rx.recv().await.unwrap();
        assert_eq!(ran, "alice:get started");
    }
}
