//! Teammate records.
//!
//! A [`TeammateRecord`] is the registry's view of one spawned teammate:
//! its name, home team, inbox, and lifecycle status. `Shutdown` is sticky —
//! once a teammate is told to stop, no later transition revives it, and the
//! idle loop observes the flip on its next tick.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::inbox::Inbox;

/// Lifecycle status of a teammate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeammateStatus {
    /// Processing stimuli or executing tool calls.
    Active,
    /// Quiescent; polling inbox and task board.
    Idle,
    /// Told to stop. Terminal and sticky.
    Shutdown,
}

impl std::fmt::Display for TeammateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Idle => "idle",
            Self::Shutdown => "shutdown",
        };
        write!(f, "{s}")
    }
}

/// Descriptor returned by `spawn_teammate`, serialized for the model as
/// `{"name", "team", "status"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeammateDescriptor {
    /// Teammate name, unique within its team.
    pub name: String,
    /// Home team name.
    pub team: String,
    /// Status at descriptor time.
    pub status: TeammateStatus,
}

/// Registry record for one teammate.
///
/// Shared as `Arc<TeammateRecord>` between the manager, senders, and the
/// teammate's own worker loop.
pub struct TeammateRecord {
    name: String,
    team_name: String,
    inbox: Inbox,
    status: RwLock<TeammateStatus>,
}

impl TeammateRecord {
    /// Create a record in the initial `Active` status.
    #[must_use]
    pub fn new(name: impl Into<String>, team_name: impl Into<String>, inbox: Inbox) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            team_name: team_name.into(),
            inbox,
            status: RwLock::new(TeammateStatus::Active),
        })
    }

    /// Teammate name, unique within its team.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Home team name.
    #[must_use]
    pub fn team_name(&self) -> &str {
        &self.team_name
    }

    /// The teammate's durable inbox.
    #[must_use]
    pub fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> TeammateStatus {
        *self.status.read().expect("teammate status poisoned")
    }

    /// Move between `Active` and `Idle`. Ignored once shut down — the
    /// terminal status never un-sticks.
    pub fn set_status(&self, status: TeammateStatus) {
        let mut current = self.status.write().expect("teammate status poisoned");
        if *current == TeammateStatus::Shutdown {
            return;
        }
        *current = status;
    }

    /// Flip to the terminal `Shutdown` status.
    pub fn mark_shutdown(&self) {
        let mut current = self.status.write().expect("teammate status poisoned");
        if *current != TeammateStatus::Shutdown {
            tracing::info!(teammate = %self.name, team = %self.team_name, "teammate shut down");
            *current = TeammateStatus::Shutdown;
        }
    }

    /// Whether the teammate has been told to stop.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.status() == TeammateStatus::Shutdown
    }

    /// Snapshot descriptor for the model-facing spawn result.
    #[must_use]
    pub fn descriptor(&self) -> TeammateDescriptor {
        TeammateDescriptor {
            name: self.name.clone(),
            team: self.team_name.clone(),
            status: self.status(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
