//! Cohort teammate coordination fabric.
//!
//! Named teams of autonomous agents that exchange typed messages and share
//! work:
//!
//! - **[`record`]** -- Per-teammate record: name, home team, inbox path,
//!   lifecycle status with a sticky `Shutdown` terminal.
//! - **[`inbox`]** -- Durable per-teammate JSONL inbox: append-only from
//!   senders, drained (read + truncate) by the owning teammate.
//! - **[`manager`]** -- [`TeammateManager`]: team registry, message routing,
//!   broadcast fan-out with sender exclusion, spawn/shutdown, cross-team
//!   lookup.
//! - **[`error`]** -- Team error types via [`thiserror`].
//!
//! The worker that animates a spawned teammate is attached through the
//! [`TeammateRunner`] trait; the production idle loop lives in
//! `cohort-agent`, and tests may install stubs.

pub mod error;
pub mod inbox;
pub mod manager;
pub mod record;

pub use error::{Result, TeamError};
pub use inbox::{Inbox, InboxMessage, MessageKind};
pub use manager::{CreateTeamOutcome, TeammateManager, TeammateRunner};
pub use record::{TeammateDescriptor, TeammateRecord, TeammateStatus};
