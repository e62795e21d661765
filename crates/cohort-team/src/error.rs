//! Error types for the cohort-team crate.
//!
//! Structural failures (unknown team, unknown teammate) are typed variants
//! the caller decides about; at the tool boundary they are rendered into
//! result strings rather than raised.

use thiserror::Error;

/// Unified error type for the teammate fabric.
#[derive(Debug, Error)]
pub enum TeamError {
    /// The referenced team is not registered.
    #[error("no such team: {team}")]
    NoSuchTeam { team: String },

    /// The referenced teammate could not be resolved.
    #[error("teammate not found: {name}")]
    TeammateNotFound { name: String },

    /// A teammate with this name already exists in the team.
    #[error("teammate already exists: {name} in team {team}")]
    TeammateExists { name: String, team: String },

    /// A broadcast was requested without naming the team to fan out to.
    #[error("broadcast requires a team name")]
    MissingTeamName,

    /// Serializing or parsing an inbox message failed.
    #[error("message encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading or writing an inbox or team directory failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the team crate.
pub type Result<T> = std::result::Result<T, TeamError>;
