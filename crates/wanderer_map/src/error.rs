//! Error and outcome types for the map engine.
//!
//! Expected domain outcomes (already exists, not found, ...) are returned as
//! [`Outcome`] inside `Ok`; only validation and infrastructure failures use
//! the error enums.

use crate::types::{MapId, SolarSystemId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Persistence collaborator errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Record not found")]
    NotFound,

    #[error("Stale record: {0}")]
    StaleRecord(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Map engine and executor errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MapError {
    #[error("Invalid location: solar system {0} is unknown")]
    InvalidLocation(SolarSystemId),

    #[error("Position ({x}, {y}) is outside the map canvas")]
    InvalidPosition { x: i32, y: i32 },

    #[error("Cannot connect solar system {0} to itself")]
    SelfConnection(SolarSystemId),

    #[error("Map {0} is restarting, retry the command")]
    Restarting(MapId),

    #[error("Map {0} is unavailable")]
    Unavailable(MapId),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl MapError {
    /// Whether the caller may resubmit the same command.
    pub fn is_retriable(&self) -> bool {
        matches!(self, MapError::Restarting(_) | MapError::Unavailable(_))
    }
}

/// Result of a mutating command that did not fail.
///
/// No-op outcomes are acknowledgements, not errors: collaborative edits race
/// and the loser of the race should not see a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Applied,
    AlreadyExists,
    NotFound,
    MissingParams,
    Ignored,
}

impl Outcome {
    pub fn is_applied(self) -> bool {
        self == Outcome::Applied
    }
}

pub type MapResult<T> = Result<T, MapError>;
pub type RepositoryResult<T> = Result<T, RepositoryError>;
