//! Core error types for breathhold-core.
//!
//! Errors are split by how the caller is expected to react:
//! - [`DenialReason`]: a session start was refused by the safety policy.
//!   Recoverable and user-facing.
//! - [`SessionError`]: a lifecycle command was issued against a session that
//!   cannot accept it. Recoverable, no state was mutated.
//! - [`ValidationError`]: a program definition is malformed.
//!
//! Safety violations and timer faults are *not* errors. They end the session
//! through the emergency-stop transition and are recorded as safety events.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::safety::ExperienceLevel;
use crate::session::Phase;

/// Core error type for breathhold-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Session lifecycle misuse
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Safety policy refused the request
    #[error("Session denied: {0}")]
    Denied(#[from] DenialReason),

    /// Program definition errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Why the safety policy refused to let a session start.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    #[error(
        "Minimum rest between sessions not yet elapsed: {} more minute(s) required",
        remaining_minutes(.remaining)
    )]
    RestIntervalNotElapsed { remaining: Duration },

    #[error("Daily session limit of {limit} reached")]
    DailyLimitReached { limit: u32 },

    #[error("Program requires {required} experience, current level is {actual}")]
    InsufficientExperience {
        required: ExperienceLevel,
        actual: ExperienceLevel,
    },

    #[error("Program is not valid: {0}")]
    InvalidProgram(String),
}

fn remaining_minutes(remaining: &Duration) -> u64 {
    remaining.as_secs().div_ceil(60)
}

/// Command issued against a session that cannot accept it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session is already finalized")]
    AlreadyFinalized,

    #[error("No session with id {0}")]
    NotFound(String),

    #[error("Another session ({0}) is still in progress")]
    SessionActive(String),

    #[error("Cannot {command} during the {phase} phase")]
    InvalidPhase { command: &'static str, phase: Phase },

    #[error("Session has not been started")]
    NotStarted,

    #[error("Session is already paused")]
    AlreadyPaused,

    #[error("Session is not paused")]
    NotPaused,

    #[error("Session is paused; resume it first")]
    Paused,

    #[error("Session start denied: {0}")]
    Denied(#[from] DenialReason),

    #[error("Session runner has shut down")]
    RunnerClosed,
}

/// Malformed training program definitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Program '{program}' must have at least one round")]
    NoRounds { program: String },

    #[error("Program '{program}' has a zero maximum hold time")]
    ZeroHoldCeiling { program: String },

    #[error("Program '{program}' uses an empty progression table")]
    EmptyTable { program: String },

    #[error(
        "Program '{program}' needs about {estimated_secs}s which exceeds its {budget_secs}s budget"
    )]
    OverBudget {
        program: String,
        estimated_secs: u64,
        budget_secs: u64,
    },

    #[error("Unknown program: {0}")]
    UnknownProgram(String),

    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    #[error("Could not determine data directory: {0}")]
    DataDir(String),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Database is locked")]
    Locked,

    #[error("Stored record is corrupt: {0}")]
    Corrupt(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) if e.code == rusqlite::ErrorCode::DatabaseLocked => {
                DatabaseError::Locked
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rest_denial_rounds_minutes_up() {
        let reason = DenialReason::RestIntervalNotElapsed {
            remaining: Duration::from_secs(61),
        };
        assert_eq!(
            reason.to_string(),
            "Minimum rest between sessions not yet elapsed: 2 more minute(s) required"
        );
    }

    #[test]
    fn denial_converts_into_session_error() {
        let err: SessionError = DenialReason::DailyLimitReached { limit: 2 }.into();
        assert_eq!(err.to_string(), "Session start denied: Daily session limit of 2 reached");
    }

    #[test]
    fn invalid_phase_names_command_and_phase() {
        let err = SessionError::InvalidPhase {
            command: "complete hold",
            phase: Phase::Rest,
        };
        assert_eq!(err.to_string(), "Cannot complete hold during the rest phase");
    }
}
