//! Explicit safety context handed to every session command.
//!
//! Built from persisted history when a session is created, instead of
//! living in a global validator object.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::level::ExperienceLevel;

/// Start times of the user's previous sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserHistory {
    session_starts: Vec<DateTime<Utc>>,
}

impl UserHistory {
    pub fn new(mut session_starts: Vec<DateTime<Utc>>) -> Self {
        session_starts.sort();
        Self { session_starts }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn session_starts(&self) -> &[DateTime<Utc>] {
        &self.session_starts
    }

    pub fn last_session_start(&self) -> Option<DateTime<Utc>> {
        self.session_starts.last().copied()
    }

    /// Number of sessions started on the given UTC calendar day.
    pub fn sessions_on(&self, day: NaiveDate) -> u32 {
        let count = self
            .session_starts
            .iter()
            .filter(|start| start.date_naive() == day)
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    pub fn record_start(&mut self, at: DateTime<Utc>) {
        let idx = self.session_starts.partition_point(|s| *s <= at);
        self.session_starts.insert(idx, at);
    }

    /// Union of both histories, duplicates removed.
    pub fn merged(&self, other: &UserHistory) -> UserHistory {
        let mut starts: Vec<_> = self
            .session_starts
            .iter()
            .chain(other.session_starts.iter())
            .copied()
            .collect();
        starts.sort();
        starts.dedup();
        UserHistory {
            session_starts: starts,
        }
    }
}

/// Everything the safety policy needs to know about the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SafetyContext {
    pub level: ExperienceLevel,
    pub history: UserHistory,
}

impl SafetyContext {
    pub fn new(level: ExperienceLevel, history: UserHistory) -> Self {
        Self { level, history }
    }
}
