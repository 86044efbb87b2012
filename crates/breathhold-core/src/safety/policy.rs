//! Safety policy: pure limit checks applied before and during every session.
//!
//! The policy holds per-level limits and nothing else. Every check is a
//! function of its arguments, so the engine can call them on every tick.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::context::UserHistory;
use super::level::ExperienceLevel;
use crate::error::DenialReason;
use crate::program::TrainingProgram;

/// Limits applied to one experience level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelLimits {
    #[serde(with = "crate::serde_ms")]
    pub max_safe_hold: Duration,
    #[serde(with = "crate::serde_ms")]
    pub min_rest_between_sessions: Duration,
    pub daily_session_limit: u32,
}

impl LevelLimits {
    pub fn defaults_for(level: ExperienceLevel) -> Self {
        let (rest_min, daily) = match level {
            ExperienceLevel::Beginner => (240, 2),
            ExperienceLevel::Intermediate => (120, 3),
            ExperienceLevel::Advanced => (60, 4),
        };
        Self {
            max_safe_hold: level.max_safe_hold_time(),
            min_rest_between_sessions: Duration::from_secs(rest_min * 60),
            daily_session_limit: daily,
        }
    }

    /// True when no limit is looser than the built-in ones for `level`.
    pub fn within_defaults(&self, level: ExperienceLevel) -> bool {
        let defaults = Self::defaults_for(level);
        self.max_safe_hold <= defaults.max_safe_hold
            && self.min_rest_between_sessions >= defaults.min_rest_between_sessions
            && self.daily_session_limit <= defaults.daily_session_limit
    }

    /// Each limit replaced by the built-in one for `level` where it is looser.
    pub fn clamped_to_defaults(self, level: ExperienceLevel) -> Self {
        let defaults = Self::defaults_for(level);
        Self {
            max_safe_hold: self.max_safe_hold.min(defaults.max_safe_hold),
            min_rest_between_sessions: self
                .min_rest_between_sessions
                .max(defaults.min_rest_between_sessions),
            daily_session_limit: self.daily_session_limit.min(defaults.daily_session_limit),
        }
    }
}

/// Outcome of a session-start check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartDecision {
    Approved,
    Denied(DenialReason),
}

impl StartDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, StartDecision::Approved)
    }

    pub fn into_result(self) -> Result<(), DenialReason> {
        match self {
            StartDecision::Approved => Ok(()),
            StartDecision::Denied(reason) => Err(reason),
        }
    }
}

/// Outcome of the per-tick hold check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldDecision {
    Continue,
    MustRelease,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyPolicy {
    beginner: LevelLimits,
    intermediate: LevelLimits,
    advanced: LevelLimits,
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self {
            beginner: LevelLimits::defaults_for(ExperienceLevel::Beginner),
            intermediate: LevelLimits::defaults_for(ExperienceLevel::Intermediate),
            advanced: LevelLimits::defaults_for(ExperienceLevel::Advanced),
        }
    }
}

impl SafetyPolicy {
    /// Builds a policy from per-level limits. Limits may only be tightened;
    /// anything looser than the built-in values is clamped back to them.
    pub fn new(beginner: LevelLimits, intermediate: LevelLimits, advanced: LevelLimits) -> Self {
        Self {
            beginner: beginner.clamped_to_defaults(ExperienceLevel::Beginner),
            intermediate: intermediate.clamped_to_defaults(ExperienceLevel::Intermediate),
            advanced: advanced.clamped_to_defaults(ExperienceLevel::Advanced),
        }
    }

    pub fn limits(&self, level: ExperienceLevel) -> &LevelLimits {
        match level {
            ExperienceLevel::Beginner => &self.beginner,
            ExperienceLevel::Intermediate => &self.intermediate,
            ExperienceLevel::Advanced => &self.advanced,
        }
    }

    /// Safety ceiling: the lesser of the level limit and the program's hard maximum.
    pub fn max_allowed_hold(&self, level: ExperienceLevel, program: &TrainingProgram) -> Duration {
        self.limits(level).max_safe_hold.min(program.max_hold_time)
    }

    /// Minimum rest that must separate two session starts for this program.
    pub fn min_rest_interval(&self, level: ExperienceLevel, program: &TrainingProgram) -> Duration {
        self.limits(level)
            .min_rest_between_sessions
            .max(program.min_rest_between_sessions)
    }

    /// Checks whether a new session may start at `now`.
    ///
    /// Rules, in order: required experience, rest since the last session
    /// start, then the daily ceiling for the UTC day containing `now`.
    pub fn validate_can_start_session(
        &self,
        history: &UserHistory,
        level: ExperienceLevel,
        program: &TrainingProgram,
        now: DateTime<Utc>,
    ) -> StartDecision {
        if level < program.required_level {
            return StartDecision::Denied(DenialReason::InsufficientExperience {
                required: program.required_level,
                actual: level,
            });
        }

        if let Some(last) = history.last_session_start() {
            let min_rest = self.min_rest_interval(level, program);
            // A start recorded in the future counts as zero elapsed rest.
            let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
            if elapsed < min_rest {
                return StartDecision::Denied(DenialReason::RestIntervalNotElapsed {
                    remaining: min_rest - elapsed,
                });
            }
        }

        let limit = self.limits(level).daily_session_limit;
        if history.sessions_on(now.date_naive()) >= limit {
            return StartDecision::Denied(DenialReason::DailyLimitReached { limit });
        }

        StartDecision::Approved
    }

    /// Evaluated on every tick of the hold phase.
    pub fn validate_hold_in_progress(current_elapsed: Duration, allowed_max: Duration) -> HoldDecision {
        if current_elapsed >= allowed_max {
            HoldDecision::MustRelease
        } else {
            HoldDecision::Continue
        }
    }
}
