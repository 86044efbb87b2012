//! Finalized session summary handed to persistence.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::safety::{ExperienceLevel, SafetyEventLog, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    Completed,
    UserCancelled,
    EmergencyStop,
    SafetyLimitExceeded,
    TimerFault,
    Discomfort,
}

impl CompletionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CompletionReason::Completed => "completed",
            CompletionReason::UserCancelled => "user_cancelled",
            CompletionReason::EmergencyStop => "emergency_stop",
            CompletionReason::SafetyLimitExceeded => "safety_limit_exceeded",
            CompletionReason::TimerFault => "timer_fault",
            CompletionReason::Discomfort => "discomfort",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(CompletionReason::Completed),
            "user_cancelled" => Some(CompletionReason::UserCancelled),
            "emergency_stop" => Some(CompletionReason::EmergencyStop),
            "safety_limit_exceeded" => Some(CompletionReason::SafetyLimitExceeded),
            "timer_fault" => Some(CompletionReason::TimerFault),
            "discomfort" => Some(CompletionReason::Discomfort),
            _ => None,
        }
    }

    /// Human-readable reason shown when a session ends.
    pub fn message(self) -> &'static str {
        match self {
            CompletionReason::Completed => "Session complete. Well done.",
            CompletionReason::UserCancelled => "Session cancelled.",
            CompletionReason::EmergencyStop => "Emergency stop. Breathe normally.",
            CompletionReason::SafetyLimitExceeded => {
                "Safety limit reached. Session stopped. Breathe normally."
            }
            CompletionReason::TimerFault => "Timer fault detected. Session stopped for safety.",
            CompletionReason::Discomfort => "Discomfort reported. Session stopped. Breathe normally.",
        }
    }

    pub fn is_normal_completion(self) -> bool {
        self == CompletionReason::Completed
    }
}

impl fmt::Display for CompletionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyCompliance {
    Compliant,
    MinorIssues,
    MajorIssues,
    EmergencyStop,
}

impl SafetyCompliance {
    pub fn from_severity(severity: Severity) -> Self {
        match severity {
            Severity::Low | Severity::Medium => SafetyCompliance::MinorIssues,
            Severity::High => SafetyCompliance::MajorIssues,
            Severity::Critical => SafetyCompliance::EmergencyStop,
        }
    }

    /// Worst classification implied by any event in the log.
    pub fn classify(log: &SafetyEventLog) -> Self {
        log.iter()
            .map(|e| Self::from_severity(e.severity))
            .max()
            .unwrap_or(SafetyCompliance::Compliant)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SafetyCompliance::Compliant => "compliant",
            SafetyCompliance::MinorIssues => "minor_issues",
            SafetyCompliance::MajorIssues => "major_issues",
            SafetyCompliance::EmergencyStop => "emergency_stop",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "compliant" => Some(SafetyCompliance::Compliant),
            "minor_issues" => Some(SafetyCompliance::MinorIssues),
            "major_issues" => Some(SafetyCompliance::MajorIssues),
            "emergency_stop" => Some(SafetyCompliance::EmergencyStop),
            _ => None,
        }
    }
}

/// Immutable summary of one finished session. Built exactly once, at finalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSessionResult {
    pub session_id: Uuid,
    pub program_id: String,
    pub level: ExperienceLevel,
    /// `None` when the session was finalized before it left setup.
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: DateTime<Utc>,
    /// Time actually spent in running phases, pauses excluded.
    #[serde(with = "crate::serde_ms")]
    pub total_duration: Duration,
    #[serde(with = "crate::serde_ms::vec")]
    pub hold_times: Vec<Duration>,
    #[serde(with = "crate::serde_ms::vec")]
    pub rest_times: Vec<Duration>,
    pub safety_events: SafetyEventLog,
    pub completion_reason: CompletionReason,
    #[serde(with = "crate::serde_ms")]
    pub best_hold: Duration,
    pub consistency_score: f64,
    pub safety_compliance: SafetyCompliance,
}

impl TrainingSessionResult {
    /// Builds the result, deriving every metric from the recorded data.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: Uuid,
        program_id: impl Into<String>,
        level: ExperienceLevel,
        started_at: Option<DateTime<Utc>>,
        ended_at: DateTime<Utc>,
        total_duration: Duration,
        hold_times: Vec<Duration>,
        rest_times: Vec<Duration>,
        safety_events: SafetyEventLog,
        completion_reason: CompletionReason,
    ) -> Self {
        Self {
            best_hold: best_hold(&hold_times),
            consistency_score: consistency_score(&hold_times),
            safety_compliance: SafetyCompliance::classify(&safety_events),
            session_id,
            program_id: program_id.into(),
            level,
            started_at,
            ended_at,
            total_duration,
            hold_times,
            rest_times,
            safety_events,
            completion_reason,
        }
    }

    pub fn rounds_completed(&self) -> usize {
        self.hold_times.len()
    }

    pub fn was_started(&self) -> bool {
        self.started_at.is_some()
    }
}

pub fn best_hold(holds: &[Duration]) -> Duration {
    holds.iter().copied().max().unwrap_or(Duration::ZERO)
}

/// `1 - coefficient of variation`, clamped to `[0, 1]`.
///
/// One hold scores 1.0; no holds score 0.0.
pub fn consistency_score(holds: &[Duration]) -> f64 {
    match holds.len() {
        0 => 0.0,
        1 => 1.0,
        n => {
            let secs: Vec<f64> = holds.iter().map(Duration::as_secs_f64).collect();
            let mean = secs.iter().sum::<f64>() / n as f64;
            if mean <= 0.0 {
                return 0.0;
            }
            let variance = secs.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n as f64;
            (1.0 - variance.sqrt() / mean).clamp(0.0, 1.0)
        }
    }
}
