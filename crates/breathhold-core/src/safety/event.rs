//! Safety events and the append-only log a session keeps of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyEventType {
    /// Hold reached the safety ceiling.
    LimitExceeded,
    UserReportedDiscomfort,
    EmergencyStop,
    /// Session ended by the user before completion.
    SessionTerminated,
    /// Start attempted before the minimum rest between sessions elapsed.
    RestPeriodViolation,
    /// A policy check or the timer subsystem failed.
    ValidationFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::str::FromStr for Severity {
    type Err = crate::error::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(crate::error::ValidationError::InvalidValue {
                field: "severity".into(),
                message: format!("unknown severity '{other}'"),
            }),
        }
    }
}

/// Immutable record of something safety-relevant that happened in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyEvent {
    pub id: Uuid,
    pub at: DateTime<Utc>,
    pub event_type: SafetyEventType,
    pub severity: Severity,
    #[serde(default)]
    pub user_response: Option<String>,
    #[serde(default)]
    pub action_taken: Option<String>,
}

impl SafetyEvent {
    pub fn new(event_type: SafetyEventType, severity: Severity, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            at,
            event_type,
            severity,
            user_response: None,
            action_taken: None,
        }
    }

    pub fn with_user_response(mut self, response: impl Into<String>) -> Self {
        self.user_response = Some(response.into());
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action_taken = Some(action.into());
        self
    }
}

/// Append-only event log.
///
/// There is no way to remove or edit an entry once pushed. Readers get a
/// slice, which is always a complete prefix of what will eventually be
/// recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SafetyEventLog {
    events: Vec<SafetyEvent>,
}

impl SafetyEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, event: SafetyEvent) -> &SafetyEvent {
        self.events.push(event);
        &self.events[self.events.len() - 1]
    }

    pub fn as_slice(&self) -> &[SafetyEvent] {
        &self.events
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SafetyEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn count_of(&self, event_type: SafetyEventType) -> usize {
        self.events
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub fn worst_severity(&self) -> Option<Severity> {
        self.events.iter().map(|e| e.severity).max()
    }
}

impl<'a> IntoIterator for &'a SafetyEventLog {
    type Item = &'a SafetyEvent;
    type IntoIter = std::slice::Iter<'a, SafetyEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
