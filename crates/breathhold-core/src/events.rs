use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::safety::SafetyEvent;
use crate::session::{CompletionReason, Phase, SafetyCompliance};

/// Every state change in a session produces an Event.
/// The presentation layer drains or subscribes to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    SessionCreated {
        session_id: Uuid,
        program_id: String,
        at: DateTime<Utc>,
    },
    PhaseChanged {
        session_id: Uuid,
        from: Phase,
        to: Phase,
        round: u32,
        /// Countdown length of the new phase; holds have none.
        duration_ms: Option<u64>,
        at: DateTime<Utc>,
    },
    /// Hold reached the round target. The user may keep holding up to the
    /// safety ceiling.
    HoldTargetReached {
        session_id: Uuid,
        round: u32,
        target_ms: u64,
        at: DateTime<Utc>,
    },
    SessionPaused {
        session_id: Uuid,
        phase: Phase,
        at: DateTime<Utc>,
    },
    SessionResumed {
        session_id: Uuid,
        phase: Phase,
        at: DateTime<Utc>,
    },
    SafetyEventRecorded {
        session_id: Uuid,
        event: SafetyEvent,
    },
    SessionFinalized {
        session_id: Uuid,
        reason: CompletionReason,
        compliance: SafetyCompliance,
        message: String,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn session_id(&self) -> Uuid {
        match self {
            Event::SessionCreated { session_id, .. }
            | Event::PhaseChanged { session_id, .. }
            | Event::HoldTargetReached { session_id, .. }
            | Event::SessionPaused { session_id, .. }
            | Event::SessionResumed { session_id, .. }
            | Event::SafetyEventRecorded { session_id, .. }
            | Event::SessionFinalized { session_id, .. } => *session_id,
        }
    }
}
