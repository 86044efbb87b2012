use std::fmt;

use serde::{Deserialize, Serialize};

/// Session state machine phases.
///
/// ```text
/// Setup -> Preparation -> Hold -> Recovery -> (Rest -> Preparation ...) -> Complete
///             any non-terminal phase -> EmergencyStopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Setup,
    Preparation,
    Hold,
    Recovery,
    Rest,
    Complete,
    EmergencyStopped,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Complete | Phase::EmergencyStopped)
    }

    /// Phases that run a countdown of known length.
    pub fn is_timed(self) -> bool {
        matches!(self, Phase::Preparation | Phase::Recovery | Phase::Rest)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Setup => "setup",
            Phase::Preparation => "preparation",
            Phase::Hold => "hold",
            Phase::Recovery => "recovery",
            Phase::Rest => "rest",
            Phase::Complete => "complete",
            Phase::EmergencyStopped => "emergency stopped",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
