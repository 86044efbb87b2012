mod aggregate;
mod phase;
mod result;

pub use aggregate::{SessionSnapshot, TrainingSession};
pub use phase::Phase;
pub use result::{
    best_hold, consistency_score, CompletionReason, SafetyCompliance, TrainingSessionResult,
};
