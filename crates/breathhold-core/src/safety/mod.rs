mod context;
mod event;
mod level;
mod policy;

pub use context::{SafetyContext, UserHistory};
pub use event::{SafetyEvent, SafetyEventLog, SafetyEventType, Severity};
pub use level::ExperienceLevel;
pub use policy::{HoldDecision, LevelLimits, SafetyPolicy, StartDecision};
