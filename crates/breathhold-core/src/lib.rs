//! # Breathhold Core Library
//!
//! This library provides the core logic for guided breath-hold training.
//! Every operation is available through the standalone `breathhold` CLI,
//! which is a thin presentation layer over this crate.
//!
//! ## Architecture
//!
//! - **Safety Policy**: pure limit checks run before a session starts and on
//!   every tick of a hold
//! - **Program Catalog**: immutable training programs and their progression
//!   rules
//! - **Session Engine**: a phase state machine that the caller drives by
//!   calling `advance()` with elapsed time
//! - **Runner**: a tokio task that ticks the engine at a fixed rate and
//!   serializes user commands with ticks
//! - **Storage**: SQLite result storage and TOML configuration
//!
//! ## Key Components
//!
//! - [`SessionEngine`]: Core session state machine
//! - [`SessionRunner`]: Fixed-rate async driver
//! - [`SafetyPolicy`]: Experience-level limits
//! - [`ProgramCatalog`]: Built-in training programs
//! - [`Database`]: Session result persistence
//! - [`Config`]: Application configuration management

pub mod engine;
pub mod error;
pub mod events;
pub mod program;
pub mod safety;
pub mod serde_ms;
pub mod session;
pub mod stats;
pub mod storage;

pub use engine::{
    AudioSink, Clock, ManualClock, MemoryStore, PersistenceSink, RunnerConfig, SessionEngine,
    SessionHandle, SessionRunner, SilentAudioSink, SystemClock, TracingAudioSink,
};
pub use error::{
    ConfigError, CoreError, DatabaseError, DenialReason, SessionError, ValidationError,
};
pub use events::Event;
pub use program::{ProgramBuilder, ProgramCatalog, ProgressionRule, TrainingProgram};
pub use safety::{
    ExperienceLevel, HoldDecision, LevelLimits, SafetyContext, SafetyEvent, SafetyEventLog,
    SafetyEventType, SafetyPolicy, Severity, StartDecision, UserHistory,
};
pub use session::{
    CompletionReason, Phase, SafetyCompliance, SessionSnapshot, TrainingSession,
    TrainingSessionResult,
};
pub use stats::{ComplianceBreakdown, HistoryStats};
pub use storage::{Config, Database};
