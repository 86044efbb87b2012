//! Collaborators the engine reports to. Neither feeds decisions back.

use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::session::TrainingSessionResult;

/// Spoken instructions. Fire-and-forget.
pub trait AudioSink: Send {
    fn speak(&mut self, instruction: &str);

    /// Silences anything queued or playing. Called synchronously on every
    /// terminal transition.
    fn stop_all(&mut self);
}

/// Receives each finalized result exactly once.
pub trait PersistenceSink: Send {
    fn store(&mut self, result: &TrainingSessionResult) -> Result<()>;
}

/// Routes instructions to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAudioSink;

impl AudioSink for TracingAudioSink {
    fn speak(&mut self, instruction: &str) {
        tracing::info!(target: "breathhold::audio", "{instruction}");
    }

    fn stop_all(&mut self) {
        tracing::debug!(target: "breathhold::audio", "audio stopped");
    }
}

/// Discards every instruction.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentAudioSink;

impl AudioSink for SilentAudioSink {
    fn speak(&mut self, _instruction: &str) {}

    fn stop_all(&mut self) {}
}

/// In-memory results. Clones share the same storage.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    results: Arc<Mutex<Vec<TrainingSessionResult>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> Vec<TrainingSessionResult> {
        self.results
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl PersistenceSink for MemoryStore {
    fn store(&mut self, result: &TrainingSessionResult) -> Result<()> {
        if let Ok(mut results) = self.results.lock() {
            results.push(result.clone());
        }
        Ok(())
    }
}
