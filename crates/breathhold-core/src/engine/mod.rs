mod clock;
#[allow(clippy::module_inception)]
mod engine;
mod scheduler;
mod sink;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::SessionEngine;
pub use scheduler::{RunnerConfig, SessionHandle, SessionRunner};
pub use sink::{AudioSink, MemoryStore, PersistenceSink, SilentAudioSink, TracingAudioSink};
