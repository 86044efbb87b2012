//! Fixed-rate driver for a [`SessionEngine`].
//!
//! The runner task is the single owner of the engine. Commands reach it over
//! an `mpsc` channel and are answered on `oneshot` channels; snapshots go out
//! through a `watch` channel and events through a `broadcast` channel.
//!
//! Once every handle is dropped, a running session continues under the hold
//! ceiling until it ends. A paused or unstarted one is stopped.
//!
//! Ordering: the tick branch of the select loop is polled first, and every
//! command is preceded by a flush of the time elapsed since the last tick,
//! so the hold ceiling is always evaluated before a user command in the
//! same instant.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::engine::SessionEngine;
use crate::error::SessionError;
use crate::events::Event;
use crate::safety::Severity;
use crate::session::{Phase, SessionSnapshot, TrainingSession, TrainingSessionResult};

const COMMAND_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerConfig {
    pub tick_interval: Duration,
    /// Extra delay tolerated between ticks before the timer counts as stalled.
    pub stall_tolerance: Duration,
    /// Session time advanced per unit of real time. 1 outside of demos.
    pub time_scale: u32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            stall_tolerance: Duration::from_secs(2),
            time_scale: 1,
        }
    }
}

impl RunnerConfig {
    pub fn is_stalled(&self, gap: Duration) -> bool {
        gap > self.tick_interval.saturating_add(self.stall_tolerance)
    }
}

enum Command {
    Start(oneshot::Sender<Result<Phase, SessionError>>),
    CompleteHold(oneshot::Sender<Result<Phase, SessionError>>),
    Pause(oneshot::Sender<Result<(), SessionError>>),
    Resume(oneshot::Sender<Result<(), SessionError>>),
    ReportDiscomfort {
        severity: Severity,
        note: Option<String>,
        reply: oneshot::Sender<Result<Phase, SessionError>>,
    },
    Stop(oneshot::Sender<()>),
    EmergencyStop(oneshot::Sender<()>),
}

/// Cloneable async front-end to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    session_id: Uuid,
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Option<SessionSnapshot>>,
    events: broadcast::Sender<Event>,
}

impl SessionHandle {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.snapshots.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Option<SessionSnapshot>> {
        self.snapshots.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub async fn start(&self) -> Result<Phase, SessionError> {
        self.request(Command::Start).await?
    }

    pub async fn complete_hold(&self) -> Result<Phase, SessionError> {
        self.request(Command::CompleteHold).await?
    }

    pub async fn pause(&self) -> Result<(), SessionError> {
        self.request(Command::Pause).await?
    }

    pub async fn resume(&self) -> Result<(), SessionError> {
        self.request(Command::Resume).await?
    }

    pub async fn report_discomfort(
        &self,
        severity: Severity,
        note: Option<String>,
    ) -> Result<Phase, SessionError> {
        self.request(|reply| Command::ReportDiscomfort {
            severity,
            note,
            reply,
        })
        .await?
    }

    /// Graceful abandonment. A runner that has already exited means the
    /// session is finished, so this cannot fail.
    pub async fn stop(&self) {
        let _ = self.request(Command::Stop).await;
    }

    /// Never fails, for the same reason as [`stop`](Self::stop).
    pub async fn emergency_stop(&self) {
        let _ = self.request(Command::EmergencyStop).await;
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| SessionError::RunnerClosed)?;
        rx.await.map_err(|_| SessionError::RunnerClosed)
    }
}

pub struct SessionRunner {
    handle: SessionHandle,
    task: JoinHandle<Option<TrainingSessionResult>>,
}

impl SessionRunner {
    /// Moves the engine onto its own task. The engine must hold a session
    /// that has not finished.
    pub fn spawn(engine: SessionEngine, config: RunnerConfig) -> Result<Self, SessionError> {
        let session_id = match engine.session() {
            Some(session) if !session.is_terminal() => session.id(),
            Some(_) => return Err(SessionError::AlreadyFinalized),
            None => return Err(SessionError::NotFound("no current session".into())),
        };

        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(engine.snapshot());
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

        let task = tokio::spawn(run(
            engine,
            session_id,
            config,
            command_rx,
            snapshot_tx,
            event_tx.clone(),
        ));

        Ok(Self {
            handle: SessionHandle {
                session_id,
                commands: command_tx,
                snapshots: snapshot_rx,
                events: event_tx,
            },
            task,
        })
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Waits for the session to reach a terminal phase.
    pub async fn finished(self) -> Option<TrainingSessionResult> {
        let Self { handle, task } = self;
        drop(handle);
        match task.await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "session runner task failed");
                None
            }
        }
    }
}

async fn run(
    mut engine: SessionEngine,
    session_id: Uuid,
    config: RunnerConfig,
    mut commands: mpsc::Receiver<Command>,
    snapshots: watch::Sender<Option<SessionSnapshot>>,
    events: broadcast::Sender<Event>,
) -> Option<TrainingSessionResult> {
    let mut ticker = tokio::time::interval(config.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_tick = Instant::now();
    let mut commands_open = true;

    info!(session_id = %session_id, tick_ms = config.tick_interval.as_millis() as u64, "session runner started");

    loop {
        tokio::select! {
            biased;

            _ = ticker.tick() => {
                tick(&mut engine, &config, &mut last_tick);
            }

            command = commands.recv(), if commands_open => {
                tick(&mut engine, &config, &mut last_tick);
                match command {
                    Some(command) => apply(&mut engine, session_id, command),
                    None => {
                        commands_open = false;
                        let stuck = engine
                            .session()
                            .is_some_and(|s| s.is_paused() || s.phase() == Phase::Setup);
                        if stuck {
                            warn!(session_id = %session_id, "all session handles dropped; stopping session");
                            engine.stop_session(session_id);
                        } else {
                            info!(session_id = %session_id, "all session handles dropped; running to completion");
                        }
                    }
                }
            }
        }

        for event in engine.drain_events() {
            // No subscribers is fine.
            let _ = events.send(event);
        }
        snapshots.send_replace(engine.snapshot());

        if engine.phase().map_or(true, Phase::is_terminal) {
            break;
        }
    }

    info!(session_id = %session_id, "session runner finished");
    engine.take_result()
}

/// Feeds the time since the last tick into the engine, or reports a fault
/// when the gap is too long for a running session.
fn tick(engine: &mut SessionEngine, config: &RunnerConfig, last_tick: &mut Instant) {
    let now = Instant::now();
    let gap = now.saturating_duration_since(*last_tick);
    *last_tick = now;

    let running = engine.session().is_some_and(TrainingSession::is_running);
    if running && config.is_stalled(gap) {
        engine.timer_fault(&format!(
            "no tick for {}ms (limit {}ms)",
            gap.as_millis(),
            (config.tick_interval + config.stall_tolerance).as_millis()
        ));
    } else {
        engine.advance(gap.saturating_mul(config.time_scale.max(1)));
    }
}

fn apply(engine: &mut SessionEngine, session_id: Uuid, command: Command) {
    // A dropped reply receiver only means the caller stopped waiting.
    match command {
        Command::Start(reply) => {
            let _ = reply.send(engine.start_session(session_id));
        }
        Command::CompleteHold(reply) => {
            let _ = reply.send(engine.complete_current_hold(session_id));
        }
        Command::Pause(reply) => {
            let _ = reply.send(engine.pause_session(session_id));
        }
        Command::Resume(reply) => {
            let _ = reply.send(engine.resume_session(session_id));
        }
        Command::ReportDiscomfort {
            severity,
            note,
            reply,
        } => {
            let _ = reply.send(engine.report_discomfort(session_id, severity, note));
        }
        Command::Stop(reply) => {
            engine.stop_session(session_id);
            let _ = reply.send(());
        }
        Command::EmergencyStop(reply) => {
            engine.emergency_stop(session_id);
            let _ = reply.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::sink::{MemoryStore, SilentAudioSink};
    use crate::program::{ProgressionRule, TrainingProgram};
    use crate::safety::{ExperienceLevel, SafetyContext, SafetyEventType, SafetyPolicy, UserHistory};
    use crate::session::CompletionReason;
    use std::sync::Arc;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn runner(store: MemoryStore) -> SessionRunner {
        runner_with(store, RunnerConfig::default())
    }

    fn runner_with(store: MemoryStore, config: RunnerConfig) -> SessionRunner {
        let program = TrainingProgram::builder("short", "Short")
            .rounds(1)
            .preparation(secs(1))
            .progression(ProgressionRule::Fixed(secs(3)))
            .max_hold(secs(5))
            .recovery(secs(1))
            .build();
        let mut engine = SessionEngine::new(
            SafetyPolicy::default(),
            Box::new(SilentAudioSink),
            Box::new(store),
        );
        engine
            .create_session(
                Arc::new(program),
                SafetyContext::new(ExperienceLevel::Beginner, UserHistory::empty()),
            )
            .unwrap();
        SessionRunner::spawn(engine, config).unwrap()
    }

    #[test]
    fn stall_detection_uses_interval_plus_tolerance() {
        let config = RunnerConfig::default();
        assert!(!config.is_stalled(Duration::from_millis(2100)));
        assert!(config.is_stalled(Duration::from_millis(2101)));
    }

    #[tokio::test(start_paused = true)]
    async fn time_scale_speeds_up_countdowns() {
        let program = TrainingProgram::builder("slow-prep", "Slow prep")
            .preparation(secs(10))
            .build();
        let mut engine = SessionEngine::new(
            SafetyPolicy::default(),
            Box::new(SilentAudioSink),
            Box::new(MemoryStore::new()),
        );
        engine
            .create_session(Arc::new(program), SafetyContext::default())
            .unwrap();
        let config = RunnerConfig {
            time_scale: 10,
            ..RunnerConfig::default()
        };
        let runner = SessionRunner::spawn(engine, config).unwrap();
        let handle = runner.handle();
        handle.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(handle.snapshot().unwrap().phase, Phase::Hold);
        handle.emergency_stop().await;
    }

    #[test]
    fn spawn_requires_a_live_session() {
        let engine = SessionEngine::new(
            SafetyPolicy::default(),
            Box::new(SilentAudioSink),
            Box::new(MemoryStore::new()),
        );
        assert!(SessionRunner::spawn(engine, RunnerConfig::default()).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn runs_a_session_to_completion() {
        let store = MemoryStore::new();
        let runner = runner(store.clone());
        let handle = runner.handle();

        assert_eq!(handle.start().await.unwrap(), Phase::Preparation);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(handle.snapshot().unwrap().phase, Phase::Hold);

        tokio::time::sleep(secs(2)).await;
        assert_eq!(handle.complete_hold().await.unwrap(), Phase::Recovery);
        drop(handle);

        let result = runner.finished().await.unwrap();
        assert_eq!(result.completion_reason, CompletionReason::Completed);
        assert_eq!(result.hold_times.len(), 1);
        assert!(result.hold_times[0] >= secs(2) && result.hold_times[0] < secs(3));
        assert_eq!(store.results().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unreleased_hold_is_stopped_at_the_ceiling() {
        let runner = runner(MemoryStore::new());
        let handle = runner.handle();
        handle.start().await.unwrap();
        drop(handle);

        let result = runner.finished().await.unwrap();
        assert_eq!(result.completion_reason, CompletionReason::SafetyLimitExceeded);
        assert_eq!(
            result.safety_events.count_of(SafetyEventType::LimitExceeded),
            1
        );
        assert_eq!(result.hold_times, vec![secs(5)]);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_ticks_end_the_session_as_a_timer_fault() {
        let store = MemoryStore::new();
        let config = RunnerConfig {
            stall_tolerance: Duration::from_millis(500),
            ..RunnerConfig::default()
        };
        let runner = runner_with(store.clone(), config);
        let handle = runner.handle();
        let mut snapshots = handle.watch();
        handle.start().await.unwrap();
        snapshots
            .wait_for(|s| s.as_ref().is_some_and(|s| s.phase == Phase::Hold))
            .await
            .unwrap();

        // Move the clock past interval + tolerance before the next tick runs.
        tokio::time::advance(Duration::from_millis(800)).await;
        drop(snapshots);
        drop(handle);

        let result = runner.finished().await.unwrap();
        assert_eq!(result.completion_reason, CompletionReason::TimerFault);
        assert_eq!(
            result.safety_events.count_of(SafetyEventType::ValidationFailed),
            1
        );
        assert_eq!(store.results().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_holds_elapsed_time_across_a_long_gap() {
        let runner = runner(MemoryStore::new());
        let handle = runner.handle();
        handle.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(3000)).await;
        handle.pause().await.unwrap();
        let paused_at = handle.snapshot().unwrap().phase_elapsed_ms;

        tokio::time::sleep(secs(60)).await;
        handle.resume().await.unwrap();
        let snapshot = handle.snapshot().unwrap();
        assert_eq!(snapshot.phase, Phase::Hold);
        assert_eq!(snapshot.phase_elapsed_ms, paused_at);
        assert!(!snapshot.paused);

        handle.emergency_stop().await;
        drop(handle);
        let result = runner.finished().await.unwrap();
        assert_eq!(result.completion_reason, CompletionReason::EmergencyStop);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handles_stops_an_unstarted_session() {
        let runner = runner(MemoryStore::new());
        let result = runner.finished().await.unwrap();
        assert_eq!(result.completion_reason, CompletionReason::UserCancelled);
        assert!(!result.was_started());
    }

    #[tokio::test(start_paused = true)]
    async fn double_emergency_stop_is_idempotent() {
        let runner = runner(MemoryStore::new());
        let handle = runner.handle();
        handle.start().await.unwrap();
        handle.emergency_stop().await;
        handle.emergency_stop().await;
        assert_eq!(
            handle.complete_hold().await,
            Err(SessionError::RunnerClosed)
        );
        drop(handle);

        let result = runner.finished().await.unwrap();
        assert_eq!(
            result.safety_events.count_of(SafetyEventType::EmergencyStop),
            1
        );
    }
}
