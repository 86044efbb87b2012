//! Session execution engine.
//!
//! The engine owns the phase state machine for at most one current session.
//! It does not use internal threads or read the wall clock for timing: the
//! caller (usually [`SessionRunner`](super::SessionRunner)) drives it by
//! calling [`SessionEngine::advance`] with the time that has passed.
//!
//! ## State Transitions
//!
//! ```text
//! Setup -> Preparation -> Hold -> Recovery -> Rest -> Preparation ... -> Complete
//!   \__________\___________\________\__________\----> EmergencyStopped
//! ```
//!
//! Every aborted ending (safety limit, timer fault, discomfort, user stop,
//! emergency stop) goes through one path, `abort`, which appends the cause
//! to the safety log and calls `finalize`. `finalize` is also the only place
//! a normal completion ends, so audio stop and persistence always happen
//! together.
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = SessionEngine::new(policy, Box::new(audio), Box::new(store));
//! let session = engine.create_session(program, context)?;
//! engine.start_session(session.session_id)?;
//! // In a loop:
//! engine.advance(tick);
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::clock::{Clock, SystemClock};
use super::sink::{AudioSink, PersistenceSink};
use crate::error::{DenialReason, SessionError};
use crate::events::Event;
use crate::program::TrainingProgram;
use crate::safety::{
    HoldDecision, SafetyContext, SafetyEvent, SafetyEventType, SafetyPolicy, Severity, StartDecision,
    UserHistory,
};
use crate::serde_ms::as_ms;
use crate::session::{
    CompletionReason, Phase, SessionSnapshot, TrainingSession, TrainingSessionResult,
};

/// Seconds before the end of preparation and rest that get a spoken count.
const COUNTDOWN_SECS: [u64; 3] = [3, 2, 1];

pub struct SessionEngine {
    policy: SafetyPolicy,
    audio: Box<dyn AudioSink>,
    persistence: Box<dyn PersistenceSink>,
    clock: Box<dyn Clock>,
    countdown_cues: bool,
    session: Option<TrainingSession>,
    result: Option<TrainingSessionResult>,
    /// Sessions started through this engine, merged into every start check.
    started: UserHistory,
    events: Vec<Event>,
}

impl SessionEngine {
    pub fn new(
        policy: SafetyPolicy,
        audio: Box<dyn AudioSink>,
        persistence: Box<dyn PersistenceSink>,
    ) -> Self {
        Self {
            policy,
            audio,
            persistence,
            clock: Box::new(SystemClock),
            countdown_cues: true,
            session: None,
            result: None,
            started: UserHistory::empty(),
            events: Vec::new(),
        }
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_countdown_cues(mut self, enabled: bool) -> Self {
        self.countdown_cues = enabled;
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn policy(&self) -> &SafetyPolicy {
        &self.policy
    }

    pub fn session(&self) -> Option<&TrainingSession> {
        self.session.as_ref()
    }

    pub fn phase(&self) -> Option<Phase> {
        self.session.as_ref().map(TrainingSession::phase)
    }

    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.session.as_ref().map(TrainingSession::snapshot)
    }

    /// Result of the most recently finalized session.
    pub fn result(&self) -> Option<&TrainingSessionResult> {
        self.result.as_ref()
    }

    pub fn take_result(&mut self) -> Option<TrainingSessionResult> {
        self.result.take()
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Creates the current session after the safety policy approves it.
    ///
    /// Fails if another session is still in progress, if the program is
    /// malformed, or if the policy denies the start.
    pub fn create_session(
        &mut self,
        program: Arc<TrainingProgram>,
        context: SafetyContext,
    ) -> Result<SessionSnapshot, SessionError> {
        if let Some(current) = self.session.as_ref().filter(|s| !s.is_terminal()) {
            return Err(SessionError::SessionActive(current.id().to_string()));
        }
        program
            .validate()
            .map_err(|e| DenialReason::InvalidProgram(e.to_string()))?;

        let now = self.clock.now();
        let history = context.history.merged(&self.started);
        if let StartDecision::Denied(reason) =
            self.policy
                .validate_can_start_session(&history, context.level, &program, now)
        {
            warn!(program = %program.id, level = %context.level, %reason, "session creation denied");
            return Err(reason.into());
        }

        let ceiling = self.policy.max_allowed_hold(context.level, &program);
        let session = TrainingSession::new(program, context, ceiling, now);
        info!(
            session_id = %session.id(),
            program = %session.program().id,
            level = %session.level(),
            ceiling_secs = ceiling.as_secs(),
            "session created"
        );
        self.events.push(Event::SessionCreated {
            session_id: session.id(),
            program_id: session.program().id.clone(),
            at: now,
        });
        let snapshot = session.snapshot();
        self.session = Some(session);
        self.result = None;
        Ok(snapshot)
    }

    /// `Setup -> Preparation`, re-checking the safety policy first.
    ///
    /// A denial is logged on the session and leaves it in setup.
    pub fn start_session(&mut self, id: Uuid) -> Result<Phase, SessionError> {
        let now = self.clock.now();
        let session = live_session(&mut self.session, id)?;
        if session.phase() != Phase::Setup {
            return Err(SessionError::InvalidPhase {
                command: "start",
                phase: session.phase(),
            });
        }

        let history = session.context().history.merged(&self.started);
        let decision = self.policy.validate_can_start_session(
            &history,
            session.level(),
            session.program(),
            now,
        );
        if let StartDecision::Denied(reason) = decision {
            let event_type = match reason {
                DenialReason::RestIntervalNotElapsed { .. } => SafetyEventType::RestPeriodViolation,
                _ => SafetyEventType::ValidationFailed,
            };
            let event = SafetyEvent::new(event_type, Severity::Medium, now)
                .with_action("session start blocked");
            let recorded = session.append_event(event).clone();
            warn!(session_id = %id, %reason, "session start denied");
            self.events.push(Event::SafetyEventRecorded {
                session_id: id,
                event: recorded,
            });
            return Err(reason.into());
        }

        session.mark_started(now);
        self.started.record_start(now);
        self.transition(Phase::Preparation);
        Ok(Phase::Preparation)
    }

    /// User released the hold: `Hold -> Recovery`.
    ///
    /// The safety ceiling is checked before the release is accepted, so a
    /// release that arrives at or past the ceiling still ends in
    /// `EmergencyStopped`.
    pub fn complete_current_hold(&mut self, id: Uuid) -> Result<Phase, SessionError> {
        let session = live_session(&mut self.session, id)?;
        if session.is_paused() {
            return Err(SessionError::Paused);
        }
        if session.phase() != Phase::Hold {
            return Err(SessionError::InvalidPhase {
                command: "complete hold",
                phase: session.phase(),
            });
        }

        let held = session.phase_elapsed();
        if SafetyPolicy::validate_hold_in_progress(held, session.safety_ceiling())
            == HoldDecision::MustRelease
        {
            self.abort_for_limit();
            return Ok(Phase::EmergencyStopped);
        }

        session.record_hold(held);
        info!(
            session_id = %id,
            round = session.round(),
            held_ms = as_ms(held),
            target_ms = as_ms(session.target_hold()),
            "hold completed"
        );
        self.transition(Phase::Recovery);
        Ok(Phase::Recovery)
    }

    /// Freezes the current phase clock.
    pub fn pause_session(&mut self, id: Uuid) -> Result<(), SessionError> {
        let now = self.clock.now();
        let session = live_session(&mut self.session, id)?;
        if session.phase() == Phase::Setup {
            return Err(SessionError::NotStarted);
        }
        if session.is_paused() {
            return Err(SessionError::AlreadyPaused);
        }
        session.set_paused(true);
        info!(session_id = %id, phase = %session.phase(), elapsed_ms = as_ms(session.phase_elapsed()), "session paused");
        self.events.push(Event::SessionPaused {
            session_id: id,
            phase: session.phase(),
            at: now,
        });
        self.audio.speak("Paused.");
        Ok(())
    }

    /// Continues from the stored elapsed time; the pause length is not counted.
    pub fn resume_session(&mut self, id: Uuid) -> Result<(), SessionError> {
        let now = self.clock.now();
        let session = live_session(&mut self.session, id)?;
        if !session.is_paused() {
            return Err(SessionError::NotPaused);
        }
        session.set_paused(false);
        info!(session_id = %id, phase = %session.phase(), elapsed_ms = as_ms(session.phase_elapsed()), "session resumed");
        self.events.push(Event::SessionResumed {
            session_id: id,
            phase: session.phase(),
            at: now,
        });
        self.audio.speak("Resuming.");
        Ok(())
    }

    /// Logs user-reported discomfort. `High` and `Critical` stop the session.
    pub fn report_discomfort(
        &mut self,
        id: Uuid,
        severity: Severity,
        note: Option<String>,
    ) -> Result<Phase, SessionError> {
        let now = self.clock.now();
        let session = live_session(&mut self.session, id)?;

        let mut event = SafetyEvent::new(SafetyEventType::UserReportedDiscomfort, severity, now);
        if let Some(note) = note {
            event = event.with_user_response(note);
        }
        if severity >= Severity::High {
            event = event.with_action("session stopped");
            self.abort(CompletionReason::Discomfort, event);
            return Ok(Phase::EmergencyStopped);
        }

        let recorded = session.append_event(event).clone();
        warn!(session_id = %id, ?severity, "discomfort reported");
        self.events.push(Event::SafetyEventRecorded {
            session_id: id,
            event: recorded,
        });
        Ok(session.phase())
    }

    /// Ends the session immediately. Never fails: an unknown id is logged,
    /// and a finalized session is left untouched.
    pub fn emergency_stop(&mut self, id: Uuid) {
        if !self.accepts_termination(id) {
            return;
        }
        let event = SafetyEvent::new(
            SafetyEventType::EmergencyStop,
            Severity::Critical,
            self.clock.now(),
        )
        .with_action("all timers and audio stopped");
        self.abort(CompletionReason::EmergencyStop, event);
    }

    /// Graceful abandonment. Same path as an emergency stop, recorded as a
    /// user cancellation.
    pub fn stop_session(&mut self, id: Uuid) {
        if !self.accepts_termination(id) {
            return;
        }
        let event = SafetyEvent::new(
            SafetyEventType::SessionTerminated,
            Severity::Low,
            self.clock.now(),
        )
        .with_user_response("user cancelled")
        .with_action("session stopped");
        self.abort(CompletionReason::UserCancelled, event);
    }

    /// The timer driving the session failed. Treated like a limit violation.
    pub fn timer_fault(&mut self, reason: &str) {
        let Some(session) = self.session.as_ref().filter(|s| !s.is_terminal()) else {
            return;
        };
        error!(session_id = %session.id(), reason, "timer fault");
        let event = SafetyEvent::new(
            SafetyEventType::ValidationFailed,
            Severity::High,
            self.clock.now(),
        )
        .with_action(format!("timer fault: {reason}"));
        self.abort(CompletionReason::TimerFault, event);
    }

    /// Moves the current session forward by `by` and returns its phase.
    ///
    /// Time left over when a countdown phase expires carries into the next
    /// phase. In the hold phase the safety ceiling is checked on every call,
    /// including `advance(Duration::ZERO)`. Paused, unstarted and finished
    /// sessions do not move.
    pub fn advance(&mut self, by: Duration) -> Option<Phase> {
        let mut budget = by;
        loop {
            let session = self.session.as_mut()?;
            if !session.is_running() {
                return Some(session.phase());
            }

            let phase = session.phase();
            if phase == Phase::Hold {
                session.add_elapsed(budget);
                let elapsed = session.phase_elapsed();
                if SafetyPolicy::validate_hold_in_progress(elapsed, session.safety_ceiling())
                    == HoldDecision::MustRelease
                {
                    self.abort_for_limit();
                } else if !session.target_announced() && elapsed >= session.target_hold() {
                    session.mark_target_announced();
                    debug!(session_id = %session.id(), round = session.round(), "hold target reached");
                    self.events.push(Event::HoldTargetReached {
                        session_id: session.id(),
                        round: session.round(),
                        target_ms: as_ms(session.target_hold()),
                        at: self.clock.now(),
                    });
                    self.audio.speak("Target reached. Release when ready.");
                }
                return self.phase();
            }

            let remaining = session.phase_remaining().unwrap_or(Duration::ZERO);
            let step = budget.min(remaining);
            session.add_elapsed(step);
            budget -= step;
            let left = remaining - step;

            if self.countdown_cues && matches!(phase, Phase::Preparation | Phase::Rest) {
                for secs in COUNTDOWN_SECS {
                    let mark = Duration::from_secs(secs);
                    if left <= mark && mark < remaining {
                        self.audio.speak(&secs.to_string());
                    }
                }
            }

            if !left.is_zero() {
                return Some(phase);
            }
            self.expire_phase();
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn accepts_termination(&self, id: Uuid) -> bool {
        match self.session.as_ref() {
            Some(s) if s.id() == id => {
                if s.is_terminal() {
                    debug!(session_id = %id, "session already finalized; stop ignored");
                    false
                } else {
                    true
                }
            }
            _ => {
                warn!(session_id = %id, "stop requested for unknown session");
                false
            }
        }
    }

    /// Countdown for the current phase ran out.
    fn expire_phase(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.is_terminal() {
            return;
        }
        match session.phase() {
            Phase::Preparation => self.transition(Phase::Hold),
            Phase::Recovery => {
                if session.program().is_last_round(session.round()) {
                    self.finalize(Phase::Complete, CompletionReason::Completed);
                } else {
                    self.transition(Phase::Rest);
                }
            }
            Phase::Rest => {
                let rested = session.phase_elapsed();
                session.record_rest(rested);
                session.next_round();
                self.transition(Phase::Preparation);
            }
            Phase::Setup | Phase::Hold | Phase::Complete | Phase::EmergencyStopped => {}
        }
    }

    /// Enters a non-terminal phase and announces it.
    fn transition(&mut self, to: Phase) {
        let now = self.clock.now();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.is_terminal() {
            return;
        }
        let from = session.phase();
        let round = session.round();
        let total = session.program().total_rounds;

        let instruction = match to {
            Phase::Preparation => {
                session.enter_phase(Phase::Preparation);
                format!(
                    "Round {} of {}. Prepare: breathe slowly and relax.",
                    round + 1,
                    total
                )
            }
            Phase::Hold => {
                let target = session
                    .program()
                    .target_hold_time(round)
                    .min(session.safety_ceiling());
                session.begin_hold(target);
                format!("Hold your breath. Target {} seconds.", target.as_secs())
            }
            Phase::Recovery => {
                session.enter_phase(Phase::Recovery);
                "Release. Take slow recovery breaths.".to_string()
            }
            Phase::Rest => {
                session.enter_phase(Phase::Rest);
                format!("Rest for {} seconds.", session.program().rest.as_secs())
            }
            Phase::Setup | Phase::Complete | Phase::EmergencyStopped => return,
        };

        info!(session_id = %session.id(), round, %from, %to, "phase transition");
        self.events.push(Event::PhaseChanged {
            session_id: session.id(),
            from,
            to,
            round,
            duration_ms: session.phase_duration().map(as_ms),
            at: now,
        });
        self.audio.speak(&instruction);
    }

    fn abort_for_limit(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        error!(
            session_id = %session.id(),
            round = session.round(),
            elapsed_ms = as_ms(session.phase_elapsed()),
            ceiling_ms = as_ms(session.safety_ceiling()),
            "hold reached safety ceiling"
        );
        let event = SafetyEvent::new(
            SafetyEventType::LimitExceeded,
            Severity::Critical,
            self.clock.now(),
        )
        .with_action("hold ended and session stopped");
        self.abort(CompletionReason::SafetyLimitExceeded, event);
    }

    /// Single path for every aborted ending.
    fn abort(&mut self, reason: CompletionReason, event: SafetyEvent) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.is_terminal() {
            return;
        }
        if session.phase() == Phase::Hold {
            // The last tick may overshoot the ceiling; never record past it.
            let held = session.phase_elapsed().min(session.safety_ceiling());
            session.record_hold(held);
        }
        let recorded = session.append_event(event).clone();
        self.events.push(Event::SafetyEventRecorded {
            session_id: session.id(),
            event: recorded,
        });
        self.finalize(Phase::EmergencyStopped, reason);
    }

    /// Single path into a terminal phase.
    fn finalize(&mut self, phase: Phase, reason: CompletionReason) {
        let now = self.clock.now();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.is_terminal() {
            return;
        }
        let from = session.phase();
        let round = session.round();
        let result = session.finish(phase, reason, now);

        self.audio.stop_all();
        self.audio.speak(reason.message());

        if reason.is_normal_completion() {
            info!(session_id = %result.session_id, rounds = result.rounds_completed(), "session complete");
        } else {
            warn!(session_id = %result.session_id, %reason, %from, "session stopped");
        }

        self.events.push(Event::PhaseChanged {
            session_id: result.session_id,
            from,
            to: phase,
            round,
            duration_ms: None,
            at: now,
        });
        if let Err(e) = self.persistence.store(&result) {
            error!(session_id = %result.session_id, error = %e, "failed to persist session result");
        }
        self.events.push(Event::SessionFinalized {
            session_id: result.session_id,
            reason,
            compliance: result.safety_compliance,
            message: reason.message().to_string(),
            at: now,
        });
        self.result = Some(result);
    }
}

/// The current session, if `id` names it and it has not finished.
fn live_session(
    slot: &mut Option<TrainingSession>,
    id: Uuid,
) -> Result<&mut TrainingSession, SessionError> {
    match slot.as_mut() {
        Some(session) if session.id() == id => {
            if session.is_terminal() {
                Err(SessionError::AlreadyFinalized)
            } else {
                Ok(session)
            }
        }
        _ => Err(SessionError::NotFound(id.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::clock::ManualClock;
    use crate::engine::sink::MemoryStore;
    use crate::program::ProgressionRule;
    use crate::safety::ExperienceLevel;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;

    #[derive(Default, Clone)]
    struct RecordingAudio {
        cues: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingAudio {
        fn cues(&self) -> Vec<String> {
            self.cues.lock().unwrap().clone()
        }
    }

    impl AudioSink for RecordingAudio {
        fn speak(&mut self, instruction: &str) {
            self.cues.lock().unwrap().push(instruction.to_string());
        }

        fn stop_all(&mut self) {
            self.cues.lock().unwrap().push("<stop>".to_string());
        }
    }

    struct Harness {
        engine: SessionEngine,
        audio: RecordingAudio,
        store: MemoryStore,
        clock: ManualClock,
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn harness() -> Harness {
        let audio = RecordingAudio::default();
        let store = MemoryStore::new();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap());
        let engine = SessionEngine::new(
            SafetyPolicy::default(),
            Box::new(audio.clone()),
            Box::new(store.clone()),
        )
        .with_clock(Box::new(clock.clone()))
        .with_countdown_cues(false);
        Harness {
            engine,
            audio,
            store,
            clock,
        }
    }

    fn program(rounds: u32) -> Arc<TrainingProgram> {
        Arc::new(
            TrainingProgram::builder("test", "Test")
                .rounds(rounds)
                .preparation(secs(5))
                .progression(ProgressionRule::Fixed(secs(20)))
                .max_hold(secs(25))
                .recovery(secs(5))
                .rest(secs(10))
                .build(),
        )
    }

    fn beginner() -> SafetyContext {
        SafetyContext::new(ExperienceLevel::Beginner, UserHistory::empty())
    }

    fn started(h: &mut Harness, rounds: u32) -> Uuid {
        let id = h
            .engine
            .create_session(program(rounds), beginner())
            .unwrap()
            .session_id;
        h.engine.start_session(id).unwrap();
        id
    }

    #[test]
    fn preparation_expires_into_hold_with_clamped_target() {
        let mut h = harness();
        let id = started(&mut h, 2);
        assert_eq!(h.engine.phase(), Some(Phase::Preparation));

        assert_eq!(h.engine.advance(secs(5)), Some(Phase::Hold));
        let session = h.engine.session().unwrap();
        assert_eq!(session.target_hold(), secs(20));
        assert_eq!(session.safety_ceiling(), secs(25));
        assert_eq!(session.id(), id);
    }

    #[test]
    fn full_session_runs_to_completion() {
        let mut h = harness();
        let id = started(&mut h, 2);

        h.engine.advance(secs(5));
        h.engine.advance(secs(18));
        assert_eq!(h.engine.complete_current_hold(id).unwrap(), Phase::Recovery);
        assert_eq!(h.engine.advance(secs(5)), Some(Phase::Rest));
        assert_eq!(h.engine.advance(secs(10)), Some(Phase::Preparation));
        assert_eq!(h.engine.session().unwrap().round(), 1);
        h.engine.advance(secs(5));
        h.engine.advance(secs(21));
        h.engine.complete_current_hold(id).unwrap();
        assert_eq!(h.engine.advance(secs(5)), Some(Phase::Complete));

        let result = h.engine.result().unwrap();
        assert_eq!(result.completion_reason, CompletionReason::Completed);
        assert_eq!(result.hold_times, vec![secs(18), secs(21)]);
        assert_eq!(result.rest_times, vec![secs(10)]);
        assert_eq!(result.best_hold, secs(21));
        assert_eq!(result.total_duration, secs(5 + 18 + 5 + 10 + 5 + 21 + 5));
        assert_eq!(h.store.results().len(), 1);
        assert!(h.audio.cues().contains(&"<stop>".to_string()));
    }

    #[test]
    fn large_tick_carries_across_phase_boundaries() {
        let mut h = harness();
        started(&mut h, 1);
        // 5s preparation, then 3s into the hold.
        assert_eq!(h.engine.advance(secs(8)), Some(Phase::Hold));
        assert_eq!(h.engine.session().unwrap().phase_elapsed(), secs(3));
    }

    #[test]
    fn hold_reaching_ceiling_forces_emergency_stop() {
        let mut h = harness();
        let id = started(&mut h, 2);
        h.engine.advance(secs(5));
        h.engine.advance(secs(24));
        assert_eq!(h.engine.phase(), Some(Phase::Hold));

        assert_eq!(h.engine.advance(secs(1)), Some(Phase::EmergencyStopped));
        let events = h.engine.session().unwrap().safety_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events.as_slice()[0].event_type, SafetyEventType::LimitExceeded);
        assert_eq!(events.as_slice()[0].severity, Severity::Critical);
        assert_eq!(
            h.engine.result().unwrap().completion_reason,
            CompletionReason::SafetyLimitExceeded
        );

        assert_eq!(
            h.engine.complete_current_hold(id),
            Err(SessionError::AlreadyFinalized)
        );
    }

    #[test]
    fn release_at_ceiling_loses_to_the_limit() {
        let mut h = harness();
        let id = started(&mut h, 2);
        h.engine.advance(secs(5));
        // Drive the aggregate to the ceiling without an intervening tick check.
        h.engine.session.as_mut().unwrap().add_elapsed(secs(25));

        assert_eq!(
            h.engine.complete_current_hold(id).unwrap(),
            Phase::EmergencyStopped
        );
        assert_eq!(
            h.engine
                .session()
                .unwrap()
                .safety_events()
                .count_of(SafetyEventType::LimitExceeded),
            1
        );
    }

    #[test]
    fn overshooting_tick_records_the_hold_at_the_ceiling() {
        let mut h = harness();
        started(&mut h, 1);
        h.engine.advance(secs(5));
        assert_eq!(h.engine.advance(secs(40)), Some(Phase::EmergencyStopped));

        let result = h.engine.result().unwrap();
        assert_eq!(result.hold_times, vec![secs(25)]);
        assert_eq!(result.best_hold, secs(25));
        assert_eq!(h.store.results()[0].hold_times, vec![secs(25)]);
    }

    #[test]
    fn start_denied_on_recheck_stays_in_setup() {
        let mut h = harness();
        // 4h30m before creation: enough rest at 09:00, not at 08:00.
        let earlier = Utc.with_ymd_and_hms(2026, 3, 14, 4, 30, 0).unwrap();
        let context = SafetyContext::new(ExperienceLevel::Beginner, UserHistory::new(vec![earlier]));
        let id = h
            .engine
            .create_session(program(1), context)
            .unwrap()
            .session_id;

        h.clock.set(Utc.with_ymd_and_hms(2026, 3, 14, 8, 0, 0).unwrap());
        let err = h.engine.start_session(id).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Denied(DenialReason::RestIntervalNotElapsed { .. })
        ));

        let session = h.engine.session().unwrap();
        assert_eq!(session.phase(), Phase::Setup);
        assert!(session.started_at().is_none());
        let events = session.safety_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events.count_of(SafetyEventType::RestPeriodViolation), 1);
        assert_eq!(events.as_slice()[0].severity, Severity::Medium);
        assert!(h.store.results().is_empty());
        assert!(h
            .engine
            .drain_events()
            .iter()
            .any(|e| matches!(e, Event::SafetyEventRecorded { .. })));
    }

    #[test]
    fn target_reached_is_announced_once() {
        let mut h = harness();
        started(&mut h, 1);
        h.engine.advance(secs(5));
        h.engine.advance(secs(20));
        h.engine.advance(secs(1));
        let announced = h
            .audio
            .cues()
            .iter()
            .filter(|c| c.starts_with("Target reached"))
            .count();
        assert_eq!(announced, 1);
        assert_eq!(h.engine.phase(), Some(Phase::Hold));
    }

    #[test]
    fn pause_freezes_hold_elapsed() {
        let mut h = harness();
        let id = started(&mut h, 1);
        h.engine.advance(secs(5));
        h.engine.advance(secs(12));
        h.engine.pause_session(id).unwrap();

        h.clock.advance(chrono::Duration::minutes(10));
        h.engine.advance(secs(600));
        h.engine.resume_session(id).unwrap();

        let session = h.engine.session().unwrap();
        assert_eq!(session.phase(), Phase::Hold);
        assert_eq!(session.phase_elapsed(), secs(12));
    }

    #[test]
    fn pause_rules() {
        let mut h = harness();
        let id = h
            .engine
            .create_session(program(1), beginner())
            .unwrap()
            .session_id;
        assert_eq!(h.engine.pause_session(id), Err(SessionError::NotStarted));
        h.engine.start_session(id).unwrap();
        assert_eq!(h.engine.resume_session(id), Err(SessionError::NotPaused));
        h.engine.pause_session(id).unwrap();
        assert_eq!(h.engine.pause_session(id), Err(SessionError::AlreadyPaused));
        h.engine.advance(secs(5));
        assert_eq!(h.engine.phase(), Some(Phase::Preparation));
    }

    #[test]
    fn complete_hold_outside_hold_is_rejected() {
        let mut h = harness();
        let id = started(&mut h, 1);
        assert_eq!(
            h.engine.complete_current_hold(id),
            Err(SessionError::InvalidPhase {
                command: "complete hold",
                phase: Phase::Preparation,
            })
        );
        assert_eq!(h.engine.phase(), Some(Phase::Preparation));
    }

    #[test]
    fn emergency_stop_twice_logs_one_event() {
        let mut h = harness();
        let id = started(&mut h, 2);
        h.engine.emergency_stop(id);
        h.engine.emergency_stop(id);

        let session = h.engine.session().unwrap();
        assert_eq!(session.phase(), Phase::EmergencyStopped);
        assert_eq!(
            session
                .safety_events()
                .count_of(SafetyEventType::EmergencyStop),
            1
        );
        assert_eq!(h.store.results().len(), 1);
        assert_eq!(h.engine.advance(secs(60)), Some(Phase::EmergencyStopped));
    }

    #[test]
    fn stop_session_records_user_cancellation() {
        let mut h = harness();
        let id = started(&mut h, 2);
        h.engine.stop_session(id);
        let result = h.engine.result().unwrap();
        assert_eq!(result.completion_reason, CompletionReason::UserCancelled);
        assert_eq!(
            result.safety_events.as_slice()[0].event_type,
            SafetyEventType::SessionTerminated
        );
    }

    #[test]
    fn commands_on_unknown_session_are_rejected() {
        let mut h = harness();
        started(&mut h, 1);
        let stranger = Uuid::new_v4();

        h.engine.emergency_stop(stranger);
        assert_eq!(h.engine.phase(), Some(Phase::Preparation));
        assert_eq!(
            h.engine.pause_session(stranger),
            Err(SessionError::NotFound(stranger.to_string()))
        );
    }

    #[test]
    fn timer_fault_converges_on_emergency_stop() {
        let mut h = harness();
        started(&mut h, 1);
        h.engine.timer_fault("tick stalled");
        let result = h.engine.result().unwrap();
        assert_eq!(result.completion_reason, CompletionReason::TimerFault);
        assert_eq!(
            result.safety_events.as_slice()[0].event_type,
            SafetyEventType::ValidationFailed
        );
    }

    #[test]
    fn mild_discomfort_is_logged_and_severe_discomfort_stops() {
        let mut h = harness();
        let id = started(&mut h, 1);
        assert_eq!(
            h.engine
                .report_discomfort(id, Severity::Low, Some("slight tingling".into()))
                .unwrap(),
            Phase::Preparation
        );
        assert_eq!(
            h.engine
                .report_discomfort(id, Severity::High, Some("dizzy".into()))
                .unwrap(),
            Phase::EmergencyStopped
        );
        let result = h.engine.result().unwrap();
        assert_eq!(result.completion_reason, CompletionReason::Discomfort);
        assert_eq!(result.safety_events.len(), 2);
    }

    #[test]
    fn second_session_is_denied_until_rest_interval_passes() {
        let mut h = harness();
        let id = started(&mut h, 1);
        h.engine.stop_session(id);

        let denied = h.engine.create_session(program(1), beginner());
        assert!(matches!(
            denied,
            Err(SessionError::Denied(DenialReason::RestIntervalNotElapsed { .. }))
        ));

        h.clock.advance(chrono::Duration::hours(5));
        assert!(h.engine.create_session(program(1), beginner()).is_ok());
    }

    #[test]
    fn cannot_create_while_a_session_is_active() {
        let mut h = harness();
        started(&mut h, 1);
        assert!(matches!(
            h.engine.create_session(program(1), beginner()),
            Err(SessionError::SessionActive(_))
        ));
    }

    #[test]
    fn malformed_program_is_denied() {
        let mut h = harness();
        let bad = Arc::new(TrainingProgram::builder("bad", "Bad").rounds(0).build());
        assert!(matches!(
            h.engine.create_session(bad, beginner()),
            Err(SessionError::Denied(DenialReason::InvalidProgram(_)))
        ));
    }

    #[test]
    fn countdown_cues_fire_in_final_seconds() {
        let mut h = harness();
        h.engine.countdown_cues = true;
        started(&mut h, 1);
        for _ in 0..50 {
            h.engine.advance(Duration::from_millis(100));
        }
        let counts: Vec<String> = h
            .audio
            .cues()
            .into_iter()
            .filter(|c| ["3", "2", "1"].contains(&c.as_str()))
            .collect();
        assert_eq!(counts, vec!["3", "2", "1"]);
        assert_eq!(h.engine.phase(), Some(Phase::Hold));
    }
}
