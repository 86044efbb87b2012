//! The mutable record of one session.
//!
//! Only the engine mutates a session; every mutator is `pub(crate)`. The
//! presentation layer reads through accessors or a [`SessionSnapshot`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::phase::Phase;
use super::result::{CompletionReason, TrainingSessionResult};
use crate::program::TrainingProgram;
use crate::safety::{ExperienceLevel, SafetyContext, SafetyEvent, SafetyEventLog};
use crate::serde_ms::as_ms;

#[derive(Debug, Clone)]
pub struct TrainingSession {
    id: Uuid,
    program: Arc<TrainingProgram>,
    context: SafetyContext,
    /// Frozen at creation from the context and the policy.
    level: ExperienceLevel,
    safety_ceiling: Duration,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    phase: Phase,
    round: u32,
    phase_elapsed: Duration,
    target_hold: Duration,
    target_announced: bool,
    active_time: Duration,
    hold_times: Vec<Duration>,
    rest_times: Vec<Duration>,
    events: SafetyEventLog,
    paused: bool,
    completion: Option<CompletionReason>,
}

impl TrainingSession {
    pub(crate) fn new(
        program: Arc<TrainingProgram>,
        context: SafetyContext,
        safety_ceiling: Duration,
        created_at: DateTime<Utc>,
    ) -> Self {
        let level = context.level;
        Self {
            id: Uuid::new_v4(),
            program,
            context,
            level,
            safety_ceiling,
            created_at,
            started_at: None,
            ended_at: None,
            phase: Phase::Setup,
            round: 0,
            phase_elapsed: Duration::ZERO,
            target_hold: Duration::ZERO,
            target_announced: false,
            active_time: Duration::ZERO,
            hold_times: Vec::new(),
            rest_times: Vec::new(),
            events: SafetyEventLog::new(),
            paused: false,
            completion: None,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn program(&self) -> &Arc<TrainingProgram> {
        &self.program
    }

    pub fn context(&self) -> &SafetyContext {
        &self.context
    }

    pub fn level(&self) -> ExperienceLevel {
        self.level
    }

    pub fn safety_ceiling(&self) -> Duration {
        self.safety_ceiling
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn phase_elapsed(&self) -> Duration {
        self.phase_elapsed
    }

    /// Planned length of the current phase, if it is a countdown.
    pub fn phase_duration(&self) -> Option<Duration> {
        match self.phase {
            Phase::Preparation => Some(self.program.preparation),
            Phase::Recovery => Some(self.program.recovery),
            Phase::Rest => Some(self.program.rest),
            _ => None,
        }
    }

    pub fn phase_remaining(&self) -> Option<Duration> {
        self.phase_duration()
            .map(|d| d.saturating_sub(self.phase_elapsed))
    }

    pub fn target_hold(&self) -> Duration {
        self.target_hold
    }

    pub fn target_announced(&self) -> bool {
        self.target_announced
    }

    pub fn active_time(&self) -> Duration {
        self.active_time
    }

    pub fn hold_times(&self) -> &[Duration] {
        &self.hold_times
    }

    pub fn rest_times(&self) -> &[Duration] {
        &self.rest_times
    }

    pub fn safety_events(&self) -> &SafetyEventLog {
        &self.events
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Setup counts as not yet running; so does any paused or finished session.
    pub fn is_running(&self) -> bool {
        !self.paused && self.phase != Phase::Setup && !self.phase.is_terminal()
    }

    pub fn completion(&self) -> Option<CompletionReason> {
        self.completion
    }

    /// 0.0 ..= 1.0 progress through the current phase. Holds measure
    /// against the round target.
    pub fn progress(&self) -> f64 {
        let total = match self.phase {
            Phase::Hold => self.target_hold,
            _ => match self.phase_duration() {
                Some(d) => d,
                None => return if self.phase == Phase::Complete { 1.0 } else { 0.0 },
            },
        };
        if total.is_zero() {
            return 1.0;
        }
        (self.phase_elapsed.as_secs_f64() / total.as_secs_f64()).min(1.0)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            program_id: self.program.id.clone(),
            phase: self.phase,
            round: self.round,
            total_rounds: self.program.total_rounds,
            paused: self.paused,
            phase_elapsed_ms: as_ms(self.phase_elapsed),
            phase_remaining_ms: self.phase_remaining().map(as_ms),
            target_hold_ms: as_ms(self.target_hold),
            safety_ceiling_ms: as_ms(self.safety_ceiling),
            progress: self.progress(),
            safety_event_count: self.events.len(),
            completion: self.completion,
        }
    }

    // ── Mutations (engine only) ──────────────────────────────────────

    pub(crate) fn mark_started(&mut self, at: DateTime<Utc>) {
        self.started_at = Some(at);
    }

    pub(crate) fn enter_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.phase_elapsed = Duration::ZERO;
    }

    pub(crate) fn begin_hold(&mut self, target: Duration) {
        self.enter_phase(Phase::Hold);
        self.target_hold = target;
        self.target_announced = false;
    }

    pub(crate) fn mark_target_announced(&mut self) {
        self.target_announced = true;
    }

    /// Moves the phase clock forward. Wall-clock time is never consulted.
    pub(crate) fn add_elapsed(&mut self, by: Duration) {
        self.phase_elapsed = self.phase_elapsed.saturating_add(by);
        self.active_time = self.active_time.saturating_add(by);
    }

    pub(crate) fn record_hold(&mut self, held: Duration) {
        self.hold_times.push(held);
    }

    pub(crate) fn record_rest(&mut self, rested: Duration) {
        self.rest_times.push(rested);
    }

    pub(crate) fn next_round(&mut self) {
        self.round += 1;
    }

    pub(crate) fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub(crate) fn append_event(&mut self, event: SafetyEvent) -> &SafetyEvent {
        self.events.append(event)
    }

    pub(crate) fn finish(
        &mut self,
        phase: Phase,
        reason: CompletionReason,
        at: DateTime<Utc>,
    ) -> TrainingSessionResult {
        debug_assert!(phase.is_terminal());
        self.phase = phase;
        self.paused = false;
        self.ended_at = Some(at);
        self.completion = Some(reason);
        TrainingSessionResult::new(
            self.id,
            self.program.id.clone(),
            self.level,
            self.started_at,
            at,
            self.active_time,
            self.hold_times.clone(),
            self.rest_times.clone(),
            self.events.clone(),
            reason,
        )
    }
}

/// Read-only view of a session for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub program_id: String,
    pub phase: Phase,
    /// Zero-based.
    pub round: u32,
    pub total_rounds: u32,
    pub paused: bool,
    pub phase_elapsed_ms: u64,
    pub phase_remaining_ms: Option<u64>,
    pub target_hold_ms: u64,
    pub safety_ceiling_ms: u64,
    pub progress: f64,
    pub safety_event_count: usize,
    pub completion: Option<CompletionReason>,
}
