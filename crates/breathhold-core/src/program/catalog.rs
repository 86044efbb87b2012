//! Training program definitions and the built-in catalog.
//!
//! Programs are immutable once built. Sessions share them through `Arc`.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::progression::ProgressionRule;
use crate::error::ValidationError;
use crate::safety::ExperienceLevel;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingProgram {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub required_level: ExperienceLevel,
    pub total_rounds: u32,
    /// Upper bound on the planned length of one session.
    #[serde(with = "crate::serde_ms")]
    pub session_budget: Duration,
    #[serde(with = "crate::serde_ms")]
    pub preparation: Duration,
    /// Hard ceiling applied to every round's target hold.
    #[serde(with = "crate::serde_ms")]
    pub max_hold_time: Duration,
    pub progression: ProgressionRule,
    #[serde(with = "crate::serde_ms")]
    pub recovery: Duration,
    #[serde(with = "crate::serde_ms")]
    pub rest: Duration,
    #[serde(with = "crate::serde_ms")]
    pub min_rest_between_sessions: Duration,
    /// Display only.
    #[serde(default)]
    pub safety_notes: Vec<String>,
}

impl TrainingProgram {
    pub fn builder(id: impl Into<String>, name: impl Into<String>) -> ProgramBuilder {
        ProgramBuilder::new(id.into(), name.into())
    }

    /// Target hold for a zero-based round, clamped to `max_hold_time`.
    pub fn target_hold_time(&self, round: u32) -> Duration {
        self.progression
            .target_hold_time(round)
            .min(self.max_hold_time)
    }

    pub fn is_last_round(&self, round: u32) -> bool {
        round.saturating_add(1) >= self.total_rounds
    }

    /// Planned length if every hold ends exactly on target.
    pub fn estimated_duration(&self) -> Duration {
        (0..self.total_rounds).fold(Duration::ZERO, |acc, round| {
            let rest = if self.is_last_round(round) {
                Duration::ZERO
            } else {
                self.rest
            };
            acc + self.preparation + self.target_hold_time(round) + self.recovery + rest
        })
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.total_rounds == 0 {
            return Err(ValidationError::NoRounds {
                program: self.id.clone(),
            });
        }
        if self.max_hold_time.is_zero() {
            return Err(ValidationError::ZeroHoldCeiling {
                program: self.id.clone(),
            });
        }
        if let ProgressionRule::Table(seq) = &self.progression {
            if seq.is_empty() {
                return Err(ValidationError::EmptyTable {
                    program: self.id.clone(),
                });
            }
            if seq.len() != self.total_rounds as usize {
                tracing::warn!(
                    program = %self.id,
                    table_len = seq.len(),
                    rounds = self.total_rounds,
                    "progression table length differs from round count; last entry will repeat"
                );
            }
        }
        let estimated = self.estimated_duration();
        if estimated > self.session_budget {
            return Err(ValidationError::OverBudget {
                program: self.id.clone(),
                estimated_secs: estimated.as_secs(),
                budget_secs: self.session_budget.as_secs(),
            });
        }
        Ok(())
    }
}

pub struct ProgramBuilder {
    program: TrainingProgram,
}

impl ProgramBuilder {
    fn new(id: String, name: String) -> Self {
        Self {
            program: TrainingProgram {
                id,
                name,
                description: String::new(),
                required_level: ExperienceLevel::Beginner,
                total_rounds: 1,
                session_budget: Duration::from_secs(60 * 60),
                preparation: Duration::from_secs(10),
                max_hold_time: Duration::from_secs(30),
                progression: ProgressionRule::Fixed(Duration::from_secs(10)),
                recovery: Duration::from_secs(10),
                rest: Duration::from_secs(30),
                min_rest_between_sessions: Duration::ZERO,
                safety_notes: Vec::new(),
            },
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.program.description = description.into();
        self
    }

    pub fn required_level(mut self, level: ExperienceLevel) -> Self {
        self.program.required_level = level;
        self
    }

    pub fn rounds(mut self, rounds: u32) -> Self {
        self.program.total_rounds = rounds;
        self
    }

    pub fn session_budget(mut self, budget: Duration) -> Self {
        self.program.session_budget = budget;
        self
    }

    pub fn preparation(mut self, preparation: Duration) -> Self {
        self.program.preparation = preparation;
        self
    }

    pub fn max_hold(mut self, max_hold: Duration) -> Self {
        self.program.max_hold_time = max_hold;
        self
    }

    pub fn progression(mut self, rule: ProgressionRule) -> Self {
        self.program.progression = rule;
        self
    }

    pub fn recovery(mut self, recovery: Duration) -> Self {
        self.program.recovery = recovery;
        self
    }

    pub fn rest(mut self, rest: Duration) -> Self {
        self.program.rest = rest;
        self
    }

    pub fn min_rest_between_sessions(mut self, rest: Duration) -> Self {
        self.program.min_rest_between_sessions = rest;
        self
    }

    pub fn safety_note(mut self, note: impl Into<String>) -> Self {
        self.program.safety_notes.push(note.into());
        self
    }

    /// Returns the program without validating it.
    pub fn build(self) -> TrainingProgram {
        self.program
    }

    pub fn build_validated(self) -> Result<TrainingProgram, ValidationError> {
        self.program.validate()?;
        Ok(self.program)
    }
}

/// Immutable set of programs, loaded once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramCatalog {
    programs: Vec<Arc<TrainingProgram>>,
}

impl ProgramCatalog {
    /// Builds a catalog, rejecting it if any program is malformed.
    pub fn new(programs: Vec<TrainingProgram>) -> Result<Self, ValidationError> {
        let mut validated = Vec::with_capacity(programs.len());
        for program in programs {
            program.validate()?;
            validated.push(Arc::new(program));
        }
        Ok(Self {
            programs: validated,
        })
    }

    pub fn builtin() -> Self {
        Self::lenient(builtin_programs())
    }

    /// Builds a catalog from every valid program, logging and skipping the
    /// malformed ones.
    fn lenient(programs: Vec<TrainingProgram>) -> Self {
        let programs = programs
            .into_iter()
            .filter_map(|program| match program.validate() {
                Ok(()) => Some(Arc::new(program)),
                Err(e) => {
                    tracing::error!(program = %program.id, error = %e, "dropping invalid program");
                    None
                }
            })
            .collect();
        Self { programs }
    }

    pub fn get(&self, id: &str) -> Option<Arc<TrainingProgram>> {
        self.programs.iter().find(|p| p.id == id).cloned()
    }

    pub fn require(&self, id: &str) -> Result<Arc<TrainingProgram>, ValidationError> {
        self.get(id)
            .ok_or_else(|| ValidationError::UnknownProgram(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<TrainingProgram>> {
        self.programs.iter()
    }

    /// Programs a user at `level` is allowed to select.
    pub fn available_for(&self, level: ExperienceLevel) -> Vec<Arc<TrainingProgram>> {
        self.programs
            .iter()
            .filter(|p| p.required_level <= level)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

fn builtin_programs() -> Vec<TrainingProgram> {
    vec![
        TrainingProgram::builder("intro-static", "Introductory Static Holds")
            .description("Short, comfortable holds to learn the rhythm of a session.")
            .rounds(4)
            .preparation(secs(30))
            .progression(ProgressionRule::Fixed(secs(15)))
            .max_hold(secs(25))
            .recovery(secs(20))
            .rest(secs(60))
            .session_budget(secs(15 * 60))
            .safety_note("Never train in or near water.")
            .safety_note("Stop immediately if you feel dizzy or tingling.")
            .build(),
        TrainingProgram::builder("progressive-builder", "Progressive Builder")
            .description("Each round adds a few seconds to the previous hold.")
            .rounds(5)
            .preparation(secs(30))
            .progression(ProgressionRule::Progressive {
                start: secs(10),
                increment: secs(4),
            })
            .max_hold(secs(30))
            .recovery(secs(20))
            .rest(secs(60))
            .session_budget(secs(20 * 60))
            .safety_note("Never train in or near water.")
            .build(),
        TrainingProgram::builder("co2-table", "CO2 Tolerance Table")
            .description("Constant holds with short rests to build CO2 tolerance.")
            .required_level(ExperienceLevel::Intermediate)
            .rounds(8)
            .preparation(secs(45))
            .progression(ProgressionRule::Fixed(secs(45)))
            .max_hold(secs(60))
            .recovery(secs(15))
            .rest(secs(75))
            .session_budget(secs(30 * 60))
            .min_rest_between_sessions(secs(3 * 3600))
            .safety_note("Never train in or near water.")
            .safety_note("Breathe normally between rounds; do not hyperventilate.")
            .build(),
        TrainingProgram::builder("o2-table", "O2 Tolerance Table")
            .description("Increasing holds with generous rests to adapt to low oxygen.")
            .required_level(ExperienceLevel::Intermediate)
            .rounds(6)
            .preparation(secs(60))
            .progression(ProgressionRule::Table(vec![
                secs(30),
                secs(40),
                secs(50),
                secs(60),
                secs(70),
                secs(80),
            ]))
            .max_hold(secs(90))
            .recovery(secs(30))
            .rest(secs(120))
            .session_budget(secs(40 * 60))
            .min_rest_between_sessions(secs(4 * 3600))
            .safety_note("Never train in or near water.")
            .safety_note("Always train with a partner for holds over one minute.")
            .build(),
        TrainingProgram::builder("advanced-max", "Advanced Maximum Holds")
            .description("Few long holds for experienced practitioners.")
            .required_level(ExperienceLevel::Advanced)
            .rounds(3)
            .preparation(secs(120))
            .progression(ProgressionRule::Table(vec![secs(90), secs(120), secs(150)]))
            .max_hold(secs(180))
            .recovery(secs(60))
            .rest(secs(240))
            .session_budget(secs(45 * 60))
            .min_rest_between_sessions(secs(6 * 3600))
            .safety_note("Never train in or near water.")
            .safety_note("A trained partner must be present for the whole session.")
            .build(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_is_valid() {
        let catalog = ProgramCatalog::new(builtin_programs()).unwrap();
        assert_eq!(catalog.len(), 5);
        assert_eq!(ProgramCatalog::builtin(), catalog);
    }

    #[test]
    fn lenient_catalog_skips_only_malformed_programs() {
        let good = TrainingProgram::builder("good", "Good").build();
        let bad = TrainingProgram::builder("bad", "Bad").rounds(0).build();
        let catalog = ProgramCatalog::lenient(vec![good, bad]);
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get("good").is_some());
        assert!(matches!(
            catalog.require("bad"),
            Err(ValidationError::UnknownProgram(_))
        ));
    }

    #[test]
    fn target_is_clamped_to_program_ceiling() {
        let program = TrainingProgram::builder("p", "P")
            .rounds(10)
            .progression(ProgressionRule::Progressive {
                start: secs(10),
                increment: secs(10),
            })
            .max_hold(secs(35))
            .build();
        assert_eq!(program.target_hold_time(1), secs(20));
        assert_eq!(program.target_hold_time(5), secs(35));
    }

    #[test]
    fn fixed_ten_under_fifteen_ceiling_stays_ten() {
        let program = TrainingProgram::builder("p", "P")
            .rounds(4)
            .progression(ProgressionRule::Fixed(secs(10)))
            .max_hold(secs(15))
            .build();
        for round in 0..4 {
            assert_eq!(program.target_hold_time(round), secs(10));
        }
    }

    #[test]
    fn estimated_duration_skips_rest_after_last_round() {
        let program = TrainingProgram::builder("p", "P")
            .rounds(2)
            .preparation(secs(10))
            .progression(ProgressionRule::Fixed(secs(20)))
            .recovery(secs(5))
            .rest(secs(30))
            .build();
        assert_eq!(program.estimated_duration(), secs(10 + 20 + 5 + 30 + 10 + 20 + 5));
    }

    #[test]
    fn validate_rejects_malformed_programs() {
        let no_rounds = TrainingProgram::builder("a", "A").rounds(0).build_validated();
        assert!(matches!(no_rounds, Err(ValidationError::NoRounds { .. })));

        let empty_table = TrainingProgram::builder("b", "B")
            .progression(ProgressionRule::Table(Vec::new()))
            .build_validated();
        assert!(matches!(empty_table, Err(ValidationError::EmptyTable { .. })));

        let over_budget = TrainingProgram::builder("c", "C")
            .rounds(3)
            .session_budget(secs(30))
            .build_validated();
        assert!(matches!(over_budget, Err(ValidationError::OverBudget { .. })));
    }

    #[test]
    fn catalog_filters_by_level() {
        let catalog = ProgramCatalog::builtin();
        let beginner = catalog.available_for(ExperienceLevel::Beginner);
        assert!(beginner
            .iter()
            .all(|p| p.required_level == ExperienceLevel::Beginner));
        assert_eq!(
            catalog.available_for(ExperienceLevel::Advanced).len(),
            catalog.len()
        );
        assert!(catalog.require("missing").is_err());
    }
}
