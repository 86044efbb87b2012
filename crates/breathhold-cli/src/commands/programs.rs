use clap::Subcommand;
use breathhold_core::{Config, ExperienceLevel, ProgramCatalog, TrainingProgram};
use serde::Serialize;

#[derive(Subcommand)]
pub enum ProgramsAction {
    /// List built-in programs
    List {
        /// Only programs available at the configured level
        #[arg(long)]
        available: bool,
    },
    /// Show one program with its per-round targets
    Show {
        /// Program ID
        id: String,
        /// Experience level used for the safety ceiling (defaults to config)
        #[arg(long)]
        level: Option<ExperienceLevel>,
    },
}

#[derive(Serialize)]
struct ProgramSummary<'a> {
    id: &'a str,
    name: &'a str,
    required_level: ExperienceLevel,
    rounds: u32,
    progression: String,
    max_hold_secs: u64,
    estimated_minutes: u64,
    available: bool,
}

#[derive(Serialize)]
struct ProgramDetail<'a> {
    #[serde(flatten)]
    program: &'a TrainingProgram,
    level: ExperienceLevel,
    safety_ceiling_secs: u64,
    round_targets_secs: Vec<u64>,
}

pub fn run(action: ProgramsAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let catalog = ProgramCatalog::builtin();

    match action {
        ProgramsAction::List { available } => {
            let level = config.experience_level();
            let summaries: Vec<ProgramSummary> = catalog
                .iter()
                .filter(|p| !available || p.required_level <= level)
                .map(|p| ProgramSummary {
                    id: &p.id,
                    name: &p.name,
                    required_level: p.required_level,
                    rounds: p.total_rounds,
                    progression: p.progression.describe(),
                    max_hold_secs: p.max_hold_time.as_secs(),
                    estimated_minutes: p.estimated_duration().as_secs().div_ceil(60),
                    available: p.required_level <= level,
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        }
        ProgramsAction::Show { id, level } => {
            let program = catalog.require(&id)?;
            let level = level.unwrap_or_else(|| config.experience_level());
            let ceiling = config.safety_policy().max_allowed_hold(level, &program);
            let detail = ProgramDetail {
                program: &program,
                level,
                safety_ceiling_secs: ceiling.as_secs(),
                round_targets_secs: (0..program.total_rounds)
                    .map(|round| program.target_hold_time(round).min(ceiling).as_secs())
                    .collect(),
            };
            println!("{}", serde_json::to_string_pretty(&detail)?);
        }
    }
    Ok(())
}
