mod catalog;
mod progression;

pub use catalog::{ProgramBuilder, ProgramCatalog, TrainingProgram};
pub use progression::ProgressionRule;
