pub mod budget;
pub mod runner;

pub use budget::TimeBudget;
pub use runner::{Pipeline, PipelineError, RunOutcome, RunSummary};
