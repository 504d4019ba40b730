#[allow(clippy::module_inception)]
pub mod scheduler;

pub use scheduler::{CycleOutcome, Scheduler, spawn_scheduler};
