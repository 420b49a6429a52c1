//! Test-suite driver built on the governance layer

mod cleanup;
mod report;
mod resources;
mod runner;
mod suite;

pub use cleanup::{CleanupReport, ResourceCleaner};
pub use report::{RunOutcome, RunReport, SuiteReport, SuiteStatus};
pub use resources::SystemProbe;
pub use runner::Orchestrator;
pub use suite::{SuiteContext, group_suites, order_suites};
