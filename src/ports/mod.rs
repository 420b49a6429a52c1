//! Ports module - Trait definitions for hexagonal architecture
//!
//! Boundaries between the governance logic and the outside world: process
//! launching and host resource inspection.

mod process;
mod resources;

pub use process::{ProcessOptions, ProcessOutput, ProcessRunner};
pub use resources::{HostResources, ResourceProbe};

#[cfg(test)]
pub use process::mock;

#[cfg(test)]
pub use resources::mock as resource_mock;
