//! Host Resource Port

use serde::Serialize;

use crate::config::ResourceRequirements;

/// Free host capacity at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HostResources {
    pub available_memory_mb: u64,
    pub cpus: usize,
}

impl HostResources {
    /// Reasons the host cannot satisfy `requirements`, empty when it can
    #[must_use]
    pub fn shortfalls(&self, requirements: &ResourceRequirements) -> Vec<String> {
        let mut out = Vec::new();
        if requirements.memory_mb > self.available_memory_mb {
            out.push(format!(
                "needs {} MiB memory, {} MiB available",
                requirements.memory_mb, self.available_memory_mb
            ));
        }
        if requirements.cpus > self.cpus {
            out.push(format!(
                "needs {} CPUs, {} available",
                requirements.cpus, self.cpus
            ));
        }
        out
    }
}

/// Reports free host resources before a suite starts
pub trait ResourceProbe: Send + Sync {
    fn available(&self) -> HostResources;
}
