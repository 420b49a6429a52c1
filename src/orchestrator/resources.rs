use std::sync::Mutex;

use sysinfo::System;

use crate::ports::{HostResources, ResourceProbe};

/// Reads free memory and logical CPUs from the operating system
pub struct SystemProbe {
    system: Mutex<System>,
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl SystemProbe {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResourceProbe for SystemProbe {
    fn available(&self) -> HostResources {
        let mut system = self
            .system
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        system.refresh_memory();
        system.refresh_cpu();

        let cpus = match system.cpus().len() {
            0 => std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get),
            n => n,
        };
        HostResources {
            available_memory_mb: system.available_memory() / (1024 * 1024),
            cpus,
        }
    }
}
