//! Removal of leftover test containers, networks and volumes.
//!
//! Every docker call goes through the rate-limited executor, so cleanup is
//! subject to the same policy: containers are stopped before removal and no
//! force flag is ever used.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::GuardError;
use crate::executor::RateLimitedExecutor;

/// What a cleanup pass removed, and what it could not
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub containers_removed: Vec<String>,
    pub networks_removed: Vec<String>,
    pub volumes_removed: Vec<String>,
    pub errors: Vec<String>,
}

impl CleanupReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn removed_count(&self) -> usize {
        self.containers_removed.len() + self.networks_removed.len() + self.volumes_removed.len()
    }
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    Container,
    Network,
    Volume,
}

impl Kind {
    const fn list_args(self) -> &'static [&'static str] {
        match self {
            Self::Container => &["ps", "-a"],
            Self::Network => &["network", "ls"],
            Self::Volume => &["volume", "ls"],
        }
    }

    const fn name_format(self) -> &'static str {
        match self {
            Self::Container => "{{.Names}}",
            Self::Network | Self::Volume => "{{.Name}}",
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::Network => "network",
            Self::Volume => "volume",
        }
    }
}

/// Removes test resources by name prefix
pub struct ResourceCleaner {
    executor: Arc<RateLimitedExecutor>,
}

impl ResourceCleaner {
    #[must_use]
    pub const fn new(executor: Arc<RateLimitedExecutor>) -> Self {
        Self { executor }
    }

    /// Remove every container, network and volume whose name starts with
    /// one of `prefixes`. Never fails; problems are collected in the report.
    pub async fn cleanup(&self, prefixes: &[String]) -> CleanupReport {
        let mut report = CleanupReport::default();
        if prefixes.is_empty() {
            return report;
        }
        let _batch = self.executor.batch_mode();

        let containers = self.list(Kind::Container, prefixes, &mut report).await;
        for name in containers {
            // Stop first: removing a running container would need a force flag
            if let Err(e) = self.executor.docker(&["stop", name.as_str()], None).await {
                record_error(&mut report, "stop container", &name, &e);
                continue;
            }
            match self.executor.docker(&["rm", name.as_str()], None).await {
                Ok(_) => report.containers_removed.push(name),
                Err(e) => record_error(&mut report, "remove container", &name, &e),
            }
        }

        for name in self.list(Kind::Network, prefixes, &mut report).await {
            match self.executor.docker(&["network", "rm", name.as_str()], None).await {
                Ok(_) => report.networks_removed.push(name),
                Err(e) => record_error(&mut report, "remove network", &name, &e),
            }
        }

        for name in self.list(Kind::Volume, prefixes, &mut report).await {
            match self.executor.docker(&["volume", "rm", name.as_str()], None).await {
                Ok(_) => report.volumes_removed.push(name),
                Err(e) => record_error(&mut report, "remove volume", &name, &e),
            }
        }

        info!(
            removed = report.removed_count(),
            errors = report.errors.len(),
            "Cleanup finished"
        );
        report
    }

    /// Names of resources of `kind` matching any prefix, without duplicates
    async fn list(&self, kind: Kind, prefixes: &[String], report: &mut CleanupReport) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for prefix in prefixes {
            let filter = format!("name={prefix}");
            let mut args: Vec<&str> = kind.list_args().to_vec();
            args.extend(["--filter", filter.as_str(), "--format", kind.name_format()]);

            match self.executor.docker(&args, None).await {
                Ok(result) => {
                    // The docker name filter matches substrings
                    for name in result
                        .stdout
                        .lines()
                        .map(str::trim)
                        .filter(|n| n.starts_with(prefix.as_str()))
                    {
                        if !names.iter().any(|n| n == name) {
                            names.push(name.to_string());
                        }
                    }
                }
                Err(e) => record_error(report, &format!("list {}s", kind.label()), prefix, &e),
            }
        }
        debug!(kind = kind.label(), count = names.len(), "Found leftover test resources");
        names
    }
}

fn record_error(report: &mut CleanupReport, action: &str, target: &str, error: &GuardError) {
    warn!(action, target, error = %error, "Cleanup step failed");
    report.errors.push(format!("{action} {target}: {error}"));
}
