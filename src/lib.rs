// Use mimalloc allocator when the feature is enabled (recommended for musl builds)
#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod ports;
pub mod security;

pub use config::Config;
pub use error::{GuardError, Result};
pub use executor::{ExecutionResult, Invocation, RateLimitedExecutor, RetryConfig};
pub use orchestrator::{Orchestrator, RunReport};
pub use ports::{ProcessRunner, ResourceProbe};
pub use security::{CommandPolicy, CommandValidator, PolicyViolation, ViolationAuditor};

// Re-exports for fuzzing
#[doc(hidden)]
pub use security::{normalize, safe_alternative};
