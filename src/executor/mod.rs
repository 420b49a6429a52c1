//! Rate-limited execution of governed commands
//!
//! Every call is validated first, then waits for a concurrency slot and a
//! start slot before the process runs. Failed attempts are retried with
//! exponential backoff.

mod governed;
mod limiter;
mod process;
mod retry;
mod stats;

pub use governed::{BatchGuard, ExecutionResult, Invocation, RateLimitedExecutor};
pub use limiter::{InFlight, RateLimiter, RateLimiterState};
pub use process::{DEFAULT_MAX_OUTPUT_BYTES, TokioProcessRunner};
pub use retry::RetryConfig;
pub use stats::OperationStats;
