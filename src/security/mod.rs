mod alternatives;
mod audit;
mod policy;
mod validator;
mod violation;

pub use alternatives::safe_alternative;
pub use audit::{AuditReport, AuditStatus, DEFAULT_RECENT_WINDOW, ViolationAuditor};
pub use policy::{
    CommandPolicy, DEFAULT_GOVERNED_PROGRAMS, DockerInvocation, DockerOption, HIGH_RISK_PATHS,
    OptionScope, RuleInfo, Word, normalize,
};
pub use validator::CommandValidator;
pub use violation::{PolicyViolation, ViolationDetail};
