//! Docker command policy
//!
//! Commands are inspected token by token. Tokens of every docker invocation
//! found in a command are classified by an explicit argument parser (global
//! options, management command path, compose options, subcommand options,
//! operands) and each docker-level option is matched against two tables:
//!
//! 1. the exception table (safe usages whose letter collides with the force
//!    flag), which always wins;
//! 2. the forbidden signature table, plus the high-risk table for
//!    destructive subcommands.
//!
//! Operands (container names, file names, the command run inside a
//! container) are never matched.

use regex::Regex;
use tracing::error;

use super::violation::ViolationDetail;

/// Programs governed by default
pub const DEFAULT_GOVERNED_PROGRAMS: &[&str] = &["docker", "docker-compose"];

/// Where an option token sits in a docker command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionScope {
    /// Before the subcommand (`docker --context x ps`)
    Global,
    /// Compose options before the compose subcommand (`docker compose -f x.yml up`)
    ComposeGlobal,
    /// Options of the (possibly nested) subcommand
    Subcommand,
}

/// Static description of a matching rule
struct SignatureSpec {
    name: &'static str,
    pattern: &'static str,
    description: &'static str,
}

/// Forbidden signatures, checked against every docker option token in order.
const FORBIDDEN_SIGNATURES: &[SignatureSpec] = &[
    SignatureSpec {
        name: "short-force",
        pattern: r"^-f$",
        description: "Isolated short force flag (-f)",
    },
    SignatureSpec {
        name: "long-force",
        pattern: r"^--force$",
        description: "Long force flag (--force)",
    },
    SignatureSpec {
        name: "long-force-value",
        pattern: r"^--force=.*$",
        description: "Long force flag with value (--force=...)",
    },
    SignatureSpec {
        name: "short-force-value",
        pattern: r"^-f=.*$",
        description: "Short force flag with value (-f=...)",
    },
    SignatureSpec {
        name: "combined-short-force",
        pattern: r"^-(?:[a-z]+f[a-z]*|f[a-z]+)$",
        description: "Force flag combined with other short flags (e.g. -rf, -fv)",
    },
];

/// Additional signatures applied only to destructive subcommands.
const HIGH_RISK_SIGNATURES: &[SignatureSpec] = &[
    SignatureSpec {
        name: "high-risk-long-force",
        pattern: r"^--[a-z0-9-]*force[a-z0-9-]*(?:=.*)?$",
        description: "Force-style long option on a destructive subcommand",
    },
    SignatureSpec {
        name: "high-risk-short-force",
        pattern: r"^-f[^a-z=]",
        description: "Short force flag with attached value on a destructive subcommand",
    },
];

/// Safe usages of tokens that would otherwise match a forbidden signature
struct ExceptionSpec {
    name: &'static str,
    scope: OptionScope,
    /// Subcommand paths the exception applies to (empty = any path)
    paths: &'static [&'static str],
    pattern: &'static str,
    description: &'static str,
}

const EXCEPTIONS: &[ExceptionSpec] = &[
    ExceptionSpec {
        name: "follow-logs",
        scope: OptionScope::Subcommand,
        paths: &["logs", "container logs", "compose logs", "service logs"],
        pattern: r"^(?:-t?ft?|--follow)$",
        description: "Follow log output",
    },
    ExceptionSpec {
        name: "build-file",
        scope: OptionScope::Subcommand,
        paths: &["build", "image build", "buildx build", "builder build"],
        pattern: r"^(?:-f|--file)(?:=.*)?$",
        description: "Name of the Dockerfile to build",
    },
    ExceptionSpec {
        name: "compose-file",
        scope: OptionScope::ComposeGlobal,
        paths: &[],
        pattern: r"^(?:-f|--file)(?:=.*)?$",
        description: "Compose configuration file",
    },
];

/// Subcommand paths that get heightened scrutiny
pub const HIGH_RISK_PATHS: &[&str] = &[
    "rm",
    "rmi",
    "container rm",
    "container remove",
    "container prune",
    "image rm",
    "image remove",
    "image prune",
    "volume rm",
    "volume remove",
    "volume prune",
    "network rm",
    "network remove",
    "network prune",
    "system prune",
    "builder prune",
    "buildx prune",
    "compose rm",
    "compose down",
    "service rm",
    "stack rm",
    "secret rm",
    "config rm",
    "node rm",
    "plugin rm",
    "context rm",
    "swarm leave",
];

/// Docker management commands that take a nested action
const MANAGEMENT_COMMANDS: &[&str] = &[
    "builder",
    "buildx",
    "checkpoint",
    "compose",
    "config",
    "container",
    "context",
    "image",
    "manifest",
    "network",
    "node",
    "plugin",
    "secret",
    "service",
    "stack",
    "swarm",
    "system",
    "trust",
    "volume",
];

/// Docker global options that consume the following token
const GLOBAL_VALUE_OPTIONS: &[&str] = &[
    "-c",
    "--context",
    "--config",
    "-h",
    "--host",
    "-l",
    "--log-level",
    "--tlscacert",
    "--tlscert",
    "--tlskey",
];

/// Compose global options that consume the following token
const COMPOSE_VALUE_OPTIONS: &[&str] = &[
    "-f",
    "--file",
    "-p",
    "--project-name",
    "--env-file",
    "--profile",
    "--project-directory",
    "--ansi",
    "--progress",
    "--parallel",
];

/// Options of run/create/exec that consume the following token
const RUN_VALUE_OPTIONS: &[&str] = &[
    "-a",
    "--attach",
    "--add-host",
    "--cap-add",
    "--cap-drop",
    "--cidfile",
    "--cpus",
    "--cpu-shares",
    "--detach-keys",
    "--device",
    "--dns",
    "-e",
    "--env",
    "--env-file",
    "--entrypoint",
    "--expose",
    "--gpus",
    "--group-add",
    "--health-cmd",
    "-h",
    "--hostname",
    "--index",
    "--ip",
    "--ipc",
    "-l",
    "--label",
    "--label-file",
    "--link",
    "--log-driver",
    "--log-opt",
    "-m",
    "--memory",
    "--mount",
    "--name",
    "--net",
    "--network",
    "--network-alias",
    "-p",
    "--publish",
    "--pid",
    "--platform",
    "--pull",
    "--restart",
    "--runtime",
    "--security-opt",
    "--shm-size",
    "--stop-signal",
    "--stop-timeout",
    "--sysctl",
    "--tmpfs",
    "-u",
    "--user",
    "--ulimit",
    "-v",
    "--volume",
    "--volumes-from",
    "-w",
    "--workdir",
];

/// Leaf commands whose first operand is followed by the container's own command
const RUNNER_PATHS: &[&str] = &[
    "run",
    "create",
    "exec",
    "container run",
    "container create",
    "container exec",
    "compose run",
    "compose exec",
];

/// Words that separate commands inside an embedded shell string
const SHELL_SEPARATORS: &[&str] = &["&&", "||", ";", "|", "&"];

/// A token of a command, with its position in the normalized command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub text: String,
    pub lower: String,
    pub offset: usize,
}

impl Word {
    fn new(text: &str, offset: usize) -> Self {
        Self {
            text: text.to_string(),
            lower: text.to_lowercase(),
            offset,
        }
    }

    fn is_option(&self) -> bool {
        self.lower.len() > 1 && self.lower.starts_with('-')
    }

    /// Option name without an inline `=value`
    fn option_name(&self) -> &str {
        self.lower
            .split_once('=')
            .map_or(self.lower.as_str(), |(name, _)| name)
    }
}

/// An option token that belongs to docker itself (not to a container command)
#[derive(Debug, Clone)]
pub struct DockerOption {
    pub word: Word,
    pub scope: OptionScope,
}

/// One docker invocation found in a command
#[derive(Debug, Clone)]
pub struct DockerInvocation {
    /// The program word (`docker`, `/usr/bin/docker`, `docker-compose`)
    pub program: Word,
    /// Lower-cased subcommand path, e.g. `["container", "rm"]`
    pub path: Vec<String>,
    pub options: Vec<DockerOption>,
    /// Operands of the subcommand, excluding option values
    pub operands: Vec<Word>,
    /// Option values consumed by value-taking options, keyed by option offset
    pub option_values: Vec<(usize, Word)>,
}

impl DockerInvocation {
    /// Space-joined subcommand path (`container rm`)
    #[must_use]
    pub fn path_key(&self) -> String {
        self.path.join(" ")
    }

    #[must_use]
    pub fn is_compose(&self) -> bool {
        self.path.first().is_some_and(|p| p == "compose")
    }

    #[must_use]
    pub fn is_high_risk(&self) -> bool {
        let key = self.path_key();
        HIGH_RISK_PATHS.contains(&key.as_str()) || self.path.last().is_some_and(|p| p == "prune")
    }

    /// Value consumed by the option at `offset`, if any
    #[must_use]
    pub fn value_of(&self, offset: usize) -> Option<&Word> {
        self.option_values
            .iter()
            .find(|(o, _)| *o == offset)
            .map(|(_, w)| w)
    }
}

struct Signature {
    name: &'static str,
    description: &'static str,
    regex: Regex,
}

struct ExceptionRule {
    name: &'static str,
    scope: OptionScope,
    paths: &'static [&'static str],
    regex: Regex,
}

impl ExceptionRule {
    fn applies(&self, invocation: &DockerInvocation, option: &DockerOption) -> bool {
        if option.scope != self.scope {
            return false;
        }
        if !self.paths.is_empty() {
            let key = invocation.path_key();
            if !self.paths.contains(&key.as_str()) {
                return false;
            }
        }
        self.regex.is_match(&option.word.lower)
    }
}

fn compile_signatures(specs: &[SignatureSpec]) -> Vec<Signature> {
    let mut out = Vec::with_capacity(specs.len());
    for spec in specs {
        match Regex::new(spec.pattern) {
            Ok(regex) => out.push(Signature {
                name: spec.name,
                description: spec.description,
                regex,
            }),
            Err(e) => {
                error!(signature = spec.name, pattern = spec.pattern, error = %e, "Invalid policy signature regex");
            }
        }
    }
    out
}

fn compile_exceptions(specs: &[ExceptionSpec]) -> Vec<ExceptionRule> {
    let mut out = Vec::with_capacity(specs.len());
    for spec in specs {
        match Regex::new(spec.pattern) {
            Ok(regex) => out.push(ExceptionRule {
                name: spec.name,
                scope: spec.scope,
                paths: spec.paths,
                regex,
            }),
            Err(e) => {
                error!(exception = spec.name, pattern = spec.pattern, error = %e, "Invalid policy exception regex");
            }
        }
    }
    out
}

/// Entry of the policy listing shown by `docker-guard check --list`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleInfo {
    pub kind: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

/// Compiled force-flag policy for docker commands
pub struct CommandPolicy {
    governed: Vec<String>,
    exceptions: Vec<ExceptionRule>,
    forbidden: Vec<Signature>,
    high_risk: Vec<Signature>,
}

impl Default for CommandPolicy {
    fn default() -> Self {
        let governed: Vec<String> = DEFAULT_GOVERNED_PROGRAMS
            .iter()
            .map(ToString::to_string)
            .collect();
        Self::new(&governed)
    }
}

impl CommandPolicy {
    /// Compile the policy tables for the given governed program names
    #[must_use]
    pub fn new(governed_programs: &[String]) -> Self {
        Self {
            governed: governed_programs
                .iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
            exceptions: compile_exceptions(EXCEPTIONS),
            forbidden: compile_signatures(FORBIDDEN_SIGNATURES),
            high_risk: compile_signatures(HIGH_RISK_SIGNATURES),
        }
    }

    /// Governed program names (lower-case)
    #[must_use]
    pub fn governed_programs(&self) -> &[String] {
        &self.governed
    }

    /// Every rule in evaluation order
    #[must_use]
    pub fn rules() -> Vec<RuleInfo> {
        let exceptions = EXCEPTIONS.iter().map(|e| RuleInfo {
            kind: "exception",
            name: e.name,
            description: e.description,
        });
        let forbidden = FORBIDDEN_SIGNATURES.iter().map(|s| RuleInfo {
            kind: "forbidden",
            name: s.name,
            description: s.description,
        });
        let high_risk = HIGH_RISK_SIGNATURES.iter().map(|s| RuleInfo {
            kind: "high-risk",
            name: s.name,
            description: s.description,
        });
        exceptions.chain(forbidden).chain(high_risk).collect()
    }

    fn is_governed_program(&self, word: &str) -> bool {
        let lower = word.to_lowercase();
        let base = lower.rsplit(['/', '\\']).next().unwrap_or(lower.as_str());
        let base = base.strip_suffix(".exe").unwrap_or(base);
        self.governed.iter().any(|g| g == base)
    }

    /// Whether any token of the command refers to a governed program
    #[must_use]
    pub fn governs(&self, command: &[String]) -> bool {
        !self.invocations(command).is_empty()
    }

    /// Find and parse every governed invocation in a command
    #[must_use]
    pub fn invocations(&self, command: &[String]) -> Vec<DockerInvocation> {
        let mut found = Vec::new();
        for segment in segments(&words(command)) {
            if let Some(pos) = segment.iter().position(|w| self.is_governed_program(&w.text)) {
                found.push(parse_invocation(&segment[pos], &segment[pos + 1..]));
            }
        }
        found
    }

    /// Evaluate a command and return every matched forbidden token.
    ///
    /// An empty result means the command is allowed.
    #[must_use]
    pub fn evaluate(&self, command: &[String]) -> Vec<ViolationDetail> {
        let mut details = Vec::new();
        for invocation in self.invocations(command) {
            self.evaluate_invocation(&invocation, &mut details);
        }
        details
    }

    fn evaluate_invocation(&self, invocation: &DockerInvocation, details: &mut Vec<ViolationDetail>) {
        let high_risk = invocation.is_high_risk();
        for option in &invocation.options {
            if self.exceptions.iter().any(|e| e.applies(invocation, option)) {
                continue;
            }
            let matched = self
                .forbidden
                .iter()
                .find(|s| s.regex.is_match(&option.word.lower))
                .or_else(|| {
                    if high_risk {
                        self.high_risk
                            .iter()
                            .find(|s| s.regex.is_match(&option.word.lower))
                    } else {
                        None
                    }
                });
            if let Some(signature) = matched {
                details.push(ViolationDetail {
                    pattern: signature.name.to_string(),
                    description: signature.description.to_string(),
                    token: option.word.text.clone(),
                    offset: option.word.offset,
                });
            }
        }
    }

    /// Name of the exception that makes an option token safe, if any
    #[must_use]
    pub fn exception_for(&self, invocation: &DockerInvocation, option: &DockerOption) -> Option<&'static str> {
        self.exceptions
            .iter()
            .find(|e| e.applies(invocation, option))
            .map(|e| e.name)
    }
}

/// Normalize a command to a single line: trimmed tokens joined by one space
#[must_use]
pub fn normalize(command: &[String]) -> String {
    command
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a command into words with character offsets into [`normalize`]'s output.
///
/// Tokens containing whitespace (e.g. the script of `sh -c "..."`) are split
/// further so embedded docker calls are visible to the policy.
fn words(command: &[String]) -> Vec<Word> {
    let mut out = Vec::new();
    let mut offset = 0;
    for token in command.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        let mut char_pos = 0;
        let mut start: Option<(usize, usize)> = None;
        for (byte_idx, ch) in token.char_indices() {
            if ch.is_whitespace() {
                if let Some((s_byte, s_char)) = start.take() {
                    push_word(&mut out, &token[s_byte..byte_idx], offset + s_char);
                }
            } else if start.is_none() {
                start = Some((byte_idx, char_pos));
            }
            char_pos += 1;
        }
        if let Some((s_byte, s_char)) = start {
            push_word(&mut out, &token[s_byte..], offset + s_char);
        }
        offset += char_pos + 1;
    }
    out
}

fn push_word(out: &mut Vec<Word>, raw: &str, offset: usize) {
    let leading = raw.chars().take_while(|c| matches!(c, '\'' | '"')).count();
    let text = raw.trim_matches(|c| c == '\'' || c == '"');
    if text.is_empty() {
        return;
    }
    // Trailing `;` belongs to the shell, not to the word
    if let Some(stripped) = text.strip_suffix(';') {
        if !stripped.is_empty() {
            out.push(Word::new(stripped, offset + leading));
        }
        out.push(Word::new(";", offset + leading + stripped.chars().count()));
        return;
    }
    out.push(Word::new(text, offset + leading));
}

fn segments(words: &[Word]) -> Vec<Vec<Word>> {
    let mut out = vec![Vec::new()];
    for word in words {
        if SHELL_SEPARATORS.contains(&word.text.as_str()) {
            out.push(Vec::new());
        } else if let Some(current) = out.last_mut() {
            current.push(word.clone());
        }
    }
    out.retain(|s| !s.is_empty());
    out
}

/// Parse the words following a governed program
fn parse_invocation(program: &Word, args: &[Word]) -> DockerInvocation {
    let mut invocation = DockerInvocation {
        program: program.clone(),
        path: Vec::new(),
        options: Vec::new(),
        operands: Vec::new(),
        option_values: Vec::new(),
    };
    let program_base = program
        .lower
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(program.lower.as_str())
        .trim_end_matches(".exe")
        .to_string();

    let mut i = 0;
    if program_base == "docker-compose" {
        invocation.path.push("compose".to_string());
    } else {
        i = take_options(&mut invocation, args, i, OptionScope::Global, GLOBAL_VALUE_OPTIONS);
        let Some(sub) = args.get(i) else {
            return invocation;
        };
        invocation.path.push(sub.lower.clone());
        i += 1;
        if !MANAGEMENT_COMMANDS.contains(&sub.lower.as_str()) {
            return parse_leaf_args(invocation, &args[i..]);
        }
    }

    let scope = if invocation.is_compose() {
        OptionScope::ComposeGlobal
    } else {
        OptionScope::Subcommand
    };
    let value_options: &[&str] = if invocation.is_compose() {
        COMPOSE_VALUE_OPTIONS
    } else {
        &[]
    };
    i = take_options(&mut invocation, args, i, scope, value_options);
    if let Some(action) = args.get(i) {
        invocation.path.push(action.lower.clone());
        i += 1;
    }
    parse_leaf_args(invocation, &args[i..])
}

/// Consume leading option words starting at `i`; returns the index of the first operand
fn take_options(
    invocation: &mut DockerInvocation,
    args: &[Word],
    mut i: usize,
    scope: OptionScope,
    value_options: &[&str],
) -> usize {
    while let Some(word) = args.get(i) {
        if !word.is_option() || word.lower == "--" {
            break;
        }
        invocation.options.push(DockerOption {
            word: word.clone(),
            scope,
        });
        i += 1;
        if !word.lower.contains('=') && value_options.contains(&word.option_name()) {
            if let Some(value) = args.get(i) {
                invocation.option_values.push((word.offset, value.clone()));
                i += 1;
            }
        }
    }
    i
}

fn parse_leaf_args(mut invocation: DockerInvocation, args: &[Word]) -> DockerInvocation {
    let key = invocation.path_key();
    let is_runner = RUNNER_PATHS.contains(&key.as_str());
    let mut i = 0;
    while let Some(word) = args.get(i) {
        i += 1;
        if word.lower == "--" {
            invocation.operands.extend(args[i..].iter().cloned());
            break;
        }
        if word.is_option() {
            invocation.options.push(DockerOption {
                word: word.clone(),
                scope: OptionScope::Subcommand,
            });
            if is_runner && !word.lower.contains('=') && RUN_VALUE_OPTIONS.contains(&word.option_name()) {
                if let Some(value) = args.get(i) {
                    invocation.option_values.push((word.offset, value.clone()));
                    i += 1;
                }
            }
            continue;
        }
        invocation.operands.push(word.clone());
        if is_runner {
            // Image (run/create) or container/service (exec): the rest is the
            // container's own command line.
            invocation.operands.extend(args[i..].iter().cloned());
            break;
        }
    }
    invocation
}
