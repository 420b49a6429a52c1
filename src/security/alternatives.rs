//! Safe alternatives for forbidden docker commands

use super::policy::{CommandPolicy, DockerInvocation, OptionScope, normalize};

/// Maps a forbidden subcommand path to a remediation template.
///
/// Placeholders: `{docker}` is the program as written plus its global options,
/// `{compose}` the compose entry point (`docker compose` or `docker-compose`)
/// with its file/project options, `{command}` the full subcommand,
/// `{options}` the subcommand options minus force flags, `{operands}` the
/// operands.
struct SafeAlternative {
    paths: &'static [&'static str],
    template: &'static str,
}

const SAFE_ALTERNATIVES: &[SafeAlternative] = &[
    SafeAlternative {
        paths: &["rm", "container rm", "container remove"],
        template: "{docker} stop {operands} && {docker} rm{options} {operands}",
    },
    SafeAlternative {
        paths: &["rmi", "image rm", "image remove"],
        template: "{docker} stop <containers using the image> && {docker} rm <containers using the image> && {docker} rmi{options} {operands}",
    },
    SafeAlternative {
        paths: &["volume rm", "volume remove"],
        template: "{docker} stop <containers using the volume> && {docker} rm <containers using the volume> && {docker} volume rm{options} {operands}",
    },
    SafeAlternative {
        paths: &["network rm", "network remove"],
        template: "{docker} network disconnect {operands} <container> && {docker} network rm{options} {operands}",
    },
    SafeAlternative {
        paths: &[
            "system prune",
            "container prune",
            "image prune",
            "volume prune",
            "network prune",
            "builder prune",
            "buildx prune",
        ],
        template: "{command}{options} with the confirmation prompt answered on stdin (\"y\")",
    },
    SafeAlternative {
        paths: &["compose rm"],
        template: "{compose} stop {operands} && {compose} rm{options} {operands} with the confirmation prompt answered on stdin (\"y\")",
    },
    SafeAlternative {
        paths: &["compose down"],
        template: "{compose} stop && {compose} down{options} {operands}",
    },
];

/// Strip the force letter from a combined short-flag cluster (`-rf` -> `-r`)
fn without_force_letter(token: &str) -> Option<String> {
    let body = token.strip_prefix('-')?;
    if body.starts_with('-') || body.contains('=') {
        return None;
    }
    let kept: String = body.chars().filter(|c| !c.eq_ignore_ascii_case(&'f')).collect();
    let kept: String = kept.chars().filter(char::is_ascii_alphabetic).collect();
    if kept.is_empty() { None } else { Some(format!("-{kept}")) }
}

fn render_options(
    invocation: &DockerInvocation,
    scope: OptionScope,
    forbidden_offsets: &[usize],
) -> String {
    let mut out = String::new();
    for option in invocation.options.iter().filter(|o| o.scope == scope) {
        let offset = option.word.offset;
        let kept = if forbidden_offsets.contains(&offset) {
            without_force_letter(&option.word.text)
        } else {
            Some(option.word.text.clone())
        };
        if let Some(kept) = kept {
            out.push(' ');
            out.push_str(&kept);
            if let Some(value) = invocation.value_of(offset) {
                out.push(' ');
                out.push_str(&value.text);
            }
        }
    }
    out
}

fn render(template: &str, invocation: &DockerInvocation, forbidden_offsets: &[usize]) -> String {
    let docker = format!(
        "{}{}",
        invocation.program.text,
        render_options(invocation, OptionScope::Global, forbidden_offsets)
    );
    let compose_globals = render_options(invocation, OptionScope::ComposeGlobal, forbidden_offsets);
    let compose = if invocation.program.lower.ends_with("docker-compose") {
        format!("{docker}{compose_globals}")
    } else {
        format!("{docker} compose{compose_globals}")
    };
    // Full subcommand as it must be typed, compose options included
    let command = if invocation.is_compose() {
        format!("{compose} {}", invocation.path[1..].join(" "))
    } else {
        format!("{docker} {}", invocation.path.join(" "))
    };

    let options = render_options(invocation, OptionScope::Subcommand, forbidden_offsets);
    let operands = invocation
        .operands
        .iter()
        .map(|w| w.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    let rendered = template
        .replace("{command}", &command)
        .replace("{compose}", &compose)
        .replace("{docker}", &docker)
        .replace("{options}", &options)
        .replace("{operands}", &operands);
    rendered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Rebuild an unmapped command with every force token removed
fn stripped(invocation: &DockerInvocation, forbidden_offsets: &[usize]) -> String {
    let rendered = render("{command}{options} {operands}", invocation, forbidden_offsets);
    format!("{rendered} (without force flags; confirm interactively or via stdin)")
}

/// Suggest a safe replacement for a command.
///
/// Commands without violations are returned normalized but otherwise
/// unchanged. The output never contains a force flag and depends only on the
/// command, so repeated calls return the same string.
#[must_use]
pub fn safe_alternative(policy: &CommandPolicy, command: &[String]) -> String {
    let details = policy.evaluate(command);
    if details.is_empty() {
        return normalize(command);
    }
    let forbidden_offsets: Vec<usize> = details.iter().map(|d| d.offset).collect();

    let mut suggestions = Vec::new();
    for invocation in policy.invocations(command) {
        let has_violation = invocation
            .options
            .iter()
            .any(|o| forbidden_offsets.contains(&o.word.offset));
        if !has_violation {
            continue;
        }
        let key = invocation.path_key();
        let suggestion = SAFE_ALTERNATIVES
            .iter()
            .find(|alt| alt.paths.contains(&key.as_str()))
            .map_or_else(
                || stripped(&invocation, &forbidden_offsets),
                |alt| render(alt.template, &invocation, &forbidden_offsets),
            );
        suggestions.push(suggestion);
    }
    suggestions.join(" && ")
}
