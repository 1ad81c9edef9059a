use crate::error::{ConfigError, Result, StackError};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, warn};
use std::path::Path;
use std::process::{Command, Output};
use std::time::Duration;

/// Tools the generate pipeline shells out to
pub const REQUIRED_TOOLS: [&str; 1] = ["docker"];

/// Execute a command and fail with its stderr when it exits non-zero
pub fn execute_command(cmd: &str, args: &[&str]) -> Result<Output> {
    debug!("Running {} {}", cmd, args.join(" "));
    let output = Command::new(cmd).args(args).output().map_err(|e| {
        StackError::ExternalCommandFailed {
            command: render_command(cmd, args),
            message: e.to_string(),
        }
    })?;

    if !output.status.success() {
        return Err(StackError::ExternalCommandFailed {
            command: render_command(cmd, args),
            message: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
        });
    }
    Ok(output)
}

/// Check if a command is available in PATH
pub fn is_command_available(cmd: &str) -> bool {
    Command::new(cmd)
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Fail on the first tool that is not installed
pub fn ensure_dependencies(tools: &[&str]) -> Result<()> {
    for tool in tools {
        if !is_command_available(tool) {
            return Err(StackError::MissingDependency(tool.to_string()));
        }
        debug!("Found {}", tool);
    }
    Ok(())
}

/// Numeric id of a host group, looked up with `getent`
pub fn lookup_group_id(group: &str) -> Result<u32> {
    let output = execute_command("getent", &["group", group]).map_err(|e| {
        warn!("Could not resolve group {}: {}", group, e);
        ConfigError::MissingRequiredField("docker.gid".to_string())
    })?;
    parse_group_entry(&String::from_utf8_lossy(&output.stdout))
        .ok_or_else(|| ConfigError::MissingRequiredField("docker.gid".to_string()).into())
}

/// Third field of a `name:password:gid:members` group entry
fn parse_group_entry(entry: &str) -> Option<u32> {
    entry.lines().next()?.split(':').nth(2)?.trim().parse().ok()
}

/// `docker compose pull` for the topology in `dir`, behind a spinner
pub fn pull_images(dir: &Path) -> Result<()> {
    let compose_file = dir.join(crate::generator::layout::COMPOSE_FILE);
    let compose_file = compose_file.to_string_lossy().into_owned();

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  🐳 {msg} {spinner:.cyan}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ "),
    );
    pb.set_message("Pulling images...");
    pb.enable_steady_tick(Duration::from_millis(100));

    let result = execute_command("docker", &["compose", "-f", compose_file.as_str(), "pull"]);
    pb.finish_and_clear();
    result.map(|_| ())
}

fn render_command(cmd: &str, args: &[&str]) -> String {
    std::iter::once(cmd)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_group_entry() {
        assert_eq!(parse_group_entry("docker:x:998:alice,bob\n"), Some(998));
        assert_eq!(parse_group_entry("docker:x:999:"), Some(999));
        assert_eq!(parse_group_entry("docker:x"), None);
        assert_eq!(parse_group_entry(""), None);
    }

    #[test]
    fn test_missing_command_is_reported() {
        assert!(!is_command_available("guac-stack-no-such-tool"));
        assert!(matches!(
            ensure_dependencies(&["guac-stack-no-such-tool"]),
            Err(StackError::MissingDependency(tool)) if tool == "guac-stack-no-such-tool"
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_command_carries_stderr() {
        let err = execute_command("sh", &["-c", "echo boom >&2; exit 3"]).unwrap_err();
        match err {
            StackError::ExternalCommandFailed { command, message } => {
                assert!(command.starts_with("sh -c"));
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
