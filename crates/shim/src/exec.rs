//! Acting on a decision: replace the process image or print a block message

use anyhow::{Context, Result};
use ribbin_common::env_vars;
use std::path::Path;
use std::process::Command;

use crate::context::Invocation;

/// Exit status of a blocked invocation.
pub const BLOCK_EXIT_CODE: i32 = 1;

/// Replace this process with the original binary, keeping `argv[0]`.
pub fn exec_original(original: &Path, inv: &Invocation) -> Result<i32> {
    let mut cmd = Command::new(original);
    set_arg0(&mut cmd, inv);
    cmd.args(&inv.args);
    replace_process(cmd, original)
}

/// Replace this process with a redirect script, exporting the context it
/// needs to find the real tool.
pub fn exec_redirect(
    script: &Path,
    config: &Path,
    original: &Path,
    inv: &Invocation,
) -> Result<i32> {
    let mut cmd = Command::new(script);
    cmd.args(&inv.args)
        .env(env_vars::COMMAND, &inv.command)
        .env(env_vars::CONFIG, config)
        .env(env_vars::ACTION, "redirect")
        .env(env_vars::ORIGINAL_BIN, original);
    replace_process(cmd, script)
}

#[cfg(unix)]
fn set_arg0(cmd: &mut Command, inv: &Invocation) {
    use std::os::unix::process::CommandExt;
    cmd.arg0(&inv.argv0);
}

#[cfg(not(unix))]
fn set_arg0(_cmd: &mut Command, _inv: &Invocation) {}

/// `exec` only returns on failure.
#[cfg(unix)]
fn replace_process(mut cmd: Command, program: &Path) -> Result<i32> {
    use std::os::unix::process::CommandExt;
    let err = cmd.exec();
    Err(err).with_context(|| format!("failed to exec {}", program.display()))
}

#[cfg(not(unix))]
fn replace_process(mut cmd: Command, program: &Path) -> Result<i32> {
    let status = cmd
        .status()
        .with_context(|| format!("failed to run {}", program.display()))?;
    Ok(status.code().unwrap_or(1))
}

/// Bordered block notice written to stderr.
pub fn render_block_message(command: &str, message: Option<&str>) -> String {
    let mut lines = vec![format!("ribbin: `{command}` is blocked in this project")];
    if let Some(message) = message.map(str::trim).filter(|m| !m.is_empty()) {
        lines.push(String::new());
        lines.extend(message.lines().map(str::to_string));
    }
    lines.push(String::new());
    lines.push(format!(
        "To run it anyway: {}=1 {command} ...",
        env_vars::BYPASS
    ));

    let width = lines
        .iter()
        .map(|l| l.chars().count())
        .max()
        .unwrap_or(0);
    let rule = "─".repeat(width + 2);

    let mut out = format!("┌{rule}┐\n");
    for line in &lines {
        let pad = width - line.chars().count();
        out.push_str(&format!("│ {line}{} │\n", " ".repeat(pad)));
    }
    out.push_str(&format!("└{rule}┘\n"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_box_is_rectangular() {
        let rendered = render_block_message("npm", Some("use pnpm\nsee CONTRIBUTING.md"));
        let widths: Vec<usize> = rendered.lines().map(|l| l.chars().count()).collect();
        assert!(widths.windows(2).all(|w| w[0] == w[1]), "{rendered}");
        assert!(rendered.starts_with('┌'));
        assert!(rendered.contains("use pnpm"));
        assert!(rendered.contains("see CONTRIBUTING.md"));
        assert!(rendered.contains("RIBBIN_BYPASS=1 npm"));
    }

    #[test]
    fn test_block_box_without_message() {
        let rendered = render_block_message("tsc", None);
        assert_eq!(rendered.lines().count(), 5);
        assert!(rendered.contains("`tsc` is blocked"));
    }

    #[test]
    fn test_exec_failure_reports_program() {
        let inv = Invocation::new(
            "npm".into(),
            Vec::new(),
            std::env::temp_dir(),
            None,
        )
        .unwrap();
        let err = exec_original(Path::new("/nonexistent/npm.ribbin-original"), &inv).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/npm.ribbin-original"));
    }
}
