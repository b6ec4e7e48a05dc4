//! `ribbin config show`

use anyhow::Result;
use ribbin_common::config::{find_matching_scope, resolve_with_provenance, ProjectConfig};
use std::io::Write;
use std::path::Path;

use super::Session;

/// Print the policies in effect for the working directory, with the
/// definition each one came from.
pub fn show(session: &Session, only: Option<&str>, out: &mut dyn Write) -> Result<()> {
    let config_path = session.config_path(None)?;
    let doc = ProjectConfig::load(&config_path)?;
    let config_dir = config_path.parent().unwrap_or_else(|| Path::new("/"));
    let scope = find_matching_scope(&doc, config_dir, &session.cwd).map(|(name, _)| name);

    writeln!(out, "config: {}", config_path.display())?;
    writeln!(out, "scope: {}", scope.unwrap_or("(root)"))?;

    let resolved = match resolve_with_provenance(&doc, &config_path, scope) {
        Ok(resolved) => resolved,
        Err(e) => {
            writeln!(out, "warning: {e}; showing root policies")?;
            resolve_with_provenance(&doc, &config_path, None)?
        }
    };

    let mut shown = 0;
    for (command, policy) in resolved
        .iter()
        .filter(|(name, _)| only.map_or(true, |o| o == name.as_str()))
    {
        shown += 1;
        writeln!(out)?;
        writeln!(out, "{command}: {}", policy.config.action)?;
        if let Some(message) = &policy.config.message {
            writeln!(out, "  message: {message}")?;
        }
        if let Some(redirect) = &policy.config.redirect {
            writeln!(out, "  redirect: {redirect}")?;
        }
        if !policy.config.paths.is_empty() {
            writeln!(out, "  paths: {}", policy.config.paths.join(", "))?;
        }
        if let Some(rule) = policy.config.passthrough.as_ref().filter(|r| !r.is_empty()) {
            writeln!(
                out,
                "  passthrough: {} literal, {} regexp, depth {}",
                rule.invocation.len(),
                rule.invocation_regexp.len(),
                rule.effective_depth()
            )?;
        }
        writeln!(out, "  from: {}", policy.source)?;
        for earlier in &policy.overrode {
            writeln!(out, "  overrides: {earlier}")?;
        }
    }

    if shown == 0 {
        match only {
            Some(command) => writeln!(out, "\n{command}: no policy (passthrough)")?,
            None => writeln!(out, "\nno policies")?,
        }
    }
    Ok(())
}
