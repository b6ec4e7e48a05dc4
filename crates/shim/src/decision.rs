//! Per-invocation decision engine
//!
//! [`decide`] turns an invocation plus registry and project config into one
//! of three outcomes. It never executes anything; the caller acts on the
//! returned [`Decision`]. Every failure along the way fails open to
//! passthrough, except an explicit block.

use regex::Regex;
use ribbin_common::config::{
    find_matching_scope, resolve_effective_shims, Action, PassthroughRule, ProjectConfig,
    ShimConfig,
};
use ribbin_common::{absolutize, clean_path, Registry};
use std::fs;
use std::path::{Path, PathBuf};

use crate::activation::{check_activation, Activation};
use crate::process::{ancestors, ProcessInspector};

/// Why an invocation runs the original untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassthroughReason {
    Bypass,
    RegistryUnavailable,
    NoConfig,
    ConfigUnreadable,
    Inactive,
    NoPolicy,
    OutsidePaths,
    AncestorMatched { pid: u32 },
    ActionPassthrough,
    UnrecognizedAction(String),
    InvalidRedirect(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Passthrough(PassthroughReason),
    Block {
        message: Option<String>,
    },
    Redirect {
        script: PathBuf,
        config: PathBuf,
    },
}

/// Inputs gathered by the caller.
#[derive(Debug)]
pub struct DecisionInput<'a> {
    pub command: &'a str,
    /// Absolute location of the shim that was invoked, when known.
    pub invoked: Option<&'a Path>,
    pub cwd: &'a Path,
    pub bypass: bool,
    /// `None` when the registry could not be loaded.
    pub registry: Option<&'a mut Registry>,
    /// Nearest `ribbin.jsonc`/`ribbin.local.jsonc` above `cwd`.
    pub config_path: Option<&'a Path>,
}

pub fn decide(input: DecisionInput<'_>, inspector: &dyn ProcessInspector) -> Decision {
    use PassthroughReason::*;

    if input.bypass {
        return Decision::Passthrough(Bypass);
    }
    let Some(registry) = input.registry else {
        return Decision::Passthrough(RegistryUnavailable);
    };
    let Some(config_path) = input.config_path else {
        return Decision::Passthrough(NoConfig);
    };

    let activation = check_activation(registry, inspector, Some(config_path));
    if activation == Activation::Inactive {
        return Decision::Passthrough(Inactive);
    }
    log::debug!("{} active via {activation:?}", input.command);

    let doc = match ProjectConfig::load(config_path) {
        Ok(doc) => doc,
        Err(e) => {
            log::warn!("ignoring unreadable config: {e}");
            return Decision::Passthrough(ConfigUnreadable);
        }
    };
    let Some(policy) = effective_policy(&doc, config_path, input.cwd, input.command) else {
        return Decision::Passthrough(NoPolicy);
    };
    let config_dir = config_path.parent().unwrap_or_else(|| Path::new("/"));

    if !policy.paths.is_empty() && !invoked_matches_paths(input.invoked, &policy.paths, config_dir)
    {
        return Decision::Passthrough(OutsidePaths);
    }

    if let Some(rule) = policy.passthrough.as_ref().filter(|r| !r.is_empty()) {
        if let Some(pid) = matching_ancestor(rule, inspector) {
            return Decision::Passthrough(AncestorMatched { pid });
        }
    }

    match policy.action {
        Action::Block => Decision::Block {
            message: policy.message,
        },
        Action::Passthrough => Decision::Passthrough(ActionPassthrough),
        Action::Redirect => match redirect_script(&policy, config_dir) {
            Ok(script) => Decision::Redirect {
                script,
                config: config_path.to_path_buf(),
            },
            Err(problem) => {
                log::warn!("redirect for {} ignored: {problem}", input.command);
                Decision::Passthrough(InvalidRedirect(problem))
            }
        },
        Action::Unrecognized(raw) => Decision::Passthrough(UnrecognizedAction(raw)),
    }
}

/// Policy for `command` at the scope matching `cwd`, falling back to the root
/// entries when scope resolution fails.
pub fn effective_policy(
    doc: &ProjectConfig,
    config_path: &Path,
    cwd: &Path,
    command: &str,
) -> Option<ShimConfig> {
    let config_dir = config_path.parent().unwrap_or_else(|| Path::new("/"));
    let scope = find_matching_scope(doc, config_dir, cwd).map(|(name, _)| name);

    let mut shims = match resolve_effective_shims(doc, config_path, scope) {
        Ok(shims) => shims,
        Err(e) => {
            log::warn!("scope resolution failed, using root policies: {e}");
            doc.wrappers.clone()
        }
    };
    shims.remove(command)
}

/// First ancestor (within the rule's depth) whose command line matches.
pub fn matching_ancestor(rule: &PassthroughRule, inspector: &dyn ProcessInspector) -> Option<u32> {
    let patterns: Vec<Regex> = rule
        .invocation_regexp
        .iter()
        .filter_map(|raw| match Regex::new(raw) {
            Ok(re) => Some(re),
            Err(e) => {
                log::warn!("invalid invocation_regexp {raw:?}: {e}");
                None
            }
        })
        .collect();

    ancestors(inspector, rule.effective_depth() as usize)
        .into_iter()
        .find(|pid| {
            let Some(cmdline) = inspector.command_line(*pid) else {
                return false;
            };
            rule.invocation
                .iter()
                .any(|needle| !needle.is_empty() && cmdline.contains(needle.as_str()))
                || patterns.iter().any(|re| re.is_match(&cmdline))
        })
}

fn invoked_matches_paths(invoked: Option<&Path>, paths: &[String], config_dir: &Path) -> bool {
    let Some(invoked) = invoked else {
        return false;
    };
    let invoked = clean_path(invoked);
    paths
        .iter()
        .map(|p| absolutize(Path::new(p), config_dir))
        .any(|candidate| same_location(&candidate, &invoked))
}

/// Compare two binary locations, tolerating symlinked parent directories.
fn same_location(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    let canonical_parent = |p: &Path| -> Option<PathBuf> {
        let parent = fs::canonicalize(p.parent()?).ok()?;
        Some(parent.join(p.file_name()?))
    };
    matches!((canonical_parent(a), canonical_parent(b)), (Some(x), Some(y)) if x == y)
}

fn redirect_script(policy: &ShimConfig, config_dir: &Path) -> Result<PathBuf, String> {
    let raw = policy
        .redirect
        .as_deref()
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| "no redirect script configured".to_string())?;
    let script = absolutize(Path::new(raw), config_dir);
    let meta = fs::metadata(&script)
        .map_err(|e| format!("redirect script {} unavailable: {e}", script.display()))?;
    if !meta.is_file() {
        return Err(format!("redirect script {} is not a file", script.display()));
    }
    if !is_executable(&meta) {
        return Err(format!(
            "redirect script {} is not executable",
            script.display()
        ));
    }
    Ok(script)
}

#[cfg(unix)]
fn is_executable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &fs::Metadata) -> bool {
    true
}
