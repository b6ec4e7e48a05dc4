//! `ribbin wrap` / `ribbin unwrap`

use anyhow::{Context, Result};
use ribbin_common::config::ProjectConfig;
use ribbin_common::sidecar_path;
use ribbin_wrap::ShimError;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{configured_commands, configured_paths, Session};
use crate::cli::{UnwrapArgs, WrapArgs};

/// Wrap every configured command. Returns the number of failures.
pub fn wrap(session: &Session, args: &WrapArgs, out: &mut dyn Write) -> Result<usize> {
    let config_path = session.config_path(args.config.as_deref())?;
    let doc = ProjectConfig::load(&config_path)?;
    let engine = session.engine(args.confirm_system_dir);
    let mut failures = 0;

    for command in configured_commands(&doc) {
        let targets = match install_targets(session, &doc, &config_path, &command) {
            Ok(targets) => targets,
            Err(e) => {
                writeln!(out, "skip {command}: {e:#}")?;
                failures += 1;
                continue;
            }
        };
        for target in targets {
            let result = session.update_registry(|registry| {
                engine
                    .install(&target, &session.dispatcher, registry, Some(config_path.as_path()))
                    .map_err(anyhow::Error::from)
            });
            match result {
                Ok(report) => writeln!(out, "wrapped {command} ({})", report.binary.display())?,
                Err(e) if is_already_shimmed(&e) => {
                    writeln!(out, "{command} already wrapped ({})", target.display())?
                }
                Err(e) => {
                    writeln!(out, "failed {command} ({}): {e:#}", target.display())?;
                    failures += 1;
                }
            }
        }
    }
    Ok(failures)
}

/// Unwrap this project's commands, or everything with `--all`. Returns the
/// number of failures.
pub fn unwrap(session: &Session, args: &UnwrapArgs, out: &mut dyn Write) -> Result<usize> {
    let targets: Vec<(String, PathBuf)> = if args.all {
        session
            .load_registry()?
            .wrappers
            .into_iter()
            .map(|(command, entry)| (command, entry.original))
            .collect()
    } else {
        let config_path = session.config_path(args.config.as_deref())?;
        let doc = ProjectConfig::load(&config_path)?;
        let registry = session.load_registry()?;
        configured_commands(&doc)
            .into_iter()
            .flat_map(|command| {
                let mut paths = configured_paths(&doc, &config_path, &command);
                if let Some(entry) = registry.wrapper(&command) {
                    paths.push(entry.original.clone());
                }
                paths.sort();
                paths.dedup();
                paths.into_iter().map(move |p| (command.clone(), p))
            })
            .collect()
    };

    let engine = session.engine(false);
    let mut failures = 0;
    for (command, binary) in targets {
        if fs::symlink_metadata(sidecar_path(&binary)).is_err()
            && fs::symlink_metadata(&binary).is_ok_and(|m| !m.file_type().is_symlink())
        {
            log::debug!("{} is not wrapped", binary.display());
            continue;
        }
        let result = session.update_registry(|registry| {
            engine
                .uninstall(&binary, registry)
                .map_err(anyhow::Error::from)
        });
        match result {
            Ok(()) => writeln!(out, "unwrapped {command} ({})", binary.display())?,
            Err(e) => {
                writeln!(out, "failed {command} ({}): {e:#}", binary.display())?;
                failures += 1;
            }
        }
    }
    Ok(failures)
}

/// Where `command` should be wrapped: explicit `paths` when configured,
/// otherwise the first match on `PATH`.
fn install_targets(
    session: &Session,
    doc: &ProjectConfig,
    config_path: &Path,
    command: &str,
) -> Result<Vec<PathBuf>> {
    let explicit = configured_paths(doc, config_path, command);
    if !explicit.is_empty() {
        return Ok(explicit);
    }
    let found = which::which_in(command, std::env::var_os("PATH"), &session.cwd)
        .with_context(|| format!("`{command}` not found on PATH"))?;
    Ok(vec![found])
}

fn is_already_shimmed(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<ShimError>(),
        Some(ShimError::AlreadyShimmed { .. })
    )
}
