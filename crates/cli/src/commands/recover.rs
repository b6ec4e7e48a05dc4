//! `ribbin recover`

use anyhow::Result;
use ribbin_wrap::{binary_for_sidecar, find_sidecars, HashCheck, ReconcileOutcome};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::PathBuf;

use super::Session;
use crate::cli::RecoverArgs;

/// Reconcile every registered shim plus any sidecar found under the search
/// paths. Returns the number of targets that could not be reconciled.
pub fn recover(session: &Session, args: &RecoverArgs, out: &mut dyn Write) -> Result<usize> {
    let mut targets: BTreeSet<PathBuf> = session
        .load_registry()?
        .wrappers
        .into_values()
        .map(|entry| entry.original)
        .collect();
    let search_paths: Vec<PathBuf> = args
        .search_paths
        .iter()
        .map(|dir| ribbin_common::absolutize(dir, &session.cwd))
        .collect();
    targets.extend(
        find_sidecars(&search_paths)
            .iter()
            .filter_map(|sidecar| binary_for_sidecar(sidecar)),
    );

    if targets.is_empty() {
        writeln!(out, "nothing to recover")?;
        return Ok(0);
    }

    let engine = session.engine(false);
    let mut failures = 0;
    for binary in targets {
        let result = session.update_registry(|registry| {
            engine
                .reconcile(&binary, registry)
                .map_err(anyhow::Error::from)
        });
        match result {
            Ok(outcome) => writeln!(out, "{}: {}", binary.display(), describe(&outcome))?,
            Err(e) => {
                writeln!(out, "{}: failed: {e:#}", binary.display())?;
                failures += 1;
            }
        }
    }
    Ok(failures)
}

fn describe(outcome: &ReconcileOutcome) -> String {
    match outcome {
        ReconcileOutcome::Healthy => "healthy".to_string(),
        ReconcileOutcome::Restored => "restored original".to_string(),
        ReconcileOutcome::DiscardedStale { verdict } => {
            let detail = match verdict {
                HashCheck::Match => "sidecar matched its recorded hash",
                HashCheck::Conflict { .. } => "sidecar differed from its recorded hash",
                HashCheck::NoMetadata => "no metadata",
            };
            format!("reinstalled over the shim; discarded stale sidecar ({detail})")
        }
        ReconcileOutcome::MissingOriginal => {
            "shim present but the original is gone; reinstall the tool and run `ribbin wrap`"
                .to_string()
        }
        ReconcileOutcome::NotWrapped => "not wrapped".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::WrapArgs;
    use crate::commands::testing::Sandbox;
    use crate::commands::wrap::wrap;
    use ribbin_common::{sidecar_path, Registry};
    use std::fs;

    #[test]
    fn test_recover_restores_and_discards() {
        let sandbox = Sandbox::new(
            r#"{ "wrappers": {
                "npm": { "action": "block", "paths": ["../bin/npm"] },
                "yarn": { "action": "block", "paths": ["../bin/yarn"] },
                "tsc": { "action": "block", "paths": ["../bin/tsc"] }
            } }"#,
        );
        let npm = sandbox.tool("bin", "npm");
        let yarn = sandbox.tool("bin", "yarn");
        let tsc = sandbox.tool("bin", "tsc");
        wrap(
            &sandbox.session,
            &WrapArgs {
                config: None,
                confirm_system_dir: false,
            },
            &mut Vec::new(),
        )
        .unwrap();

        // Interrupted uninstall: shim removed, sidecar left behind.
        fs::remove_file(&npm).unwrap();
        // Package manager reinstalled over the shim.
        fs::remove_file(&yarn).unwrap();
        fs::write(&yarn, "#!/bin/sh\necho yarn v2\n").unwrap();

        let mut out = Vec::new();
        let failures = recover(
            &sandbox.session,
            &RecoverArgs {
                search_paths: Vec::new(),
            },
            &mut out,
        )
        .unwrap();
        let out = Sandbox::output(out);

        assert_eq!(failures, 0, "{out}");
        assert!(out.contains("npm: restored original"), "{out}");
        assert!(out.contains("yarn: reinstalled over the shim"), "{out}");
        assert!(out.contains("tsc: healthy"), "{out}");

        assert_eq!(fs::read_to_string(&npm).unwrap(), "#!/bin/sh\necho real npm\n");
        assert_eq!(fs::read_to_string(&yarn).unwrap(), "#!/bin/sh\necho yarn v2\n");
        assert!(fs::symlink_metadata(sidecar_path(&yarn)).is_err());
        assert!(fs::symlink_metadata(&tsc).unwrap().file_type().is_symlink());

        let reg = Registry::load(&sandbox.session.registry_file).unwrap();
        assert_eq!(reg.wrappers.keys().collect::<Vec<_>>(), vec!["tsc"]);
    }

    #[test]
    fn test_recover_finds_unregistered_sidecars() {
        let sandbox = Sandbox::new("{}");
        let dir = sandbox.root().join("orphans");
        fs::create_dir_all(&dir).unwrap();
        fs::write(sidecar_path(&dir.join("pnpm")), "#!/bin/sh\n").unwrap();

        let mut out = Vec::new();
        recover(
            &sandbox.session,
            &RecoverArgs {
                search_paths: vec![dir.clone()],
            },
            &mut out,
        )
        .unwrap();

        assert!(Sandbox::output(out).contains("pnpm: restored original"));
        assert!(dir.join("pnpm").is_file());
    }

    #[test]
    fn test_nothing_to_recover() {
        let sandbox = Sandbox::new("{}");
        let mut out = Vec::new();
        recover(
            &sandbox.session,
            &RecoverArgs {
                search_paths: Vec::new(),
            },
            &mut out,
        )
        .unwrap();
        assert_eq!(Sandbox::output(out), "nothing to recover\n");
    }
}
