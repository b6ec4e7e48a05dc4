//! `ribbin status`

use anyhow::Result;
use ribbin_common::sidecar_path;
use std::fs;
use std::io::Write;
use std::path::Path;

use super::Session;

/// Health of one registry entry as seen on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShimHealth {
    Ok,
    /// The shim symlink was replaced or removed.
    ShimMissing,
    /// The shim is in place but the original next to it is gone.
    SidecarMissing,
}

impl ShimHealth {
    pub fn check(binary: &Path, dispatcher: &Path) -> Self {
        let is_shim = fs::read_link(binary).is_ok_and(|target| {
            target == dispatcher || fs::canonicalize(binary).is_ok_and(|t| t == dispatcher)
        });
        if !is_shim {
            return Self::ShimMissing;
        }
        if fs::symlink_metadata(sidecar_path(binary)).is_err() {
            return Self::SidecarMissing;
        }
        Self::Ok
    }

    fn label(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::ShimMissing => "shim missing, run `ribbin recover`",
            Self::SidecarMissing => "original missing, run `ribbin recover`",
        }
    }
}

/// Print activation state and installed shims. Dead shell activations are
/// pruned and the registry saved.
pub fn status(session: &Session, is_alive: &dyn Fn(u32) -> bool, out: &mut dyn Write) -> Result<()> {
    let (registry, pruned) = session.update_registry(|registry| {
        let pruned = registry.prune_dead_shells(is_alive);
        Ok((registry.clone(), pruned))
    })?;
    if !pruned.is_empty() {
        log::info!("pruned dead shell activations: {pruned:?}");
    }

    writeln!(
        out,
        "global: {}",
        if registry.global_active { "active" } else { "inactive" }
    )?;

    if registry.shell_activations.is_empty() {
        writeln!(out, "shells: none")?;
    } else {
        writeln!(out, "shells:")?;
        for activation in registry.shell_activations.values() {
            let marker = if activation.pid == session.shell_pid {
                " (this shell)"
            } else {
                ""
            };
            writeln!(
                out,
                "  {}{marker} since {}",
                activation.pid,
                activation.activated_at.to_rfc3339()
            )?;
        }
    }

    if registry.config_activations.is_empty() {
        writeln!(out, "configs: none")?;
    } else {
        writeln!(out, "configs:")?;
        for (path, activation) in &registry.config_activations {
            writeln!(out, "  {path} since {}", activation.activated_at.to_rfc3339())?;
        }
    }

    if registry.wrappers.is_empty() {
        writeln!(out, "wrappers: none")?;
    } else {
        writeln!(out, "wrappers:")?;
        for (command, entry) in &registry.wrappers {
            let health = ShimHealth::check(&entry.original, &session.dispatcher);
            writeln!(
                out,
                "  {command:<12} {} [{}]",
                entry.original.display(),
                health.label()
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::WrapArgs;
    use crate::commands::testing::Sandbox;
    use crate::commands::wrap::wrap;
    use ribbin_common::Registry;

    #[test]
    fn test_status_prunes_dead_shells_and_reports_health() {
        let sandbox = Sandbox::new(
            r#"{ "wrappers": {
                "npm": { "action": "block", "paths": ["../bin/npm"] },
                "yarn": { "action": "block", "paths": ["../bin/yarn"] }
            } }"#,
        );
        let _npm = sandbox.tool("bin", "npm");
        let yarn = sandbox.tool("bin", "yarn");
        wrap(
            &sandbox.session,
            &WrapArgs {
                config: None,
                confirm_system_dir: false,
            },
            &mut Vec::new(),
        )
        .unwrap();
        fs::remove_file(sidecar_path(&yarn)).unwrap();
        sandbox
            .session
            .update_registry(|registry| {
                registry.activate_shell(111);
                registry.activate_shell(222);
                Ok(())
            })
            .unwrap();

        let mut out = Vec::new();
        status(&sandbox.session, &|pid| pid == 222, &mut out).unwrap();
        let out = Sandbox::output(out);

        assert!(out.contains("global: inactive"), "{out}");
        assert!(out.contains("  222"), "{out}");
        assert!(!out.contains("  111"), "{out}");
        assert!(out.contains("npm          "), "{out}");
        assert!(out.contains("[ok]"), "{out}");
        assert!(out.contains("original missing"), "{out}");

        let reg = Registry::load(&sandbox.session.registry_file).unwrap();
        assert_eq!(reg.shell_activations.keys().copied().collect::<Vec<_>>(), vec![222]);
    }

    #[test]
    fn test_status_on_fresh_home() {
        let sandbox = Sandbox::new("{}");
        let mut out = Vec::new();
        status(&sandbox.session, &|_| true, &mut out).unwrap();
        assert_eq!(
            Sandbox::output(out),
            "global: inactive\nshells: none\nconfigs: none\nwrappers: none\n"
        );
    }

    #[test]
    fn test_health_check_detects_replaced_shim() {
        let sandbox = Sandbox::new("{}");
        let tool = sandbox.tool("bin", "tsc");
        assert_eq!(
            ShimHealth::check(&tool, &sandbox.session.dispatcher),
            ShimHealth::ShimMissing
        );
    }
}
