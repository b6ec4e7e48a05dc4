//! Locating the original binary behind a shim

use anyhow::{anyhow, Result};
use ribbin_common::{sidecar_path, Registry};
use std::fs;
use std::path::PathBuf;

use crate::context::Invocation;

/// Sidecar locations to try, in order: beside the invoked path, beside its
/// absolute form, beside the dispatcher executable, then the registry entry.
pub fn sidecar_candidates(inv: &Invocation, registry: Option<&Registry>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    let mut push = |path: PathBuf| {
        let sidecar = sidecar_path(&path);
        if !candidates.contains(&sidecar) {
            candidates.push(sidecar);
        }
    };

    if let Some(invoked) = inv.invoked_path() {
        push(invoked);
    }
    if let Some(absolute) = inv.absolute_invoked_path() {
        push(absolute);
    }
    if let Some(dir) = inv.current_exe.as_deref().and_then(|exe| exe.parent()) {
        push(dir.join(&inv.command));
    }
    if let Some(entry) = registry.and_then(|r| r.wrapper(&inv.command)) {
        push(entry.original.clone());
    }
    candidates
}

/// First existing sidecar; running out of candidates is fatal.
pub fn locate_original(inv: &Invocation, registry: Option<&Registry>) -> Result<PathBuf> {
    let candidates = sidecar_candidates(inv, registry);
    candidates
        .iter()
        .find(|candidate| fs::metadata(candidate).is_ok())
        .cloned()
        .ok_or_else(|| {
            anyhow!(
                "original binary for `{}` not found (looked for {}); run `ribbin recover`",
                inv.command,
                candidates
                    .iter()
                    .map(|c| c.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        })
}
