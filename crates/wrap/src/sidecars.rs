//! Sidecar inspection: hash conflicts, orphan discovery and repair

use glob::Pattern;
use ribbin_common::audit::{self, AuditEvent};
use ribbin_common::lock::FileLock;
use ribbin_common::{command_name, metadata_path, sidecar_path, Registry, SIDECAR_SUFFIX};
use ribbin_security::{rename_exclusive, validate_binary_path};
use serde_json::json;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::engine::ShimEngine;
use crate::error::ShimError;
use crate::metadata::{hash_file, Metadata};

/// Sidecar content compared with what was recorded at wrap time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashCheck {
    Match,
    Conflict { expected: String, actual: String },
    NoMetadata,
}

/// Recompute the sidecar hash for `binary` and compare it with its metadata.
pub fn check_hash_conflict(binary: &Path) -> Result<HashCheck, ShimError> {
    let meta = match Metadata::load(&metadata_path(binary)) {
        Ok(meta) => meta,
        Err(e) => {
            log::debug!("no usable metadata for {}: {e:#}", binary.display());
            return Ok(HashCheck::NoMetadata);
        }
    };
    let sidecar = sidecar_path(binary);
    let (actual, _) = hash_file(&sidecar).map_err(|e| {
        ShimError::io(
            "hash sidecar",
            &sidecar,
            io::Error::other(format!("{e:#}")),
        )
    })?;
    if actual == meta.original_hash {
        Ok(HashCheck::Match)
    } else {
        Ok(HashCheck::Conflict {
            expected: meta.original_hash,
            actual,
        })
    }
}

/// Every `*.ribbin-original` directly inside the given directories.
pub fn find_sidecars(search_paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for dir in search_paths {
        let pattern = format!(
            "{}/*{}",
            Pattern::escape(&dir.to_string_lossy()),
            SIDECAR_SUFFIX
        );
        let entries = match glob::glob(&pattern) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("bad search path {}: {e}", dir.display());
                continue;
            }
        };
        found.extend(entries.filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                log::debug!("skipping unreadable entry: {e}");
                None
            }
        }));
    }
    found.sort();
    found.dedup();
    found
}

/// The binary path a sidecar belongs to.
pub fn binary_for_sidecar(sidecar: &Path) -> Option<PathBuf> {
    let raw = sidecar.to_str()?;
    raw.strip_suffix(SIDECAR_SUFFIX)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

/// State of one wrapped location after [`ShimEngine::reconcile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Shim symlink and sidecar are both in place.
    Healthy,
    /// The binary was gone; the sidecar was moved back.
    Restored,
    /// A regular binary was reinstalled over the shim; the stale sidecar was
    /// discarded.
    DiscardedStale { verdict: HashCheck },
    /// The shim is in place but its original is gone.
    MissingOriginal,
    NotWrapped,
}

impl ShimEngine {
    /// Classify `binary` and repair inconsistent state where that is safe.
    pub fn reconcile(
        &self,
        binary: &Path,
        registry: &mut Registry,
    ) -> Result<ReconcileOutcome, ShimError> {
        let binary = validate_binary_path(binary)?;
        let command = command_name(&binary).ok_or_else(|| ShimError::NoFileName(binary.clone()))?;
        let _lock = FileLock::acquire(&binary, self.options().lock_timeout)?;

        let sidecar = sidecar_path(&binary);
        let has_sidecar = fs::symlink_metadata(&sidecar).is_ok();
        let binary_kind = fs::symlink_metadata(&binary).map(|m| m.file_type());

        let outcome = match (binary_kind, has_sidecar) {
            (Ok(kind), true) if kind.is_symlink() => ReconcileOutcome::Healthy,
            (Ok(kind), false) if kind.is_symlink() => {
                log::warn!(
                    "{} is a shim but {} is missing",
                    binary.display(),
                    sidecar.display()
                );
                ReconcileOutcome::MissingOriginal
            }
            (Err(e), true) if e.kind() == io::ErrorKind::NotFound => {
                rename_exclusive(&sidecar, &binary)
                    .map_err(|e| ShimError::io("restore original", &binary, e))?;
                discard(&metadata_path(&binary))?;
                forget(registry, &command, &binary);
                ReconcileOutcome::Restored
            }
            (Ok(_), true) => {
                let verdict = check_hash_conflict(&binary)?;
                log::warn!(
                    "{} was reinstalled after wrapping; discarding stale sidecar ({verdict:?})",
                    binary.display()
                );
                discard(&sidecar)?;
                discard(&metadata_path(&binary))?;
                forget(registry, &command, &binary);
                ReconcileOutcome::DiscardedStale { verdict }
            }
            (Err(e), true) => return Err(ShimError::io("inspect", &binary, e)),
            (_, false) => ReconcileOutcome::NotWrapped,
        };

        if !matches!(
            outcome,
            ReconcileOutcome::Healthy | ReconcileOutcome::NotWrapped
        ) {
            if let Some(log_path) = &self.options().audit_log {
                let entry = audit::build_entry(
                    AuditEvent::Recover,
                    &command,
                    json!({
                        "path": binary.display().to_string(),
                        "outcome": format!("{outcome:?}"),
                    }),
                );
                if let Err(e) = audit::write_entry(log_path, &entry) {
                    log::debug!("audit record dropped: {e:#}");
                }
            }
        }
        Ok(outcome)
    }
}

fn discard(path: &Path) -> Result<(), ShimError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ShimError::io("remove", path, e)),
    }
}

fn forget(registry: &mut Registry, command: &str, binary: &Path) {
    if registry
        .wrapper(command)
        .is_some_and(|entry| entry.original == binary)
    {
        registry.remove_wrapper(command);
    }
}
