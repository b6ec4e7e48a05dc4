//! Shim install and uninstall
//!
//! Both operations hold the per-binary exclusive lock for their whole
//! duration and fail closed: any error before the destructive rename leaves
//! the filesystem untouched, and a failure after it is rolled back.

use ribbin_common::audit::{self, AuditEvent};
use ribbin_common::lock::{lock_timeout, FileLock};
use ribbin_common::{command_name, metadata_path, paths, sidecar_path, Registry};
use ribbin_security::{
    classify_directory, is_critical_binary, rename_exclusive, resolve_symlink_chain,
    validate_binary_path, validate_install_target, DirectoryClass, FileSnapshot,
};
use serde_json::json;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PermissionHint, ShimError};
use crate::metadata::Metadata;

#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub lock_timeout: Duration,
    /// Allow directories that need explicit operator confirmation.
    pub confirm_system_dir: bool,
    /// Audit log to append to; `None` disables auditing.
    pub audit_log: Option<PathBuf>,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            lock_timeout: lock_timeout(),
            confirm_system_dir: false,
            audit_log: paths::audit_file().ok(),
        }
    }
}

/// What an install did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub command: String,
    pub binary: PathBuf,
    pub sidecar: PathBuf,
    /// Extra sidecar created at the end of the binary's symlink chain.
    pub resolved_sidecar: Option<PathBuf>,
    pub metadata_written: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ShimEngine {
    options: InstallOptions,
}

impl ShimEngine {
    pub fn new(options: InstallOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &InstallOptions {
        &self.options
    }

    /// Replace `binary` with a symlink to `dispatcher`, keeping the original
    /// as `<binary>.ribbin-original`, and record it in `registry`.
    pub fn install(
        &self,
        binary: &Path,
        dispatcher: &Path,
        registry: &mut Registry,
        config: Option<&Path>,
    ) -> Result<InstallReport, ShimError> {
        self.install_checked(binary, dispatcher, registry, config, |_| {})
    }

    /// [`Self::install`] with a callback run between the snapshot and the
    /// re-check that precedes the rename.
    fn install_checked<F>(
        &self,
        binary: &Path,
        dispatcher: &Path,
        registry: &mut Registry,
        config: Option<&Path>,
        before_commit: F,
    ) -> Result<InstallReport, ShimError>
    where
        F: FnOnce(&Path),
    {
        let confirm = self.options.confirm_system_dir;
        // Validated once to pick the lock location, again under the lock.
        let binary = validate_install_target(binary, confirm)?;
        let command = command_name(&binary).ok_or_else(|| ShimError::NoFileName(binary.clone()))?;

        let lock = FileLock::acquire(&binary, self.options.lock_timeout)?;
        let binary = validate_install_target(&binary, confirm)?;
        let snapshot =
            FileSnapshot::capture(&binary).map_err(|e| self.fs_error("inspect", &binary, e))?;
        let dispatcher = validate_binary_path(dispatcher)?;

        let resolved_target = self.resolve_layered_target(&binary, &dispatcher)?;

        let sidecar = sidecar_path(&binary);
        if fs::symlink_metadata(&sidecar).is_ok() {
            return Err(ShimError::AlreadyShimmed {
                path: binary,
                sidecar,
            });
        }

        before_commit(&binary);

        // Last check before anything is moved.
        let unchanged = snapshot
            .still_matches(&binary)
            .map_err(|e| self.fs_error("inspect", &binary, e))?;
        if !unchanged {
            return Err(ShimError::Modified { path: binary });
        }

        if let Err(e) = rename_exclusive(&binary, &sidecar) {
            if e.kind() == io::ErrorKind::AlreadyExists {
                return Err(ShimError::AlreadyShimmed {
                    path: binary,
                    sidecar,
                });
            }
            return Err(self.fs_error("move original aside", &binary, e));
        }

        if let Err(e) = make_symlink(&dispatcher, &binary) {
            if let Err(rollback) = fs::rename(&sidecar, &binary) {
                return Err(ShimError::RollbackFailed {
                    op: "create shim symlink",
                    path: binary,
                    source: e,
                    rollback,
                });
            }
            return Err(self.fs_error("create shim symlink", &binary, e));
        }

        let resolved_sidecar = resolved_target.and_then(|target| copy_layered_sidecar(&target));

        let metadata_written = match Metadata::capture(&sidecar, &dispatcher)
            .and_then(|meta| meta.write(&metadata_path(&binary)))
        {
            Ok(()) => true,
            Err(e) => {
                log::warn!("metadata for {} not written: {e:#}", binary.display());
                false
            }
        };

        let config = config.map(|c| fs::canonicalize(c).unwrap_or_else(|_| c.to_path_buf()));
        registry.add_wrapper(&command, binary.clone(), config);
        drop(lock);

        log::info!("wrapped {} -> {}", binary.display(), dispatcher.display());
        self.audit(
            AuditEvent::Install,
            &command,
            json!({
                "path": binary.display().to_string(),
                "dispatcher": dispatcher.display().to_string(),
            }),
        );

        Ok(InstallReport {
            command,
            binary,
            sidecar,
            resolved_sidecar,
            metadata_written,
        })
    }

    /// Put the original back at `binary` and drop its registry entry.
    pub fn uninstall(&self, binary: &Path, registry: &mut Registry) -> Result<(), ShimError> {
        let binary = validate_binary_path(binary)?;
        let command = command_name(&binary).ok_or_else(|| ShimError::NoFileName(binary.clone()))?;
        let _lock = FileLock::acquire(&binary, self.options.lock_timeout)?;

        let is_link = fs::symlink_metadata(&binary)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);
        if !is_link {
            return Err(ShimError::NotAShim { path: binary });
        }

        let sidecar = sidecar_path(&binary);
        if fs::symlink_metadata(&sidecar).is_err() {
            return Err(ShimError::SidecarMissing {
                path: binary,
                sidecar,
            });
        }

        let link_target =
            fs::read_link(&binary).map_err(|e| self.fs_error("read shim symlink", &binary, e))?;
        fs::remove_file(&binary).map_err(|e| self.fs_error("remove shim symlink", &binary, e))?;

        if let Err(e) = rename_exclusive(&sidecar, &binary) {
            if let Err(rollback) = make_symlink(&link_target, &binary) {
                return Err(ShimError::RollbackFailed {
                    op: "restore original",
                    path: binary,
                    source: e,
                    rollback,
                });
            }
            return Err(self.fs_error("restore original", &binary, e));
        }

        remove_if_present(&metadata_path(&binary));
        remove_layered_sidecar(&binary);

        match registry.wrapper(&command) {
            Some(entry) if entry.original == binary => {
                registry.remove_wrapper(&command);
            }
            Some(entry) => log::debug!(
                "registry entry for {command} belongs to {}, keeping it",
                entry.original.display()
            ),
            None => {}
        }

        log::info!("unwrapped {}", binary.display());
        self.audit(
            AuditEvent::Uninstall,
            &command,
            json!({ "path": binary.display().to_string() }),
        );
        Ok(())
    }

    /// For a binary that is itself a symlink (version-manager shims), the
    /// validated end of its chain. Refuses chains that already end at the
    /// dispatcher.
    fn resolve_layered_target(
        &self,
        binary: &Path,
        dispatcher: &Path,
    ) -> Result<Option<PathBuf>, ShimError> {
        let is_link = fs::symlink_metadata(binary)
            .map(|m| m.file_type().is_symlink())
            .map_err(|e| self.fs_error("inspect", binary, e))?;
        if !is_link {
            return Ok(None);
        }

        let target = resolve_symlink_chain(binary)?;
        if same_file(&target, dispatcher) {
            return Err(ShimError::AlreadyShimmed {
                path: binary.to_path_buf(),
                sidecar: sidecar_path(binary),
            });
        }
        Ok(Some(target))
    }

    fn fs_error(&self, op: &'static str, path: &Path, source: io::Error) -> ShimError {
        if source.kind() != io::ErrorKind::PermissionDenied {
            return ShimError::io(op, path, source);
        }
        let hint = permission_hint(path, self.options.confirm_system_dir);
        ShimError::PermissionDenied {
            path: path.to_path_buf(),
            hint,
            source,
        }
    }

    fn audit(&self, event: AuditEvent, command: &str, fields: serde_json::Value) {
        let Some(log_path) = &self.options.audit_log else {
            return;
        };
        let entry = audit::build_entry(event, command, fields);
        if let Err(e) = audit::write_entry(log_path, &entry) {
            log::debug!("audit record dropped: {e:#}");
        }
    }
}

pub(crate) fn permission_hint(path: &Path, confirmed: bool) -> PermissionHint {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if is_critical_binary(&name) {
        return PermissionHint::CriticalBinary;
    }
    let dir = path.parent().unwrap_or_else(|| Path::new("/"));
    if !confirmed && classify_directory(dir) == DirectoryClass::RequiresConfirmation {
        return PermissionHint::NeedsConfirmation;
    }
    PermissionHint::Privileges
}

fn copy_layered_sidecar(target: &Path) -> Option<PathBuf> {
    let copy = sidecar_path(target);
    if fs::symlink_metadata(&copy).is_ok() {
        return None;
    }
    match fs::copy(target, &copy) {
        Ok(_) => Some(copy),
        Err(e) => {
            log::debug!("no layered sidecar for {}: {e}", target.display());
            None
        }
    }
}

/// Remove the copy made by [`copy_layered_sidecar`] once `binary` is restored.
fn remove_layered_sidecar(binary: &Path) {
    let is_link = fs::symlink_metadata(binary)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false);
    if !is_link {
        return;
    }
    let Ok(target) = resolve_symlink_chain(binary) else {
        return;
    };
    // A separately wrapped target owns its sidecar and has metadata.
    if target == binary || metadata_path(&target).exists() {
        return;
    }
    remove_if_present(&sidecar_path(&target));
}

fn remove_if_present(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            log::warn!("failed to remove {}: {e}", path.display());
        }
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn make_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}
