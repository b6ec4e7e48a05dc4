use ribbin_common::absolutize;
use std::env;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::ValidationError;

/// Locations a shim may never touch, matched as path prefixes.
pub const DANGEROUS_PREFIXES: &[&str] = &[
    "/etc/",
    "/private/etc/",
    "/var/",
    "/sys/",
    "/proc/",
    "/dev/",
    "/boot/",
    "/root/",
];

/// Temp trees allowed even though a parent prefix is dangerous.
const TEMP_PREFIXES: &[&str] = &[
    "/tmp/",
    "/private/tmp/",
    "/var/tmp/",
    "/var/folders/",
    "/private/var/folders/",
];

/// User-managed install prefixes that need no confirmation.
const ALLOWED_PREFIXES: &[&str] = &[
    "/usr/local/",
    "/opt/homebrew/",
    "/opt/local/",
    "/home/linuxbrew/",
];

/// Binaries that are never wrapped, wherever they live.
pub const CRITICAL_BINARIES: &[&str] = &[
    // shells
    "sh", "bash", "zsh", "fish", "dash", "ksh", "tcsh", "csh",
    // privilege escalation
    "sudo", "su", "doas", "pkexec",
    // remote access and authentication
    "ssh", "sshd", "login", "passwd",
    // init
    "init", "systemd", "launchd",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryClass {
    Allowed,
    RequiresConfirmation,
    Forbidden,
}

pub fn is_critical_binary(name: &str) -> bool {
    CRITICAL_BINARIES.contains(&name)
}

/// General validation: no traversal, absolute, and neither the path nor its
/// first symlink target under a protected prefix. Returns the absolute path.
pub fn validate_binary_path(path: &Path) -> Result<PathBuf, ValidationError> {
    if path.as_os_str().is_empty() {
        return Err(ValidationError::Empty);
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(ValidationError::Traversal(path.to_path_buf()));
    }

    let cwd = env::current_dir().map_err(|source| ValidationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let absolute = absolutize(path, &cwd);
    ensure_unprotected(&absolute)?;

    if let Some(target) = one_level_target(&absolute) {
        ensure_unprotected(&target)?;
    }

    Ok(absolute)
}

/// Install-time validation: general checks, critical-binary names, and the
/// directory class of the containing directory.
pub fn validate_install_target(
    path: &Path,
    confirm_system_dir: bool,
) -> Result<PathBuf, ValidationError> {
    let absolute = validate_binary_path(path)?;
    ensure_not_critical(&absolute)?;

    let dir = absolute.parent().unwrap_or_else(|| Path::new("/"));
    match classify_directory(dir) {
        DirectoryClass::Allowed => Ok(absolute),
        DirectoryClass::RequiresConfirmation if confirm_system_dir => {
            log::warn!(
                "wrapping {} in a system directory (confirmed)",
                absolute.display()
            );
            Ok(absolute)
        }
        DirectoryClass::RequiresConfirmation => {
            Err(ValidationError::RequiresConfirmation { path: absolute })
        }
        DirectoryClass::Forbidden => Err(ValidationError::ForbiddenDirectory { path: absolute }),
    }
}

pub fn classify_directory(dir: &Path) -> DirectoryClass {
    if is_temp_path(dir) {
        return DirectoryClass::Allowed;
    }
    if protected_prefix(dir).is_some() {
        return DirectoryClass::Forbidden;
    }
    if let Some(home) = dirs::home_dir() {
        if home != Path::new("/") && dir.starts_with(&home) {
            return DirectoryClass::Allowed;
        }
    }
    let with_slash = slashed(dir);
    if ALLOWED_PREFIXES.iter().any(|p| with_slash.starts_with(p)) || is_node_modules_bin(dir) {
        return DirectoryClass::Allowed;
    }
    DirectoryClass::RequiresConfirmation
}

/// The dangerous prefix `path` falls under, if any. Temp trees are exempt.
pub fn protected_prefix(path: &Path) -> Option<&'static str> {
    if is_temp_path(path) {
        return None;
    }
    let with_slash = slashed(path);
    DANGEROUS_PREFIXES
        .iter()
        .copied()
        .find(|prefix| with_slash.starts_with(prefix))
}

/// Rules re-applied at every hop of a symlink chain.
pub(crate) fn validate_hop(path: &Path) -> Result<(), ValidationError> {
    ensure_unprotected(path)?;
    ensure_not_critical(path)?;
    let dir = path.parent().unwrap_or_else(|| Path::new("/"));
    if classify_directory(dir) == DirectoryClass::Forbidden {
        return Err(ValidationError::ForbiddenDirectory {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

fn ensure_unprotected(path: &Path) -> Result<(), ValidationError> {
    match protected_prefix(path) {
        Some(prefix) => Err(ValidationError::ProtectedPath {
            path: path.to_path_buf(),
            prefix,
        }),
        None => Ok(()),
    }
}

fn ensure_not_critical(path: &Path) -> Result<(), ValidationError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if is_critical_binary(&name) {
        return Err(ValidationError::CriticalBinary {
            name,
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

fn one_level_target(path: &Path) -> Option<PathBuf> {
    let meta = fs::symlink_metadata(path).ok()?;
    if !meta.file_type().is_symlink() {
        return None;
    }
    let target = fs::read_link(path).ok()?;
    let base = path.parent().unwrap_or_else(|| Path::new("/"));
    Some(absolutize(&target, base))
}

fn is_temp_path(path: &Path) -> bool {
    let with_slash = slashed(path);
    if TEMP_PREFIXES.iter().any(|p| with_slash.starts_with(p)) {
        return true;
    }
    let temp = env::temp_dir();
    if temp.parent().is_some() && path.starts_with(&temp) {
        return true;
    }
    fs::canonicalize(&temp)
        .map(|canonical| canonical.parent().is_some() && path.starts_with(canonical))
        .unwrap_or(false)
}

fn is_node_modules_bin(dir: &Path) -> bool {
    let mut components = dir.components().rev();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(bin)), Some(Component::Normal(modules)))
            if bin == ".bin" && modules == "node_modules"
    )
}

fn slashed(path: &Path) -> String {
    let mut text = path.to_string_lossy().into_owned();
    if !text.ends_with('/') {
        text.push('/');
    }
    text
}
