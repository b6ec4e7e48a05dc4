//! Shared building blocks for ribbin components
//!
//! Everything that both the installer and the live dispatcher need lives here:
//! on-disk naming conventions, the registry store, cross-process file locks,
//! project configuration loading and resolution, and the audit log.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub mod audit;
pub mod config;
pub mod lock;
pub mod paths;
pub mod registry;

pub use lock::{with_lock, with_shared_lock, FileLock, LockError};
pub use registry::{Registry, WrapperEntry};

/// Suffix of the relocated original binary.
pub const SIDECAR_SUFFIX: &str = ".ribbin-original";
/// Suffix of the wrap-time metadata document.
pub const METADATA_SUFFIX: &str = ".ribbin-meta";
/// Suffix appended to a target path to form its lock file.
pub const LOCK_SUFFIX: &str = ".lock";

/// Environment variable names forming the runtime contract
pub mod env_vars {
    pub const BYPASS: &str = "RIBBIN_BYPASS"; // "1" forces passthrough
    pub const HOME: &str = "RIBBIN_HOME"; // Overrides the state directory
    pub const LOG: &str = "RIBBIN_LOG"; // env_logger filter
    pub const LOCK_TIMEOUT_MS: &str = "RIBBIN_LOCK_TIMEOUT_MS";
    pub const ORIGINAL_BIN: &str = "RIBBIN_ORIGINAL_BIN"; // Exported to redirect scripts
    pub const COMMAND: &str = "RIBBIN_COMMAND";
    pub const CONFIG: &str = "RIBBIN_CONFIG";
    pub const ACTION: &str = "RIBBIN_ACTION";
}

/// Version stamped into metadata files.
pub const RIBBIN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Path of the sidecar for `binary`, i.e. `<binary>.ribbin-original`.
pub fn sidecar_path(binary: &Path) -> PathBuf {
    with_suffix(binary, SIDECAR_SUFFIX)
}

/// Path of the metadata file for `binary`, i.e. `<binary>.ribbin-meta`.
pub fn metadata_path(binary: &Path) -> PathBuf {
    with_suffix(binary, METADATA_SUFFIX)
}

/// Path of the lock file guarding `target`.
pub fn lock_path(target: &Path) -> PathBuf {
    with_suffix(target, LOCK_SUFFIX)
}

/// Basename of a binary path, used as the registry key.
pub fn command_name(binary: &Path) -> Option<String> {
    binary
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

/// Lexically normalize a path: drop `.` components and fold `..` where a
/// parent is available. Never touches the filesystem.
pub fn clean_path(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !path.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Make `path` absolute against `base` (when relative) and clean it.
pub fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        clean_path(path)
    } else {
        clean_path(&base.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffix_paths() {
        let bin = Path::new("/usr/local/bin/npm");
        assert_eq!(
            sidecar_path(bin),
            PathBuf::from("/usr/local/bin/npm.ribbin-original")
        );
        assert_eq!(
            metadata_path(bin),
            PathBuf::from("/usr/local/bin/npm.ribbin-meta")
        );
        assert_eq!(lock_path(bin), PathBuf::from("/usr/local/bin/npm.lock"));
    }

    #[test]
    fn test_command_name() {
        assert_eq!(
            command_name(Path::new("/usr/local/bin/tsc")).as_deref(),
            Some("tsc")
        );
        assert_eq!(command_name(Path::new("/")), None);
    }

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(clean_path(Path::new("/../a")), PathBuf::from("/a"));
        assert_eq!(clean_path(Path::new("a/../../b")), PathBuf::from("../b"));
        assert_eq!(clean_path(Path::new("./")), PathBuf::from("."));
    }

    #[test]
    fn test_absolutize() {
        assert_eq!(
            absolutize(Path::new("bin/../npm"), Path::new("/proj")),
            PathBuf::from("/proj/npm")
        );
        assert_eq!(
            absolutize(Path::new("/x/y"), Path::new("/proj")),
            PathBuf::from("/x/y")
        );
    }
}
