use ribbin_common::LockError;
use ribbin_security::ValidationError;
use std::io;
use std::path::PathBuf;

/// Why a permission failure happened, as far as ribbin can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionHint {
    CriticalBinary,
    NeedsConfirmation,
    Privileges,
}

#[derive(Debug, thiserror::Error)]
pub enum ShimError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error("{} is already shimmed (sidecar {} exists)", path.display(), sidecar.display())]
    AlreadyShimmed { path: PathBuf, sidecar: PathBuf },
    #[error("{} is not a shim", path.display())]
    NotAShim { path: PathBuf },
    #[error("sidecar {} for {} is missing; run `ribbin recover`", sidecar.display(), path.display())]
    SidecarMissing { path: PathBuf, sidecar: PathBuf },
    #[error("{} changed while it was being wrapped; nothing was modified", path.display())]
    Modified { path: PathBuf },
    #[error("{} has no file name", .0.display())]
    NoFileName(PathBuf),
    #[error("{}", permission_message(path, *hint))]
    PermissionDenied {
        path: PathBuf,
        hint: PermissionHint,
        #[source]
        source: io::Error,
    },
    #[error(
        "{op} failed for {}: {source}; restoring the original also failed: {rollback}",
        path.display()
    )]
    RollbackFailed {
        op: &'static str,
        path: PathBuf,
        source: io::Error,
        rollback: io::Error,
    },
    #[error("{op} failed for {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ShimError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Lock timeouts are the only failure worth retrying as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Lock(e) if e.is_timeout())
    }
}

fn permission_message(path: &std::path::Path, hint: PermissionHint) -> String {
    match hint {
        PermissionHint::CriticalBinary => format!(
            "permission denied for {}: it is a critical system binary and cannot be wrapped",
            path.display()
        ),
        PermissionHint::NeedsConfirmation => format!(
            "permission denied for {}: system directories require --confirm-system-dir \
             (and usually elevated privileges)",
            path.display()
        ),
        PermissionHint::Privileges => format!(
            "permission denied for {}: check ownership of the directory or retry with sudo",
            path.display()
        ),
    }
}
