use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("empty path")]
    Empty,
    #[error("path {} contains a `..` traversal component", .0.display())]
    Traversal(PathBuf),
    #[error("refusing {}: paths under {prefix} are protected system locations", path.display())]
    ProtectedPath { path: PathBuf, prefix: &'static str },
    #[error("{name} ({}) is a critical system binary and can never be wrapped", path.display())]
    CriticalBinary { name: String, path: PathBuf },
    #[error("{} is in a forbidden directory; ribbin will not wrap binaries there", path.display())]
    ForbiddenDirectory { path: PathBuf },
    #[error("{} is in a system directory; rerun with --confirm-system-dir to wrap it anyway", path.display())]
    RequiresConfirmation { path: PathBuf },
    #[error("symlink chain starting at {} is circular (revisits {})", start.display(), repeated.display())]
    CircularSymlink { start: PathBuf, repeated: PathBuf },
    #[error("symlink chain starting at {} is too deep (more than {max} links)", start.display())]
    SymlinkTooDeep { start: PathBuf, max: usize },
    #[error("cannot inspect {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ValidationError {
    /// Whether an operator flag could make this path acceptable.
    pub fn is_overridable(&self) -> bool {
        matches!(self, Self::RequiresConfirmation { .. })
    }
}
