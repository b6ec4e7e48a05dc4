use ribbin_common::absolutize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ValidationError;
use crate::validate::validate_hop;

/// Links followed before a chain is rejected.
pub const MAX_SYMLINK_DEPTH: usize = 10;

/// Follow `start` link by link and return the final non-link target.
///
/// Every hop is validated: no protected prefix, no critical binary name and no
/// forbidden directory. Relative targets are joined to the link's directory.
/// A chain of exactly `MAX_SYMLINK_DEPTH` links resolves; one more fails.
pub fn resolve_symlink_chain(start: &Path) -> Result<PathBuf, ValidationError> {
    let mut visited = HashSet::new();
    let mut current = start.to_path_buf();
    let mut links = 0usize;

    loop {
        if !visited.insert(current.clone()) {
            return Err(ValidationError::CircularSymlink {
                start: start.to_path_buf(),
                repeated: current,
            });
        }
        validate_hop(&current)?;

        let meta = fs::symlink_metadata(&current).map_err(|source| ValidationError::Io {
            path: current.clone(),
            source,
        })?;
        if !meta.file_type().is_symlink() {
            return Ok(current);
        }

        if links == MAX_SYMLINK_DEPTH {
            return Err(ValidationError::SymlinkTooDeep {
                start: start.to_path_buf(),
                max: MAX_SYMLINK_DEPTH,
            });
        }
        links += 1;

        let target = fs::read_link(&current).map_err(|source| ValidationError::Io {
            path: current.clone(),
            source,
        })?;
        let base = current.parent().unwrap_or_else(|| Path::new("/"));
        current = absolutize(&target, base);
    }
}
