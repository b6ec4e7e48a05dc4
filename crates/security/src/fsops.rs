use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::time::SystemTime;

/// Identity of a path as seen by `lstat`, used to detect swaps between
/// validation and rename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    pub len: u64,
    pub mode: u32,
    pub modified: Option<SystemTime>,
    pub inode: u64,
    pub is_symlink: bool,
}

impl FileSnapshot {
    pub fn capture(path: &Path) -> io::Result<Self> {
        let meta = fs::symlink_metadata(path)?;
        Ok(Self {
            len: meta.len(),
            mode: mode_of(&meta),
            modified: meta.modified().ok(),
            inode: inode_of(&meta),
            is_symlink: meta.file_type().is_symlink(),
        })
    }

    /// Re-read `path` and report whether it still looks the same.
    pub fn still_matches(&self, path: &Path) -> io::Result<bool> {
        Ok(Self::capture(path)? == *self)
    }
}

/// Rename `from` to `to`, refusing when `to` already exists.
///
/// The destination is claimed with an exclusive create before the rename so a
/// concurrent writer cannot slip a file in first.
pub fn rename_exclusive(from: &Path, to: &Path) -> io::Result<()> {
    OpenOptions::new().write(true).create_new(true).open(to)?;
    if let Err(err) = fs::rename(from, to) {
        let _ = fs::remove_file(to);
        return Err(err);
    }
    Ok(())
}

#[cfg(unix)]
fn mode_of(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
}

#[cfg(not(unix))]
fn mode_of(meta: &fs::Metadata) -> u32 {
    u32::from(meta.permissions().readonly())
}

#[cfg(unix)]
fn inode_of(meta: &fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(not(unix))]
fn inode_of(_meta: &fs::Metadata) -> u64 {
    0
}
