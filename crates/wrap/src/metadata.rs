//! `<binary>.ribbin-meta` documents

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub wrapped_at: DateTime<Utc>,
    /// `sha256:<hex>` of the sidecar at wrap time.
    pub original_hash: String,
    pub original_size: u64,
    /// Dispatcher the shim symlink points at.
    pub ribbin_path: PathBuf,
    pub ribbin_version: String,
}

impl Metadata {
    /// Describe `sidecar` as it is right now.
    pub fn capture(sidecar: &Path, dispatcher: &Path) -> Result<Self> {
        let (original_hash, original_size) = hash_file(sidecar)?;
        Ok(Self {
            wrapped_at: Utc::now(),
            original_hash,
            original_size,
            ribbin_path: dispatcher.to_path_buf(),
            ribbin_version: ribbin_common::RIBBIN_VERSION.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read metadata {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse metadata {}", path.display()))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize metadata")?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
    }
}

/// SHA-256 of `path` (following symlinks) as `sha256:<hex>`, plus its size.
pub fn hash_file(path: &Path) -> Result<(String, u64)> {
    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    let mut size = 0u64;
    loop {
        let n = file
            .read(&mut buffer)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        size += n as u64;
    }
    Ok((format!("sha256:{:x}", hasher.finalize()), size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_hash_matches_known_digest() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("empty");
        fs::write(&path, "").unwrap();

        let (hash, size) = hash_file(&path).unwrap();
        assert_eq!(
            hash,
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(size, 0);
    }

    #[test]
    fn test_document_field_names() {
        let temp = TempDir::new().unwrap();
        let sidecar = temp.path().join("npm.ribbin-original");
        fs::write(&sidecar, "#!/bin/sh\necho npm\n").unwrap();

        let meta = Metadata::capture(&sidecar, Path::new("/usr/local/bin/ribbin")).unwrap();
        let meta_path = temp.path().join("npm.ribbin-meta");
        meta.write(&meta_path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&meta_path).unwrap()).unwrap();
        for key in [
            "wrapped_at",
            "original_hash",
            "original_size",
            "ribbin_path",
            "ribbin_version",
        ] {
            assert!(raw.get(key).is_some(), "missing {key}");
        }
        assert_eq!(raw["original_size"], 19);
        assert_eq!(Metadata::load(&meta_path).unwrap(), meta);
    }
}
