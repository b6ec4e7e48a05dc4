use anyhow::Result;
use std::path::PathBuf;

use crate::env_vars;

pub const RIBBIN_DIR_NAME: &str = "ribbin";
pub const REGISTRY_FILE_NAME: &str = "registry.json";
pub const AUDIT_FILE_NAME: &str = "audit.log";

pub fn ribbin_home() -> Result<PathBuf> {
    if let Ok(override_home) = std::env::var(env_vars::HOME) {
        let trimmed = override_home.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }
    if let Some(config) = dirs::config_dir() {
        return Ok(config.join(RIBBIN_DIR_NAME));
    }
    Ok(dirs::home_dir()
        .ok_or_else(|| anyhow::anyhow!("No home directory found"))?
        .join(".config")
        .join(RIBBIN_DIR_NAME))
}

pub fn registry_file() -> Result<PathBuf> {
    Ok(ribbin_home()?.join(REGISTRY_FILE_NAME))
}

pub fn audit_file() -> Result<PathBuf> {
    Ok(ribbin_home()?.join(AUDIT_FILE_NAME))
}
