//! Persisted ribbin state: wrapped commands and activation entries
//!
//! The registry is an explicit value. Callers load it, mutate it in memory and
//! save it back; [`Registry::update`] does all three under the registry's own
//! exclusive lock so concurrent installs of different binaries cannot lose
//! each other's entries.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

use crate::lock::FileLock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrapperEntry {
    /// Absolute path where the shim symlink lives.
    pub original: PathBuf,
    /// Config file that requested the wrap, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellActivation {
    pub pid: u32,
    pub activated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigActivation {
    pub activated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    /// Keyed by command basename (`npm`), never by full path.
    #[serde(default)]
    pub wrappers: BTreeMap<String, WrapperEntry>,
    #[serde(default)]
    pub shell_activations: BTreeMap<u32, ShellActivation>,
    #[serde(default)]
    pub config_activations: BTreeMap<String, ConfigActivation>,
    #[serde(default)]
    pub global_active: bool,
}

impl Registry {
    /// Load from `path`; a missing file is an empty registry.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read registry {}", path.display()))
            }
        };
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse registry {}", path.display()))
    }

    /// Atomically replace `path` with this registry.
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create registry directory {}", parent.display()))?;

        let json = serde_json::to_string_pretty(self).context("failed to serialize registry")?;
        let mut temp = NamedTempFile::new_in(parent)
            .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
        temp.write_all(json.as_bytes())
            .context("failed to write registry")?;
        temp.write_all(b"\n").context("failed to write registry")?;
        temp.as_file().sync_all().ok();
        temp.persist(path)
            .map_err(|e| e.error)
            .with_context(|| format!("failed to persist registry {}", path.display()))?;
        Ok(())
    }

    /// Load, mutate and save under the registry's exclusive lock.
    pub fn update<T, F>(path: &Path, timeout: Duration, f: F) -> Result<T>
    where
        F: FnOnce(&mut Registry) -> Result<T>,
    {
        let _lock = FileLock::acquire(path, timeout)?;
        let mut registry = Self::load(path)?;
        let value = f(&mut registry)?;
        registry.save(path)?;
        Ok(value)
    }

    /// Load under a shared lock, for readers that must not observe a write
    /// in progress on platforms without atomic rename.
    pub fn load_shared(path: &Path, timeout: Duration) -> Result<Self> {
        let _lock = FileLock::acquire_shared(path, timeout)?;
        Self::load(path)
    }

    pub fn add_wrapper(&mut self, command: &str, original: PathBuf, config: Option<PathBuf>) {
        self.wrappers
            .insert(command.to_string(), WrapperEntry { original, config });
    }

    pub fn remove_wrapper(&mut self, command: &str) -> Option<WrapperEntry> {
        self.wrappers.remove(command)
    }

    pub fn wrapper(&self, command: &str) -> Option<&WrapperEntry> {
        self.wrappers.get(command)
    }

    pub fn activate_shell(&mut self, pid: u32) {
        self.shell_activations.insert(
            pid,
            ShellActivation {
                pid,
                activated_at: Utc::now(),
            },
        );
    }

    pub fn deactivate_shell(&mut self, pid: u32) -> bool {
        self.shell_activations.remove(&pid).is_some()
    }

    pub fn activate_config(&mut self, config: &Path) {
        self.config_activations.insert(
            config.display().to_string(),
            ConfigActivation {
                activated_at: Utc::now(),
            },
        );
    }

    pub fn deactivate_config(&mut self, config: &Path) -> bool {
        self.config_activations
            .remove(&config.display().to_string())
            .is_some()
    }

    pub fn is_config_activated(&self, config: &Path) -> bool {
        self.config_activations
            .contains_key(&config.display().to_string())
    }

    /// Drop shell activations whose process is gone. Returns the pruned pids.
    pub fn prune_dead_shells<F>(&mut self, is_alive: F) -> Vec<u32>
    where
        F: Fn(u32) -> bool,
    {
        let dead: Vec<u32> = self
            .shell_activations
            .keys()
            .copied()
            .filter(|pid| !is_alive(*pid))
            .collect();
        for pid in &dead {
            self.shell_activations.remove(pid);
        }
        dead
    }

    /// Clear every activation tier.
    pub fn deactivate_all(&mut self) {
        self.global_active = false;
        self.shell_activations.clear();
        self.config_activations.clear();
    }
}
