//! Three-tier activation gate
//!
//! Shims are dormant unless one tier says otherwise, checked in order:
//! the global flag, a live activated shell among our ancestors, then the
//! nearest config file being activated.

use ribbin_common::Registry;
use std::path::Path;

use crate::process::{ancestors, ProcessInspector, MAX_ANCESTRY};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    Global,
    Shell { pid: u32 },
    Config,
    Inactive,
}

impl Activation {
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Inactive)
    }
}

/// Evaluate the gate. Dead shell entries are pruned from `registry` in memory
/// before the shell tier is checked.
pub fn check_activation(
    registry: &mut Registry,
    inspector: &dyn ProcessInspector,
    nearest_config: Option<&Path>,
) -> Activation {
    if registry.global_active {
        return Activation::Global;
    }

    if !registry.shell_activations.is_empty() {
        let pruned = registry.prune_dead_shells(|pid| inspector.is_alive(pid));
        if !pruned.is_empty() {
            log::debug!("ignoring dead shell activations: {pruned:?}");
        }
        let lineage = std::iter::once(inspector.current_pid())
            .chain(ancestors(inspector, MAX_ANCESTRY));
        for pid in lineage {
            if registry.shell_activations.contains_key(&pid) {
                return Activation::Shell { pid };
            }
        }
    }

    if let Some(config) = nearest_config {
        if config_is_activated(registry, config) {
            return Activation::Config;
        }
    }

    Activation::Inactive
}

fn config_is_activated(registry: &Registry, config: &Path) -> bool {
    if registry.is_config_activated(config) {
        return true;
    }
    std::fs::canonicalize(config)
        .map(|canonical| registry.is_config_activated(&canonical))
        .unwrap_or(false)
}
