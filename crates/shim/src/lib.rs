//! ribbin dispatcher
//!
//! Every wrapped command is a symlink to the `ribbin` binary. Invoked under
//! any name other than `ribbin`, it runs [`run_shim`], which:
//!
//! 1. Builds the [`Invocation`] from `argv[0]`, arguments and working directory.
//! 2. Loads the registry and locates the original binary. A shim whose
//!    original is gone is an error whatever the policy says.
//! 3. Finds the nearest project config and asks [`decide`] for a
//!    [`Decision`], checking activation first.
//! 4. Blocks with a message, or replaces itself with the original binary or a
//!    redirect script.
//!
//! Interception is silent unless a command is blocked, and fails open: a
//! broken registry, config or redirect script runs the original.
//!
//! ```rust,no_run
//! fn main() -> anyhow::Result<()> {
//!     let exit_code = ribbin_shim::run_shim()?;
//!     std::process::exit(exit_code);
//! }
//! ```

pub use activation::{check_activation, Activation};
pub use context::{is_bypass_enabled, Invocation};
pub use decision::{decide, effective_policy, Decision, DecisionInput, PassthroughReason};
pub use process::{ProcessInspector, SystemProcesses};
pub use resolver::{locate_original, sidecar_candidates};

mod activation;
mod context;
mod decision;
mod exec;
mod process;
mod resolver;

use anyhow::Result;
use ribbin_common::audit::{self, AuditEvent};
use ribbin_common::config::find_nearest_config;
use ribbin_common::{paths, Registry};
use serde_json::json;

/// Dispatch the current invocation. Returns an exit code only when the
/// process was not replaced (a block, or a non-Unix platform).
pub fn run_shim() -> Result<i32> {
    let inv = Invocation::from_env()?;
    let bypass = is_bypass_enabled();

    let mut registry = load_registry();
    let original = locate_original(&inv, registry.as_ref())?;
    let config_path = find_nearest_config(&inv.cwd);
    let invoked = inv.absolute_invoked_path();

    let decision = decide(
        DecisionInput {
            command: &inv.command,
            invoked: invoked.as_deref(),
            cwd: &inv.cwd,
            bypass,
            registry: registry.as_mut(),
            config_path: config_path.as_deref(),
        },
        &SystemProcesses::new(),
    );
    log::debug!("{}: {decision:?}", inv.command);

    match decision {
        Decision::Block { message } => {
            audit::record(
                AuditEvent::Block,
                &inv.command,
                json!({
                    "cwd": inv.cwd.display().to_string(),
                    "invocation": inv.display_command(),
                }),
            );
            eprint!(
                "{}",
                exec::render_block_message(&inv.command, message.as_deref())
            );
            Ok(exec::BLOCK_EXIT_CODE)
        }
        Decision::Redirect { script, config } => {
            audit::record(
                AuditEvent::Redirect,
                &inv.command,
                json!({
                    "cwd": inv.cwd.display().to_string(),
                    "script": script.display().to_string(),
                }),
            );
            exec::exec_redirect(&script, &config, &original, &inv)
        }
        Decision::Passthrough(reason) => {
            if reason == PassthroughReason::Bypass {
                audit::record(
                    AuditEvent::Bypass,
                    &inv.command,
                    json!({ "cwd": inv.cwd.display().to_string() }),
                );
            }
            exec::exec_original(&original, &inv)
        }
    }
}

fn load_registry() -> Option<Registry> {
    let loaded = paths::registry_file().and_then(|path| Registry::load(&path));
    match loaded {
        Ok(registry) => Some(registry),
        Err(e) => {
            log::warn!("registry unavailable, passing through: {e:#}");
            None
        }
    }
}
