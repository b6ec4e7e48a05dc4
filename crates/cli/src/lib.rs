//! `ribbin` command-line surface
//!
//! Installing and removing shims, switching activation tiers, and inspecting
//! what is in effect. Interception itself lives in `ribbin-shim`.

pub mod cli;
pub mod commands;

pub use cli::Cli;

use anyhow::Result;
use clap::Parser;
use std::io::{self, Write};

use cli::{Command, ConfigAction};
use commands::Session;

pub fn run_cli() -> Result<i32> {
    run_cli_with(Cli::parse())
}

pub fn run_cli_with(cli: Cli) -> Result<i32> {
    let session = Session::from_env()?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let code = execute(&session, cli.command, &mut out)?;
    out.flush()?;
    Ok(code)
}

/// Run one parsed command against `session`, writing its report to `out`.
pub fn execute(session: &Session, command: Command, out: &mut dyn Write) -> Result<i32> {
    log::debug!("running {command:?}");
    let failures = match command {
        Command::Wrap(args) => commands::wrap::wrap(session, &args, out)?,
        Command::Unwrap(args) => commands::wrap::unwrap(session, &args, out)?,
        Command::Activate(args) => {
            commands::activate::activate(session, &args, out)?;
            0
        }
        Command::Deactivate(args) => {
            commands::activate::deactivate(session, &args, out)?;
            0
        }
        Command::Status => {
            commands::status::status(session, &is_alive, out)?;
            0
        }
        Command::Config(cmd) => match cmd.action {
            ConfigAction::Show { command } => {
                commands::config_show::show(session, command.as_deref(), out)?;
                0
            }
        },
        Command::Recover(args) => commands::recover::recover(session, &args, out)?,
    };
    Ok(if failures == 0 { 0 } else { 1 })
}

fn is_alive(pid: u32) -> bool {
    use ribbin_shim::ProcessInspector;
    ribbin_shim::SystemProcesses::new().is_alive(pid)
}
