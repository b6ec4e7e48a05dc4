//! ribbin entry point
//!
//! One binary serves both roles. Run as `ribbin` it is the management CLI;
//! reached through a shim symlink (`npm`, `tsc`, ...) it is the dispatcher.

use ribbin_common::{command_name, env_vars};
use std::path::Path;
use std::process::ExitCode;

const CLI_NAMES: &[&str] = &["ribbin", "ribbin.exe"];

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::new().filter_or(env_vars::LOG, "warn"))
        .format_timestamp(None)
        .init();

    let argv0 = std::env::args_os().next().unwrap_or_default();
    let invoked_as = command_name(Path::new(&argv0));
    log::debug!("invoked as {invoked_as:?}");

    if invoked_as
        .as_deref()
        .map_or(true, |name| CLI_NAMES.contains(&name))
    {
        match ribbin_cli::run_cli() {
            Ok(code) => exit_code(code),
            Err(e) => {
                eprintln!("ribbin: {e:#}");
                ExitCode::FAILURE
            }
        }
    } else {
        match ribbin_shim::run_shim() {
            Ok(code) => exit_code(code),
            Err(e) => {
                eprintln!("ribbin: {e:#}");
                ExitCode::from(126)
            }
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
