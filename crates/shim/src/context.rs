//! Invocation context
//!
//! Everything the dispatcher knows about how it was started: the name it was
//! invoked under, the remaining arguments, and where it is running.

use anyhow::{anyhow, Context, Result};
use ribbin_common::{absolutize, env_vars};
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

#[derive(Debug, Clone)]
pub struct Invocation {
    /// `argv[0]` exactly as received.
    pub argv0: OsString,
    /// Basename of `argv0`, e.g. `npm`.
    pub command: String,
    pub args: Vec<OsString>,
    pub cwd: PathBuf,
    /// The dispatcher binary itself (symlinks resolved by the OS).
    pub current_exe: Option<PathBuf>,
}

impl Invocation {
    pub fn from_env() -> Result<Self> {
        let mut argv = env::args_os();
        let argv0 = argv.next().ok_or_else(|| anyhow!("missing argv[0]"))?;
        let cwd = env::current_dir().context("failed to read current directory")?;
        Self::new(argv0, argv.collect(), cwd, env::current_exe().ok())
    }

    pub fn new(
        argv0: OsString,
        args: Vec<OsString>,
        cwd: PathBuf,
        current_exe: Option<PathBuf>,
    ) -> Result<Self> {
        let command = ribbin_common::command_name(Path::new(&argv0))
            .ok_or_else(|| anyhow!("cannot derive a command name from {argv0:?}"))?;
        Ok(Self {
            argv0,
            command,
            args,
            cwd,
            current_exe,
        })
    }

    /// Path the shim was reached through: `argv[0]` when it names a path,
    /// otherwise the first match on `PATH`.
    pub fn invoked_path(&self) -> Option<PathBuf> {
        let raw = Path::new(&self.argv0);
        if self.argv0.to_string_lossy().contains(MAIN_SEPARATOR) {
            return Some(raw.to_path_buf());
        }
        which::which_in(raw, env::var_os("PATH"), &self.cwd).ok()
    }

    /// [`Self::invoked_path`] made absolute against the working directory.
    pub fn absolute_invoked_path(&self) -> Option<PathBuf> {
        self.invoked_path().map(|p| absolutize(&p, &self.cwd))
    }

    /// Human-readable command line for messages.
    pub fn display_command(&self) -> String {
        std::iter::once(self.command.clone())
            .chain(self.args.iter().map(|a| a.to_string_lossy().into_owned()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// `RIBBIN_BYPASS=1` skips every check.
pub fn is_bypass_enabled() -> bool {
    env::var(env_vars::BYPASS).as_deref() == Ok("1")
}
