//! `ribbin activate` / `ribbin deactivate`

use anyhow::{bail, Result};
use std::io::Write;

use super::Session;
use crate::cli::{ActivateArgs, DeactivateArgs};

pub fn activate(session: &Session, args: &ActivateArgs, out: &mut dyn Write) -> Result<()> {
    if args.global {
        session.update_registry(|registry| {
            registry.global_active = true;
            Ok(())
        })?;
        writeln!(out, "activated globally")?;
        return Ok(());
    }

    if args.shell {
        let pid = session.shell_pid;
        if pid == 0 {
            bail!("could not determine the calling shell");
        }
        session.update_registry(|registry| {
            registry.activate_shell(pid);
            Ok(())
        })?;
        writeln!(out, "activated for shell {pid} and its children")?;
        return Ok(());
    }

    let config = session.config_path(args.config.as_deref())?;
    if !config.is_file() {
        bail!("config {} does not exist", config.display());
    }
    session.update_registry(|registry| {
        registry.activate_config(&config);
        Ok(())
    })?;
    writeln!(out, "activated {}", config.display())?;
    Ok(())
}

pub fn deactivate(session: &Session, args: &DeactivateArgs, out: &mut dyn Write) -> Result<()> {
    if args.everything {
        session.update_registry(|registry| {
            registry.deactivate_all();
            Ok(())
        })?;
        writeln!(out, "deactivated everything")?;
        return Ok(());
    }

    if args.global {
        let was = session.update_registry(|registry| {
            Ok(std::mem::replace(&mut registry.global_active, false))
        })?;
        if was {
            writeln!(out, "deactivated globally")?;
        } else {
            writeln!(out, "global activation was not set")?;
        }
        return Ok(());
    }

    if args.shell {
        let pid = session.shell_pid;
        let removed = session.update_registry(|registry| Ok(registry.deactivate_shell(pid)))?;
        if removed {
            writeln!(out, "deactivated shell {pid}")?;
        } else {
            writeln!(out, "shell {pid} was not activated")?;
        }
        return Ok(());
    }

    let config = session.config_path(args.config.as_deref())?;
    let removed = session.update_registry(|registry| Ok(registry.deactivate_config(&config)))?;
    if removed {
        writeln!(out, "deactivated {}", config.display())?;
    } else {
        writeln!(out, "{} was not activated", config.display())?;
    }
    Ok(())
}
