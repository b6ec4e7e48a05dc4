//! Process ancestry inspection
//!
//! Linux reads `/proc/<pid>/stat` and `/proc/<pid>/cmdline` directly. Other
//! platforms, or a pid `/proc` cannot answer for, use a `sysinfo` process
//! table loaded once per dispatch. Liveness is a signal-0 check.

use std::sync::OnceLock;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

/// Upper bound on any ancestor walk, guarding against ppid loops.
pub const MAX_ANCESTRY: usize = 256;

/// Read-only view of the process table.
pub trait ProcessInspector {
    fn current_pid(&self) -> u32;
    fn parent_pid(&self, pid: u32) -> Option<u32>;
    /// Full command line, arguments joined by spaces.
    fn command_line(&self, pid: u32) -> Option<String>;
    fn is_alive(&self, pid: u32) -> bool;
}

/// Ancestors of the current process, nearest first, at most `limit` of them.
pub fn ancestors(inspector: &dyn ProcessInspector, limit: usize) -> Vec<u32> {
    let mut chain = Vec::new();
    let mut pid = inspector.current_pid();
    while chain.len() < limit.min(MAX_ANCESTRY) {
        match inspector.parent_pid(pid) {
            Some(parent) if parent != 0 && parent != pid => {
                chain.push(parent);
                if parent == 1 {
                    break;
                }
                pid = parent;
            }
            _ => break,
        }
    }
    chain
}

/// The live process table. The `sysinfo` snapshot is taken on first use and
/// reused for the rest of the walk.
#[derive(Debug, Default)]
pub struct SystemProcesses {
    table: OnceLock<System>,
}

impl SystemProcesses {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> &System {
        self.table.get_or_init(|| {
            let mut system = System::new();
            system.refresh_processes_specifics(
                ProcessesToUpdate::All,
                true,
                ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
            );
            system
        })
    }

    fn table_parent_pid(&self, pid: u32) -> Option<u32> {
        self.table()
            .process(Pid::from_u32(pid))?
            .parent()
            .map(|parent| parent.as_u32())
    }

    fn table_command_line(&self, pid: u32) -> Option<String> {
        let process = self.table().process(Pid::from_u32(pid))?;
        let joined = process
            .cmd()
            .iter()
            .map(|arg| arg.to_string_lossy())
            .filter(|arg| !arg.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        (!joined.is_empty()).then_some(joined)
    }
}

impl ProcessInspector for SystemProcesses {
    fn current_pid(&self) -> u32 {
        std::process::id()
    }

    fn parent_pid(&self, pid: u32) -> Option<u32> {
        #[cfg(target_os = "linux")]
        {
            if let Some(ppid) = proc_parent_pid(pid) {
                return Some(ppid);
            }
        }
        self.table_parent_pid(pid)
    }

    fn command_line(&self, pid: u32) -> Option<String> {
        #[cfg(target_os = "linux")]
        {
            if let Some(cmdline) = proc_command_line(pid) {
                return Some(cmdline);
            }
        }
        self.table_command_line(pid)
    }

    fn is_alive(&self, pid: u32) -> bool {
        pid_alive(pid)
    }
}

#[cfg(target_os = "linux")]
fn proc_parent_pid(pid: u32) -> Option<u32> {
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    parse_stat_ppid(&stat)
}

/// `pid (comm) state ppid ...`; comm may contain spaces and parens.
pub(crate) fn parse_stat_ppid(stat: &str) -> Option<u32> {
    let after_comm = stat.rsplit_once(')')?.1;
    after_comm.split_whitespace().nth(1)?.parse().ok()
}

#[cfg(target_os = "linux")]
fn proc_command_line(pid: u32) -> Option<String> {
    let raw = std::fs::read(format!("/proc/{pid}/cmdline")).ok()?;
    parse_cmdline(&raw)
}

pub(crate) fn parse_cmdline(raw: &[u8]) -> Option<String> {
    let joined = raw
        .split(|b| *b == 0)
        .filter(|part| !part.is_empty())
        .map(|part| String::from_utf8_lossy(part).into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    (!joined.is_empty()).then_some(joined)
}

#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        // Exists but belongs to someone else.
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    false
}

#[cfg(test)]
pub(crate) mod fake {
    use super::ProcessInspector;
    use std::collections::{HashMap, HashSet};

    /// Scripted process table for tests.
    #[derive(Debug, Default)]
    pub struct FakeProcesses {
        pub current: u32,
        pub parents: HashMap<u32, u32>,
        pub cmdlines: HashMap<u32, String>,
        pub alive: HashSet<u32>,
    }

    impl FakeProcesses {
        /// A chain `current -> parents[0] -> parents[1] ...` with command lines.
        pub fn chain(current: u32, ancestors: &[(u32, &str)]) -> Self {
            let mut fake = Self {
                current,
                ..Self::default()
            };
            let mut child = current;
            for (pid, cmdline) in ancestors {
                fake.parents.insert(child, *pid);
                fake.cmdlines.insert(*pid, cmdline.to_string());
                fake.alive.insert(*pid);
                child = *pid;
            }
            fake
        }
    }

    impl ProcessInspector for FakeProcesses {
        fn current_pid(&self) -> u32 {
            self.current
        }

        fn parent_pid(&self, pid: u32) -> Option<u32> {
            self.parents.get(&pid).copied()
        }

        fn command_line(&self, pid: u32) -> Option<String> {
            self.cmdlines.get(&pid).cloned()
        }

        fn is_alive(&self, pid: u32) -> bool {
            self.alive.contains(&pid)
        }
    }
}
