pub mod activate;
pub mod config_show;
pub mod recover;
pub mod status;
pub mod wrap;

use anyhow::{anyhow, Context, Result};
use ribbin_common::config::{find_nearest_config, ProjectConfig};
use ribbin_common::lock::lock_timeout;
use ribbin_common::{absolutize, paths, Registry};
use ribbin_wrap::{InstallOptions, ShimEngine};
use std::collections::BTreeSet;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything a command needs from its environment, so commands can be run
/// against scratch directories in tests.
#[derive(Debug, Clone)]
pub struct Session {
    pub registry_file: PathBuf,
    pub audit_log: Option<PathBuf>,
    pub cwd: PathBuf,
    /// The `ribbin` binary that shims point at.
    pub dispatcher: PathBuf,
    /// Process treated as "the calling shell" by `--shell`.
    pub shell_pid: u32,
    pub lock_timeout: Duration,
}

impl Session {
    pub fn from_env() -> Result<Self> {
        let dispatcher = env::current_exe().context("failed to locate the ribbin binary")?;
        let dispatcher = dispatcher.canonicalize().unwrap_or(dispatcher);
        Ok(Self {
            registry_file: paths::registry_file()?,
            audit_log: paths::audit_file().ok(),
            cwd: env::current_dir().context("failed to read current directory")?,
            dispatcher,
            shell_pid: parent_pid(),
            lock_timeout: lock_timeout(),
        })
    }

    pub fn engine(&self, confirm_system_dir: bool) -> ShimEngine {
        ShimEngine::new(InstallOptions {
            lock_timeout: self.lock_timeout,
            confirm_system_dir,
            audit_log: self.audit_log.clone(),
        })
    }

    pub fn load_registry(&self) -> Result<Registry> {
        Registry::load_shared(&self.registry_file, self.lock_timeout)
    }

    pub fn update_registry<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Registry) -> Result<T>,
    {
        Registry::update(&self.registry_file, self.lock_timeout, f)
    }

    /// `explicit` made absolute, or the nearest config above the working
    /// directory.
    pub fn config_path(&self, explicit: Option<&Path>) -> Result<PathBuf> {
        match explicit {
            Some(path) => {
                let path = absolutize(path, &self.cwd);
                Ok(path.canonicalize().unwrap_or(path))
            }
            None => find_nearest_config(&self.cwd)
                .map(|p| p.canonicalize().unwrap_or(p))
                .ok_or_else(|| {
                    anyhow!(
                        "no ribbin.jsonc found in {} or any parent directory",
                        self.cwd.display()
                    )
                }),
        }
    }
}

/// Every command a config mentions, at the root or in any scope.
pub fn configured_commands(doc: &ProjectConfig) -> BTreeSet<String> {
    doc.wrappers
        .keys()
        .chain(doc.scopes.values().flat_map(|scope| scope.wrappers.keys()))
        .cloned()
        .collect()
}

/// Explicit `paths` for `command` across root and scopes, absolute.
pub fn configured_paths(doc: &ProjectConfig, config_path: &Path, command: &str) -> Vec<PathBuf> {
    let config_dir = config_path.parent().unwrap_or_else(|| Path::new("/"));
    let mut paths: Vec<PathBuf> = doc
        .wrappers
        .get(command)
        .into_iter()
        .chain(doc.scopes.values().filter_map(|s| s.wrappers.get(command)))
        .flat_map(|shim| shim.paths.iter())
        .map(|p| absolutize(Path::new(p), config_dir))
        .collect();
    paths.sort();
    paths.dedup();
    paths
}

#[cfg(unix)]
fn parent_pid() -> u32 {
    u32::try_from(nix::unistd::getppid().as_raw()).unwrap_or(0)
}

#[cfg(not(unix))]
fn parent_pid() -> u32 {
    0
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// A scratch project with its own registry and a fake dispatcher.
    pub struct Sandbox {
        pub temp: TempDir,
        pub session: Session,
    }

    impl Sandbox {
        pub fn new(config: &str) -> Self {
            let temp = TempDir::new().unwrap();
            let root = temp.path().canonicalize().unwrap();
            let project = root.join("project");
            fs::create_dir_all(&project).unwrap();
            fs::write(project.join("ribbin.jsonc"), config).unwrap();
            let dispatcher = root.join("ribbin");
            fs::write(&dispatcher, "#!/bin/sh\n").unwrap();
            fs::set_permissions(&dispatcher, fs::Permissions::from_mode(0o755)).unwrap();
            let session = Session {
                registry_file: root.join("home/registry.json"),
                audit_log: None,
                cwd: project,
                dispatcher,
                shell_pid: std::process::id(),
                lock_timeout: Duration::from_secs(5),
            };
            Self { temp, session }
        }

        pub fn root(&self) -> PathBuf {
            self.session.dispatcher.parent().unwrap().to_path_buf()
        }

        /// Create an executable named `name` under `<root>/<dir>`.
        pub fn tool(&self, dir: &str, name: &str) -> PathBuf {
            let dir = self.root().join(dir);
            fs::create_dir_all(&dir).unwrap();
            let path = dir.join(name);
            fs::write(&path, format!("#!/bin/sh\necho real {name}\n")).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        pub fn output(buf: Vec<u8>) -> String {
            String::from_utf8(buf).unwrap()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_commands_and_paths() {
        let doc = ProjectConfig::parse(
            r#"{
                "wrappers": { "npm": { "action": "block", "paths": ["bin/npm"] } },
                "scopes": {
                    "web": {
                        "path": "web",
                        "wrappers": {
                            "tsc": { "action": "block" },
                            "npm": { "action": "passthrough", "paths": ["web/bin/npm", "bin/npm"] }
                        }
                    }
                }
            }"#,
            Path::new("ribbin.jsonc"),
        )
        .unwrap();

        let commands: Vec<_> = configured_commands(&doc).into_iter().collect();
        assert_eq!(commands, vec!["npm", "tsc"]);
        assert_eq!(
            configured_paths(&doc, Path::new("/p/ribbin.jsonc"), "npm"),
            vec![PathBuf::from("/p/bin/npm"), PathBuf::from("/p/web/bin/npm")]
        );
        assert!(configured_paths(&doc, Path::new("/p/ribbin.jsonc"), "tsc").is_empty());
    }
}
