//! End-to-end: the real binary as CLI and as dispatcher behind a shim.
#![cfg(unix)]

use assert_cmd::Command;
use predicates::prelude::*;
use ribbin_common::{sidecar_path, Registry};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Fixture {
    _temp: TempDir,
    root: PathBuf,
    ribbin: PathBuf,
    home: PathBuf,
    project: PathBuf,
}

impl Fixture {
    /// The binary is copied out of the build tree so shims point somewhere
    /// the path validator accepts.
    fn new(config: &str) -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        let ribbin = root.join("ribbin");
        fs::copy(env!("CARGO_BIN_EXE_ribbin"), &ribbin).unwrap();
        fs::set_permissions(&ribbin, fs::Permissions::from_mode(0o755)).unwrap();

        let home = root.join("home");
        fs::create_dir_all(&home).unwrap();
        let project = root.join("project");
        fs::create_dir_all(&project).unwrap();
        fs::write(project.join("ribbin.jsonc"), config).unwrap();

        Self {
            _temp: temp,
            root,
            ribbin,
            home,
            project,
        }
    }

    fn tool(&self, name: &str) -> PathBuf {
        let dir = self.root.join("bin");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\necho real {name} \"$@\"\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn ribbin(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.ribbin);
        cmd.args(args)
            .current_dir(&self.project)
            .env("RIBBIN_HOME", &self.home)
            .env_remove("RIBBIN_BYPASS");
        cmd
    }

    fn shim(&self, path: &Path) -> Command {
        let mut cmd = Command::new(path);
        cmd.current_dir(&self.project)
            .env("RIBBIN_HOME", &self.home)
            .env_remove("RIBBIN_BYPASS");
        cmd
    }

    fn registry(&self) -> Registry {
        Registry::load(&self.home.join("registry.json")).unwrap()
    }
}

const BLOCK_NPM: &str = r#"{
    // npm is not used here
    "wrappers": {
        "npm": { "action": "block", "message": "use pnpm", "paths": ["../bin/npm"] }
    }
}"#;

#[test]
fn test_blocked_command_exits_one_with_message() {
    let fx = Fixture::new(BLOCK_NPM);
    let npm = fx.tool("npm");

    fx.ribbin(&["wrap"]).assert().success();
    assert!(fs::symlink_metadata(&npm).unwrap().file_type().is_symlink());
    assert!(sidecar_path(&npm).is_file());
    fx.ribbin(&["activate", "--global"]).assert().success();

    fx.shim(&npm)
        .arg("install")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("use pnpm"))
        .stderr(predicate::str::contains("RIBBIN_BYPASS=1 npm"))
        .stdout(predicate::str::is_empty());

    let audit = fs::read_to_string(fx.home.join("audit.log")).unwrap();
    let events: Vec<serde_json::Value> = audit
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert!(events
        .iter()
        .any(|e| e["event"] == "block" && e["command"] == "npm"));
}

#[test]
fn test_bypass_runs_original_with_arguments() {
    let fx = Fixture::new(BLOCK_NPM);
    let npm = fx.tool("npm");
    fx.ribbin(&["wrap"]).assert().success();
    fx.ribbin(&["activate", "--global"]).assert().success();

    fx.shim(&npm)
        .args(["install", "left-pad"])
        .env("RIBBIN_BYPASS", "1")
        .assert()
        .success()
        .stdout(predicate::str::contains("real npm install left-pad"));
}

#[test]
fn test_inactive_shim_is_transparent() {
    let fx = Fixture::new(BLOCK_NPM);
    let npm = fx.tool("npm");
    fx.ribbin(&["wrap"]).assert().success();

    fx.shim(&npm)
        .arg("ci")
        .assert()
        .success()
        .stdout(predicate::str::contains("real npm ci"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn test_config_activation_applies_to_project() {
    let fx = Fixture::new(BLOCK_NPM);
    let npm = fx.tool("npm");
    fx.ribbin(&["wrap"]).assert().success();
    fx.ribbin(&["activate"]).assert().success();
    assert_eq!(fx.registry().config_activations.len(), 1);

    fx.shim(&npm).assert().code(1);

    // Outside the project the config does not apply.
    fx.shim(&npm)
        .current_dir(&fx.root)
        .assert()
        .success()
        .stdout(predicate::str::contains("real npm"));
}

#[test]
fn test_redirect_receives_context() {
    let fx = Fixture::new(
        r#"{ "wrappers": {
            "tsc": { "action": "redirect", "redirect": "scripts/tsc.sh", "paths": ["../bin/tsc"] }
        } }"#,
    );
    let tsc = fx.tool("tsc");
    let scripts = fx.project.join("scripts");
    fs::create_dir_all(&scripts).unwrap();
    let script = scripts.join("tsc.sh");
    fs::write(
        &script,
        "#!/bin/sh\necho \"redirected $RIBBIN_COMMAND $RIBBIN_ACTION $*\"\nexec \"$RIBBIN_ORIGINAL_BIN\" \"$@\"\n",
    )
    .unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    fx.ribbin(&["wrap"]).assert().success();
    fx.ribbin(&["activate", "--global"]).assert().success();

    fx.shim(&tsc)
        .arg("--noEmit")
        .assert()
        .success()
        .stdout(predicate::str::contains("redirected tsc redirect --noEmit"))
        .stdout(predicate::str::contains("real tsc --noEmit"));
}

#[test]
fn test_unwrap_restores_and_status_reports() {
    let fx = Fixture::new(BLOCK_NPM);
    let npm = fx.tool("npm");
    fx.ribbin(&["wrap"]).assert().success();

    fx.ribbin(&["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("npm"))
        .stdout(predicate::str::contains("[ok]"));

    fx.ribbin(&["unwrap"])
        .assert()
        .success()
        .stdout(predicate::str::contains("unwrapped npm"));
    assert!(fs::symlink_metadata(&npm).unwrap().is_file());
    assert!(!sidecar_path(&npm).exists());
    assert!(fx.registry().wrappers.is_empty());
}

#[test]
fn test_missing_sidecar_is_a_dispatcher_error() {
    let fx = Fixture::new(BLOCK_NPM);
    let npm = fx.tool("npm");
    fx.ribbin(&["wrap"]).assert().success();
    fs::remove_file(sidecar_path(&npm)).unwrap();

    fx.shim(&npm)
        .assert()
        .code(126)
        .stderr(predicate::str::contains("ribbin recover"));
}

#[test]
fn test_blocked_command_without_original_is_an_error() {
    let fx = Fixture::new(BLOCK_NPM);
    let npm = fx.tool("npm");
    fx.ribbin(&["wrap"]).assert().success();
    fx.ribbin(&["activate", "--global"]).assert().success();
    fs::remove_file(sidecar_path(&npm)).unwrap();

    fx.shim(&npm)
        .arg("install")
        .assert()
        .code(126)
        .stderr(predicate::str::contains("ribbin recover"))
        .stderr(predicate::str::contains("use pnpm").not());
}
