//! Project configuration (`ribbin.jsonc`)
//!
//! A document carries root wrapper policies plus named scopes. Scopes are
//! rooted at a directory, may `extends` other scopes or files, and override
//! policies for invocations under their directory. See [`resolve`] for the
//! inheritance rules.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub mod resolve;

pub use resolve::{
    find_matching_scope, resolve_effective_shims, resolve_with_provenance, ConfigResolver,
    ResolvedShim,
};

/// Project config file name.
pub const CONFIG_FILE_NAME: &str = "ribbin.jsonc";
/// Untracked per-developer override; wins over `ribbin.jsonc` in the same directory.
pub const LOCAL_CONFIG_FILE_NAME: &str = "ribbin.local.jsonc";

/// Default bound on the ancestor walk of a passthrough rule.
pub const MAX_ANCESTOR_DEPTH: u32 = 50;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("scope `{scope}` not found in {}", path.display())]
    UnknownScope { scope: String, path: PathBuf },
    #[error("invalid extends reference `{reference}` in {}", path.display())]
    InvalidReference { reference: String, path: PathBuf },
    #[error("cyclic extends: {}", chain.join(" -> "))]
    CyclicExtends { chain: Vec<String> },
}

/// What a wrapped command does when intercepted.
///
/// Unknown or empty action strings are kept verbatim in `Unrecognized` and
/// treated as passthrough at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    Block,
    Passthrough,
    Redirect,
    Unrecognized(String),
}

impl Default for Action {
    fn default() -> Self {
        Self::Unrecognized(String::new())
    }
}

impl From<String> for Action {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "block" => Self::Block,
            "passthrough" => Self::Passthrough,
            "redirect" => Self::Redirect,
            _ => Self::Unrecognized(value),
        }
    }
}

impl From<Action> for String {
    fn from(value: Action) -> Self {
        match value {
            Action::Block => "block".to_string(),
            Action::Passthrough => "passthrough".to_string(),
            Action::Redirect => "redirect".to_string(),
            Action::Unrecognized(raw) => raw,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Block => f.write_str("block"),
            Self::Passthrough => f.write_str("passthrough"),
            Self::Redirect => f.write_str("redirect"),
            Self::Unrecognized(raw) => write!(f, "unrecognized({raw:?})"),
        }
    }
}

/// Let an invocation through when an ancestor process command line matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassthroughRule {
    /// Literal substrings matched against ancestor command lines.
    #[serde(default)]
    pub invocation: Vec<String>,
    /// Regular expressions matched against ancestor command lines.
    #[serde(default, alias = "invocationRegexp")]
    pub invocation_regexp: Vec<String>,
    /// How many ancestors to inspect; 0 means [`MAX_ANCESTOR_DEPTH`].
    #[serde(default)]
    pub depth: u32,
}

impl PassthroughRule {
    pub fn is_empty(&self) -> bool {
        self.invocation.is_empty() && self.invocation_regexp.is_empty()
    }

    pub fn effective_depth(&self) -> u32 {
        match self.depth {
            0 => MAX_ANCESTOR_DEPTH,
            d => d.min(MAX_ANCESTOR_DEPTH),
        }
    }
}

/// Policy for one command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShimConfig {
    #[serde(default)]
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Script path, relative to the config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    /// Explicit binary locations this policy wraps, relative to the config file.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passthrough: Option<PassthroughRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeConfig {
    /// Directory the scope applies to, relative to the config file.
    pub path: String,
    #[serde(default)]
    pub extends: Vec<String>,
    #[serde(default)]
    pub wrappers: BTreeMap<String, ShimConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub wrappers: BTreeMap<String, ShimConfig>,
    #[serde(default)]
    pub scopes: BTreeMap<String, ScopeConfig>,
}

impl ProjectConfig {
    /// Parse JSONC text. `origin` only labels errors.
    pub fn parse(contents: &str, origin: &Path) -> Result<Self, ConfigError> {
        json5::from_str(contents).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents, path)
    }

    pub fn scope(&self, name: &str) -> Option<&ScopeConfig> {
        self.scopes.get(name)
    }
}

/// Nearest config file at or above `start`, preferring the local override.
pub fn find_nearest_config(start: &Path) -> Option<PathBuf> {
    start.ancestors().find_map(|dir| {
        [LOCAL_CONFIG_FILE_NAME, CONFIG_FILE_NAME]
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
    })
}
