//! Scope inheritance
//!
//! Precedence for a scope is `extends[0] < extends[1] < ... < own wrappers`.
//! Root entries only apply when no scope matches. References:
//!
//! - `root`, `root.<scope>`: same document
//! - `<file>`: the whole file, its root and then every scope in name order
//! - `<file>#root`, `<file>#root.<scope>`: a fragment of another file
//!
//! Cycles are detected with a stack of `absolute-path#fragment` keys that is
//! pushed on entry and popped on return, so two scopes may share an ancestor
//! without tripping the check.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use super::{ConfigError, ProjectConfig, ScopeConfig, ShimConfig};
use crate::{absolutize, clean_path};

/// Effective policy plus where it came from. Display only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedShim {
    pub config: ShimConfig,
    /// `path#fragment` that supplied the winning definition.
    pub source: String,
    /// Earlier definitions this one replaced, oldest first.
    pub overrode: Vec<String>,
}

type Resolved = BTreeMap<String, ResolvedShim>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Fragment {
    Root,
    Scope(String),
}

impl Fragment {
    fn parse(raw: &str) -> Option<Self> {
        if raw == "root" {
            return Some(Self::Root);
        }
        raw.strip_prefix("root.")
            .filter(|name| !name.is_empty())
            .map(|name| Self::Scope(name.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ExtendsRef {
    Local(Fragment),
    External {
        file: String,
        fragment: Option<Fragment>,
    },
}

impl ExtendsRef {
    fn parse(reference: &str, doc_path: &Path) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidReference {
            reference: reference.to_string(),
            path: doc_path.to_path_buf(),
        };

        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(invalid());
        }
        if let Some(fragment) = Fragment::parse(trimmed) {
            return Ok(Self::Local(fragment));
        }
        match trimmed.split_once('#') {
            Some((file, fragment)) => {
                if file.is_empty() {
                    return Err(invalid());
                }
                let fragment = Fragment::parse(fragment).ok_or_else(invalid)?;
                Ok(Self::External {
                    file: file.to_string(),
                    fragment: Some(fragment),
                })
            }
            None => Ok(Self::External {
                file: trimmed.to_string(),
                fragment: None,
            }),
        }
    }
}

/// Resolves scopes for one top-level request. External documents are cached
/// by absolute path for the resolver's lifetime.
#[derive(Debug, Default)]
pub struct ConfigResolver {
    cache: HashMap<PathBuf, Rc<ProjectConfig>>,
    stack: Vec<String>,
}

impl ConfigResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Effective policies with provenance for `scope` (root when `None`).
    pub fn resolve(
        &mut self,
        doc: &ProjectConfig,
        doc_path: &Path,
        scope: Option<&str>,
    ) -> Result<Resolved, ConfigError> {
        let doc_path = normalize_doc_path(doc_path);
        match scope {
            None => Ok(root_entries(doc, &doc_path)),
            Some(name) => self.resolve_scope(doc, &doc_path, name),
        }
    }

    fn resolve_scope(
        &mut self,
        doc: &ProjectConfig,
        doc_path: &Path,
        name: &str,
    ) -> Result<Resolved, ConfigError> {
        let scope = doc.scope(name).ok_or_else(|| ConfigError::UnknownScope {
            scope: name.to_string(),
            path: doc_path.to_path_buf(),
        })?;
        let key = fragment_key(doc_path, &format!("root.{name}"));

        self.enter(key)?;
        let result = self.merge_scope(doc, doc_path, name, scope);
        self.stack.pop();
        result
    }

    fn merge_scope(
        &mut self,
        doc: &ProjectConfig,
        doc_path: &Path,
        name: &str,
        scope: &ScopeConfig,
    ) -> Result<Resolved, ConfigError> {
        let mut acc = Resolved::new();
        for reference in &scope.extends {
            let inherited = self.resolve_reference(doc, doc_path, reference)?;
            merge_into(&mut acc, inherited);
        }
        let own_source = fragment_key(doc_path, &format!("root.{name}"));
        merge_into(&mut acc, tag_entries(&scope.wrappers, &own_source));
        Ok(acc)
    }

    fn resolve_reference(
        &mut self,
        doc: &ProjectConfig,
        doc_path: &Path,
        reference: &str,
    ) -> Result<Resolved, ConfigError> {
        match ExtendsRef::parse(reference, doc_path)? {
            ExtendsRef::Local(fragment) => self.resolve_fragment(doc, doc_path, &fragment),
            ExtendsRef::External { file, fragment } => {
                let base = doc_path.parent().unwrap_or_else(|| Path::new("/"));
                let target = normalize_doc_path(&absolutize(Path::new(&file), base));
                let external = self.load(&target)?;
                match fragment {
                    Some(fragment) => self.resolve_fragment(&external, &target, &fragment),
                    None => self.resolve_whole(&external, &target),
                }
            }
        }
    }

    fn resolve_fragment(
        &mut self,
        doc: &ProjectConfig,
        doc_path: &Path,
        fragment: &Fragment,
    ) -> Result<Resolved, ConfigError> {
        match fragment {
            Fragment::Root => Ok(root_entries(doc, doc_path)),
            Fragment::Scope(name) => self.resolve_scope(doc, doc_path, name),
        }
    }

    fn resolve_whole(
        &mut self,
        doc: &ProjectConfig,
        doc_path: &Path,
    ) -> Result<Resolved, ConfigError> {
        self.enter(fragment_key(doc_path, "*"))?;
        let result = self.merge_whole(doc, doc_path);
        self.stack.pop();
        result
    }

    fn merge_whole(
        &mut self,
        doc: &ProjectConfig,
        doc_path: &Path,
    ) -> Result<Resolved, ConfigError> {
        let mut acc = root_entries(doc, doc_path);
        for name in doc.scopes.keys() {
            let scoped = self.resolve_scope(doc, doc_path, name)?;
            merge_into(&mut acc, scoped);
        }
        Ok(acc)
    }

    fn enter(&mut self, key: String) -> Result<(), ConfigError> {
        if let Some(start) = self.stack.iter().position(|k| *k == key) {
            let mut chain = self.stack[start..].to_vec();
            chain.push(key);
            return Err(ConfigError::CyclicExtends { chain });
        }
        self.stack.push(key);
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<Rc<ProjectConfig>, ConfigError> {
        if let Some(doc) = self.cache.get(path) {
            return Ok(Rc::clone(doc));
        }
        let doc = Rc::new(ProjectConfig::load(path)?);
        self.cache.insert(path.to_path_buf(), Rc::clone(&doc));
        Ok(doc)
    }
}

/// Effective policies for `scope` (root entries when `None`).
pub fn resolve_effective_shims(
    doc: &ProjectConfig,
    doc_path: &Path,
    scope: Option<&str>,
) -> Result<BTreeMap<String, ShimConfig>, ConfigError> {
    Ok(resolve_with_provenance(doc, doc_path, scope)?
        .into_iter()
        .map(|(name, resolved)| (name, resolved.config))
        .collect())
}

/// Like [`resolve_effective_shims`] but keeps provenance for display.
pub fn resolve_with_provenance(
    doc: &ProjectConfig,
    doc_path: &Path,
    scope: Option<&str>,
) -> Result<BTreeMap<String, ResolvedShim>, ConfigError> {
    ConfigResolver::new().resolve(doc, doc_path, scope)
}

/// The most specific scope whose directory contains `cwd`.
pub fn find_matching_scope<'a>(
    doc: &'a ProjectConfig,
    config_dir: &Path,
    cwd: &Path,
) -> Option<(&'a str, &'a ScopeConfig)> {
    let cwd = absolutize(cwd, config_dir);
    let mut best: Option<(&'a str, &'a ScopeConfig, usize)> = None;

    for (name, scope) in &doc.scopes {
        let scope_dir = absolutize(Path::new(&scope.path), config_dir);
        if !cwd.starts_with(&scope_dir) {
            continue;
        }
        let depth = scope_dir.components().count();
        if best.map_or(true, |(_, _, best_depth)| depth > best_depth) {
            best = Some((name.as_str(), scope, depth));
        }
    }

    best.map(|(name, scope, _)| (name, scope))
}

fn normalize_doc_path(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| clean_path(path))
}

fn fragment_key(doc_path: &Path, fragment: &str) -> String {
    format!("{}#{}", doc_path.display(), fragment)
}

fn root_entries(doc: &ProjectConfig, doc_path: &Path) -> Resolved {
    tag_entries(&doc.wrappers, &fragment_key(doc_path, "root"))
}

fn tag_entries(entries: &BTreeMap<String, ShimConfig>, source: &str) -> Resolved {
    entries
        .iter()
        .map(|(name, config)| {
            (
                name.clone(),
                ResolvedShim {
                    config: config.clone(),
                    source: source.to_string(),
                    overrode: Vec::new(),
                },
            )
        })
        .collect()
}

fn merge_into(acc: &mut Resolved, incoming: Resolved) {
    for (name, mut shim) in incoming {
        if let Some(previous) = acc.remove(&name) {
            let mut chain = previous.overrode;
            chain.push(previous.source);
            chain.append(&mut shim.overrode);
            shim.overrode = chain;
        }
        acc.insert(name, shim);
    }
}
