use crate::file::FileRepo;
use crate::http::HttpRepo;
use crate::spec::{valid_repo_name, RepoSpec};
use crate::{Repo, RepoError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tmcat_store::atomic_write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoKind {
    File,
    Http,
}

impl fmt::Display for RepoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepoKind::File => f.write_str("file"),
            RepoKind::Http => f.write_str("http"),
        }
    }
}

/// Per-repository credentials, passed opaquely to the HTTP transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Configuration of one named repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoConfig {
    #[serde(rename = "type")]
    pub kind: RepoKind,
    /// Directory path for `file` repositories, base URL for `http` ones.
    pub loc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub default: bool,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub enabled: bool,
}

fn is_false(v: &bool) -> bool {
    !*v
}

fn is_true(v: &bool) -> bool {
    *v
}

fn default_true() -> bool {
    true
}

impl RepoConfig {
    pub fn file(loc: &str) -> Self {
        Self {
            kind: RepoKind::File,
            loc: loc.to_owned(),
            auth: None,
            default: false,
            enabled: true,
        }
    }

    pub fn http(loc: &str) -> Self {
        Self {
            kind: RepoKind::Http,
            loc: loc.to_owned(),
            auth: None,
            default: false,
            enabled: true,
        }
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_home(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(path.trim_start_matches("~/").trim_start_matches('~'));
        }
    }
    PathBuf::from(path)
}

/// The set of configured repositories, loaded from and saved to a JSON file
/// mapping repo names to [`RepoConfig`].
pub struct RepoRegistry {
    path: PathBuf,
    repos: BTreeMap<String, RepoConfig>,
}

impl RepoRegistry {
    /// Load the registry; a missing file is an empty registry.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, RepoError> {
        let path = path.into();
        let repos = match std::fs::read(&path) {
            Ok(raw) => serde_json::from_slice(&raw)
                .map_err(|e| RepoError::InvalidSpec(format!("invalid repos config: {e}")))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, repos })
    }

    /// An in-memory registry, for tests and ad-hoc use.
    pub fn in_memory(repos: BTreeMap<String, RepoConfig>) -> Self {
        Self {
            path: PathBuf::new(),
            repos,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All configured repositories, including disabled ones; management
    /// commands list these.
    pub fn repos(&self) -> &BTreeMap<String, RepoConfig> {
        &self.repos
    }

    pub fn save(&self) -> Result<(), RepoError> {
        let defaults = self.repos.values().filter(|c| c.default).count();
        if defaults > 1 {
            return Err(RepoError::InvalidSpec(
                "too many default repositories, at most one is allowed".to_owned(),
            ));
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(&self.repos)
            .map_err(|e| RepoError::InvalidSpec(e.to_string()))?;
        atomic_write(&self.path, &json)?;
        Ok(())
    }

    pub fn add(&mut self, name: &str, config: RepoConfig) -> Result<(), RepoError> {
        if !valid_repo_name(name) {
            return Err(RepoError::InvalidRepoName(name.to_owned()));
        }
        if self.repos.contains_key(name) {
            return Err(RepoError::RepoExists);
        }
        self.repos.insert(name.to_owned(), config);
        self.save()
    }

    pub fn remove(&mut self, name: &str) -> Result<(), RepoError> {
        if self.repos.remove(name).is_none() {
            return Err(RepoError::RepoNotFound);
        }
        self.save()
    }

    pub fn rename(&mut self, old: &str, new: &str) -> Result<(), RepoError> {
        if !valid_repo_name(new) {
            return Err(RepoError::InvalidRepoName(new.to_owned()));
        }
        if self.repos.contains_key(new) {
            return Err(RepoError::RepoExists);
        }
        let config = self.repos.remove(old).ok_or(RepoError::RepoNotFound)?;
        self.repos.insert(new.to_owned(), config);
        self.save()
    }

    pub fn set_default(&mut self, name: &str) -> Result<(), RepoError> {
        if !self.repos.contains_key(name) {
            return Err(RepoError::RepoNotFound);
        }
        for (repo_name, config) in &mut self.repos {
            config.default = repo_name == name;
        }
        self.save()
    }

    pub fn toggle_enabled(&mut self, name: &str) -> Result<(), RepoError> {
        let config = self.repos.get_mut(name).ok_or(RepoError::RepoNotFound)?;
        config.enabled = !config.enabled;
        self.save()
    }

    fn build(&self, name: &str, config: &RepoConfig) -> Box<dyn Repo> {
        let spec = RepoSpec::named(name);
        match config.kind {
            RepoKind::File => Box::new(FileRepo::new(expand_home(&config.loc), spec)),
            RepoKind::Http => Box::new(HttpRepo::new(
                &config.loc,
                config.auth.as_ref().and_then(|a| a.token.clone()),
                spec,
            )),
        }
    }

    /// The repository with the given name. An empty name selects the single
    /// configured repository, or the one flagged `default`. A disabled
    /// repository is treated as nonexistent.
    pub fn get(&self, name: &str) -> Result<Box<dyn Repo>, RepoError> {
        let (name, config) = if name.is_empty() {
            if self.repos.len() == 1 {
                let (n, c) = self.repos.iter().next().expect("one repo");
                (n.as_str(), c)
            } else {
                self.repos
                    .iter()
                    .find(|(_, c)| c.default)
                    .map(|(n, c)| (n.as_str(), c))
                    .ok_or(RepoError::NoDefaultRepo)?
            }
        } else {
            let config = self.repos.get(name).ok_or(RepoError::RepoNotFound)?;
            (name, config)
        };
        if !config.enabled {
            return Err(RepoError::RepoNotFound);
        }
        Ok(self.build(name, config))
    }

    /// All enabled repositories in name order.
    pub fn all(&self) -> Vec<Box<dyn Repo>> {
        self.repos
            .iter()
            .filter(|(_, c)| c.enabled)
            .map(|(name, config)| self.build(name, config))
            .collect()
    }

    /// The set of backends a federated operation addresses.
    pub fn resolve(&self, spec: &RepoSpec) -> Result<Vec<Box<dyn Repo>>, RepoError> {
        match spec {
            RepoSpec::All => Ok(self.all()),
            RepoSpec::Named(name) => Ok(vec![self.get(name)?]),
            RepoSpec::Dir(dir) => Ok(vec![Box::new(FileRepo::new(
                dir.clone(),
                RepoSpec::Dir(dir.clone()),
            ))]),
        }
    }

    /// The single backend a write operation targets: the named or default
    /// repository, or an ad-hoc directory.
    pub fn target(&self, spec: &RepoSpec) -> Result<Box<dyn Repo>, RepoError> {
        match spec {
            RepoSpec::All => self.get(""),
            RepoSpec::Named(name) => self.get(name),
            RepoSpec::Dir(dir) => Ok(Box::new(FileRepo::new(
                dir.clone(),
                RepoSpec::Dir(dir.clone()),
            ))),
        }
    }
}
