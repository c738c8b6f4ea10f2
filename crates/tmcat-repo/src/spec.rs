use std::fmt;
use std::path::PathBuf;
use tmcat_model::FoundSource;

/// Selects which repositories a federated operation addresses.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RepoSpec {
    /// Every enabled configured repository.
    #[default]
    All,
    /// The single configured repository with this name.
    Named(String),
    /// An ad-hoc filesystem repository rooted at this directory, not
    /// present in the configuration.
    Dir(PathBuf),
}

impl RepoSpec {
    pub fn named(name: &str) -> Self {
        RepoSpec::Named(name.to_owned())
    }

    pub fn dir(path: impl Into<PathBuf>) -> Self {
        RepoSpec::Dir(path.into())
    }

    /// The source tag attached to every search hit from this repository.
    pub fn to_found_source(&self) -> FoundSource {
        match self {
            RepoSpec::All => FoundSource::default(),
            RepoSpec::Named(name) => FoundSource::named(name),
            RepoSpec::Dir(path) => FoundSource::directory(&path.to_string_lossy()),
        }
    }
}

impl fmt::Display for RepoSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepoSpec::All => f.write_str("<all>"),
            RepoSpec::Named(name) => f.write_str(name),
            RepoSpec::Dir(path) => write!(f, "<{}>", path.display()),
        }
    }
}

/// Repository names must match `^[A-Za-z0-9][\w\-:]*$`.
pub fn valid_repo_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':'))
}
