pub mod complete;
pub mod fetch;
pub mod index;
pub mod list;
pub mod push;
pub mod repo;
pub mod serve;
pub mod versions;

use std::path::PathBuf;
use tmcat_repo::{RepoAccessError, RepoRegistry, RepoSpec};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFLICT: u8 = 2;
pub const EXIT_NOT_FOUND: u8 = 3;

/// Default location of the repositories config file.
pub fn default_config_path() -> Result<PathBuf, String> {
    let home = std::env::var("HOME").map_err(|_| "HOME not set".to_owned())?;
    Ok(PathBuf::from(home).join(".config/tmcat/repos.json"))
}

pub fn load_registry(config: Option<&PathBuf>) -> Result<RepoRegistry, String> {
    let path = match config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    RepoRegistry::load(path).map_err(|e| e.to_string())
}

/// Build the repo selector from the global `--repo`/`--directory` flags.
pub fn repo_spec(repo: Option<&String>, directory: Option<&PathBuf>) -> RepoSpec {
    match (repo, directory) {
        (Some(name), _) => RepoSpec::named(name),
        (None, Some(dir)) => RepoSpec::dir(dir.clone()),
        (None, None) => RepoSpec::All,
    }
}

/// Per-backend failures of a federated call go to stderr; the merged result
/// is still printed.
pub fn report_access_errors(errors: &[RepoAccessError]) {
    for error in errors {
        eprintln!("warning: {error}");
    }
}
