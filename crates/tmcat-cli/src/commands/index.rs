use super::{EXIT_NOT_FOUND, EXIT_SUCCESS};
use tmcat_core::{Catalog, CoreError};
use tmcat_repo::{RepoError, RepoRegistry, RepoSpec};

/// Rebuild a repository's index, or update it for the given ids.
pub fn run(registry: &RepoRegistry, spec: &RepoSpec, ids: &[String]) -> Result<u8, String> {
    let repo = registry.target(spec).map_err(|e| e.to_string())?;
    repo.update_index(ids).map_err(|e| e.to_string())?;
    if ids.is_empty() {
        println!("index rebuilt");
    } else {
        println!("index updated for {} id(s)", ids.len());
    }
    Ok(EXIT_SUCCESS)
}

/// Delete a single TM by exact id.
pub fn delete(registry: &RepoRegistry, spec: &RepoSpec, id: &str) -> Result<u8, String> {
    let catalog = Catalog::new(registry);
    match catalog.delete(spec, id) {
        Ok(()) => {
            println!("deleted {id}");
            Ok(EXIT_SUCCESS)
        }
        Err(CoreError::Repo(RepoError::TmNotFound)) => {
            eprintln!("no TM with id {id}");
            Ok(EXIT_NOT_FOUND)
        }
        Err(e) => Err(e.to_string()),
    }
}
