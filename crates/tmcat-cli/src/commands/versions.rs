use super::{report_access_errors, EXIT_NOT_FOUND, EXIT_SUCCESS};
use tmcat_core::{Catalog, CoreError, Deadline};
use tmcat_repo::{RepoRegistry, RepoSpec};

pub fn run(registry: &RepoRegistry, spec: &RepoSpec, name: &str) -> Result<u8, String> {
    let catalog = Catalog::new(registry);
    match catalog.versions(spec, name, Deadline::NONE) {
        Ok((versions, errors)) => {
            report_access_errors(&errors);
            println!(
                "{:<16} {:<16} {:<14} {:<10} ID",
                "VERSION", "TIMESTAMP", "DIGEST", "REPO"
            );
            for found in &versions {
                println!(
                    "{:<16} {:<16} {:<14} {:<10} {}",
                    found.version.version.model,
                    found.version.timestamp,
                    found.version.digest,
                    found.found_in,
                    found.version.tm_id
                );
            }
            Ok(EXIT_SUCCESS)
        }
        Err(CoreError::EntryNotFound { errors }) => {
            report_access_errors(&errors);
            eprintln!("no entry named {name} found");
            Ok(EXIT_NOT_FOUND)
        }
        Err(e) => Err(e.to_string()),
    }
}
