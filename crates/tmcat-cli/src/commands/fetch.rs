use super::{report_access_errors, EXIT_NOT_FOUND, EXIT_SUCCESS};
use std::io::Write;
use std::path::Path;
use tmcat_core::{Catalog, CoreError, Deadline};
use tmcat_repo::{RepoRegistry, RepoSpec};

pub fn run(
    registry: &RepoRegistry,
    spec: &RepoSpec,
    name: &str,
    restore_id: bool,
    output: Option<&Path>,
) -> Result<u8, String> {
    let catalog = Catalog::new(registry);
    match catalog.fetch_by_tmid_or_name(spec, name, restore_id, Deadline::NONE) {
        Ok(fetched) => {
            report_access_errors(&fetched.errors);
            match output {
                Some(path) => {
                    std::fs::write(path, &fetched.raw)
                        .map_err(|e| format!("cannot write {}: {e}", path.display()))?;
                    eprintln!("wrote {} to {}", fetched.id, path.display());
                }
                None => {
                    std::io::stdout()
                        .write_all(&fetched.raw)
                        .map_err(|e| e.to_string())?;
                }
            }
            Ok(EXIT_SUCCESS)
        }
        Err(e @ (CoreError::TmNotFound { .. } | CoreError::NoVersionFound { .. })) => {
            if let CoreError::TmNotFound { errors } = &e {
                report_access_errors(errors);
            }
            eprintln!("{e}");
            Ok(EXIT_NOT_FOUND)
        }
        Err(e) => Err(e.to_string()),
    }
}
