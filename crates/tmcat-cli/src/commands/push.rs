use super::{EXIT_CONFLICT, EXIT_SUCCESS};
use chrono::Utc;
use std::path::Path;
use tmcat_core::{CoreError, PushCommand};
use tmcat_repo::{ConflictKind, RepoError, RepoRegistry, RepoSpec};

pub fn run(
    registry: &RepoRegistry,
    spec: &RepoSpec,
    file: &Path,
    opt_path: &str,
) -> Result<u8, String> {
    let raw = std::fs::read(file).map_err(|e| format!("cannot read {}: {e}", file.display()))?;
    let repo = registry.target(spec).map_err(|e| e.to_string())?;
    let command = PushCommand::new(Utc::now);
    match command.push_file(repo.as_ref(), &raw, opt_path) {
        Ok(id) => {
            println!("pushed {id}");
            Ok(EXIT_SUCCESS)
        }
        Err(CoreError::Repo(RepoError::Conflict(conflict))) => {
            match conflict.kind {
                ConflictKind::SameContent => {
                    println!("already in catalog as {}", conflict.existing_id);
                }
                ConflictKind::SameTimestamp => {
                    println!(
                        "timestamp clash with existing {}, try again",
                        conflict.existing_id
                    );
                }
            }
            Ok(EXIT_CONFLICT)
        }
        Err(e) => Err(e.to_string()),
    }
}
