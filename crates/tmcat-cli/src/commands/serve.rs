use std::path::PathBuf;
use std::sync::Arc;
use tmcat_repo::{RepoKind, RepoRegistry, RepoSpec};
use tmcat_server::{run_server, ServedRepo};

/// Serve a filesystem repository over HTTP. Blocks until interrupted.
pub fn run(registry: &RepoRegistry, spec: &RepoSpec, addr: &str) -> Result<u8, String> {
    let root = match spec {
        RepoSpec::Dir(dir) => dir.clone(),
        RepoSpec::Named(name) => file_repo_root(registry, name)?,
        RepoSpec::All => {
            let repo = registry.target(&RepoSpec::All).map_err(|e| e.to_string())?;
            match repo.spec() {
                RepoSpec::Named(name) => file_repo_root(registry, &name)?,
                other => return Err(format!("cannot serve {other}")),
            }
        }
    };
    let auth_token = std::env::var("TMCAT_AUTH_TOKEN").ok();
    let state = Arc::new(ServedRepo::new(root, auth_token));
    run_server(&state, addr);
    Ok(super::EXIT_SUCCESS)
}

fn file_repo_root(registry: &RepoRegistry, name: &str) -> Result<PathBuf, String> {
    let config = registry
        .repos()
        .get(name)
        .ok_or_else(|| format!("no repository named {name}"))?;
    if config.kind != RepoKind::File {
        return Err(format!("repository {name} is not a file repository"));
    }
    Ok(PathBuf::from(&config.loc))
}
