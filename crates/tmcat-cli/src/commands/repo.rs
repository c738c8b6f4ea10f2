use super::EXIT_SUCCESS;
use std::path::PathBuf;
use tmcat_repo::{AuthConfig, RepoConfig, RepoRegistry};

pub fn add(
    registry: &mut RepoRegistry,
    name: &str,
    dir: Option<&PathBuf>,
    url: Option<&String>,
    auth_token: Option<&String>,
) -> Result<u8, String> {
    let mut config = match (dir, url) {
        (Some(dir), None) => {
            let absolute = if dir.is_absolute() {
                dir.clone()
            } else {
                std::env::current_dir()
                    .map_err(|e| e.to_string())?
                    .join(dir)
            };
            RepoConfig::file(&absolute.to_string_lossy())
        }
        (None, Some(url)) => RepoConfig::http(url),
        _ => return Err("exactly one of --dir and --url is required".to_owned()),
    };
    if let Some(token) = auth_token {
        config.auth = Some(AuthConfig {
            token: Some(token.clone()),
        });
    }
    registry.add(name, config).map_err(|e| e.to_string())?;
    println!("added repository {name}");
    Ok(EXIT_SUCCESS)
}

pub fn list(registry: &RepoRegistry) -> Result<u8, String> {
    if registry.repos().is_empty() {
        println!("no repositories configured");
        return Ok(EXIT_SUCCESS);
    }
    println!("{:<16} {:<6} {:<8} {:<8} LOC", "NAME", "TYPE", "DEFAULT", "ENABLED");
    for (name, config) in registry.repos() {
        println!(
            "{:<16} {:<6} {:<8} {:<8} {}",
            name, config.kind, config.default, config.enabled, config.loc
        );
    }
    Ok(EXIT_SUCCESS)
}

pub fn remove(registry: &mut RepoRegistry, name: &str) -> Result<u8, String> {
    registry.remove(name).map_err(|e| e.to_string())?;
    println!("removed repository {name}");
    Ok(EXIT_SUCCESS)
}

pub fn rename(registry: &mut RepoRegistry, old: &str, new: &str) -> Result<u8, String> {
    registry.rename(old, new).map_err(|e| e.to_string())?;
    println!("renamed repository {old} to {new}");
    Ok(EXIT_SUCCESS)
}

pub fn set_default(registry: &mut RepoRegistry, name: &str) -> Result<u8, String> {
    registry.set_default(name).map_err(|e| e.to_string())?;
    println!("default repository is now {name}");
    Ok(EXIT_SUCCESS)
}

pub fn toggle(registry: &mut RepoRegistry, name: &str) -> Result<u8, String> {
    registry.toggle_enabled(name).map_err(|e| e.to_string())?;
    let enabled = registry.repos()[name].enabled;
    println!(
        "repository {name} is now {}",
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(EXIT_SUCCESS)
}
