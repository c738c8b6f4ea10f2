use super::EXIT_SUCCESS;
use tmcat_core::{Catalog, Deadline};
use tmcat_repo::{CompletionKind, RepoRegistry, RepoSpec};

/// Print completion candidates, one per line. Wired into the generated
/// shell completion scripts.
pub fn run(
    registry: &RepoRegistry,
    spec: &RepoSpec,
    kind: &str,
    prefix: &str,
) -> Result<u8, String> {
    let kind = CompletionKind::parse(kind)
        .ok_or_else(|| format!("unknown completion kind '{kind}'"))?;
    let catalog = Catalog::new(registry);
    let candidates = catalog
        .completions(spec, kind, prefix, Deadline::NONE)
        .map_err(|e| e.to_string())?;
    for candidate in candidates {
        if candidate.starts_with(prefix) || kind == CompletionKind::FetchNames {
            println!("{candidate}");
        }
    }
    Ok(EXIT_SUCCESS)
}
