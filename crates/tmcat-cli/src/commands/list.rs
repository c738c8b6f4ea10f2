use super::{report_access_errors, EXIT_SUCCESS};
use tmcat_core::{Catalog, Deadline};
use tmcat_model::{NameFilterType, SearchParams};
use tmcat_repo::{RepoRegistry, RepoSpec};

#[allow(clippy::too_many_arguments)]
pub fn run(
    registry: &RepoRegistry,
    spec: &RepoSpec,
    name: Option<&String>,
    author: &[String],
    manufacturer: &[String],
    mpn: &[String],
    query: Option<&String>,
) -> Result<u8, String> {
    let search = SearchParams {
        name: name.cloned(),
        author: author.to_vec(),
        manufacturer: manufacturer.to_vec(),
        mpn: mpn.to_vec(),
        query: query.cloned(),
        name_filter: NameFilterType::Prefix,
    };
    let catalog = Catalog::new(registry);
    let (result, errors) = catalog
        .list(spec, &search, Deadline::NONE)
        .map_err(|e| e.to_string())?;
    report_access_errors(&errors);

    if result.entries.is_empty() {
        println!("no entries found");
        return Ok(EXIT_SUCCESS);
    }
    println!(
        "{:<48} {:<20} {:<20} {:<12} VERSIONS",
        "NAME", "AUTHOR", "MANUFACTURER", "MPN"
    );
    for entry in &result.entries {
        println!(
            "{:<48} {:<20} {:<20} {:<12} {}",
            entry.name,
            entry.author.name,
            entry.manufacturer.name,
            entry.mpn,
            entry.versions.len()
        );
    }
    Ok(EXIT_SUCCESS)
}
