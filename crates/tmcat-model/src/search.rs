use crate::thing::{SchemaAuthor, SchemaManufacturer};
use crate::toc::{Toc, TocEntry, TocVersion};
use crate::version::parse_loose_semver;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;

/// How the name filter of a search is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameFilterType {
    /// Exact equality with the entry name.
    #[default]
    Full,
    /// Path-segment prefix: every accepted segment must equal the
    /// corresponding leading segment of the entry name.
    Prefix,
}

/// Structured filters applied to a repository's index.
#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    pub name: Option<String>,
    pub author: Vec<String>,
    pub manufacturer: Vec<String>,
    pub mpn: Vec<String>,
    pub query: Option<String>,
    pub name_filter: NameFilterType,
}

impl SearchParams {
    /// Exact-name search, as used by the versions operation.
    pub fn by_name(name: &str) -> Self {
        Self {
            name: Some(name.trim().to_owned()),
            ..Self::default()
        }
    }

    pub fn matches(&self, entry: &TocEntry) -> bool {
        if let Some(name) = &self.name {
            if !name.is_empty() && !self.matches_name(name, &entry.name) {
                return false;
            }
        }
        if !matches_filter(&self.author, &entry.author.name)
            || !matches_filter(&self.manufacturer, &entry.manufacturer.name)
            || !matches_filter(&self.mpn, &entry.mpn)
        {
            return false;
        }
        match &self.query {
            Some(query) if !query.trim().is_empty() => matches_query(entry, query),
            _ => true,
        }
    }

    fn matches_name(&self, accepted: &str, actual: &str) -> bool {
        match self.name_filter {
            NameFilterType::Full => actual == accepted,
            NameFilterType::Prefix => {
                let actual_parts: Vec<&str> = actual.split('/').collect();
                let accepted_parts: Vec<&str> =
                    accepted.trim_matches('/').split('/').collect();
                accepted_parts.len() <= actual_parts.len()
                    && actual_parts[..accepted_parts.len()] == accepted_parts[..]
            }
        }
    }
}

fn matches_filter(accepted: &[String], value: &str) -> bool {
    accepted.is_empty() || accepted.iter().any(|a| a == value)
}

fn matches_query(entry: &TocEntry, query: &str) -> bool {
    let query = query.trim().to_lowercase();
    let contains = |s: &str| s.trim().to_lowercase().contains(&query);
    contains(&entry.name)
        || contains(&entry.manufacturer.name)
        || contains(&entry.mpn)
        || entry
            .versions
            .iter()
            .any(|v| contains(&v.description) || contains(&v.external_id))
}

/// Which repository a search hit came from: a configured repo by name, or an
/// ad-hoc directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoundSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

impl FoundSource {
    pub fn named(repo: &str) -> Self {
        Self {
            repo: Some(repo.to_owned()),
            directory: None,
        }
    }

    pub fn directory(dir: &str) -> Self {
        Self {
            repo: None,
            directory: Some(dir.to_owned()),
        }
    }
}

impl fmt::Display for FoundSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.repo, &self.directory) {
            (Some(repo), _) => f.write_str(repo),
            (None, Some(dir)) => write!(f, "<{dir}>"),
            (None, None) => f.write_str("<unknown>"),
        }
    }
}

/// A version record annotated with the repository it was found in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoundVersion {
    #[serde(flatten)]
    pub version: TocVersion,
    #[serde(rename = "repo")]
    pub found_in: FoundSource,
}

/// An index entry annotated with per-version sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoundEntry {
    pub name: String,
    #[serde(rename = "schema:manufacturer")]
    pub manufacturer: SchemaManufacturer,
    #[serde(rename = "schema:mpn")]
    pub mpn: String,
    #[serde(rename = "schema:author")]
    pub author: SchemaAuthor,
    pub versions: Vec<FoundVersion>,
}

/// The merged outcome of a (possibly federated) list operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub entries: Vec<FoundEntry>,
}

impl SearchResult {
    pub fn from_toc(toc: Toc, source: &FoundSource) -> Self {
        let entries = toc
            .data
            .into_iter()
            .map(|entry| FoundEntry {
                name: entry.name,
                manufacturer: entry.manufacturer,
                mpn: entry.mpn,
                author: entry.author,
                versions: entry
                    .versions
                    .into_iter()
                    .map(|version| FoundVersion {
                        version,
                        found_in: source.clone(),
                    })
                    .collect(),
            })
            .collect();
        Self { entries }
    }

    /// Union another result into this one. Entries merge by name; versions
    /// union by `tmID`, the already-present record winning on ties.
    pub fn merge(&mut self, other: SearchResult) {
        for entry in other.entries {
            match self.entries.iter_mut().find(|e| e.name == entry.name) {
                Some(existing) => {
                    for version in entry.versions {
                        if !existing
                            .versions
                            .iter()
                            .any(|v| v.version.tm_id == version.version.tm_id)
                        {
                            existing.versions.push(version);
                        }
                    }
                }
                None => self.entries.push(entry),
            }
        }
        self.entries.sort_by(|a, b| a.name.cmp(&b.name));
    }
}

fn base_of(version: &FoundVersion) -> Version {
    parse_loose_semver(&version.version.version.model).unwrap_or_else(|_| Version::new(0, 0, 0))
}

/// Union two version lists. Records with the same base version and digest
/// collapse to the one with the most recent timestamp; the result is sorted
/// by base semver ascending, ties broken by timestamp ascending.
pub fn merge_found_versions(
    mut into: Vec<FoundVersion>,
    from: Vec<FoundVersion>,
) -> Vec<FoundVersion> {
    into.extend(from);
    let mut kept: BTreeMap<(String, String), FoundVersion> = BTreeMap::new();
    for version in into {
        let key = (
            base_of(&version).to_string(),
            version.version.digest.clone(),
        );
        match kept.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(version);
            }
            Entry::Occupied(mut slot) => {
                if version.version.timestamp > slot.get().version.timestamp {
                    slot.insert(version);
                }
            }
        }
    }
    let mut out: Vec<FoundVersion> = kept.into_values().collect();
    out.sort_by(|a, b| {
        base_of(a)
            .cmp(&base_of(b))
            .then_with(|| a.version.timestamp.cmp(&b.version.timestamp))
    });
    out
}
