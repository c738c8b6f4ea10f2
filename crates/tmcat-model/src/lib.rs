//! Identifier model and index data structures for the tmcat catalog.
//!
//! This crate defines the content-derived TM identifier (`TmId`), the
//! pseudo-version scheme (`TmVersion`), the stable content digest, the
//! byte-preserving JSON editor used to compute it, the table-of-contents
//! index (`Toc`), and the search/merge types shared by all backends.

pub mod digest;
pub mod fetch;
pub mod id;
pub mod json_edit;
pub mod search;
pub mod thing;
pub mod toc;
pub mod version;

pub use digest::calculate_digest;
pub use fetch::FetchName;
pub use id::{sanitize_name, sanitize_path, TmId, MAX_NAME_LENGTH, TM_FILE_EXT};
pub use search::{
    merge_found_versions, FoundEntry, FoundSource, FoundVersion, NameFilterType, SearchParams,
    SearchResult,
};
pub use thing::{
    Link, Links, SchemaAuthor, SchemaManufacturer, ThingModel, Version, ORIGINAL_LINK_REL,
};
pub use toc::{Toc, TocEntry, TocMeta, TocVersion, TM_LINK_REL};
pub use version::{parse_loose_semver, SemverMask, TmVersion, PSEUDO_VERSION_TIMESTAMP_FORMAT};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid TM id: {0}")]
    InvalidId(String),
    #[error("invalid fetch name '{0}': must be NAME[:SEMVER]")]
    InvalidFetchName(String),
    #[error("invalid semantic version: {0}")]
    InvalidVersion(String),
    #[error("invalid JSON document: {0}")]
    Json(String),
}
