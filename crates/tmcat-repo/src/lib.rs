//! Repository backends for the tmcat catalog.
//!
//! A repository stores TM files under their content-derived ids and answers
//! list/fetch/versions queries from its index. Two implementations exist:
//! [`FileRepo`] over a local directory tree and [`HttpRepo`] over the REST
//! surface served by `tmcat-server`. Named repositories are configured in a
//! JSON file managed by [`RepoRegistry`]; [`RepoSpec`] selects which
//! repositories a federated operation addresses.

pub mod config;
pub mod file;
pub mod http;
pub mod spec;

pub use config::{AuthConfig, RepoConfig, RepoKind, RepoRegistry};
pub use file::FileRepo;
pub use http::HttpRepo;
pub use spec::{valid_repo_name, RepoSpec};

use std::fmt;
use thiserror::Error;
use tmcat_model::{FoundVersion, ModelError, SearchParams, SearchResult, TmId};
use tmcat_store::StoreError;

/// Protocol version sent as `X-Tmcat-Protocol` header on all HTTP requests.
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TM not found")]
    TmNotFound,
    #[error("entry not found")]
    EntryNotFound,
    #[error(transparent)]
    Conflict(#[from] IdConflict),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("named repository not found")]
    RepoNotFound,
    #[error("named repository already exists")]
    RepoExists,
    #[error("no default repository configured")]
    NoDefaultRepo,
    #[error("invalid repository name: {0}")]
    InvalidRepoName(String),
    #[error("invalid repository config: {0}")]
    InvalidSpec(String),
    #[error("invalid completion parameters: {0}")]
    InvalidCompletionParams(String),
    #[error("refusing to write empty TM content")]
    EmptyContent,
    #[error("operation cancelled")]
    Cancelled,
}

impl RepoError {
    /// Whether this error means "the requested thing does not exist here",
    /// which federated operations swallow per backend.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepoError::TmNotFound | RepoError::EntryNotFound)
    }
}

/// How a push collides with content already in the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Identical content already stored, possibly under another timestamp.
    SameContent,
    /// A different digest already occupies the same version+timestamp slot.
    SameTimestamp,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::SameContent => f.write_str("same content"),
            ConflictKind::SameTimestamp => f.write_str("same timestamp"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Thing Model conflicts with existing id {existing_id} ({kind})")]
pub struct IdConflict {
    pub kind: ConflictKind,
    pub existing_id: String,
}

/// What a completion request enumerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionKind {
    /// All TM names in the repository.
    Names,
    /// `name:baseSemver` pairs for a given name prefix.
    FetchNames,
}

impl CompletionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionKind::Names => "names",
            CompletionKind::FetchNames => "fetch-names",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "names" => Some(CompletionKind::Names),
            "fetch-names" => Some(CompletionKind::FetchNames),
            _ => None,
        }
    }
}

/// A failure of one backend inside a federated operation. Collected and
/// returned alongside the merged result rather than aborting the call.
#[derive(Debug, Error)]
#[error("repository {repo}: {source}")]
pub struct RepoAccessError {
    pub repo: String,
    #[source]
    pub source: RepoError,
}

impl RepoAccessError {
    pub fn new(spec: &RepoSpec, source: RepoError) -> Self {
        Self {
            repo: spec.to_string(),
            source,
        }
    }
}

/// The capability set every repository backend provides.
pub trait Repo: Send + Sync {
    /// Store prepared TM bytes under the given id. Returns an
    /// [`IdConflict`] when equivalent or clashing content already exists.
    fn push(&self, id: &TmId, raw: &[u8]) -> Result<(), RepoError>;

    /// Retrieve a TM by id. The returned id may differ from the requested
    /// one when the content matched under another timestamp.
    fn fetch(&self, id: &str) -> Result<(String, Vec<u8>), RepoError>;

    /// Remove a single TM; exact id match required.
    fn delete(&self, id: &str) -> Result<(), RepoError>;

    /// Filtered view of the repository's index.
    fn list(&self, search: &SearchParams) -> Result<SearchResult, RepoError>;

    /// All stored versions of one name.
    fn versions(&self, name: &str) -> Result<Vec<FoundVersion>, RepoError>;

    /// Update the index: a full rebuild when `ids` is empty, otherwise a
    /// partial update of exactly those ids.
    fn update_index(&self, ids: &[String]) -> Result<(), RepoError>;

    /// The spec this backend was resolved from.
    fn spec(&self) -> RepoSpec;

    /// Enumerate completion candidates for interactive shells.
    fn list_completions(&self, kind: CompletionKind, prefix: &str)
        -> Result<Vec<String>, RepoError>;
}

/// Resolution of a [`RepoSpec`] into concrete backends. Implemented by
/// [`RepoRegistry`]; the federated layer depends on this seam only.
pub trait RepoResolver {
    /// All backends a federated read addresses, in a stable order.
    fn resolve(&self, spec: &RepoSpec) -> Result<Vec<Box<dyn Repo>>, RepoError>;

    /// The single backend a write operation targets.
    fn target(&self, spec: &RepoSpec) -> Result<Box<dyn Repo>, RepoError>;
}

impl RepoResolver for RepoRegistry {
    fn resolve(&self, spec: &RepoSpec) -> Result<Vec<Box<dyn Repo>>, RepoError> {
        RepoRegistry::resolve(self, spec)
    }

    fn target(&self, spec: &RepoSpec) -> Result<Box<dyn Repo>, RepoError> {
        RepoRegistry::target(self, spec)
    }
}
