//! Catalog engine for tmcat.
//!
//! Ties the identifier model and the repository backends together: the push
//! pipeline that normalizes, hashes, and conflict-checks incoming TMs
//! (`PushCommand`), and the federated query layer (`Catalog`) that fans
//! list/versions/fetch out across backends, merges results, and resolves
//! partial semver requests.

pub mod completions;
pub mod delete;
pub mod fetch;
pub mod list;
pub mod push;
pub mod validate;
pub mod versions;

pub use fetch::{resolve_version, Fetched};
pub use push::{PushCommand, MAX_PUSH_RETRIES};
pub use validate::validate_thing_model;

use std::time::{Duration, Instant};
use thiserror::Error;
use tmcat_model::{ModelError, MAX_NAME_LENGTH};
use tmcat_repo::{RepoAccessError, RepoError, RepoResolver};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("invalid Thing Model: {0}")]
    Validation(String),
    #[error("TM name too long (max {MAX_NAME_LENGTH} allowed): {0}")]
    NameTooLong(String),
    #[error("TM not found")]
    TmNotFound { errors: Vec<RepoAccessError> },
    #[error("entry not found")]
    EntryNotFound { errors: Vec<RepoAccessError> },
    #[error("no version {requested} found")]
    NoVersionFound { requested: String },
    #[error("operation cancelled")]
    Cancelled,
}

/// An optional wall-clock deadline checked at the suspension points of
/// federated operations. Already-completed side effects are not rolled back
/// when it expires.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub const NONE: Deadline = Deadline(None);

    pub fn after(duration: Duration) -> Self {
        Deadline(Some(Instant::now() + duration))
    }

    pub fn expired(&self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }
}

/// The federated manager: dispatches list/fetch/versions across the
/// backends a [`tmcat_repo::RepoSpec`] resolves to and merges the results.
/// Per-backend failures never abort a call unless every backend failed.
pub struct Catalog<'a> {
    resolver: &'a dyn RepoResolver,
}

impl<'a> Catalog<'a> {
    pub fn new(resolver: &'a dyn RepoResolver) -> Self {
        Self { resolver }
    }

    pub(crate) fn resolver(&self) -> &dyn RepoResolver {
        self.resolver
    }
}
