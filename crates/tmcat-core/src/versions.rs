use crate::{Catalog, CoreError, Deadline};
use tmcat_model::{merge_found_versions, FoundVersion};
use tmcat_repo::{RepoAccessError, RepoSpec};

impl Catalog<'_> {
    /// All versions of `name` across the resolved backends, merged and
    /// sorted by base semver (timestamp as tie-break). Fails with
    /// [`CoreError::EntryNotFound`] only when no backend contributed a
    /// record; other per-backend failures are collected and returned.
    pub fn versions(
        &self,
        spec: &RepoSpec,
        name: &str,
        deadline: Deadline,
    ) -> Result<(Vec<FoundVersion>, Vec<RepoAccessError>), CoreError> {
        let repos = self.resolver().resolve(spec)?;
        let mut merged: Vec<FoundVersion> = Vec::new();
        let mut errors = Vec::new();
        let mut found = false;
        for repo in repos {
            if deadline.expired() {
                return Err(CoreError::Cancelled);
            }
            match repo.versions(name) {
                Ok(versions) => {
                    found = true;
                    merged = merge_found_versions(merged, versions);
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => errors.push(RepoAccessError::new(&repo.spec(), e)),
            }
        }
        if !found {
            return Err(CoreError::EntryNotFound { errors });
        }
        Ok((merged, errors))
    }
}
