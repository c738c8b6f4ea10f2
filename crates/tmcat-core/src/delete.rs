use crate::{Catalog, CoreError};
use tmcat_repo::RepoSpec;
use tracing::warn;

impl Catalog<'_> {
    /// Delete a single TM from the targeted repository and evict it from
    /// the index. The index update is best-effort: the file removal is the
    /// operation's outcome.
    pub fn delete(&self, spec: &RepoSpec, id: &str) -> Result<(), CoreError> {
        let repo = self.resolver().target(spec)?;
        repo.delete(id)?;
        if let Err(e) = repo.update_index(&[id.to_owned()]) {
            warn!("index update after delete of {id} failed: {e}");
        }
        Ok(())
    }
}
