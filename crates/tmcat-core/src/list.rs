use crate::{Catalog, CoreError, Deadline};
use tmcat_model::{SearchParams, SearchResult};
use tmcat_repo::{RepoAccessError, RepoSpec};

impl Catalog<'_> {
    /// Filtered listing across the resolved backends. Results merge by
    /// name; a version from the first-listed backend wins on ties for the
    /// same tmID. Per-backend failures are collected, never fatal.
    pub fn list(
        &self,
        spec: &RepoSpec,
        search: &SearchParams,
        deadline: Deadline,
    ) -> Result<(SearchResult, Vec<RepoAccessError>), CoreError> {
        let repos = self.resolver().resolve(spec)?;
        let mut merged = SearchResult::default();
        let mut errors = Vec::new();
        for repo in repos {
            if deadline.expired() {
                return Err(CoreError::Cancelled);
            }
            match repo.list(search) {
                Ok(result) => merged.merge(result),
                Err(e) if e.is_not_found() => {}
                Err(e) => errors.push(RepoAccessError::new(&repo.spec(), e)),
            }
        }
        Ok((merged, errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tmcat_repo::{FileRepo, Repo, RepoError, RepoResolver, RepoSpec};

    /// Resolver over two real file repositories; list federation is easier
    /// to exercise end-to-end than to script.
    struct TwoDirResolver {
        a: std::path::PathBuf,
        b: std::path::PathBuf,
    }

    impl RepoResolver for TwoDirResolver {
        fn resolve(&self, spec: &RepoSpec) -> Result<Vec<Box<dyn Repo>>, RepoError> {
            match spec {
                RepoSpec::All => Ok(vec![
                    Box::new(FileRepo::new(&self.a, RepoSpec::named("a"))),
                    Box::new(FileRepo::new(&self.b, RepoSpec::named("b"))),
                ]),
                RepoSpec::Named(name) if name == "a" => {
                    Ok(vec![Box::new(FileRepo::new(&self.a, RepoSpec::named("a")))])
                }
                RepoSpec::Named(name) if name == "b" => {
                    Ok(vec![Box::new(FileRepo::new(&self.b, RepoSpec::named("b")))])
                }
                _ => Err(RepoError::RepoNotFound),
            }
        }

        fn target(&self, spec: &RepoSpec) -> Result<Box<dyn Repo>, RepoError> {
            let mut repos = self.resolve(spec)?;
            repos.pop().ok_or(RepoError::RepoNotFound)
        }
    }

    fn seed(root: &std::path::Path, name: &str, base: &str, ts: &str, digest: &str) {
        let repo = FileRepo::new(root, RepoSpec::named("seed"));
        let id = tmcat_model::TmId::parse(&format!(
            "{name}/v{base}-{ts}-{digest}.tm.json"
        ))
        .unwrap();
        let raw = format!(
            r#"{{"id":"{id}","schema:author":{{"schema:name":"{}"}},"schema:manufacturer":{{"schema:name":"{}"}},"schema:mpn":"{}","version":{{"model":"{base}"}}}}"#,
            id.author, id.manufacturer, id.mpn
        );
        repo.push(&id, raw.as_bytes()).unwrap();
        repo.update_index(&[id.to_string()]).unwrap();
    }

    #[test]
    fn list_merges_entries_across_backends() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        seed(
            dir_a.path(),
            "acme/omnicorp/x1",
            "1.0.0",
            "20231205123243",
            "c49617d2e4fc",
        );
        seed(
            dir_b.path(),
            "acme/omnicorp/x1",
            "1.1.0",
            "20231206123243",
            "d49617d2e4fc",
        );
        seed(
            dir_b.path(),
            "acme/bartech/b1",
            "1.0.0",
            "20231205123243",
            "e49617d2e4fc",
        );

        let resolver = TwoDirResolver {
            a: dir_a.path().to_path_buf(),
            b: dir_b.path().to_path_buf(),
        };
        let catalog = Catalog::new(&resolver);
        let (result, errors) = catalog
            .list(&RepoSpec::All, &SearchParams::default(), Deadline::NONE)
            .unwrap();
        assert!(errors.is_empty());
        assert_eq!(result.entries.len(), 2);
        // entries come back sorted by name
        assert_eq!(result.entries[0].name, "acme/bartech/b1");
        assert_eq!(result.entries[1].name, "acme/omnicorp/x1");
        assert_eq!(result.entries[1].versions.len(), 2);
    }

    #[test]
    fn backend_without_index_is_reported_not_fatal() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        seed(
            dir_a.path(),
            "acme/omnicorp/x1",
            "1.0.0",
            "20231205123243",
            "c49617d2e4fc",
        );
        // dir_b has no ToC at all

        let resolver = TwoDirResolver {
            a: dir_a.path().to_path_buf(),
            b: dir_b.path().to_path_buf(),
        };
        let catalog = Catalog::new(&resolver);
        let (result, errors) = catalog
            .list(&RepoSpec::All, &SearchParams::default(), Deadline::NONE)
            .unwrap();
        assert_eq!(result.entries.len(), 1);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].repo, "b");
    }
}
