use crate::{Catalog, CoreError, Deadline};
use std::collections::BTreeSet;
use tmcat_repo::{CompletionKind, RepoSpec};

impl Catalog<'_> {
    /// Completion candidates for interactive shells, unioned across the
    /// resolved backends and sorted. Per-backend failures are ignored
    /// unless no backend answered at all.
    pub fn completions(
        &self,
        spec: &RepoSpec,
        kind: CompletionKind,
        prefix: &str,
        deadline: Deadline,
    ) -> Result<Vec<String>, CoreError> {
        let repos = self.resolver().resolve(spec)?;
        let mut candidates = BTreeSet::new();
        let mut answered = false;
        let mut last_error = None;
        for repo in repos {
            if deadline.expired() {
                return Err(CoreError::Cancelled);
            }
            match repo.list_completions(kind, prefix) {
                Ok(values) => {
                    answered = true;
                    candidates.extend(values);
                }
                Err(e) => last_error = Some(e),
            }
        }
        match (answered, last_error) {
            (false, Some(e)) => Err(e.into()),
            _ => Ok(candidates.into_iter().collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tmcat_repo::{FileRepo, Repo, RepoError, RepoResolver};

    struct TwoDirResolver {
        a: std::path::PathBuf,
        b: std::path::PathBuf,
    }

    impl RepoResolver for TwoDirResolver {
        fn resolve(&self, _spec: &RepoSpec) -> Result<Vec<Box<dyn Repo>>, RepoError> {
            Ok(vec![
                Box::new(FileRepo::new(&self.a, RepoSpec::named("a"))),
                Box::new(FileRepo::new(&self.b, RepoSpec::named("b"))),
            ])
        }

        fn target(&self, spec: &RepoSpec) -> Result<Box<dyn Repo>, RepoError> {
            Ok(self.resolve(spec)?.remove(0))
        }
    }

    fn seed(root: &std::path::Path, name: &str, base: &str, digest: &str) {
        let repo = FileRepo::new(root, RepoSpec::named("seed"));
        let id = tmcat_model::TmId::parse(&format!(
            "{name}/v{base}-20231205123243-{digest}.tm.json"
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
    fn names_are_unioned_and_sorted() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        seed(dir_a.path(), "acme/omnicorp/x1", "1.0.0", "c49617d2e4fc");
        seed(dir_b.path(), "acme/bartech/b1", "1.0.0", "d49617d2e4fc");
        seed(dir_b.path(), "acme/omnicorp/x1", "1.1.0", "e49617d2e4fc");

        let resolver = TwoDirResolver {
            a: dir_a.path().to_path_buf(),
            b: dir_b.path().to_path_buf(),
        };
        let catalog = Catalog::new(&resolver);
        let names = catalog
            .completions(&RepoSpec::All, CompletionKind::Names, "", Deadline::NONE)
            .unwrap();
        assert_eq!(names, vec!["acme/bartech/b1", "acme/omnicorp/x1"]);
    }

    #[test]
    fn fetch_names_union_base_versions() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        seed(dir_a.path(), "acme/omnicorp/x1", "1.0.0", "c49617d2e4fc");
        seed(dir_b.path(), "acme/omnicorp/x1", "1.1.0", "e49617d2e4fc");

        let resolver = TwoDirResolver {
            a: dir_a.path().to_path_buf(),
            b: dir_b.path().to_path_buf(),
        };
        let catalog = Catalog::new(&resolver);
        let pairs = catalog
            .completions(
                &RepoSpec::All,
                CompletionKind::FetchNames,
                "acme/omnicorp/x1:",
                Deadline::NONE,
            )
            .unwrap();
        assert_eq!(
            pairs,
            vec!["acme/omnicorp/x1:v1.0.0", "acme/omnicorp/x1:v1.1.0"]
        );
    }
}
