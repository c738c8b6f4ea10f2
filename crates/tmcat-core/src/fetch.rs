use crate::{Catalog, CoreError, Deadline};
use tmcat_model::{
    json_edit, parse_loose_semver, FetchName, FoundVersion, SemverMask, TmId, ORIGINAL_LINK_REL,
};
use tmcat_repo::{RepoAccessError, RepoSpec};
use tracing::warn;

/// A successfully fetched TM, along with non-fatal errors from backends
/// consulted on the way.
#[derive(Debug)]
pub struct Fetched {
    pub id: String,
    pub raw: Vec<u8>,
    pub errors: Vec<RepoAccessError>,
}

impl Catalog<'_> {
    /// Fetch a TM by exact id: ask each resolved backend in order, first
    /// success wins. Unexpected errors are collected; they accompany the
    /// result on success and the [`CoreError::TmNotFound`] when every
    /// backend came up empty.
    pub fn fetch_by_tmid(
        &self,
        spec: &RepoSpec,
        id: &str,
        restore_id: bool,
        deadline: Deadline,
    ) -> Result<Fetched, CoreError> {
        let repos = self.resolver().resolve(spec)?;
        let mut errors = Vec::new();
        for repo in repos {
            if deadline.expired() {
                return Err(CoreError::Cancelled);
            }
            match repo.fetch(id) {
                Ok((actual_id, raw)) => {
                    let raw = if restore_id {
                        restore_external_id(raw)
                    } else {
                        raw
                    };
                    return Ok(Fetched {
                        id: actual_id,
                        raw,
                        errors,
                    });
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => errors.push(RepoAccessError::new(&repo.spec(), e)),
            }
        }
        Err(CoreError::TmNotFound { errors })
    }

    /// Fetch the version of `name` best matching its (possibly partial)
    /// semver, then fetch that id with the same spec.
    pub fn fetch_by_name(
        &self,
        spec: &RepoSpec,
        name: &FetchName,
        restore_id: bool,
        deadline: Deadline,
    ) -> Result<Fetched, CoreError> {
        let (versions, mut errors) = match self.versions(spec, &name.name, deadline) {
            Ok(found) => found,
            Err(CoreError::EntryNotFound { errors }) => {
                return Err(CoreError::TmNotFound { errors });
            }
            Err(e) => return Err(e),
        };
        let selected = resolve_version(&versions, &name.semver)?.version.tm_id.clone();
        match self.fetch_by_tmid(spec, &selected, restore_id, deadline) {
            Ok(mut fetched) => {
                errors.extend(fetched.errors);
                fetched.errors = errors;
                Ok(fetched)
            }
            Err(CoreError::TmNotFound { errors: more }) => {
                errors.extend(more);
                Err(CoreError::TmNotFound { errors })
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch by whatever `s` is: a full TMID, or a `NAME[:SEMVER]`
    /// reference.
    pub fn fetch_by_tmid_or_name(
        &self,
        spec: &RepoSpec,
        s: &str,
        restore_id: bool,
        deadline: Deadline,
    ) -> Result<Fetched, CoreError> {
        match TmId::parse(s) {
            Ok(_) => self.fetch_by_tmid(spec, s, restore_id, deadline),
            Err(_) => {
                let name = FetchName::parse(s)?;
                self.fetch_by_name(spec, &name, restore_id, deadline)
            }
        }
    }
}

/// Pick the version matching a full or partial semver request: highest base
/// semver wins, ties broken by most recent timestamp. An empty request
/// means "latest overall".
pub fn resolve_version<'a>(
    versions: &'a [FoundVersion],
    requested: &str,
) -> Result<&'a FoundVersion, CoreError> {
    let mask = SemverMask::parse(requested)
        .map_err(|_| tmcat_model::ModelError::InvalidFetchName(requested.to_owned()))?;
    versions
        .iter()
        .filter_map(|v| {
            let base = parse_loose_semver(&v.version.version.model).ok()?;
            match &mask {
                Some(mask) if !mask.matches(&base) => None,
                _ => Some((base, v)),
            }
        })
        .max_by(|(a_base, a), (b_base, b)| {
            a_base
                .cmp(b_base)
                .then_with(|| a.version.timestamp.cmp(&b.version.timestamp))
        })
        .map(|(_, v)| v)
        .ok_or_else(|| CoreError::NoVersionFound {
            requested: requested.to_owned(),
        })
}

/// Undo the push-time id relocation: when a `rel:"original"` link exists,
/// put its href back into `id` and drop the link. Anything unexpected
/// leaves the bytes untouched.
fn restore_external_id(raw: Vec<u8>) -> Vec<u8> {
    let links = match json_edit::get(&raw, &["links"]) {
        Ok(Some((span, json_edit::ValueKind::Array))) => span,
        _ => return raw,
    };
    let Ok(items) = serde_json::from_slice::<Vec<serde_json::Value>>(&raw[links.clone()]) else {
        warn!("error parsing links array, returning TM as stored");
        return raw;
    };
    let mut original_href: Option<String> = None;
    let mut kept = Vec::with_capacity(items.len());
    for item in items {
        let is_original = original_href.is_none()
            && item.get("rel").and_then(|r| r.as_str()) == Some(ORIGINAL_LINK_REL);
        if is_original {
            original_href = item
                .get("href")
                .and_then(|h| h.as_str())
                .map(str::to_owned);
            if original_href.is_some() {
                continue;
            }
        }
        kept.push(item);
    }
    let Some(href) = original_href else {
        return raw;
    };
    let encoded = serde_json::to_vec(&kept).expect("values serialize");
    let updated = json_edit::splice(&raw, links, &encoded);
    match json_edit::set_string(&updated, &["id"], &href) {
        Ok(restored) => restored,
        Err(e) => {
            warn!("could not restore original id: {e}");
            raw
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MockRepo, MockResolver};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tmcat_model::{FoundSource, TocVersion, Version};

    fn found(model: &str, tm_id: &str, digest: &str, timestamp: &str, repo: &str) -> FoundVersion {
        FoundVersion {
            version: TocVersion {
                description: String::new(),
                version: Version {
                    model: model.to_owned(),
                },
                links: Default::default(),
                tm_id: tm_id.to_owned(),
                digest: digest.to_owned(),
                timestamp: timestamp.to_owned(),
                external_id: String::new(),
            },
            found_in: FoundSource::named(repo),
        }
    }

    fn version_fixture() -> Vec<FoundVersion> {
        vec![
            found(
                "v1.0.0",
                "author/manufacturer/mpn/v1.0.0-20231205123243-c49617d2e4fc.tm.json",
                "c49617d2e4fc",
                "20231205123243",
                "r1",
            ),
            found(
                "v1.0.4",
                "author/manufacturer/mpn/v1.0.4-20231206123243-d49617d2e4fc.tm.json",
                "d49617d2e4fc",
                "20231206123243",
                "r1",
            ),
            // more recent by timestamp than the latest 1.2.x semver, on purpose
            found(
                "v1.2.0",
                "author/manufacturer/mpn/v1.2.0-20231207163243-e49617d2e4fc.tm.json",
                "e49617d2e4fc",
                "20231207163243",
                "r1",
            ),
            found(
                "v1.2.3",
                "author/manufacturer/mpn/v1.2.3-20231207153243-e49617d2e4ff.tm.json",
                "e49617d2e4ff",
                "20231207153243",
                "r1",
            ),
            found(
                "v2.0.0",
                "author/manufacturer/mpn/v2.0.0-20231208123243-f49617d2e4fc.tm.json",
                "f49617d2e4fc",
                "20231208123243",
                "r1",
            ),
        ]
    }

    #[test]
    fn resolution_follows_partial_semver_rules() {
        let versions = version_fixture();
        let cases = [
            ("", "v2.0.0"),
            ("v1", "v1.2.3"),
            ("1.0", "v1.0.4"),
            ("v1.0", "v1.0.4"),
            ("1.2", "v1.2.3"),
            ("1.0.0", "v1.0.0"),
            ("v2.0.0", "v2.0.0"),
        ];
        for (requested, expected) in cases {
            let selected = resolve_version(&versions, requested).unwrap();
            assert_eq!(
                selected.version.version.model, expected,
                "requested {requested:?}"
            );
        }
    }

    #[test]
    fn highest_semver_beats_newer_timestamp() {
        let versions = version_fixture();
        let selected = resolve_version(&versions, "1.2").unwrap();
        assert_eq!(selected.version.version.model, "v1.2.3");
        assert_eq!(selected.version.timestamp, "20231207153243");
    }

    #[test]
    fn unmatched_request_reports_the_requested_version() {
        let versions = version_fixture();
        for requested in ["1.1", "1.3", "3"] {
            match resolve_version(&versions, requested) {
                Err(CoreError::NoVersionFound { requested: r }) => assert_eq!(r, requested),
                other => panic!("expected NoVersionFound, got {other:?}"),
            }
        }
    }

    #[test]
    fn invalid_request_is_invalid_fetch_name() {
        let versions = version_fixture();
        assert!(matches!(
            resolve_version(&versions, "1.a.0"),
            Err(CoreError::Model(_))
        ));
    }

    fn two_repo_resolver() -> MockResolver {
        let id_r1 = "author/manufacturer/mpn/v1.0.0-20231005123243-a49617d2e4fc.tm.json";
        let id_r2 = "author/manufacturer/mpn/v1.0.0-20231205123243-c49617d2e4fc.tm.json";

        let mut r1 = MockRepo::named("r1");
        r1.versions = Arc::new(HashMap::from([(
            "author/manufacturer/mpn".to_owned(),
            vec![found("v1.0.0", id_r1, "a49617d2e4fc", "20231005123243", "r1")],
        )]));
        r1.fetches = Arc::new(HashMap::from([(
            id_r1.to_owned(),
            (id_r1.to_owned(), br#"{"src": "r1"}"#.to_vec()),
        )]));

        let mut r2 = MockRepo::named("r2");
        r2.versions = Arc::new(HashMap::from([(
            "author/manufacturer/mpn".to_owned(),
            vec![found("v1.0.0", id_r2, "c49617d2e4fc", "20231205123243", "r2")],
        )]));
        r2.fetches = Arc::new(HashMap::from([(
            id_r2.to_owned(),
            (id_r2.to_owned(), br#"{"src": "r2"}"#.to_vec()),
        )]));

        MockResolver {
            repos: vec![r1, r2],
        }
    }

    #[test]
    fn fetch_by_id_searches_backends_in_order() {
        let resolver = two_repo_resolver();
        let catalog = Catalog::new(&resolver);
        let id_r2 = "author/manufacturer/mpn/v1.0.0-20231205123243-c49617d2e4fc.tm.json";

        // present only in r2; the empty spec still finds it
        let fetched = catalog
            .fetch_by_tmid(&RepoSpec::All, id_r2, false, Deadline::NONE)
            .unwrap();
        assert_eq!(fetched.id, id_r2);
        assert!(String::from_utf8(fetched.raw).unwrap().contains("r2"));

        // restricting to r1 hides it
        let err = catalog
            .fetch_by_tmid(&RepoSpec::named("r1"), id_r2, false, Deadline::NONE)
            .unwrap_err();
        assert!(matches!(err, CoreError::TmNotFound { .. }));
    }

    #[test]
    fn fetch_by_name_resolves_across_backends() {
        let resolver = two_repo_resolver();
        let catalog = Catalog::new(&resolver);

        // merged versions: r2's timestamp is more recent, so its id wins
        let fetched = catalog
            .fetch_by_tmid_or_name(
                &RepoSpec::All,
                "author/manufacturer/mpn",
                false,
                Deadline::NONE,
            )
            .unwrap();
        assert!(String::from_utf8(fetched.raw).unwrap().contains("r2"));

        // a named spec resolves against that backend only
        let fetched = catalog
            .fetch_by_tmid_or_name(
                &RepoSpec::named("r1"),
                "author/manufacturer/mpn",
                false,
                Deadline::NONE,
            )
            .unwrap();
        assert!(String::from_utf8(fetched.raw).unwrap().contains("r1"));
    }

    #[test]
    fn unexpected_error_then_success_attaches_errors() {
        let mut resolver = two_repo_resolver();
        resolver.repos[0].fetch_error = Some("unexpected".to_owned());
        let catalog = Catalog::new(&resolver);
        let id_r2 = "author/manufacturer/mpn/v1.0.0-20231205123243-c49617d2e4fc.tm.json";

        let fetched = catalog
            .fetch_by_tmid(&RepoSpec::All, id_r2, false, Deadline::NONE)
            .unwrap();
        assert_eq!(fetched.errors.len(), 1);
        assert!(fetched.errors[0].to_string().contains("unexpected"));
    }

    #[test]
    fn all_not_found_carries_collected_errors() {
        let mut resolver = two_repo_resolver();
        resolver.repos[0].fetch_error = Some("unexpected".to_owned());
        resolver.repos[1].fetches = Arc::new(HashMap::new());
        let catalog = Catalog::new(&resolver);
        let id = "author/manufacturer/mpn/v1.0.0-20231005123243-a49617d2e4fc.tm.json";

        match catalog.fetch_by_tmid(&RepoSpec::All, id, false, Deadline::NONE) {
            Err(CoreError::TmNotFound { errors }) => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].to_string().contains("unexpected"));
            }
            other => panic!("expected TmNotFound, got {other:?}"),
        }
    }

    #[test]
    fn fetch_by_name_collects_version_phase_errors() {
        let mut resolver = two_repo_resolver();
        resolver.repos[1].versions_error = Some("unexpected".to_owned());
        let catalog = Catalog::new(&resolver);

        let fetched = catalog
            .fetch_by_name(
                &RepoSpec::All,
                &FetchName::parse("author/manufacturer/mpn").unwrap(),
                false,
                Deadline::NONE,
            )
            .unwrap();
        assert!(String::from_utf8(fetched.raw).unwrap().contains("r1"));
        assert_eq!(fetched.errors.len(), 1);
        assert!(fetched.errors[0].to_string().contains("unexpected"));
    }

    #[test]
    fn fetch_by_unknown_name_is_tm_not_found() {
        let resolver = two_repo_resolver();
        let catalog = Catalog::new(&resolver);
        let err = catalog
            .fetch_by_tmid_or_name(
                &RepoSpec::All,
                "author/manufacturer/mpn2",
                false,
                Deadline::NONE,
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::TmNotFound { .. }));
    }

    fn restore_fixture(links: &str) -> Vec<u8> {
        format!(
            r#"{{
  "id": "author/manufacturer/mpn/v1.0.0-20231005123243-a49617d2e4fc.tm.json"{links}
}}"#
        )
        .into_bytes()
    }

    #[test]
    fn restore_id_replaces_id_and_drops_the_link() {
        let raw = restore_fixture(
            r#",
  "links": [{"rel": "original", "href": "externalId"},
            {"rel": "manifest", "href": "manifest"}]"#,
        );
        let restored = restore_external_id(raw);
        assert_eq!(
            json_edit::get_string(&restored, &["id"]).unwrap().unwrap(),
            "externalId"
        );
        let links: Vec<serde_json::Value> = serde_json::from_slice(
            &restored[json_edit::get(&restored, &["links"]).unwrap().unwrap().0],
        )
        .unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0]["rel"], "manifest");
    }

    #[test]
    fn restore_id_without_original_link_changes_nothing() {
        let raw = restore_fixture(
            r#",
  "links": [{"rel": "manifest", "href": "externalId"}]"#,
        );
        let restored = restore_external_id(raw.clone());
        assert_eq!(restored, raw);

        let bare = restore_fixture("");
        let restored = restore_external_id(bare.clone());
        assert_eq!(restored, bare);
    }

    #[test]
    fn fetch_with_restore_id_applies_restoration() {
        let id = "author/manufacturer/mpn/v1.0.0-20231005123243-a49617d2e4fc.tm.json";
        let body = restore_fixture(
            r#",
  "links": [{"rel": "original", "href": "externalId"}]"#,
        );
        let mut r1 = MockRepo::named("r1");
        r1.fetches = Arc::new(HashMap::from([(
            id.to_owned(),
            (id.to_owned(), body),
        )]));
        let resolver = MockResolver { repos: vec![r1] };
        let catalog = Catalog::new(&resolver);

        let fetched = catalog
            .fetch_by_tmid(&RepoSpec::All, id, true, Deadline::NONE)
            .unwrap();
        assert_eq!(
            json_edit::get_string(&fetched.raw, &["id"]).unwrap().unwrap(),
            "externalId"
        );
    }
}
