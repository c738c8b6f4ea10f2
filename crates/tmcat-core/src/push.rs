use crate::validate::validate_thing_model;
use crate::CoreError;
use chrono::{DateTime, Utc};
use tmcat_model::{
    calculate_digest, json_edit, sanitize_path, ThingModel, TmId, TmVersion, MAX_NAME_LENGTH,
    ORIGINAL_LINK_REL, PSEUDO_VERSION_TIMESTAMP_FORMAT,
};
use tmcat_repo::{ConflictKind, Repo, RepoError};
use tracing::{error, info, warn};

/// How many times a same-timestamp conflict is retried with a fresh
/// timestamp before being surfaced.
pub const MAX_PUSH_RETRIES: u32 = 3;

const RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(1);

/// Clock used for pseudo-version timestamps; injected for testability.
pub type Now = fn() -> DateTime<Utc>;

/// The push pipeline: validate, normalize the identity fields in place,
/// preserve or relocate an existing id, compute the content digest, build
/// the TMID, and store the result.
pub struct PushCommand {
    now: Now,
}

impl PushCommand {
    pub fn new(now: Now) -> Self {
        Self { now }
    }

    /// Prepare raw TM bytes and push them to `repo`, returning the id the
    /// TM was stored under. A conflict with existing content surfaces as
    /// [`RepoError::Conflict`] carrying the existing id; same-timestamp
    /// conflicts are retried with a fresh timestamp first.
    pub fn push_file(
        &self,
        repo: &dyn Repo,
        raw: &[u8],
        opt_path: &str,
    ) -> Result<String, CoreError> {
        let tm = validate_thing_model(raw).inspect_err(|e| error!("validation failed: {e}"))?;

        let mut retries_left = MAX_PUSH_RETRIES;
        loop {
            let (prepared, id) = prepare_for_import(self.now, &tm, raw, opt_path)?;
            match repo.push(&id, &prepared) {
                Ok(()) => {
                    info!("pushed {id} successfully");
                    if let Err(e) = repo.update_index(&[id.to_string()]) {
                        warn!("index update after push of {id} failed: {e}");
                    }
                    return Ok(id.to_string());
                }
                Err(RepoError::Conflict(conflict)) => {
                    if conflict.kind == ConflictKind::SameTimestamp && retries_left > 0 {
                        retries_left -= 1;
                        // a later wall-clock second yields a different id
                        std::thread::sleep(RETRY_DELAY);
                        continue;
                    }
                    info!(
                        "Thing Model conflicts with existing {} ({})",
                        conflict.existing_id, conflict.kind
                    );
                    return Err(RepoError::Conflict(conflict).into());
                }
                Err(e) => {
                    error!("error pushing to repository: {e}");
                    return Err(e.into());
                }
            }
        }
    }
}

/// Steps 2–9 of the push pipeline, pure over its inputs: returns the final
/// TM bytes (id field filled in) and the id they belong under.
fn prepare_for_import(
    now: Now,
    tm: &ThingModel,
    raw: &[u8],
    opt_path: &str,
) -> Result<(Vec<u8>, TmId), CoreError> {
    let mut bytes = replace_keys_with_sanitized(raw, tm)?;

    // an existing id is either ours (candidate to keep) or external (moved
    // into a rel:original link)
    let mut preserved: Option<TmId> = None;
    if let Some(original) = json_edit::get_string(&bytes, &["id"])? {
        if !original.is_empty() {
            match TmId::parse(&original) {
                Ok(id) => preserved = Some(id),
                Err(_) => bytes = move_id_to_original_link(bytes, &original),
            }
        }
    }

    let (digest, normalized) = calculate_digest(&bytes)?;
    let mut version = TmVersion::from_original(&tm.version.model)?;
    version.hash = digest;
    version.timestamp = now()
        .format(PSEUDO_VERSION_TIMESTAMP_FORMAT)
        .to_string();
    let generated = TmId::new(
        &tm.author.name,
        &tm.manufacturer.name,
        &tm.mpn,
        &sanitize_path(opt_path),
        version,
    );

    let final_id = match preserved {
        Some(preserved) if preserved.same_content(&generated) => preserved,
        _ => generated,
    };
    if final_id.name().len() > MAX_NAME_LENGTH {
        return Err(CoreError::NameTooLong(final_id.name()));
    }

    let final_bytes = json_edit::set_string(&normalized, &["id"], &final_id.to_string())?;
    Ok((final_bytes, final_id))
}

/// Overwrite the three identity fields in place with their sanitized values.
fn replace_keys_with_sanitized(raw: &[u8], tm: &ThingModel) -> Result<Vec<u8>, CoreError> {
    use tmcat_model::sanitize_name;
    let bytes = json_edit::set_string(
        raw,
        &["schema:author", "schema:name"],
        &sanitize_name(&tm.author.name),
    )?;
    let bytes = json_edit::set_string(
        &bytes,
        &["schema:manufacturer", "schema:name"],
        &sanitize_name(&tm.manufacturer.name),
    )?;
    Ok(json_edit::set_string(
        &bytes,
        &["schema:mpn"],
        &sanitize_name(&tm.mpn),
    )?)
}

/// Move an external id into a `{rel: "original", href: <id>}` link, unless
/// one is already present. Unknown `links` shapes are left alone.
fn move_id_to_original_link(bytes: Vec<u8>, id: &str) -> Vec<u8> {
    let link = serde_json::json!({"href": id, "rel": ORIGINAL_LINK_REL});
    let links_member = match json_edit::get(&bytes, &["links"]) {
        Ok(member) => member,
        Err(e) => {
            warn!("cannot inspect links: {e}");
            return bytes;
        }
    };
    match links_member {
        None => {
            let encoded = serde_json::to_vec(&vec![link]).expect("literal serializes");
            json_edit::set_raw(&bytes, &["links"], &encoded).unwrap_or(bytes)
        }
        Some((span, json_edit::ValueKind::Array)) => {
            let Ok(mut links) =
                serde_json::from_slice::<Vec<serde_json::Value>>(&bytes[span.clone()])
            else {
                warn!("error parsing links array, leaving it alone");
                return bytes;
            };
            let has_original = links.iter().any(|l| {
                l.get("rel").and_then(|r| r.as_str()) == Some(ORIGINAL_LINK_REL)
            });
            if has_original {
                return bytes;
            }
            links.push(link);
            let encoded = serde_json::to_vec(&links).expect("values serialize");
            json_edit::splice(&bytes, span, &encoded)
        }
        Some((_, kind)) => {
            warn!("unexpected type of links ({kind:?}), leaving it alone");
            bytes
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tmcat_model::json_edit::get_string;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 12, 5, 12, 32, 43).unwrap()
    }

    const RAW: &str = r#"{
  "schema:author": {"schema:name": "ACME Corp"},
  "schema:manufacturer": {"schema:name": "ACME Corp"},
  "schema:mpn": "X1",
  "version": {"model": "1.2.3"},
  "description": "a lamp"
}"#;

    fn prepare(raw: &str, opt_path: &str) -> (Vec<u8>, TmId) {
        let tm = validate_thing_model(raw.as_bytes()).unwrap();
        prepare_for_import(fixed_now, &tm, raw.as_bytes(), opt_path).unwrap()
    }

    #[test]
    fn generates_id_from_sanitized_fields_and_clock() {
        let (bytes, id) = prepare(RAW, "");
        assert_eq!(id.name(), "acme-corp/acme-corp/x1");
        assert_eq!(id.version.base_string(), "v1.2.3");
        assert_eq!(id.version.timestamp, "20231205123243");
        assert_eq!(id.version.hash.len(), 12);
        // id is written into the bytes
        assert_eq!(
            get_string(&bytes, &["id"]).unwrap(),
            Some(id.to_string())
        );
        // identity fields were sanitized in place
        assert_eq!(
            get_string(&bytes, &["schema:author", "schema:name"]).unwrap(),
            Some("acme-corp".to_owned())
        );
        assert_eq!(
            get_string(&bytes, &["schema:mpn"]).unwrap(),
            Some("x1".to_owned())
        );
    }

    #[test]
    fn optional_path_is_sanitized_into_the_id() {
        let (_, id) = prepare(RAW, "/Sub Folder/Deep/");
        assert_eq!(id.name(), "acme-corp/acme-corp/x1/sub-folder/deep");
    }

    #[test]
    fn digest_is_independent_of_the_incoming_id() {
        let (_, without) = prepare(RAW, "");
        let with_id = RAW.replace(
            "{\n  \"schema:author\"",
            "{\n  \"id\": \"acme-corp/acme-corp/x1/v9.9.9-20200101000000-aaaaaaaaaaaa.tm.json\",\n  \"schema:author\"",
        );
        let (_, with) = prepare(&with_id, "");
        assert_eq!(without.version.hash, with.version.hash);
    }

    #[test]
    fn valid_preserved_id_with_same_content_is_kept() {
        let (bytes, first_id) = prepare(RAW, "");
        // push the prepared output again: same digest, same base version
        let raw_again = String::from_utf8(bytes).unwrap();
        let (_, second_id) = prepare(&raw_again, "");
        assert_eq!(second_id, first_id);
    }

    #[test]
    fn preserved_id_with_stale_digest_is_replaced() {
        let stale = RAW.replace(
            "{\n  \"schema:author\"",
            "{\n  \"id\": \"acme-corp/acme-corp/x1/v1.2.3-20200101000000-aaaaaaaaaaaa.tm.json\",\n  \"schema:author\"",
        );
        let (_, id) = prepare(&stale, "");
        assert_ne!(id.version.hash, "aaaaaaaaaaaa");
        assert_eq!(id.version.timestamp, "20231205123243");
    }

    #[test]
    fn external_id_moves_into_original_link() {
        let external = RAW.replace(
            "{\n  \"schema:author\"",
            "{\n  \"id\": \"http://example/x\",\n  \"schema:author\"",
        );
        let (bytes, _) = prepare(&external, "");
        let tm: ThingModel = serde_json::from_slice(&bytes).unwrap();
        let original = tm.links.find(ORIGINAL_LINK_REL).unwrap();
        assert_eq!(original.href, "http://example/x");
    }

    #[test]
    fn existing_original_link_is_not_duplicated() {
        let doc = r#"{
  "id": "http://example/x",
  "links": [{"rel": "original", "href": "http://example/earlier"}],
  "schema:author": {"schema:name": "a"},
  "schema:manufacturer": {"schema:name": "m"},
  "schema:mpn": "p",
  "version": {"model": "1.0.0"}
}"#;
        let (bytes, _) = prepare(doc, "");
        let tm: ThingModel = serde_json::from_slice(&bytes).unwrap();
        let originals: Vec<_> = tm
            .links
            .0
            .iter()
            .filter(|l| l.rel == ORIGINAL_LINK_REL)
            .collect();
        assert_eq!(originals.len(), 1);
        assert_eq!(originals[0].href, "http://example/earlier");
    }

    #[test]
    fn non_array_links_are_left_alone() {
        let doc = r#"{
  "id": "http://example/x",
  "links": {"self": "here"},
  "schema:author": {"schema:name": "a"},
  "schema:manufacturer": {"schema:name": "m"},
  "schema:mpn": "p",
  "version": {"model": "1.0.0"}
}"#;
        let (bytes, _) = prepare(doc, "");
        assert!(String::from_utf8(bytes)
            .unwrap()
            .contains(r#""links": {"self": "here"}"#));
    }

    #[test]
    fn overlong_name_is_rejected() {
        let long_mpn = "x".repeat(300);
        let doc = RAW.replace("\"X1\"", &format!("\"{long_mpn}\""));
        let tm = validate_thing_model(doc.as_bytes()).unwrap();
        let err = prepare_for_import(fixed_now, &tm, doc.as_bytes(), "").unwrap_err();
        assert!(matches!(err, CoreError::NameTooLong(_)));
    }

    #[test]
    fn push_file_stores_and_indexes() {
        use tmcat_model::SearchParams;
        use tmcat_repo::{FileRepo, RepoSpec};

        let dir = tempfile::tempdir().unwrap();
        let repo = FileRepo::new(dir.path(), RepoSpec::named("r1"));
        let command = PushCommand::new(fixed_now);

        let id = command.push_file(&repo, RAW.as_bytes(), "").unwrap();
        assert!(id.starts_with("acme-corp/acme-corp/x1/v1.2.3-20231205123243-"));
        assert!(id.ends_with(".tm.json"));
        assert!(dir.path().join(&id).is_file());

        let result = repo.list(&SearchParams::default()).unwrap();
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].versions.len(), 1);
        assert_eq!(result.entries[0].versions[0].version.tm_id, id);
    }

    #[test]
    fn same_content_re_push_returns_existing_id_without_retry() {
        use tmcat_repo::{FileRepo, RepoSpec};

        let dir = tempfile::tempdir().unwrap();
        let repo = FileRepo::new(dir.path(), RepoSpec::named("r1"));
        let command = PushCommand::new(fixed_now);

        let id = command.push_file(&repo, RAW.as_bytes(), "").unwrap();
        let err = command.push_file(&repo, RAW.as_bytes(), "").unwrap_err();
        match err {
            CoreError::Repo(RepoError::Conflict(conflict)) => {
                assert_eq!(conflict.kind, ConflictKind::SameContent);
                assert_eq!(conflict.existing_id, id);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn validation_failure_writes_nothing() {
        use tmcat_repo::{FileRepo, RepoSpec};

        let dir = tempfile::tempdir().unwrap();
        let repo = FileRepo::new(dir.path(), RepoSpec::named("r1"));
        let command = PushCommand::new(fixed_now);

        let err = command.push_file(&repo, b"{}", "").unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }
}
