use crate::spec::RepoSpec;
use crate::{CompletionKind, ConflictKind, IdConflict, Repo, RepoError};
use serde::{Deserialize, Serialize};
use std::io::Read;
use tmcat_model::{FoundVersion, NameFilterType, SearchParams, SearchResult, TmId};

/// A TM repository reached over the tmcat REST protocol.
///
/// Routes, relative to the configured base URL:
/// - `PUT    /tms/<id>` - store prepared TM bytes; responds with [`PushResponse`]
/// - `GET    /tms/<id>` - fetch; `X-Tmcat-Id` header carries the actual id
/// - `DELETE /tms/<id>` - remove a single TM
/// - `GET    /list?...` - filtered index as a `SearchResult`
/// - `GET    /versions/<name>` - version records of one name
/// - `POST   /index` - JSON array of ids to update, empty for a full rebuild
/// - `GET    /completions?kind=<kind>&prefix=<prefix>` - newline-separated
pub struct HttpRepo {
    base_url: String,
    auth_token: Option<String>,
    spec: RepoSpec,
    agent: ureq::Agent,
}

/// Body of a push response. A conflict is reported inside a 200 response so
/// the existing id survives transport.
#[derive(Debug, Serialize, Deserialize)]
pub struct PushResponse {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict: Option<ConflictResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConflictResponse {
    pub kind: String,
    #[serde(rename = "existingId")]
    pub existing_id: String,
}

const CONFLICT_SAME_CONTENT: &str = "same-content";
const CONFLICT_SAME_TIMESTAMP: &str = "same-timestamp";

impl From<&IdConflict> for ConflictResponse {
    fn from(conflict: &IdConflict) -> Self {
        Self {
            kind: match conflict.kind {
                ConflictKind::SameContent => CONFLICT_SAME_CONTENT,
                ConflictKind::SameTimestamp => CONFLICT_SAME_TIMESTAMP,
            }
            .to_owned(),
            existing_id: conflict.existing_id.clone(),
        }
    }
}

impl ConflictResponse {
    pub fn to_conflict(&self) -> Result<IdConflict, RepoError> {
        let kind = match self.kind.as_str() {
            CONFLICT_SAME_CONTENT => ConflictKind::SameContent,
            CONFLICT_SAME_TIMESTAMP => ConflictKind::SameTimestamp,
            other => {
                return Err(RepoError::Http(format!("unknown conflict kind '{other}'")));
            }
        };
        Ok(IdConflict {
            kind,
            existing_id: self.existing_id.clone(),
        })
    }
}

/// Percent-encode a query parameter value. Path-ish characters stay as-is;
/// everything outside the unreserved set is escaped.
fn encode_query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        let keep = byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'~' | b'-' | b'/');
        if keep {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

impl HttpRepo {
    pub fn new(base_url: &str, auth_token: Option<String>, spec: RepoSpec) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            auth_token,
            spec,
            agent: ureq::Agent::new_with_defaults(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn do_get(&self, url: &str, not_found: RepoError) -> Result<(ureq::http::HeaderMap, Vec<u8>), RepoError> {
        tracing::debug!("GET {url}");
        let mut req = self
            .agent
            .get(url)
            .header("X-Tmcat-Protocol", &crate::PROTOCOL_VERSION.to_string());
        if let Some(ref token) = self.auth_token {
            req = req.header("Authorization", &format!("Bearer {token}"));
        }
        let resp = match req.call() {
            Ok(resp) => resp,
            Err(ureq::Error::StatusCode(404)) => return Err(not_found),
            Err(ureq::Error::StatusCode(code)) => {
                return Err(RepoError::Http(format!("HTTP {code} for {url}")));
            }
            Err(e) => return Err(RepoError::Http(e.to_string())),
        };
        let headers = resp.headers().clone();
        let mut body = Vec::new();
        resp.into_body()
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|e| RepoError::Http(e.to_string()))?;
        Ok((headers, body))
    }

    fn do_send(
        &self,
        method: &str,
        url: &str,
        body: &[u8],
        not_found: RepoError,
    ) -> Result<Vec<u8>, RepoError> {
        tracing::debug!("{method} {url} ({} bytes)", body.len());
        let mut req = match method {
            "PUT" => self.agent.put(url),
            "POST" => self.agent.post(url),
            _ => unreachable!("unsupported method {method}"),
        }
        .header("Content-Type", "application/json")
        .header("X-Tmcat-Protocol", &crate::PROTOCOL_VERSION.to_string());
        if let Some(ref token) = self.auth_token {
            req = req.header("Authorization", &format!("Bearer {token}"));
        }
        let resp = match req.send(body) {
            Ok(resp) => resp,
            Err(ureq::Error::StatusCode(404)) => return Err(not_found),
            Err(ureq::Error::StatusCode(code)) => {
                return Err(RepoError::Http(format!("HTTP {code} for {url}")));
            }
            Err(e) => return Err(RepoError::Http(e.to_string())),
        };
        let mut out = Vec::new();
        resp.into_body()
            .into_reader()
            .read_to_end(&mut out)
            .map_err(|e| RepoError::Http(e.to_string()))?;
        Ok(out)
    }

    fn do_delete(&self, url: &str) -> Result<(), RepoError> {
        tracing::debug!("DELETE {url}");
        let mut req = self
            .agent
            .delete(url)
            .header("X-Tmcat-Protocol", &crate::PROTOCOL_VERSION.to_string());
        if let Some(ref token) = self.auth_token {
            req = req.header("Authorization", &format!("Bearer {token}"));
        }
        match req.call() {
            Ok(_) => Ok(()),
            Err(ureq::Error::StatusCode(404)) => Err(RepoError::TmNotFound),
            Err(ureq::Error::StatusCode(code)) => {
                Err(RepoError::Http(format!("HTTP {code} for {url}")))
            }
            Err(e) => Err(RepoError::Http(e.to_string())),
        }
    }

    fn list_query(search: &SearchParams) -> String {
        let mut params = Vec::new();
        if let Some(name) = &search.name {
            if !name.is_empty() {
                params.push(format!("name={}", encode_query_value(name)));
                if search.name_filter == NameFilterType::Prefix {
                    params.push("nameFilter=prefix".to_owned());
                }
            }
        }
        for (key, values) in [
            ("author", &search.author),
            ("manufacturer", &search.manufacturer),
            ("mpn", &search.mpn),
        ] {
            if !values.is_empty() {
                params.push(format!("{key}={}", encode_query_value(&values.join(","))));
            }
        }
        if let Some(query) = &search.query {
            if !query.is_empty() {
                params.push(format!("query={}", encode_query_value(query)));
            }
        }
        if params.is_empty() {
            String::new()
        } else {
            format!("?{}", params.join("&"))
        }
    }
}

impl Repo for HttpRepo {
    fn push(&self, id: &TmId, raw: &[u8]) -> Result<(), RepoError> {
        if raw.is_empty() {
            return Err(RepoError::EmptyContent);
        }
        let url = self.url(&format!("/tms/{id}"));
        let body = self.do_send("PUT", &url, raw, RepoError::TmNotFound)?;
        let response: PushResponse =
            serde_json::from_slice(&body).map_err(|e| RepoError::Http(e.to_string()))?;
        match response.conflict {
            Some(conflict) => Err(conflict.to_conflict()?.into()),
            None => Ok(()),
        }
    }

    fn fetch(&self, id: &str) -> Result<(String, Vec<u8>), RepoError> {
        TmId::parse(id)?;
        let url = self.url(&format!("/tms/{id}"));
        let (headers, body) = self.do_get(&url, RepoError::TmNotFound)?;
        let actual_id = headers
            .get("X-Tmcat-Id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or(id)
            .to_owned();
        Ok((actual_id, body))
    }

    fn delete(&self, id: &str) -> Result<(), RepoError> {
        TmId::parse(id)?;
        self.do_delete(&self.url(&format!("/tms/{id}")))
    }

    fn list(&self, search: &SearchParams) -> Result<SearchResult, RepoError> {
        let url = self.url(&format!("/list{}", Self::list_query(search)));
        let (_, body) = self.do_get(&url, RepoError::EntryNotFound)?;
        let mut result: SearchResult =
            serde_json::from_slice(&body).map_err(|e| RepoError::Http(e.to_string()))?;
        // hits are re-attributed to this repository, not the server's own view
        let source = self.spec.to_found_source();
        for entry in &mut result.entries {
            for version in &mut entry.versions {
                version.found_in = source.clone();
            }
        }
        Ok(result)
    }

    fn versions(&self, name: &str) -> Result<Vec<FoundVersion>, RepoError> {
        let url = self.url(&format!("/versions/{}", name.trim()));
        let (_, body) = self.do_get(&url, RepoError::EntryNotFound)?;
        let mut versions: Vec<FoundVersion> =
            serde_json::from_slice(&body).map_err(|e| RepoError::Http(e.to_string()))?;
        let source = self.spec.to_found_source();
        for version in &mut versions {
            version.found_in = source.clone();
        }
        Ok(versions)
    }

    fn update_index(&self, ids: &[String]) -> Result<(), RepoError> {
        let body = serde_json::to_vec(ids).map_err(|e| RepoError::Http(e.to_string()))?;
        self.do_send(
            "POST",
            &self.url("/index"),
            &body,
            RepoError::TmNotFound,
        )?;
        Ok(())
    }

    fn spec(&self) -> RepoSpec {
        self.spec.clone()
    }

    fn list_completions(
        &self,
        kind: CompletionKind,
        prefix: &str,
    ) -> Result<Vec<String>, RepoError> {
        let url = self.url(&format!(
            "/completions?kind={}&prefix={}",
            kind.as_str(),
            encode_query_value(prefix)
        ));
        let (_, body) = self.do_get(&url, RepoError::EntryNotFound)?;
        let text = String::from_utf8(body).map_err(|e| RepoError::Http(e.to_string()))?;
        Ok(text.lines().map(str::to_owned).filter(|l| !l.is_empty()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let repo = HttpRepo::new("http://example.com/", None, RepoSpec::named("r1"));
        assert_eq!(repo.url("/tms/x"), "http://example.com/tms/x");
    }

    #[test]
    fn list_query_includes_set_filters_only() {
        let query = HttpRepo::list_query(&SearchParams::default());
        assert_eq!(query, "");

        let search = SearchParams {
            name: Some("acme/omnicorp".to_owned()),
            name_filter: NameFilterType::Prefix,
            author: vec!["acme".to_owned()],
            query: Some("smart lamp".to_owned()),
            ..SearchParams::default()
        };
        let query = HttpRepo::list_query(&search);
        assert!(query.starts_with('?'));
        assert!(query.contains("name=acme/omnicorp"));
        assert!(query.contains("nameFilter=prefix"));
        assert!(query.contains("author=acme"));
        assert!(query.contains("query=smart%20lamp"));
    }

    #[test]
    fn conflict_response_roundtrip() {
        let conflict = IdConflict {
            kind: ConflictKind::SameTimestamp,
            existing_id: "a/b/c/v1.0.0-20231205123243-c49617d2e4fc.tm.json".to_owned(),
        };
        let encoded = ConflictResponse::from(&conflict);
        assert_eq!(encoded.kind, "same-timestamp");
        assert_eq!(encoded.to_conflict().unwrap(), conflict);
    }

    #[test]
    fn unknown_conflict_kind_is_an_http_error() {
        let bad = ConflictResponse {
            kind: "sideways".to_owned(),
            existing_id: String::new(),
        };
        assert!(matches!(bad.to_conflict(), Err(RepoError::Http(_))));
    }

    #[test]
    fn unreachable_server_yields_http_error() {
        let repo = HttpRepo::new("http://127.0.0.1:1", None, RepoSpec::named("r1"));
        let err = repo
            .fetch("acme/omnicorp/x1/v1.0.0-20231205123243-c49617d2e4fc.tm.json")
            .unwrap_err();
        assert!(matches!(err, RepoError::Http(_)));
    }
}
