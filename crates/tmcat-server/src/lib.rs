//! Reference HTTP server for the tmcat repository protocol.
//!
//! Exposes a single filesystem repository over the routes consumed by
//! `tmcat_repo::HttpRepo`:
//!
//! - `PUT    /tms/<id>` - store prepared TM bytes; 200 with a push outcome body
//! - `GET    /tms/<id>` - fetch bytes; `X-Tmcat-Id` carries the actual id
//! - `DELETE /tms/<id>` - remove one TM
//! - `GET    /list?name=&nameFilter=&author=&manufacturer=&mpn=&query=`
//! - `GET    /versions/<name>`
//! - `POST   /index` - JSON array of ids, empty array for a full rebuild
//! - `GET    /completions?kind=<names|fetch-names>&prefix=<prefix>`
//! - `GET    /health`
//!
//! The [`TestServer`] helper starts a server on a random port for
//! integration testing.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tiny_http::{Header, Method, Response, Server, StatusCode};
use tmcat_model::{NameFilterType, SearchParams, TmId};
use tmcat_repo::http::{ConflictResponse, PushResponse};
use tmcat_repo::{CompletionKind, FileRepo, Repo, RepoError, RepoSpec};
use tracing::{debug, error, info};

/// Server state: the repository being served plus an optional bearer token.
pub struct ServedRepo {
    repo: FileRepo,
    auth_token: Option<String>,
}

impl ServedRepo {
    pub fn new(root: impl Into<PathBuf>, auth_token: Option<String>) -> Self {
        let root = root.into();
        Self {
            repo: FileRepo::new(root.clone(), RepoSpec::dir(root)),
            auth_token,
        }
    }

    fn authorized(&self, req: &tiny_http::Request) -> bool {
        let Some(expected) = &self.auth_token else {
            return true;
        };
        req.headers().iter().any(|h| {
            h.field.equiv("Authorization") && h.value.as_str() == format!("Bearer {expected}")
        })
    }
}

/// Split a request URL into its path and percent-decoded query pairs.
fn parse_query(url: &str) -> (&str, Vec<(String, String)>) {
    let (path, query) = match url.split_once('?') {
        Some((p, q)) => (p, q),
        None => (url, ""),
    };
    let pairs = query
        .split('&')
        .filter(|kv| !kv.is_empty())
        .filter_map(|kv| {
            let (k, v) = kv.split_once('=')?;
            Some((percent_decode(k), percent_decode(v)))
        })
        .collect();
    (path, pairs)
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = &s[i + 1..i + 3];
                match u8::from_str_radix(hex, 16) {
                    Ok(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    Err(_) => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn search_from_query(pairs: &[(String, String)]) -> SearchParams {
    let mut search = SearchParams::default();
    for (key, value) in pairs {
        match key.as_str() {
            "name" => search.name = Some(value.clone()),
            "nameFilter" if value == "prefix" => {
                search.name_filter = NameFilterType::Prefix;
            }
            "author" => search.author = split_csv(value),
            "manufacturer" => search.manufacturer = split_csv(value),
            "mpn" => search.mpn = split_csv(value),
            "query" => search.query = Some(value.clone()),
            _ => {}
        }
    }
    search
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .collect()
}

fn respond_err(req: tiny_http::Request, code: u16, msg: &str) {
    let _ = req.respond(Response::from_string(msg).with_status_code(StatusCode(code)));
}

fn respond_json(req: tiny_http::Request, json: impl Into<Vec<u8>>) {
    let header = Header::from_bytes("Content-Type", "application/json").expect("valid header");
    let _ = req.respond(Response::from_data(json.into()).with_header(header));
}

fn read_body(req: &mut tiny_http::Request) -> Option<Vec<u8>> {
    let mut body = Vec::new();
    if req.as_reader().read_to_end(&mut body).is_ok() {
        Some(body)
    } else {
        None
    }
}

fn error_code(e: &RepoError) -> u16 {
    match e {
        RepoError::TmNotFound | RepoError::EntryNotFound => 404,
        RepoError::Model(_) | RepoError::InvalidCompletionParams(_) | RepoError::EmptyContent => {
            400
        }
        _ => 500,
    }
}

fn handle_tms(state: &ServedRepo, mut req: tiny_http::Request, method: &Method, id: &str) {
    match *method {
        Method::Put => {
            let parsed = match TmId::parse(id) {
                Ok(parsed) => parsed,
                Err(e) => {
                    respond_err(req, 400, &e.to_string());
                    return;
                }
            };
            let Some(body) = read_body(&mut req) else {
                respond_err(req, 500, "read error");
                return;
            };
            let outcome = match state.repo.push(&parsed, &body) {
                Ok(()) => {
                    if let Err(e) = state.repo.update_index(&[id.to_owned()]) {
                        error!("index update after push of {id} failed: {e}");
                    }
                    info!("PUT /tms/{id}: {} bytes", body.len());
                    PushResponse {
                        id: id.to_owned(),
                        conflict: None,
                    }
                }
                Err(RepoError::Conflict(conflict)) => PushResponse {
                    id: conflict.existing_id.clone(),
                    conflict: Some(ConflictResponse::from(&conflict)),
                },
                Err(e) => {
                    error!("PUT /tms/{id}: {e}");
                    respond_err(req, error_code(&e), &e.to_string());
                    return;
                }
            };
            match serde_json::to_vec(&outcome) {
                Ok(json) => respond_json(req, json),
                Err(e) => respond_err(req, 500, &e.to_string()),
            }
        }
        Method::Get => match state.repo.fetch(id) {
            Ok((actual_id, raw)) => {
                let content =
                    Header::from_bytes("Content-Type", "application/json").expect("valid header");
                let actual =
                    Header::from_bytes("X-Tmcat-Id", actual_id.as_bytes()).expect("valid header");
                let _ = req.respond(
                    Response::from_data(raw).with_header(content).with_header(actual),
                );
            }
            Err(e) => respond_err(req, error_code(&e), &e.to_string()),
        },
        Method::Delete => match state.repo.delete(id) {
            Ok(()) => {
                if let Err(e) = state.repo.update_index(&[id.to_owned()]) {
                    error!("index update after delete of {id} failed: {e}");
                }
                let _ = req.respond(Response::empty(204));
            }
            Err(e) => respond_err(req, error_code(&e), &e.to_string()),
        },
        _ => respond_err(req, 405, "method not allowed"),
    }
}

/// Handle a single HTTP request, dispatching to the appropriate route.
pub fn handle_request(state: &ServedRepo, mut req: tiny_http::Request) {
    let method = req.method().clone();
    let url = req.url().to_owned();
    debug!("{method} {url}");

    if !state.authorized(&req) {
        respond_err(req, 401, "unauthorized");
        return;
    }

    let (path, pairs) = parse_query(&url);
    if let Some(id) = path.strip_prefix("/tms/") {
        let id = percent_decode(id);
        handle_tms(state, req, &method, &id);
    } else if path == "/list" && method == Method::Get {
        match state.repo.list(&search_from_query(&pairs)) {
            Ok(result) => match serde_json::to_vec(&result) {
                Ok(json) => respond_json(req, json),
                Err(e) => respond_err(req, 500, &e.to_string()),
            },
            Err(e) => respond_err(req, error_code(&e), &e.to_string()),
        }
    } else if let Some(name) = path.strip_prefix("/versions/") {
        if method != Method::Get {
            respond_err(req, 405, "method not allowed");
            return;
        }
        match state.repo.versions(&percent_decode(name)) {
            Ok(versions) => match serde_json::to_vec(&versions) {
                Ok(json) => respond_json(req, json),
                Err(e) => respond_err(req, 500, &e.to_string()),
            },
            Err(e) => respond_err(req, error_code(&e), &e.to_string()),
        }
    } else if path == "/index" && method == Method::Post {
        let Some(body) = read_body(&mut req) else {
            respond_err(req, 500, "read error");
            return;
        };
        let ids: Vec<String> = match serde_json::from_slice(&body) {
            Ok(ids) => ids,
            Err(e) => {
                respond_err(req, 400, &format!("invalid id list: {e}"));
                return;
            }
        };
        match state.repo.update_index(&ids) {
            Ok(()) => {
                let _ = req.respond(Response::empty(204));
            }
            Err(e) => respond_err(req, error_code(&e), &e.to_string()),
        }
    } else if path == "/completions" && method == Method::Get {
        let kind = pairs
            .iter()
            .find(|(k, _)| k == "kind")
            .and_then(|(_, v)| CompletionKind::parse(v));
        let prefix = pairs
            .iter()
            .find(|(k, _)| k == "prefix")
            .map(|(_, v)| v.as_str())
            .unwrap_or_default();
        let Some(kind) = kind else {
            respond_err(req, 400, "unknown completion kind");
            return;
        };
        match state.repo.list_completions(kind, prefix) {
            Ok(values) => {
                let mut body = values.join("\n");
                if !body.is_empty() {
                    body.push('\n');
                }
                let header =
                    Header::from_bytes("Content-Type", "text/plain").expect("valid header");
                let _ = req.respond(Response::from_string(body).with_header(header));
            }
            Err(e) => respond_err(req, error_code(&e), &e.to_string()),
        }
    } else if path == "/health" && method == Method::Get {
        let _ = req.respond(Response::from_string(r#"{"status":"ok"}"#));
    } else {
        respond_err(req, 404, "not found");
    }
}

/// Start the server loop, blocking the current thread.
pub fn run_server(state: &Arc<ServedRepo>, addr: &str) {
    let server = Server::http(addr).expect("failed to bind HTTP server");
    info!("serving repository on {addr}");
    for request in server.incoming_requests() {
        handle_request(state, request);
    }
}

/// A test helper that serves a repository on a random port in a background
/// thread. Drop stops accepting via `Server::unblock`.
pub struct TestServer {
    pub url: String,
    pub root: PathBuf,
    server: Arc<Server>,
    _handle: std::thread::JoinHandle<()>,
}

impl TestServer {
    pub fn start(root: PathBuf, auth_token: Option<String>) -> Self {
        let server =
            Arc::new(Server::http("127.0.0.1:0").expect("failed to bind test HTTP server"));
        let port = server.server_addr().to_ip().expect("not an IP addr").port();
        let url = format!("http://127.0.0.1:{port}");

        let state = Arc::new(ServedRepo::new(root.clone(), auth_token));
        let srv = Arc::clone(&server);
        let handle = std::thread::spawn(move || {
            for request in srv.incoming_requests() {
                handle_request(&state, request);
            }
        });

        Self {
            url,
            root,
            server,
            _handle: handle,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.unblock();
    }
}
