use crate::spec::RepoSpec;
use crate::{CompletionKind, ConflictKind, IdConflict, Repo, RepoError};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tmcat_model::{
    FoundVersion, SearchParams, SearchResult, ThingModel, TmId, TmVersion, Toc, TM_FILE_EXT,
};
use tmcat_store::{
    atomic_write, read_names, read_toc, write_names, write_toc, RepoLayout, TocLock,
};
use tracing::{debug, info, warn};

/// A TM repository backed by a directory tree.
///
/// TM files live at `<root>/<id>`; the index and names file live under
/// `<root>/.tmc/`, guarded by the cross-process ToC lock.
pub struct FileRepo {
    layout: RepoLayout,
    spec: RepoSpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdMatch {
    None,
    Full,
    Digest,
    Timestamp,
}

impl FileRepo {
    pub fn new(root: impl Into<PathBuf>, spec: RepoSpec) -> Self {
        Self {
            layout: RepoLayout::new(root),
            spec,
        }
    }

    pub fn layout(&self) -> &RepoLayout {
        &self.layout
    }

    /// Inspect the destination directory for content colliding with `id`.
    ///
    /// An exact file match is `Full`. Otherwise siblings with the same base
    /// version are compared: same digest anywhere wins over a timestamp
    /// clash.
    fn existing_id(&self, id: &str) -> (IdMatch, String) {
        let full_path = self.layout.tm_path(id);
        if full_path.is_file() {
            return (IdMatch::Full, id.to_owned());
        }
        let Some(dir) = full_path.parent() else {
            return (IdMatch::None, String::new());
        };
        let Some((name, filename)) = id.rsplit_once('/') else {
            return (IdMatch::None, String::new());
        };
        let Some(stem) = filename.strip_suffix(TM_FILE_EXT) else {
            return (IdMatch::None, String::new());
        };
        let Ok(version) = TmVersion::parse(stem) else {
            warn!("invalid TM version in id {id}");
            return (IdMatch::None, String::new());
        };
        let siblings = sibling_versions(dir, &version);
        let rebuild = |v: &TmVersion| format!("{name}/{v}{TM_FILE_EXT}");
        if let Some(same_digest) = siblings.iter().find(|v| v.hash == version.hash) {
            return (IdMatch::Digest, rebuild(same_digest));
        }
        if let Some(same_ts) = siblings.iter().find(|v| v.timestamp == version.timestamp) {
            return (IdMatch::Timestamp, rebuild(same_ts));
        }
        (IdMatch::None, String::new())
    }

    fn update_index_locked(&self, ids: &[String]) -> Result<(), RepoError> {
        let _lock = TocLock::acquire(&self.layout)?;
        let mut names: Vec<String>;
        let mut toc: Toc;

        if ids.is_empty() {
            toc = Toc::new();
            names = Vec::new();
            let mut count = 0usize;
            for entry in walkdir::WalkDir::new(self.layout.root())
                .into_iter()
                .filter_map(Result::ok)
            {
                if !entry.file_type().is_file() {
                    continue;
                }
                if let Some(name) = insert_file(&mut toc, entry.path()) {
                    names.push(name);
                    count += 1;
                }
            }
            info!("rebuilt index with {count} files");
        } else {
            toc = match read_toc(&self.layout) {
                Ok(existing) => existing,
                Err(e) => {
                    warn!("could not read existing ToC, starting fresh: {e}");
                    Toc::new()
                }
            };
            names = read_names(&self.layout);
            for id in ids {
                let path = self.layout.tm_path(id);
                if path.is_file() {
                    if let Some(name) = insert_file(&mut toc, &path) {
                        names.push(name);
                    }
                } else {
                    let (_, deleted_name) = toc.delete(id)?;
                    if let Some(deleted) = deleted_name {
                        names.retain(|n| *n != deleted);
                    }
                }
            }
        }

        write_toc(&self.layout, &toc)?;
        write_names(&self.layout, names)?;
        Ok(())
    }
}

/// Parse every TM filename in `dir` and keep those sharing the base version,
/// most recent first.
fn sibling_versions(dir: &Path, version: &TmVersion) -> Vec<TmVersion> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let base = version.base_string();
    let mut versions: Vec<TmVersion> = entries
        .filter_map(Result::ok)
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|e| {
            let name = e.file_name();
            let stem = name.to_str()?.strip_suffix(TM_FILE_EXT)?;
            TmVersion::parse(stem).ok()
        })
        .filter(|v| v.base_string() == base)
        .collect();
    versions.sort_by(|a, b| b.to_string().cmp(&a.to_string()));
    versions
}

/// Parse the TM at `path` and insert it into the ToC. Returns the TM name,
/// or `None` (with a log line) when the file cannot be indexed.
fn insert_file(toc: &mut Toc, path: &Path) -> Option<String> {
    if !path.to_string_lossy().ends_with(TM_FILE_EXT) {
        return None;
    }
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("failed to read {}: {e}", path.display());
            return None;
        }
    };
    let tm: ThingModel = match serde_json::from_slice(&raw) {
        Ok(tm) => tm,
        Err(e) => {
            warn!(
                "failed to extract metadata from {}, excluding from index: {e}",
                path.display()
            );
            return None;
        }
    };
    match toc.insert(&tm) {
        Ok(id) => Some(id.name()),
        Err(e) => {
            warn!(
                "failed to insert {} into index, excluding: {e}",
                path.display()
            );
            None
        }
    }
}

/// Remove now-empty directories from `from` up to (not including) `up_to`.
fn remove_empty_dirs(from: &Path, up_to: &Path) {
    let mut current = from.to_path_buf();
    while current.starts_with(up_to) && current != up_to {
        match fs::read_dir(&current) {
            Ok(mut entries) => {
                if entries.next().is_some() {
                    break;
                }
                if fs::remove_dir(&current).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }
}

impl Repo for FileRepo {
    fn push(&self, id: &TmId, raw: &[u8]) -> Result<(), RepoError> {
        if raw.is_empty() {
            return Err(RepoError::EmptyContent);
        }
        let id_str = id.to_string();
        let full_path = self.layout.tm_path(&id_str);
        let dir = full_path
            .parent()
            .ok_or_else(|| RepoError::InvalidSpec("id has no directory".to_owned()))?;
        fs::create_dir_all(dir)?;

        match self.existing_id(&id_str) {
            (IdMatch::Full | IdMatch::Digest, existing_id) => {
                info!("same TM content already exists under id {existing_id}");
                return Err(IdConflict {
                    kind: ConflictKind::SameContent,
                    existing_id,
                }
                .into());
            }
            (IdMatch::Timestamp, existing_id) => {
                info!("version and timestamp clash with existing {existing_id}");
                return Err(IdConflict {
                    kind: ConflictKind::SameTimestamp,
                    existing_id,
                }
                .into());
            }
            (IdMatch::None, _) => {}
        }

        atomic_write(&full_path, raw)?;
        info!("saved Thing Model file {}", full_path.display());
        Ok(())
    }

    fn fetch(&self, id: &str) -> Result<(String, Vec<u8>), RepoError> {
        self.layout.check_root_valid()?;
        TmId::parse(id)?;
        let (matched, actual_id) = self.existing_id(id);
        if !matches!(matched, IdMatch::Full | IdMatch::Digest) {
            return Err(RepoError::TmNotFound);
        }
        let raw = fs::read(self.layout.tm_path(&actual_id))?;
        Ok((actual_id, raw))
    }

    fn delete(&self, id: &str) -> Result<(), RepoError> {
        self.layout.check_root_valid()?;
        TmId::parse(id)?;
        let (matched, _) = self.existing_id(id);
        if matched != IdMatch::Full {
            return Err(RepoError::TmNotFound);
        }
        let path = self.layout.tm_path(id);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RepoError::TmNotFound)
            }
            Err(e) => return Err(e.into()),
        }
        if let Some(dir) = path.parent() {
            remove_empty_dirs(dir, self.layout.root());
        }
        Ok(())
    }

    fn list(&self, search: &SearchParams) -> Result<SearchResult, RepoError> {
        debug!("listing {} with filter {search:?}", self.spec);
        self.layout.check_root_valid()?;
        let _lock = TocLock::acquire(&self.layout)?;
        let mut toc = read_toc(&self.layout)?;
        toc.filter(search);
        Ok(SearchResult::from_toc(toc, &self.spec.to_found_source()))
    }

    fn versions(&self, name: &str) -> Result<Vec<FoundVersion>, RepoError> {
        let name = name.trim();
        let mut result = self.list(&SearchParams::by_name(name))?;
        if result.entries.len() != 1 {
            debug!("no versions of {name} found in {}", self.spec);
            return Err(RepoError::EntryNotFound);
        }
        Ok(result.entries.remove(0).versions)
    }

    fn update_index(&self, ids: &[String]) -> Result<(), RepoError> {
        self.layout.check_root_valid()?;
        self.update_index_locked(ids)
    }

    fn spec(&self) -> RepoSpec {
        self.spec.clone()
    }

    fn list_completions(
        &self,
        kind: CompletionKind,
        prefix: &str,
    ) -> Result<Vec<String>, RepoError> {
        match kind {
            CompletionKind::Names => {
                let _lock = TocLock::acquire(&self.layout)?;
                Ok(read_names(&self.layout))
            }
            CompletionKind::FetchNames => {
                if prefix.contains("..") {
                    return Err(RepoError::InvalidCompletionParams(
                        "no completions for names containing '..'".to_owned(),
                    ));
                }
                let name = prefix.split(':').next().unwrap_or_default();
                let dir = self.layout.root().join(name);
                let mut bases = BTreeSet::new();
                for entry in fs::read_dir(dir)?.filter_map(Result::ok) {
                    if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                        continue;
                    }
                    let filename = entry.file_name();
                    let Some(stem) = filename
                        .to_str()
                        .and_then(|n| n.strip_suffix(TM_FILE_EXT))
                    else {
                        continue;
                    };
                    if let Ok(version) = TmVersion::parse(stem) {
                        bases.insert(version.base_string());
                    }
                }
                Ok(bases
                    .into_iter()
                    .map(|base| format!("{name}:{base}"))
                    .collect())
            }
        }
    }
}
