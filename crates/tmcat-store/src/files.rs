use crate::layout::RepoLayout;
use crate::{fsync_dir, StoreError};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tmcat_model::Toc;

/// Write `data` to `path` atomically: temp file in the same directory,
/// fsync, rename over the target, fsync the directory.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let dir = path.parent().ok_or_else(|| {
        StoreError::Io(std::io::Error::other("target path has no parent"))
    })?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    fsync_dir(dir)?;
    Ok(())
}

/// Read and parse the ToC. A missing or unreadable file is
/// [`StoreError::NoToc`]; a present but malformed file is a serialization
/// error. Must be called with the ToC lock held.
pub fn read_toc(layout: &RepoLayout) -> Result<Toc, StoreError> {
    let data = fs::read(layout.toc_file()).map_err(|_| StoreError::NoToc)?;
    Ok(serde_json::from_slice(&data)?)
}

/// Serialize and atomically replace the ToC file. Must be called with the
/// ToC lock held.
pub fn write_toc(layout: &RepoLayout, toc: &Toc) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(toc)?;
    atomic_write(&layout.toc_file(), &json)
}

/// Read the names file; missing or unreadable yields an empty list.
pub fn read_names(layout: &RepoLayout) -> Vec<String> {
    let Ok(content) = fs::read_to_string(layout.names_file()) else {
        return Vec::new();
    };
    content
        .lines()
        .map(str::to_owned)
        .filter(|l| !l.is_empty())
        .collect()
}

/// Sort, deduplicate, and atomically replace the names file. Each name is
/// LF-terminated.
pub fn write_names(layout: &RepoLayout, mut names: Vec<String>) -> Result<(), StoreError> {
    names.sort();
    names.dedup();
    let mut content = names.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    atomic_write(&layout.names_file(), content.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tmcat_model::ThingModel;

    fn test_layout() -> (tempfile::TempDir, RepoLayout) {
        let dir = tempfile::tempdir().unwrap();
        let layout = RepoLayout::new(dir.path());
        fs::create_dir_all(layout.conf_dir()).unwrap();
        (dir, layout)
    }

    #[test]
    fn toc_roundtrip_is_pretty_printed() {
        let (_dir, layout) = test_layout();
        let mut toc = Toc::new();
        toc.insert(&ThingModel {
            id: "acme/omnicorp/x1/v1.0.0-20231205123243-c49617d2e4fc.tm.json".to_owned(),
            ..ThingModel::default()
        })
        .unwrap();
        write_toc(&layout, &toc).unwrap();

        let raw = fs::read_to_string(layout.toc_file()).unwrap();
        assert!(raw.contains("\n  \"data\""), "expected 2-space indent");
        let back = read_toc(&layout).unwrap();
        assert_eq!(back.data, toc.data);
    }

    #[test]
    fn missing_toc_reads_as_no_toc() {
        let (_dir, layout) = test_layout();
        assert!(matches!(read_toc(&layout), Err(StoreError::NoToc)));
    }

    #[test]
    fn malformed_toc_is_a_serialization_error() {
        let (_dir, layout) = test_layout();
        fs::write(layout.toc_file(), b"{ nope").unwrap();
        assert!(matches!(
            read_toc(&layout),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn names_file_is_sorted_unique_lf_terminated() {
        let (_dir, layout) = test_layout();
        write_names(
            &layout,
            vec![
                "b/y/z".to_owned(),
                "a/x/y".to_owned(),
                "b/y/z".to_owned(),
            ],
        )
        .unwrap();
        let raw = fs::read_to_string(layout.names_file()).unwrap();
        assert_eq!(raw, "a/x/y\nb/y/z\n");
        assert_eq!(read_names(&layout), vec!["a/x/y", "b/y/z"]);
    }

    #[test]
    fn empty_names_file_roundtrip() {
        let (_dir, layout) = test_layout();
        write_names(&layout, Vec::new()).unwrap();
        assert_eq!(fs::read_to_string(layout.names_file()).unwrap(), "");
        assert!(read_names(&layout).is_empty());
    }

    #[test]
    fn missing_names_file_reads_empty() {
        let (_dir, layout) = test_layout();
        assert!(read_names(&layout).is_empty());
    }

    #[test]
    fn atomic_write_replaces_existing_content() {
        let (dir, _layout) = test_layout();
        let path = dir.path().join("file.json");
        atomic_write(&path, b"one").unwrap();
        atomic_write(&path, b"two").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"two");
    }
}
