use crate::id::TmId;
use crate::search::SearchParams;
use crate::thing::{SchemaAuthor, SchemaManufacturer, ThingModel, Version, ORIGINAL_LINK_REL};
use crate::ModelError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Relation under which a version record links to its TM file.
pub const TM_LINK_REL: &str = "content";

/// The per-repository table of contents: one entry per TM name, each entry
/// carrying all stored versions of that name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Toc {
    pub meta: TocMeta,
    pub data: Vec<TocEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TocMeta {
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TocEntry {
    pub name: String,
    #[serde(rename = "schema:manufacturer")]
    pub manufacturer: SchemaManufacturer,
    #[serde(rename = "schema:mpn")]
    pub mpn: String,
    #[serde(rename = "schema:author")]
    pub author: SchemaAuthor,
    #[serde(default)]
    pub versions: Vec<TocVersion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TocVersion {
    #[serde(default)]
    pub description: String,
    pub version: Version,
    #[serde(default)]
    pub links: BTreeMap<String, String>,
    #[serde(rename = "tmID")]
    pub tm_id: String,
    pub digest: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub timestamp: String,
    #[serde(rename = "externalID", default)]
    pub external_id: String,
}

impl Default for Toc {
    fn default() -> Self {
        Self::new()
    }
}

impl Toc {
    pub fn new() -> Self {
        Self {
            meta: TocMeta {
                created: Utc::now(),
            },
            data: Vec::new(),
        }
    }

    fn find_by_name_mut(&mut self, name: &str) -> Option<&mut TocEntry> {
        self.data.iter_mut().find(|e| e.name == name)
    }

    /// Add a version record for the given TM, creating the entry for its
    /// name if necessary. Inserting an id already present in the entry
    /// replaces that record in place.
    pub fn insert(&mut self, tm: &ThingModel) -> Result<TmId, ModelError> {
        let id = TmId::parse(&tm.id)?;
        let name = id.name();
        if self.find_by_name_mut(&name).is_none() {
            self.data.push(TocEntry {
                name: name.clone(),
                manufacturer: SchemaManufacturer {
                    name: id.manufacturer.clone(),
                },
                mpn: id.mpn.clone(),
                author: SchemaAuthor {
                    name: id.author.clone(),
                },
                versions: Vec::new(),
            });
        }
        let external_id = tm
            .links
            .find(ORIGINAL_LINK_REL)
            .map(|l| l.href.clone())
            .unwrap_or_default();
        let record = TocVersion {
            description: tm.description.clone(),
            version: Version {
                model: id.version.base_string(),
            },
            links: BTreeMap::from([(TM_LINK_REL.to_owned(), id.to_string())]),
            tm_id: tm.id.clone(),
            digest: id.version.hash.clone(),
            timestamp: id.version.timestamp.clone(),
            external_id,
        };
        let entry = self.find_by_name_mut(&name).expect("entry just ensured");
        match entry.versions.iter_mut().find(|v| v.tm_id == tm.id) {
            Some(existing) => *existing = record,
            None => entry.versions.push(record),
        }
        Ok(id)
    }

    /// Remove the record for `id`. Returns whether anything was removed and,
    /// when the entry lost its last version, the entry name so the caller
    /// can evict it from the names file.
    pub fn delete(&mut self, id: &str) -> Result<(bool, Option<String>), ModelError> {
        let (name, _) = id
            .rsplit_once('/')
            .ok_or_else(|| ModelError::InvalidId(id.to_owned()))?;
        let Some(entry) = self.find_by_name_mut(name) else {
            return Ok((false, None));
        };
        let before = entry.versions.len();
        entry.versions.retain(|v| v.tm_id != id);
        let updated = entry.versions.len() != before;
        if entry.versions.is_empty() {
            self.data.retain(|e| e.name != name);
            return Ok((updated, Some(name.to_owned())));
        }
        Ok((updated, None))
    }

    /// Drop every entry that does not match the search parameters.
    pub fn filter(&mut self, search: &SearchParams) {
        self.data.retain(|entry| search.matches(entry));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::NameFilterType;

    fn tm(id: &str, description: &str) -> ThingModel {
        ThingModel {
            id: id.to_owned(),
            description: description.to_owned(),
            ..ThingModel::default()
        }
    }

    const ID1: &str = "acme/omnicorp/x1/v1.0.0-20231205123243-c49617d2e4fc.tm.json";
    const ID2: &str = "acme/omnicorp/x1/v1.1.0-20231206123243-d49617d2e4fc.tm.json";
    const OTHER: &str = "acme/omnicorp/x2/v1.0.0-20231205123243-c49617d2e4fc.tm.json";

    #[test]
    fn insert_creates_entry_with_identity_from_id() {
        let mut toc = Toc::new();
        let id = toc.insert(&tm(ID1, "a lamp")).unwrap();
        assert_eq!(id.name(), "acme/omnicorp/x1");
        assert_eq!(toc.data.len(), 1);
        let entry = &toc.data[0];
        assert_eq!(entry.author.name, "acme");
        assert_eq!(entry.manufacturer.name, "omnicorp");
        assert_eq!(entry.mpn, "x1");
        assert_eq!(entry.versions.len(), 1);
        let version = &entry.versions[0];
        assert_eq!(version.version.model, "v1.0.0");
        assert_eq!(version.digest, "c49617d2e4fc");
        assert_eq!(version.timestamp, "20231205123243");
        assert_eq!(version.links[TM_LINK_REL], ID1);
    }

    #[test]
    fn insert_groups_versions_under_one_name() {
        let mut toc = Toc::new();
        toc.insert(&tm(ID1, "")).unwrap();
        toc.insert(&tm(ID2, "")).unwrap();
        toc.insert(&tm(OTHER, "")).unwrap();
        assert_eq!(toc.data.len(), 2);
        assert_eq!(toc.data[0].versions.len(), 2);
    }

    #[test]
    fn insert_same_id_is_an_upsert() {
        let mut toc = Toc::new();
        toc.insert(&tm(ID1, "old")).unwrap();
        toc.insert(&tm(ID1, "new")).unwrap();
        assert_eq!(toc.data[0].versions.len(), 1);
        assert_eq!(toc.data[0].versions[0].description, "new");
    }

    #[test]
    fn insert_records_external_id_from_original_link() {
        let mut toc = Toc::new();
        let mut model = tm(ID1, "");
        model.links = serde_json::from_str(
            r#"[{"rel": "original", "href": "http://example/x"}]"#,
        )
        .unwrap();
        toc.insert(&model).unwrap();
        assert_eq!(toc.data[0].versions[0].external_id, "http://example/x");
    }

    #[test]
    fn insert_rejects_invalid_id() {
        let mut toc = Toc::new();
        assert!(toc.insert(&tm("not/an/id", "")).is_err());
    }

    #[test]
    fn delete_removes_version_then_entry() {
        let mut toc = Toc::new();
        toc.insert(&tm(ID1, "")).unwrap();
        toc.insert(&tm(ID2, "")).unwrap();

        let (updated, name) = toc.delete(ID1).unwrap();
        assert!(updated);
        assert_eq!(name, None);
        assert_eq!(toc.data[0].versions.len(), 1);

        let (updated, name) = toc.delete(ID2).unwrap();
        assert!(updated);
        assert_eq!(name.as_deref(), Some("acme/omnicorp/x1"));
        assert!(toc.data.is_empty());
    }

    #[test]
    fn delete_unknown_id_is_a_noop() {
        let mut toc = Toc::new();
        toc.insert(&tm(ID1, "")).unwrap();
        let (updated, name) = toc.delete(OTHER).unwrap();
        assert!(!updated);
        assert_eq!(name, None);
        assert_eq!(toc.data.len(), 1);
    }

    #[test]
    fn insert_then_delete_restores_previous_state() {
        let mut toc = Toc::new();
        toc.insert(&tm(ID1, "")).unwrap();
        let before = toc.clone();
        toc.insert(&tm(ID2, "")).unwrap();
        toc.delete(ID2).unwrap();
        assert_eq!(toc.data, before.data);
    }

    #[test]
    fn filter_is_monotone_and_order_independent() {
        let mut toc = Toc::new();
        toc.insert(&tm(ID1, "smart lamp")).unwrap();
        toc.insert(&tm(OTHER, "dumb toaster")).unwrap();

        let by_name = SearchParams {
            name: Some("acme/omnicorp".to_owned()),
            name_filter: NameFilterType::Prefix,
            ..SearchParams::default()
        };
        let by_query = SearchParams {
            query: Some("lamp".to_owned()),
            ..SearchParams::default()
        };

        let mut a = toc.clone();
        a.filter(&by_name);
        assert_eq!(a.data.len(), 2);
        a.filter(&by_query);

        let mut b = toc.clone();
        b.filter(&by_query);
        b.filter(&by_name);

        assert_eq!(a.data, b.data);
        assert_eq!(a.data.len(), 1);
        assert_eq!(a.data[0].name, "acme/omnicorp/x1");
    }

    #[test]
    fn toc_serializes_with_stable_field_names() {
        let mut toc = Toc::new();
        toc.insert(&tm(ID1, "d")).unwrap();
        let json = serde_json::to_string_pretty(&toc).unwrap();
        assert!(json.contains("\"meta\""));
        assert!(json.contains("\"created\""));
        assert!(json.contains("\"schema:author\""));
        assert!(json.contains("\"schema:manufacturer\""));
        assert!(json.contains("\"schema:mpn\""));
        assert!(json.contains("\"tmID\""));
        assert!(json.contains("\"externalID\""));
        let back: Toc = serde_json::from_str(&json).unwrap();
        assert_eq!(back.data, toc.data);
    }
}
