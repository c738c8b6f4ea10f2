use serde::{Deserialize, Deserializer, Serialize};

/// Relation name of the link recording an external id moved out of `id`.
pub const ORIGINAL_LINK_REL: &str = "original";

/// The catalog-relevant subset of a Thing Model document. Deserialization
/// tolerates and drops everything else.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThingModel {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "schema:author", default)]
    pub author: SchemaAuthor,
    #[serde(rename = "schema:manufacturer", default)]
    pub manufacturer: SchemaManufacturer,
    #[serde(rename = "schema:mpn", default)]
    pub mpn: String,
    #[serde(default)]
    pub version: Version,
    #[serde(default, skip_serializing_if = "Links::is_empty")]
    pub links: Links,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaAuthor {
    #[serde(rename = "schema:name", default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaManufacturer {
    #[serde(rename = "schema:name", default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Version {
    #[serde(default)]
    pub model: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Link {
    #[serde(default)]
    pub rel: String,
    #[serde(default)]
    pub href: String,
}

/// The `links` array of a TM. Deserialization is lenient: a value that is
/// not an array, or array elements that are not link objects, are dropped
/// rather than failing the whole document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Links(pub Vec<Link>);

impl Links {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn find(&self, rel: &str) -> Option<&Link> {
        self.0.iter().find(|l| l.rel == rel)
    }
}

impl<'de> Deserialize<'de> for Links {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::Array(items) => Ok(Links(
                items
                    .into_iter()
                    .filter_map(|item| serde_json::from_value(item).ok())
                    .collect(),
            )),
            serde_json::Value::Null => Ok(Links::default()),
            other => {
                tracing::warn!("unexpected shape of links: {other}");
                Ok(Links::default())
            }
        }
    }
}
