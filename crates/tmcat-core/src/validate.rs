use crate::CoreError;
use tmcat_model::{parse_loose_semver, sanitize_name, ThingModel};

/// Parse raw bytes as a Thing Model and check the fields the catalog
/// depends on: the document must be a JSON object, the author,
/// manufacturer, and mpn must survive sanitization non-empty, and
/// `version.model` must be a (possibly partial) semver when present.
pub fn validate_thing_model(raw: &[u8]) -> Result<ThingModel, CoreError> {
    let value: serde_json::Value = serde_json::from_slice(raw)
        .map_err(|e| CoreError::Validation(format!("not valid JSON: {e}")))?;
    if !value.is_object() {
        return Err(CoreError::Validation(
            "document is not a JSON object".to_owned(),
        ));
    }
    let tm: ThingModel = serde_json::from_value(value)
        .map_err(|e| CoreError::Validation(e.to_string()))?;

    for (field, value) in [
        ("schema:author.schema:name", &tm.author.name),
        ("schema:manufacturer.schema:name", &tm.manufacturer.name),
        ("schema:mpn", &tm.mpn),
    ] {
        if sanitize_name(value).is_empty() {
            return Err(CoreError::Validation(format!(
                "mandatory field {field} is missing or empty"
            )));
        }
    }
    if parse_loose_semver(&tm.version.model).is_err() {
        return Err(CoreError::Validation(format!(
            "version.model is not a valid semantic version: {}",
            tm.version.model
        )));
    }
    Ok(tm)
}
