use crate::version::TmVersion;
use crate::ModelError;
use std::fmt;

/// File extension of every stored Thing Model.
pub const TM_FILE_EXT: &str = ".tm.json";

/// Maximum length of a TM name (the id minus its filename).
pub const MAX_NAME_LENGTH: usize = 255;

/// Sanitize a single path segment: trim whitespace, map everything outside
/// `[A-Za-z0-9._-]` to `-`, collapse runs of `-`, trim leading/trailing `-`,
/// and lowercase.
pub fn sanitize_name(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_dash = false;
    for c in s.trim().chars() {
        let mapped = if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            c.to_ascii_lowercase()
        } else {
            '-'
        };
        if mapped == '-' {
            if prev_dash {
                continue;
            }
            prev_dash = true;
        } else {
            prev_dash = false;
        }
        out.push(mapped);
    }
    out.trim_matches('-').to_owned()
}

/// Sanitize a caller-supplied optional path: normalize separators, resolve
/// `.`/`..` segments, then sanitize each remaining segment.
pub fn sanitize_path(p: &str) -> String {
    let normalized = p.replace('\\', "/");
    let mut parts: Vec<String> = Vec::new();
    for seg in normalized.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => {
                let clean = sanitize_name(other);
                if !clean.is_empty() {
                    parts.push(clean);
                }
            }
        }
    }
    parts.join("/")
}

/// Content-derived identifier of a stored Thing Model.
///
/// String form: `author/manufacturer/mpn[/optional/path]/v<semver>-<ts>-<digest>.tm.json`.
/// All path segments are sanitized; parsing rejects ids whose segments do not
/// round-trip through [`sanitize_name`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmId {
    pub author: String,
    pub manufacturer: String,
    pub mpn: String,
    /// Zero or more extra segments joined with `/`, empty when absent.
    pub opt_path: String,
    pub version: TmVersion,
}

impl TmId {
    pub fn new(
        author: &str,
        manufacturer: &str,
        mpn: &str,
        opt_path: &str,
        version: TmVersion,
    ) -> Self {
        Self {
            author: sanitize_name(author),
            manufacturer: sanitize_name(manufacturer),
            mpn: sanitize_name(mpn),
            opt_path: opt_path.to_owned(),
            version,
        }
    }

    /// The id with the filename stripped; groups all versions of one product.
    pub fn name(&self) -> String {
        let mut name = format!("{}/{}/{}", self.author, self.manufacturer, self.mpn);
        if !self.opt_path.is_empty() {
            name.push('/');
            name.push_str(&self.opt_path);
        }
        name
    }

    /// Whether two ids name the same content: equal name, base version, and
    /// digest. The timestamp is deliberately disregarded, so a preserved id
    /// survives a re-push of unchanged bytes.
    pub fn same_content(&self, other: &TmId) -> bool {
        self.name() == other.name()
            && self.version.base == other.version.base
            && self.version.hash == other.version.hash
    }

    pub fn parse(s: &str) -> Result<Self, ModelError> {
        let invalid = || ModelError::InvalidId(s.to_owned());
        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() < 4 {
            return Err(invalid());
        }
        let filename = parts[parts.len() - 1];
        let stem = filename.strip_suffix(TM_FILE_EXT).ok_or_else(invalid)?;
        let version = TmVersion::parse(stem).map_err(|_| invalid())?;
        if version.timestamp.is_empty() || version.hash.is_empty() {
            return Err(invalid());
        }
        for seg in &parts[..parts.len() - 1] {
            if seg.is_empty() || *seg != sanitize_name(seg) {
                return Err(invalid());
            }
        }
        Ok(Self {
            author: parts[0].to_owned(),
            manufacturer: parts[1].to_owned(),
            mpn: parts[2].to_owned(),
            opt_path: parts[3..parts.len() - 1].join("/"),
            version,
        })
    }
}

impl fmt::Display for TmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}{}", self.name(), self.version, TM_FILE_EXT)
    }
}
