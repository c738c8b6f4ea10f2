use crate::ModelError;
use semver::{Prerelease, Version};
use std::fmt;

/// `chrono` format string for the pseudo-version timestamp (UTC).
pub const PSEUDO_VERSION_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

const TIMESTAMP_LEN: usize = 14;
const HASH_LEN: usize = 12;

/// The pseudo-version embedded in a TM filename: base semver, UTC timestamp,
/// and the first 12 hex digits of the content digest.
///
/// `timestamp` and `hash` are empty on a version freshly parsed from a TM's
/// `version.model`; they are filled in by the push pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmVersion {
    pub base: Version,
    pub timestamp: String,
    pub hash: String,
}

impl TmVersion {
    /// Parse `v<semver>-<14-digit timestamp>-<12 hex digits>`.
    pub fn parse(s: &str) -> Result<Self, ModelError> {
        let invalid = || ModelError::InvalidVersion(s.to_owned());
        let rest = s.strip_prefix('v').ok_or_else(invalid)?;
        let (front, hash) = rest.rsplit_once('-').ok_or_else(invalid)?;
        let (base_str, timestamp) = front.rsplit_once('-').ok_or_else(invalid)?;
        if timestamp.len() != TIMESTAMP_LEN || !timestamp.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if hash.len() != HASH_LEN
            || !hash
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(invalid());
        }
        if base_str.contains('+') {
            return Err(invalid());
        }
        let base = Version::parse(base_str).map_err(|_| invalid())?;
        Ok(Self {
            base,
            timestamp: timestamp.to_owned(),
            hash: hash.to_owned(),
        })
    }

    /// Build a version from a TM's `version.model` field. The value may be
    /// partial (`"1"`, `"1.2"`) or empty; missing parts default to zero.
    pub fn from_original(model: &str) -> Result<Self, ModelError> {
        Ok(Self {
            base: parse_loose_semver(model)?,
            timestamp: String::new(),
            hash: String::new(),
        })
    }

    /// The base semver with the canonical `v` prefix, e.g. `v1.2.3-alpha1`.
    pub fn base_string(&self) -> String {
        format!("v{}", self.base)
    }
}

impl fmt::Display for TmVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}-{}-{}", self.base, self.timestamp, self.hash)
    }
}

/// Parse a possibly-partial semver into a full [`Version`], completing missing
/// minor/patch with zero. The `v` prefix is optional; an empty string yields
/// `0.0.0`.
pub fn parse_loose_semver(s: &str) -> Result<Version, ModelError> {
    let invalid = || ModelError::InvalidVersion(s.to_owned());
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Ok(Version::new(0, 0, 0));
    }
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Err(invalid());
    }
    let (numeric, pre) = match trimmed.split_once('-') {
        Some((n, p)) => (n, Some(p)),
        None => (trimmed, None),
    };
    let parts: Vec<&str> = numeric.split('.').collect();
    if parts.is_empty() || parts.len() > 3 {
        return Err(invalid());
    }
    let mut nums = [0u64; 3];
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        nums[i] = part.parse().map_err(|_| invalid())?;
    }
    let mut version = Version::new(nums[0], nums[1], nums[2]);
    if let Some(pre) = pre {
        version.pre = Prerelease::new(pre).map_err(|_| invalid())?;
    }
    Ok(version)
}

/// A full or partial semver pattern as accepted by fetch-by-name:
/// `1`, `1.2`, `1.2.3`, `1.2.3-pre`, each with an optional `v` prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemverMask {
    major: u64,
    minor: Option<u64>,
    patch: Option<u64>,
    pre: Option<Prerelease>,
}

impl SemverMask {
    /// Parse a pattern. An empty string means "no constraint" and yields
    /// `Ok(None)`; anything else either parses or is an invalid version.
    pub fn parse(s: &str) -> Result<Option<Self>, ModelError> {
        let invalid = || ModelError::InvalidVersion(s.to_owned());
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let (numeric, pre) = match trimmed.split_once('-') {
            Some((n, p)) => (n, Some(p)),
            None => (trimmed, None),
        };
        let parts: Vec<&str> = numeric.split('.').collect();
        if parts.is_empty() || parts.len() > 3 {
            return Err(invalid());
        }
        if pre.is_some() && parts.len() != 3 {
            return Err(invalid());
        }
        let mut nums = Vec::with_capacity(3);
        for part in &parts {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            nums.push(part.parse::<u64>().map_err(|_| invalid())?);
        }
        let pre = match pre {
            Some(p) => Some(Prerelease::new(p).map_err(|_| invalid())?),
            None => None,
        };
        Ok(Some(Self {
            major: nums[0],
            minor: nums.get(1).copied(),
            patch: nums.get(2).copied(),
            pre,
        }))
    }

    /// Whether a concrete base version falls within this pattern. A pattern
    /// that pins the patch level matches releases only, unless it names a
    /// prerelease explicitly.
    pub fn matches(&self, v: &Version) -> bool {
        if v.major != self.major {
            return false;
        }
        if let Some(minor) = self.minor {
            if v.minor != minor {
                return false;
            }
        }
        if let Some(patch) = self.patch {
            if v.patch != patch {
                return false;
            }
            return match &self.pre {
                Some(pre) => v.pre == *pre,
                None => v.pre.is_empty(),
            };
        }
        true
    }
}
