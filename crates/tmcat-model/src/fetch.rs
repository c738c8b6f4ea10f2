use crate::id::sanitize_name;
use crate::version::SemverMask;
use crate::ModelError;
use std::fmt;

/// A `NAME[:SEMVER]` reference as accepted by fetch-by-name. The semver part
/// may be partial (`1`, `1.2`) or absent (latest overall).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchName {
    pub name: String,
    pub semver: String,
}

impl FetchName {
    pub fn parse(s: &str) -> Result<Self, ModelError> {
        let invalid = || ModelError::InvalidFetchName(s.to_owned());
        let (name, semver) = match s.split_once(':') {
            Some((n, v)) => (n, v),
            None => (s, ""),
        };
        let segments: Vec<&str> = name.split('/').collect();
        if segments.len() < 2 {
            return Err(invalid());
        }
        for seg in &segments {
            if seg.is_empty() || *seg != sanitize_name(seg) {
                return Err(invalid());
            }
        }
        if SemverMask::parse(semver).is_err() {
            return Err(invalid());
        }
        Ok(Self {
            name: name.to_owned(),
            semver: semver.to_owned(),
        })
    }
}

impl fmt::Display for FetchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.semver.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}:{}", self.name, self.semver)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_with_and_without_semver() {
        let cases = [
            ("manu-facturer/mpn", "manu-facturer/mpn", ""),
            ("manufacturer/mpn:1.2.3", "manufacturer/mpn", "1.2.3"),
            ("manufacturer/mpn:1.2", "manufacturer/mpn", "1.2"),
            ("manufacturer/mpn:v1.2.3", "manufacturer/mpn", "v1.2.3"),
            ("author/manufacturer/mpn:1.2.3", "author/manufacturer/mpn", "1.2.3"),
            (
                "author/manufacturer/mpn/folder/structure:v1.2.3-alpha1",
                "author/manufacturer/mpn/folder/structure",
                "v1.2.3-alpha1",
            ),
        ];
        for (input, name, semver) in cases {
            let parsed = FetchName::parse(input).unwrap();
            assert_eq!(parsed.name, name, "{input}");
            assert_eq!(parsed.semver, semver, "{input}");
        }
    }

    #[test]
    fn rejects_invalid_references() {
        for input in [
            "",
            "manufacturer",
            "manufacturer\\mpn",
            "manufacturer/mpn:1.2.",
            "manufacturer/mpn:43748209adcb",
            "Manufacturer/mpn",
            "manufacturer//mpn",
        ] {
            let err = FetchName::parse(input).unwrap_err();
            assert!(
                matches!(err, ModelError::InvalidFetchName(_)),
                "{input}: {err}"
            );
        }
    }

    #[test]
    fn display_roundtrips() {
        for input in ["manufacturer/mpn", "manufacturer/mpn:1.2"] {
            assert_eq!(FetchName::parse(input).unwrap().to_string(), input);
        }
    }
}
