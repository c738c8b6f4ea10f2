//! Byte-preserving edits on JSON documents.
//!
//! The content digest is defined over the original TM bytes with only the
//! `id` value replaced, so edits must leave key order, whitespace, and every
//! untouched value byte-for-byte intact. This module implements a minimal
//! scanner that locates a member's value span inside an object and splices a
//! replacement in, inserting the member before the object's closing brace
//! when it is absent.

use crate::ModelError;
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Object,
    Array,
    String,
    Number,
    Bool,
    Null,
}

/// Locate the value of the member reached by `path` from the document root.
/// Returns `None` when any path component is missing or an intermediate
/// value is not an object.
pub fn get(buf: &[u8], path: &[&str]) -> Result<Option<(Range<usize>, ValueKind)>, ModelError> {
    let mut span = root_object(buf)?;
    let mut kind = ValueKind::Object;
    for key in path {
        if kind != ValueKind::Object {
            return Ok(None);
        }
        match find_member(buf, span.clone(), key)? {
            Some(member) => {
                span = member.value;
                kind = member.kind;
            }
            None => return Ok(None),
        }
    }
    Ok(Some((span, kind)))
}

/// Fetch a member as a decoded string; `None` when absent or not a string.
pub fn get_string(buf: &[u8], path: &[&str]) -> Result<Option<String>, ModelError> {
    match get(buf, path)? {
        Some((span, ValueKind::String)) => Ok(Some(decode_string(&buf[span])?)),
        _ => Ok(None),
    }
}

/// Replace the value at `path` with `value` (raw JSON bytes), returning the
/// edited document. Missing members are inserted at the end of the innermost
/// existing object, nested objects being created as needed.
pub fn set_raw(buf: &[u8], path: &[&str], value: &[u8]) -> Result<Vec<u8>, ModelError> {
    assert!(!path.is_empty());
    let root = root_object(buf)?;
    set_in(buf, root, path, value)
}

/// Replace the value at `path` with a JSON string.
pub fn set_string(buf: &[u8], path: &[&str], value: &str) -> Result<Vec<u8>, ModelError> {
    let encoded = serde_json::to_vec(value).map_err(|e| ModelError::Json(e.to_string()))?;
    set_raw(buf, path, &encoded)
}

/// Splice `value` over `span` in `buf`.
pub fn splice(buf: &[u8], span: Range<usize>, value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(buf.len() - span.len() + value.len());
    out.extend_from_slice(&buf[..span.start]);
    out.extend_from_slice(value);
    out.extend_from_slice(&buf[span.end..]);
    out
}

pub fn decode_string(raw: &[u8]) -> Result<String, ModelError> {
    serde_json::from_slice(raw).map_err(|e| ModelError::Json(e.to_string()))
}

struct Member {
    value: Range<usize>,
    kind: ValueKind,
}

fn set_in(
    buf: &[u8],
    obj: Range<usize>,
    path: &[&str],
    value: &[u8],
) -> Result<Vec<u8>, ModelError> {
    let (key, rest) = path.split_first().expect("non-empty path");
    match find_member(buf, obj.clone(), key)? {
        Some(member) => {
            if rest.is_empty() {
                Ok(splice(buf, member.value, value))
            } else if member.kind == ValueKind::Object {
                set_in(buf, member.value, rest, value)
            } else {
                Err(ModelError::Json(format!(
                    "member '{key}' is not an object"
                )))
            }
        }
        None => {
            let mut literal = value.to_vec();
            for k in rest.iter().rev() {
                let mut wrapped = Vec::with_capacity(literal.len() + k.len() + 5);
                wrapped.push(b'{');
                wrapped.extend_from_slice(encode_key(k)?.as_bytes());
                wrapped.push(b':');
                wrapped.extend_from_slice(&literal);
                wrapped.push(b'}');
                literal = wrapped;
            }
            let mut member = Vec::with_capacity(literal.len() + key.len() + 4);
            member.extend_from_slice(encode_key(key)?.as_bytes());
            member.push(b':');
            member.extend_from_slice(&literal);
            insert_member(buf, obj, &member)
        }
    }
}

fn encode_key(key: &str) -> Result<String, ModelError> {
    serde_json::to_string(key).map_err(|e| ModelError::Json(e.to_string()))
}

fn insert_member(buf: &[u8], obj: Range<usize>, member: &[u8]) -> Result<Vec<u8>, ModelError> {
    let mut s = Scanner::new(buf, obj.start);
    s.expect(b'{')?;
    s.skip_ws();
    let empty = s.peek() == Some(b'}');
    let pos = obj.end - 1;
    let mut out = Vec::with_capacity(buf.len() + member.len() + 1);
    out.extend_from_slice(&buf[..pos]);
    if !empty {
        out.push(b',');
    }
    out.extend_from_slice(member);
    out.extend_from_slice(&buf[pos..]);
    Ok(out)
}

fn root_object(buf: &[u8]) -> Result<Range<usize>, ModelError> {
    let mut s = Scanner::new(buf, 0);
    let (span, kind) = s.scan_value()?;
    if kind != ValueKind::Object {
        return Err(ModelError::Json("document is not an object".to_owned()));
    }
    Ok(span)
}

fn find_member(buf: &[u8], obj: Range<usize>, key: &str) -> Result<Option<Member>, ModelError> {
    let mut s = Scanner::new(&buf[..obj.end], obj.start);
    s.expect(b'{')?;
    s.skip_ws();
    if s.peek() == Some(b'}') {
        return Ok(None);
    }
    loop {
        let key_span = s.scan_string()?;
        s.skip_ws();
        s.expect(b':')?;
        let (value, kind) = s.scan_value()?;
        if key_matches(&buf[key_span], key)? {
            return Ok(Some(Member { value, kind }));
        }
        s.skip_ws();
        match s.peek() {
            Some(b',') => {
                s.advance();
                s.skip_ws();
            }
            Some(b'}') | None => return Ok(None),
            Some(other) => {
                return Err(ModelError::Json(format!(
                    "unexpected byte 0x{other:02x} in object"
                )))
            }
        }
    }
}

fn key_matches(raw: &[u8], key: &str) -> Result<bool, ModelError> {
    let inner = &raw[1..raw.len() - 1];
    if !inner.contains(&b'\\') {
        return Ok(inner == key.as_bytes());
    }
    Ok(decode_string(raw)? == key)
}

struct Scanner<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.advance();
        }
    }

    fn expect(&mut self, b: u8) -> Result<(), ModelError> {
        self.skip_ws();
        if self.peek() == Some(b) {
            self.advance();
            Ok(())
        } else {
            Err(ModelError::Json(format!(
                "expected '{}' at offset {}",
                b as char, self.pos
            )))
        }
    }

    /// Scan a string starting at the opening quote; the returned span
    /// includes both quotes.
    fn scan_string(&mut self) -> Result<Range<usize>, ModelError> {
        self.skip_ws();
        let start = self.pos;
        if self.peek() != Some(b'"') {
            return Err(ModelError::Json(format!(
                "expected string at offset {start}"
            )));
        }
        self.advance();
        loop {
            match self.peek() {
                Some(b'\\') => {
                    self.advance();
                    self.advance();
                }
                Some(b'"') => {
                    self.advance();
                    return Ok(start..self.pos);
                }
                Some(_) => self.advance(),
                None => {
                    return Err(ModelError::Json("unterminated string".to_owned()));
                }
            }
        }
    }

    fn scan_value(&mut self) -> Result<(Range<usize>, ValueKind), ModelError> {
        self.skip_ws();
        let start = self.pos;
        match self.peek() {
            Some(b'"') => Ok((self.scan_string()?, ValueKind::String)),
            Some(b'{') => Ok((self.scan_container(b'{', b'}')?, ValueKind::Object)),
            Some(b'[') => Ok((self.scan_container(b'[', b']')?, ValueKind::Array)),
            Some(b't' | b'f') => {
                self.scan_bare();
                Ok((start..self.pos, ValueKind::Bool))
            }
            Some(b'n') => {
                self.scan_bare();
                Ok((start..self.pos, ValueKind::Null))
            }
            Some(b) if b == b'-' || b.is_ascii_digit() => {
                self.scan_bare();
                Ok((start..self.pos, ValueKind::Number))
            }
            _ => Err(ModelError::Json(format!(
                "expected value at offset {start}"
            ))),
        }
    }

    fn scan_container(&mut self, open: u8, close: u8) -> Result<Range<usize>, ModelError> {
        let start = self.pos;
        let mut depth = 0usize;
        loop {
            match self.peek() {
                Some(b'"') => {
                    self.scan_string()?;
                }
                Some(b) if b == open => {
                    depth += 1;
                    self.advance();
                }
                Some(b) if b == close => {
                    depth -= 1;
                    self.advance();
                    if depth == 0 {
                        return Ok(start..self.pos);
                    }
                }
                Some(_) => self.advance(),
                None => {
                    return Err(ModelError::Json("unterminated container".to_owned()));
                }
            }
        }
    }

    /// Consume a bare token (number or literal) up to the next delimiter.
    fn scan_bare(&mut self) {
        while let Some(b) = self.peek() {
            if matches!(b, b',' | b'}' | b']' | b' ' | b'\t' | b'\n' | b'\r') {
                break;
            }
            self.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &[u8] = br#"{
  "id": "old-id",
  "schema:author": {"schema:name": "ACME Corp"},
  "nested": {"a": [1, {"x": "}"}], "b": "quote \" brace }"},
  "flag": true,
  "count": 42
}"#;

    #[test]
    fn get_top_level_string() {
        assert_eq!(
            get_string(DOC, &["id"]).unwrap(),
            Some("old-id".to_owned())
        );
    }

    #[test]
    fn get_nested_string() {
        assert_eq!(
            get_string(DOC, &["schema:author", "schema:name"]).unwrap(),
            Some("ACME Corp".to_owned())
        );
    }

    #[test]
    fn get_reports_kind() {
        let (_, kind) = get(DOC, &["flag"]).unwrap().unwrap();
        assert_eq!(kind, ValueKind::Bool);
        let (_, kind) = get(DOC, &["count"]).unwrap().unwrap();
        assert_eq!(kind, ValueKind::Number);
        let (_, kind) = get(DOC, &["nested", "a"]).unwrap().unwrap();
        assert_eq!(kind, ValueKind::Array);
        assert!(get(DOC, &["missing"]).unwrap().is_none());
        assert!(get(DOC, &["flag", "sub"]).unwrap().is_none());
    }

    #[test]
    fn containers_with_tricky_strings_are_scanned() {
        assert_eq!(
            get_string(DOC, &["nested", "b"]).unwrap(),
            Some("quote \" brace }".to_owned())
        );
    }

    #[test]
    fn set_replaces_value_preserving_everything_else() {
        let out = set_string(DOC, &["id"], "").unwrap();
        let expected = String::from_utf8(DOC.to_vec())
            .unwrap()
            .replace("\"old-id\"", "\"\"");
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }

    #[test]
    fn set_nested_value() {
        let out = set_string(DOC, &["schema:author", "schema:name"], "acme-corp").unwrap();
        assert_eq!(
            get_string(&out, &["schema:author", "schema:name"]).unwrap(),
            Some("acme-corp".to_owned())
        );
        // siblings untouched
        assert_eq!(get_string(&out, &["id"]).unwrap(), Some("old-id".to_owned()));
    }

    #[test]
    fn set_inserts_missing_member_before_closing_brace() {
        let doc = br#"{"a": 1}"#;
        let out = set_string(doc, &["id"], "x").unwrap();
        assert_eq!(out, br#"{"a": 1,"id":"x"}"#);
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["id"], "x");
    }

    #[test]
    fn set_inserts_into_empty_object() {
        let out = set_string(b"{}", &["id"], "x").unwrap();
        assert_eq!(out, br#"{"id":"x"}"#);
    }

    #[test]
    fn set_creates_nested_objects_for_missing_path() {
        let out = set_string(b"{}", &["a", "b"], "v").unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["a"]["b"], "v");
    }

    #[test]
    fn set_rejects_non_object_intermediate() {
        assert!(set_string(DOC, &["flag", "sub"], "v").is_err());
    }

    #[test]
    fn set_raw_splices_arbitrary_json() {
        let out = set_raw(DOC, &["count"], b"[1,2]").unwrap();
        let (_, kind) = get(&out, &["count"]).unwrap().unwrap();
        assert_eq!(kind, ValueKind::Array);
    }

    #[test]
    fn escaped_keys_are_matched_by_decoded_value() {
        let doc = br#"{"abc": 1}"#;
        let (_, kind) = get(doc, &["abc"]).unwrap().unwrap();
        assert_eq!(kind, ValueKind::Number);
    }

    #[test]
    fn non_object_document_is_rejected() {
        assert!(get(b"[1,2]", &["a"]).is_err());
        assert!(get(b"42", &["a"]).is_err());
    }
}
