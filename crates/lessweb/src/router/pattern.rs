//! Path pattern compilation.
//!
//! A pattern is a regular expression over the whole request path. Two
//! placeholder forms are understood:
//!
//! * `{name}` is shorthand for `(?P<name>[^/]+)`, the charset is configurable.
//! * raw named groups such as `(?P<a>[a-z]*)` are kept as written.
//!
//! Patterns are always anchored at both ends, so `/add` never matches `/add/x`.

use crate::router::RouterError;
use regex::Regex;
use std::fmt;
use std::fmt::Write;

/// The charset used for `{name}` placeholders unless configured otherwise.
pub const DEFAULT_PLACEHOLDER: &str = "[^/]+";

/// A compiled, anchored path pattern.
#[derive(Clone)]
pub struct PathPattern {
    source: String,
    regex: Regex,
}

impl PathPattern {
    pub fn new(pattern: &str) -> Result<Self, RouterError> {
        Self::with_placeholder(pattern, DEFAULT_PLACEHOLDER)
    }

    pub fn with_placeholder(pattern: &str, placeholder: &str) -> Result<Self, RouterError> {
        let expanded = expand_placeholders(strip_anchors(pattern), placeholder);
        let regex = Regex::new(&format!("^(?:{expanded})$"))
            .map_err(|source| RouterError::InvalidPattern { pattern: pattern.to_string(), source })?;
        Ok(Self { source: pattern.to_string(), regex })
    }

    /// The pattern as it was registered.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    #[inline]
    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Matches `path` and returns the named captures, `None` when the path does not match.
    pub fn captures(&self, path: &str) -> Option<PathParams> {
        let captures = self.regex.captures(path)?;
        let params = self
            .regex
            .capture_names()
            .flatten()
            .filter_map(|name| captures.name(name).map(|m| (name.to_string(), m.as_str().to_string())))
            .collect();
        Some(PathParams { inner: params })
    }
}

impl fmt::Debug for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PathPattern").field(&self.source).finish()
    }
}

/// Named captures of a matched path, in capture order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    inner: Vec<(String, String)>,
}

impl PathParams {
    #[inline]
    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PathParams {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self { inner: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}

fn strip_anchors(pattern: &str) -> &str {
    let pattern = pattern.strip_prefix('^').unwrap_or(pattern);
    match pattern.strip_suffix('$') {
        Some(stripped) if !stripped.ends_with('\\') => stripped,
        _ => pattern,
    }
}

fn expand_placeholders(pattern: &str, placeholder: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 16);
    let mut rest = pattern;

    while let Some(start) = rest.find('{') {
        let (head, tail) = rest.split_at(start);
        out.push_str(head);
        let inner = &tail[1..];

        match inner.find('}') {
            Some(end) if !head.ends_with('\\') && is_identifier(&inner[..end]) => {
                // writing into a String never fails
                let _ = write!(out, "(?P<{}>{placeholder})", &inner[..end]);
                rest = &inner[end + 1..];
            }
            _ => {
                out.push('{');
                rest = inner;
            }
        }
    }

    out.push_str(rest);
    out
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_placeholders() {
        assert_eq!(expand_placeholders("/add/{b}", "[^/]+"), "/add/(?P<b>[^/]+)");
        assert_eq!(expand_placeholders("/{a}/{b_2}", "\\d+"), "/(?P<a>\\d+)/(?P<b_2>\\d+)");
        // quantifiers and escaped braces are left alone
        assert_eq!(expand_placeholders("/x{2,3}", "[^/]+"), "/x{2,3}");
        assert_eq!(expand_placeholders("/\\{a}", "[^/]+"), "/\\{a}");
        assert_eq!(expand_placeholders("/{unclosed", "[^/]+"), "/{unclosed");
    }

    #[test]
    fn test_anchored() {
        let pattern = PathPattern::new("/add").unwrap();
        assert!(pattern.is_match("/add"));
        assert!(!pattern.is_match("/add/x"));
        assert!(!pattern.is_match("/x/add"));

        let pattern = PathPattern::new("^/add$").unwrap();
        assert!(pattern.is_match("/add"));
        assert_eq!(pattern.as_str(), "^/add$");
    }

    #[test]
    fn test_alternation_is_anchored_as_a_whole() {
        let pattern = PathPattern::new("/a|/b").unwrap();
        assert!(pattern.is_match("/a"));
        assert!(pattern.is_match("/b"));
        assert!(!pattern.is_match("/a/b"));
    }

    #[test]
    fn test_mixed_placeholders() {
        let pattern = PathPattern::new("/add/(?P<a>[a-z]*)/{b}").unwrap();
        let params = pattern.captures("/add/x/2").unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params.get("a"), Some("x"));
        assert_eq!(params.get("b"), Some("2"));

        assert!(pattern.captures("/add/1/2").is_none());
        assert!(pattern.captures("/add/x/2/3").is_none());
    }

    #[test]
    fn test_custom_placeholder() {
        let pattern = PathPattern::with_placeholder("/user/{id}", "\\d+").unwrap();
        assert!(pattern.is_match("/user/12"));
        assert!(!pattern.is_match("/user/abc"));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = PathPattern::new("/add/(?P<a>[a-z]").unwrap_err();
        assert!(matches!(err, RouterError::InvalidPattern { ref pattern, .. } if pattern == "/add/(?P<a>[a-z]"));
    }

    #[test]
    fn test_optional_group_is_skipped() {
        let pattern = PathPattern::new("/page(/(?P<n>\\d+))?").unwrap();
        let params = pattern.captures("/page").unwrap();
        assert!(params.is_empty());
        let params = pattern.captures("/page/3").unwrap();
        assert_eq!(params.get("n"), Some("3"));
    }
}
