use std::fmt;

use crate::error::StoreError;

/// Characters the store does not accept inside a key.
const FORBIDDEN: &[char] = &['.', '#', '$', '[', ']', '/'];

/// Slash-separated location in the store tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse `a/b/c`. Empty segments are skipped.
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let mut path = Self::root();
        for seg in raw.split('/').filter(|s| !s.is_empty()) {
            path = path.child(seg)?;
        }
        Ok(path)
    }

    /// Append one validated segment.
    pub fn child(&self, segment: &str) -> Result<Self, StoreError> {
        if segment.is_empty() || segment.contains(FORBIDDEN) {
            return Err(StoreError::InvalidPath(segment.to_string()));
        }
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Ok(Self { segments })
    }

    /// Append a segment after replacing forbidden characters with `_`.
    pub fn child_sanitized(&self, segment: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(sanitize_key(segment));
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Last segment, if any.
    pub fn key(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// True if `self` equals `other` or lies above it.
    pub fn is_ancestor_of(&self, other: &StorePath) -> bool {
        self.segments.len() <= other.segments.len()
            && self.segments.iter().zip(&other.segments).all(|(a, b)| a == b)
    }

    /// True if a write at one path can change the value seen at the other.
    pub fn overlaps(&self, other: &StorePath) -> bool {
        self.is_ancestor_of(other) || other.is_ancestor_of(self)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

/// Replace characters the store rejects in keys with `_`.
pub fn sanitize_key(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if FORBIDDEN.contains(&c) { '_' } else { c })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let p = StorePath::parse("/artifacts/app/public/").unwrap();
        assert_eq!(p.segments().len(), 3);
        assert_eq!(p.to_string(), "/artifacts/app/public");
        assert_eq!(p.key(), Some("public"));
    }

    #[test]
    fn rejects_forbidden_segments() {
        assert!(StorePath::root().child("a.b").is_err());
        assert!(StorePath::root().child("").is_err());
        assert!(StorePath::parse("ok/fine$").is_err());
    }

    #[test]
    fn sanitizes_app_ids() {
        assert_eq!(sanitize_key("ghost.app#1"), "ghost_app_1");
        assert_eq!(StorePath::root().child_sanitized("a[b]").key(), Some("a_b_"));
    }

    #[test]
    fn overlap_is_symmetric_and_prefix_based() {
        let a = StorePath::parse("x/y").unwrap();
        let b = StorePath::parse("x/y/z").unwrap();
        let c = StorePath::parse("x/w").unwrap();
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!b.overlaps(&c));
        assert!(StorePath::root().overlaps(&c));
    }
}
