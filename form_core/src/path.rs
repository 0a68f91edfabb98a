use serde::{Deserialize, Serialize};
use std::fmt;

/// One step into the value tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => f.write_str(key),
            PathSegment::Index(index) => write!(f, "{}", index),
        }
    }
}

/// Structured address of a value in a form, e.g. `features.0.title`.
///
/// Parsing accepts both the dotted form (`dynamicFields.0.title`) and the
/// bracketed form used by multipart keys (`smallBoxes[0][label]`). Purely
/// numeric segments become indices; empty segments are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

impl FieldPath {
    pub fn parse(raw: &str) -> Self {
        let segments = raw
            .split(|c| c == '.' || c == '[' || c == ']')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| match s.parse::<usize>() {
                Ok(index) => PathSegment::Index(index),
                Err(_) => PathSegment::Key(s.to_string()),
            })
            .collect();
        FieldPath { segments }
    }

    /// A single-segment path. The key is taken verbatim, dots included.
    pub fn key(key: impl Into<String>) -> Self {
        FieldPath {
            segments: vec![PathSegment::Key(key.into())],
        }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Builder-style child key
    pub fn child(&self, key: impl Into<String>) -> Self {
        let mut path = self.clone();
        path.segments.push(PathSegment::Key(key.into()));
        path
    }

    /// Builder-style child index
    pub fn at(&self, index: usize) -> Self {
        let mut path = self.clone();
        path.segments.push(PathSegment::Index(index));
        path
    }

    /// Append every segment of `other`
    pub fn join(&self, other: &FieldPath) -> Self {
        let mut path = self.clone();
        path.segments.extend(other.segments.iter().cloned());
        path
    }

    /// The first `len` segments
    pub fn prefix(&self, len: usize) -> Self {
        FieldPath {
            segments: self.segments[..len.min(self.segments.len())].to_vec(),
        }
    }

    pub fn starts_with(&self, prefix: &FieldPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// Segments after `prefix`, if this path starts with it
    pub fn strip_prefix(&self, prefix: &FieldPath) -> Option<FieldPath> {
        if !self.starts_with(prefix) {
            return None;
        }
        Some(FieldPath {
            segments: self.segments[prefix.len()..].to_vec(),
        })
    }

    pub fn first_key(&self) -> Option<&str> {
        match self.segments.first() {
            Some(PathSegment::Key(key)) => Some(key),
            _ => None,
        }
    }

    /// The index directly following `prefix`, e.g. `2` for `features.2.title`
    /// under `features`
    pub fn index_after(&self, prefix: &FieldPath) -> Option<usize> {
        if !self.starts_with(prefix) {
            return None;
        }
        match self.segments.get(prefix.len()) {
            Some(PathSegment::Index(index)) => Some(*index),
            _ => None,
        }
    }

    /// Replace the segment at `position` with a new index
    pub fn with_index_at(&self, position: usize, index: usize) -> Self {
        let mut path = self.clone();
        if let Some(segment) = path.segments.get_mut(position) {
            *segment = PathSegment::Index(index);
        }
        path
    }

    /// Multipart key: keys before the first index are dotted, everything from
    /// the first index on is bracketed.
    ///
    /// `aboutBanner.bannerThree.smallBoxes.0.label` becomes
    /// `aboutBanner.bannerThree.smallBoxes[0][label]`.
    pub fn to_form_key(&self) -> String {
        let mut out = String::new();
        let mut bracketed = false;
        for segment in &self.segments {
            if let PathSegment::Index(_) = segment {
                bracketed = true;
            }
            if bracketed {
                out.push('[');
                out.push_str(&segment.to_string());
                out.push(']');
            } else {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(&segment.to_string());
            }
        }
        out
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

impl From<&str> for FieldPath {
    fn from(raw: &str) -> Self {
        FieldPath::parse(raw)
    }
}

impl From<String> for FieldPath {
    fn from(raw: String) -> Self {
        FieldPath::parse(&raw)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_string()
    }
}
