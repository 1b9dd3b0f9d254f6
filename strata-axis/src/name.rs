//! Hierarchical variable path identifiers.

use std::fmt;

/// A hierarchical variable path.
///
/// A name is an ordered sequence of path segments; the empty sequence is the
/// canonical "unset" value. Equality and ordering are structural, so names
/// key sorted maps directly. The string form joins segments with `/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VariableName {
    segments: Vec<String>,
}

impl VariableName {
    /// The empty (unset) name.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a name from path segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Number of path segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether this is the empty name.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The path segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The first segment, if any.
    pub fn first(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    /// The last segment, if any.
    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Concatenation `self / other`.
    pub fn append(&self, other: &VariableName) -> VariableName {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        VariableName { segments }
    }

    /// Concatenation `other / self`.
    pub fn prepend(&self, other: &VariableName) -> VariableName {
        other.append(self)
    }

    /// Rewrite the last segment by appending `suffix` to it.
    ///
    /// The empty name has no last segment and is returned unchanged.
    pub fn with_suffix(&self, suffix: &str) -> VariableName {
        let mut segments = self.segments.clone();
        if let Some(last) = segments.last_mut() {
            last.push_str(suffix);
        }
        VariableName { segments }
    }

    /// Whether `prefix` is a full-segment prefix of this name.
    ///
    /// Segments match whole, never as substrings: `internal/stress/foo`
    /// starts with `internal/stress` but not with `internal/str`.
    pub fn start_with(&self, prefix: &VariableName) -> bool {
        prefix.len() <= self.len() && self.segments[..prefix.len()] == prefix.segments[..]
    }

    /// Drop the leading `n` segments.
    pub fn peel(&self, n: usize) -> VariableName {
        VariableName {
            segments: self.segments.iter().skip(n).cloned().collect(),
        }
    }
}

impl From<&str> for VariableName {
    fn from(path: &str) -> Self {
        Self::from_segments(path.split('/').filter(|s| !s.is_empty()))
    }
}

impl From<String> for VariableName {
    fn from(path: String) -> Self {
        Self::from(path.as_str())
    }
}

impl fmt::Display for VariableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}
