//! Hierarchical keys and per-provider namespaces.

use thiserror::Error;

/// Errors produced while parsing or composing keys.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("key must have at least one segment")]
    Empty,
    #[error("key segment cannot be empty")]
    EmptySegment,
    #[error("key segment cannot contain control characters")]
    ControlCharacter,
}

/// An ordered list of non-empty segments, rendered as `a/b/c`.
///
/// Two keys are equal iff their segment sequences are equal; rendering is
/// deterministic, so the string form is safe to use as a storage key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    segments: Vec<String>,
}

impl Key {
    /// Build a key from segments, rejecting empty or control-laden ones.
    pub fn new<I, S>(segments: I) -> Result<Self, KeyError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(KeyError::Empty);
        }
        for segment in &segments {
            validate_segment(segment)?;
        }
        Ok(Self { segments })
    }

    /// Parse a `/`-separated key, trimming surrounding whitespace.
    pub fn parse(raw: &str) -> Result<Self, KeyError> {
        let trimmed = raw.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Err(KeyError::Empty);
        }
        Self::new(trimmed.split('/'))
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Return a new key with `segment` appended.
    pub fn child(&self, segment: impl Into<String>) -> Result<Self, KeyError> {
        let segment = segment.into();
        validate_segment(&segment)?;
        let mut segments = self.segments.clone();
        segments.push(segment);
        Ok(Self { segments })
    }
}

fn validate_segment(segment: &str) -> Result<(), KeyError> {
    if segment.is_empty() {
        return Err(KeyError::EmptySegment);
    }
    if segment.chars().any(|c| c.is_control()) {
        return Err(KeyError::ControlCharacter);
    }
    Ok(())
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

impl std::str::FromStr for Key {
    type Err = KeyError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw)
    }
}

/// A root tag plus an optional key prefix; qualifies keys for one provider.
///
/// Two providers with different namespaces never collide in a shared store,
/// even when callers reuse the same user keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    root: String,
    prefix: Option<Key>,
}

impl Namespace {
    /// Create a namespace from a root tag. The tag is trimmed, trailing
    /// slashes are stripped, and empty or control-laden tags are rejected.
    pub fn new(root: impl Into<String>) -> Result<Self, KeyError> {
        let root: String = root.into();
        let root = root.trim().trim_end_matches('/').to_string();
        validate_segment(&root)?;
        Ok(Self { root, prefix: None })
    }

    pub fn with_prefix(mut self, prefix: Key) -> Self {
        self.prefix = Some(prefix);
        self
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Render the fully-qualified storage key for `key`.
    pub fn qualify(&self, key: &Key) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}/{}", self.root, prefix, key),
            None => format!("{}/{}", self.root, key),
        }
    }
}
