//! Hierarchical locations inside a snapshot tree.
//!
//! A [`Path`] is an immutable sequence of child keys. Slicing off the front
//! segment is cheap because the segments are shared behind an [`Arc`] and a
//! path only stores its starting offset.

use crate::error::{SnapshotError, SnapshotResult};
use crate::index::name_compare;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Pseudo child key addressing a node's priority.
pub const PRIORITY_KEY: &str = ".priority";

/// Longest key accepted by [`validate_key`], in UTF-8 bytes.
pub const MAX_KEY_BYTES: usize = 768;

/// An immutable path such as `/users/ada/name`.
#[derive(Clone)]
pub struct Path {
    pieces: Arc<[String]>,
    offset: usize,
}

impl Path {
    /// The root path.
    pub fn root() -> Self {
        Self {
            pieces: Arc::from(Vec::new()),
            offset: 0,
        }
    }

    /// Build a path from a slash-separated string, ignoring empty segments.
    ///
    /// No validation is performed; use [`Path::parse`] for user input.
    pub fn new(path: &str) -> Self {
        Self::from_segments(path.split('/').filter(|s| !s.is_empty()))
    }

    /// Parse and validate a slash-separated path string.
    pub fn parse(path: &str) -> SnapshotResult<Self> {
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if segment == PRIORITY_KEY {
                continue;
            }
            validate_key(segment)
                .map_err(|err| SnapshotError::invalid_path(path, err.to_string()))?;
        }
        Ok(Self::new(path))
    }

    /// Build a path from individual segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pieces: Vec<String> = segments.into_iter().map(Into::into).collect();
        Self {
            pieces: Arc::from(pieces),
            offset: 0,
        }
    }

    /// The remaining segments of this path.
    pub fn segments(&self) -> &[String] {
        &self.pieces[self.offset..]
    }

    /// First segment, or `None` for the root.
    pub fn front(&self) -> Option<&str> {
        self.segments().first().map(String::as_str)
    }

    /// Last segment, or `None` for the root.
    pub fn back(&self) -> Option<&str> {
        self.segments().last().map(String::as_str)
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.pieces.len() - self.offset
    }

    /// Whether this is the root path.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The path without its first segment. The root stays the root.
    pub fn pop_front(&self) -> Self {
        Self {
            pieces: Arc::clone(&self.pieces),
            offset: (self.offset + 1).min(self.pieces.len()),
        }
    }

    /// The path without its last segment, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        let segments = self.segments();
        let (_, init) = segments.split_last()?;
        Some(Self::from_segments(init.iter().cloned()))
    }

    /// Append a child key. Keys containing `/` contribute several segments.
    pub fn child(&self, key: &str) -> Self {
        let mut pieces = self.segments().to_vec();
        pieces.extend(key.split('/').filter(|s| !s.is_empty()).map(String::from));
        Self::from_segments(pieces)
    }

    /// Append every segment of `other`.
    pub fn join(&self, other: &Path) -> Self {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        let mut pieces = self.segments().to_vec();
        pieces.extend(other.segments().iter().cloned());
        Self::from_segments(pieces)
    }

    /// Whether `other` equals this path or lies beneath it.
    pub fn contains(&self, other: &Path) -> bool {
        let mine = self.segments();
        let theirs = other.segments();
        mine.len() <= theirs.len() && mine.iter().zip(theirs).all(|(a, b)| a == b)
    }

    /// The location of `inner` relative to `outer`.
    ///
    /// # Panics
    ///
    /// Panics if `inner` is not contained in `outer`.
    pub fn relative(outer: &Path, inner: &Path) -> Path {
        assert!(
            outer.contains(inner),
            "path {inner} is not contained in {outer}"
        );
        Self {
            pieces: Arc::clone(&inner.pieces),
            offset: inner.offset + outer.len(),
        }
    }
}

impl Default for Path {
    fn default() -> Self {
        Self::root()
    }
}

impl From<&str> for Path {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.segments() == other.segments()
    }
}

impl Eq for Path {}

impl Hash for Path {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.segments().hash(state);
    }
}

impl Ord for Path {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.segments().iter().zip(other.segments()) {
            match name_compare(a, b) {
                Ordering::Equal => {}
                unequal => return unequal,
            }
        }
        self.len().cmp(&other.len())
    }
}

impl PartialOrd for Path {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("/");
        }
        for segment in self.segments() {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({self})")
    }
}

/// Check that `key` may be used as a child name.
///
/// Keys must be non-empty, at most [`MAX_KEY_BYTES`] bytes long and free of
/// `.`, `#`, `$`, `[`, `]`, `/` and ASCII control characters.
pub fn validate_key(key: &str) -> SnapshotResult<()> {
    if key.is_empty() {
        return Err(SnapshotError::invalid_key(key, "key must not be empty"));
    }
    if key.len() > MAX_KEY_BYTES {
        return Err(SnapshotError::invalid_key(
            key,
            format!("key is longer than {MAX_KEY_BYTES} bytes"),
        ));
    }
    if let Some(c) = key
        .chars()
        .find(|c| matches!(c, '.' | '#' | '$' | '[' | ']' | '/') || c.is_ascii_control())
    {
        return Err(SnapshotError::invalid_key(
            key,
            format!("key contains forbidden character {c:?}"),
        ));
    }
    Ok(())
}
