use std::{cmp::Ordering, fmt::Display, str::FromStr};

use colloquy_encoding::decode;
use serde::{Deserialize, Serialize};

use crate::ThreadError;

/// Separates the segments of a [ThreadKey], one segment per depth level.
pub const SEGMENT_SEPARATOR: char = '.';

/// Terminates every [ThreadKey].
pub const TRAILING_MARKER: char = '/';

/// The position of a node in a comment tree.
///
/// A thread key is one or more alphadecimal segments joined by `.` and
/// terminated by `/`, for example `01/` or `01.02/`. The number of segments is
/// the depth of the node; the segments before the last one are the key of its
/// parent.
///
/// Keys order by their *body* (the key without the trailing `/`). Since the
/// segments are self-delimiting, this puts every node directly before its
/// descendants and after the descendants of its preceding siblings. External
/// stores that sort by string should sort by [ThreadKey::body].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ThreadKey(String);

impl ThreadKey {
    /// Parse and validate a thread key, including its trailing `/`.
    pub fn parse(input: &str) -> Result<Self, ThreadError> {
        let malformed = |reason: String| ThreadError::MalformedKey {
            key: input.to_owned(),
            reason,
        };

        let body = input
            .strip_suffix(TRAILING_MARKER)
            .ok_or_else(|| malformed(format!("missing trailing {TRAILING_MARKER:?}")))?;

        for segment in body.split(SEGMENT_SEPARATOR) {
            decode(segment).map_err(|error| malformed(format!("segment {segment:?}: {error}")))?;
        }

        Ok(ThreadKey(input.to_owned()))
    }

    /// Wrap a key the builder has just assembled from valid segments.
    pub(crate) fn assembled(key: String) -> Self {
        debug_assert!(Self::parse(&key).is_ok(), "assembled invalid key {key}");
        ThreadKey(key)
    }

    /// The full key, including the trailing `/`
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key without its trailing `/`
    pub fn body(&self) -> &str {
        &self.0[..self.0.len() - TRAILING_MARKER.len_utf8()]
    }

    /// Number of segments, which is 1 for a top-level node
    pub fn depth(&self) -> usize {
        self.raw_segments().count()
    }

    /// The decoded integer of every segment, outermost first
    pub fn segments(&self) -> impl Iterator<Item = u64> + '_ {
        self.raw_segments().filter_map(|segment| decode(segment).ok())
    }

    /// The decoded integer at `depth`, counting the top level as 0
    pub fn segment(&self, depth: usize) -> Option<u64> {
        self.segments().nth(depth)
    }

    fn raw_segments(&self) -> impl Iterator<Item = &str> {
        self.body().split(SEGMENT_SEPARATOR)
    }

    /// The key of the parent node, or `None` for a top-level node
    pub fn parent(&self) -> Option<ThreadKey> {
        self.body()
            .rsplit_once(SEGMENT_SEPARATOR)
            .map(|(parent, _)| ThreadKey(format!("{parent}{TRAILING_MARKER}")))
    }

    /// The string every descendant key starts with: the body followed by `.`
    pub fn descendant_prefix(&self) -> String {
        format!("{}{SEGMENT_SEPARATOR}", self.body())
    }

    /// Whether `other` is a strict descendant of this key
    pub fn is_ancestor_of(&self, other: &ThreadKey) -> bool {
        other
            .body()
            .strip_prefix(self.body())
            .is_some_and(|rest| rest.starts_with(SEGMENT_SEPARATOR))
    }

    /// Whether this key is a strict descendant of `other`
    pub fn is_descendant_of(&self, other: &ThreadKey) -> bool {
        other.is_ancestor_of(self)
    }
}

impl Ord for ThreadKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.body().cmp(other.body())
    }
}

impl PartialOrd for ThreadKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for ThreadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ThreadKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for ThreadKey {
    type Err = ThreadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ThreadKey::parse(s)
    }
}

impl TryFrom<String> for ThreadKey {
    type Error = ThreadError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ThreadKey::parse(&value)
    }
}

impl From<ThreadKey> for String {
    fn from(value: ThreadKey) -> Self {
        value.0
    }
}
