use colloquy_encoding::encode_into;

use crate::{TRAILING_MARKER, ThreadError, ThreadKey};

/// Compute the key that follows `max` among the children of `parent` (or
/// among the top-level nodes when `parent` is `None`).
///
/// See [ThreadKeyBuilder::next_key].
pub fn next_key(
    parent: Option<&ThreadKey>,
    max: Option<&ThreadKey>,
) -> Result<ThreadKey, ThreadError> {
    ThreadKeyBuilder::new(parent).next_key(max)
}

/// Builds candidate keys for new children of one parent.
///
/// The builder only knows the depth it builds at from the parent key; the
/// observed maximum must agree with it.
#[derive(Clone, Debug)]
pub struct ThreadKeyBuilder {
    parent: Option<ThreadKey>,
    prefix: String,
}

impl ThreadKeyBuilder {
    /// A builder for children of `parent`, or for top-level nodes
    pub fn new(parent: Option<&ThreadKey>) -> Self {
        let prefix = parent.map(ThreadKey::descendant_prefix).unwrap_or_default();

        Self {
            parent: parent.cloned(),
            prefix,
        }
    }

    /// Index of the segment this builder produces; 0 at the top level
    pub fn depth(&self) -> usize {
        self.parent.as_ref().map(ThreadKey::depth).unwrap_or(0)
    }

    /// The integer already used by `max` at this builder's depth, or 0 when
    /// nothing has been observed yet.
    ///
    /// `max` may be deeper than this builder's depth (a store may report the
    /// largest key of a whole subtree), but it must lie under the parent.
    pub fn last_observed(&self, max: Option<&ThreadKey>) -> Result<u64, ThreadError> {
        let Some(max) = max else {
            return Ok(0);
        };

        if let Some(parent) = &self.parent {
            if !parent.is_ancestor_of(max) {
                return Err(ThreadError::DepthMismatch(format!(
                    "maximum {max} is not below parent {parent}"
                )));
            }
        }

        max.segment(self.depth()).ok_or_else(|| {
            ThreadError::DepthMismatch(format!(
                "maximum {max} has no segment at depth {}",
                self.depth()
            ))
        })
    }

    /// The key for integer `n` at this builder's depth.
    pub fn candidate(&self, n: u64) -> ThreadKey {
        let mut key = String::with_capacity(self.prefix.len() + 4);
        key.push_str(&self.prefix);
        encode_into(n, &mut key);
        key.push(TRAILING_MARKER);
        ThreadKey::assembled(key)
    }

    /// The key after `max`: the integer at this depth plus one, appended to
    /// the parent's body.
    ///
    /// The first child (and the first top-level node) is numbered 1.
    pub fn next_key(&self, max: Option<&ThreadKey>) -> Result<ThreadKey, ThreadError> {
        let last = self.last_observed(max)?;
        let next = self.successor(last)?;
        Ok(self.candidate(next))
    }

    pub(crate) fn successor(&self, n: u64) -> Result<u64, ThreadError> {
        n.checked_add(1).ok_or_else(|| {
            ThreadError::KeySpaceExhausted(format!("{n} at depth {}", self.depth()))
        })
    }
}
