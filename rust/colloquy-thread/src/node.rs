use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::ThreadKey;

/// Identifies a single comment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Identifies the entity a comment tree is attached to.
///
/// Thread keys are only unique (and only comparable) among the nodes of one
/// root entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RootId(pub u64);

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for RootId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A comment as far as threading is concerned.
///
/// The parent is referenced by id only; a node never owns its parent and the
/// parent's lifetime is independent of its replies. The thread key is
/// assigned once when the node is created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// This node
    pub id: NodeId,
    /// The entity being commented on
    pub root: RootId,
    /// The comment this one replies to, if any
    pub parent: Option<NodeId>,
    /// Position of this node in the tree
    pub thread: ThreadKey,
}

impl Node {
    /// Number of ancestors plus one
    pub fn depth(&self) -> usize {
        self.thread.depth()
    }
}
