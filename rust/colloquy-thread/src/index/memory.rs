use std::{
    collections::{BTreeMap, HashMap},
    convert::Infallible,
    ops::Bound,
    sync::Arc,
};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{Node, NodeId, RootId, ThreadError, ThreadKey};

use super::ThreadIndex;

#[derive(Default)]
struct IndexState {
    nodes: HashMap<NodeId, Node>,
    threads: HashMap<RootId, BTreeMap<ThreadKey, NodeId>>,
}

impl IndexState {
    fn subtree<'a>(
        &'a self,
        root: RootId,
        ancestor: &'a ThreadKey,
    ) -> impl Iterator<Item = (&'a ThreadKey, &'a NodeId)> {
        self.threads
            .get(&root)
            .into_iter()
            .flat_map(move |tree| {
                tree.range((Bound::Excluded(ancestor.clone()), Bound::Unbounded))
                    .take_while(move |(key, _)| ancestor.is_ancestor_of(key))
            })
    }
}

/// A trivial [ThreadIndex] where all nodes are kept in memory and never
/// persisted.
///
/// Clones share the same nodes.
#[derive(Clone, Default)]
pub struct MemoryThreadIndex {
    state: Arc<RwLock<IndexState>>,
}

impl MemoryThreadIndex {
    /// Store a node whose thread key has already been allocated.
    ///
    /// The node must be new, its key must be unused under its root, and its
    /// key must sit directly below its parent's key (or at the top level when
    /// it has no parent).
    pub async fn insert(&self, node: Node) -> Result<(), ThreadError> {
        let mut state = self.state.write().await;

        if state.nodes.contains_key(&node.id) {
            return Err(ThreadError::DuplicateNode(format!(
                "node {} already exists",
                node.id
            )));
        }

        match node.parent {
            Some(parent_id) => {
                let parent = state
                    .nodes
                    .get(&parent_id)
                    .ok_or(ThreadError::UnknownParent(parent_id))?;

                if parent.root != node.root
                    || node.thread.parent().as_ref() != Some(&parent.thread)
                {
                    return Err(ThreadError::DepthMismatch(format!(
                        "thread {} of node {} is not a direct child of {} under root {}",
                        node.thread, node.id, parent.thread, parent.root
                    )));
                }
            }
            None if node.depth() != 1 => {
                return Err(ThreadError::DepthMismatch(format!(
                    "top-level node {} has nested thread {}",
                    node.id, node.thread
                )));
            }
            None => {}
        }

        let tree = state.threads.entry(node.root).or_default();

        if tree.contains_key(&node.thread) {
            return Err(ThreadError::DuplicateNode(format!(
                "thread {} is already used under root {}",
                node.thread, node.root
            )));
        }

        tree.insert(node.thread.clone(), node.id);
        debug!(node = %node.id, root = %node.root, thread = %node.thread, "stored node");
        state.nodes.insert(node.id, node);

        Ok(())
    }

    /// Look up a node by id
    pub async fn get(&self, id: NodeId) -> Option<Node> {
        self.state.read().await.nodes.get(&id).cloned()
    }

    /// Every node of `root` in thread order
    pub async fn thread(&self, root: RootId) -> Vec<Node> {
        let state = self.state.read().await;

        state
            .threads
            .get(&root)
            .map(|tree| {
                tree.values()
                    .filter_map(|id| state.nodes.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Remove a node together with all of its descendants, returning the
    /// removed ids in thread order.
    pub async fn remove(&self, id: NodeId) -> Vec<NodeId> {
        let mut state = self.state.write().await;

        let Some(node) = state.nodes.get(&id).cloned() else {
            return Vec::new();
        };

        let mut removed = vec![node.id];
        removed.extend(state.subtree(node.root, &node.thread).map(|(_, id)| *id));

        for id in &removed {
            if let Some(node) = state.nodes.remove(id) {
                if let Some(tree) = state.threads.get_mut(&node.root) {
                    tree.remove(&node.thread);
                }
            }
        }

        debug!(node = %id, count = removed.len(), "removed subtree");
        removed
    }
}

#[async_trait]
impl ThreadIndex for MemoryThreadIndex {
    type Error = Infallible;

    async fn max_root_key(&self, root: RootId) -> Result<Option<ThreadKey>, Self::Error> {
        let state = self.state.read().await;

        Ok(state.threads.get(&root).and_then(|tree| {
            tree.keys()
                .rev()
                .find(|key| key.depth() == 1)
                .cloned()
        }))
    }

    async fn max_child_key(&self, parent: NodeId) -> Result<Option<ThreadKey>, Self::Error> {
        let state = self.state.read().await;

        let Some(parent) = state.nodes.get(&parent) else {
            return Ok(None);
        };

        let depth = parent.depth() + 1;

        Ok(state
            .subtree(parent.root, &parent.thread)
            .filter(|(key, _)| key.depth() == depth)
            .map(|(key, _)| key.clone())
            .last())
    }

    async fn thread_of(&self, node: NodeId) -> Result<Option<(RootId, ThreadKey)>, Self::Error> {
        Ok(self
            .state
            .read()
            .await
            .nodes
            .get(&node)
            .map(|node| (node.root, node.thread.clone())))
    }

    async fn descendant_keys(
        &self,
        root: RootId,
        ancestor: &ThreadKey,
    ) -> Result<Vec<ThreadKey>, Self::Error> {
        let state = self.state.read().await;

        Ok(state
            .subtree(root, ancestor)
            .map(|(key, _)| key.clone())
            .collect())
    }
}
