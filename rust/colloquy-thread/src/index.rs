use async_trait::async_trait;

use crate::{NodeId, RootId, ThreadKey};

mod memory;
pub use memory::*;

/// The read side of whatever store persists nodes, as far as minting thread
/// keys needs it.
///
/// None of these reads are expected to be transactional with later writes:
/// the maxima are hints, and uniqueness is enforced by locking.
#[async_trait]
pub trait ThreadIndex: Send + Sync {
    /// The error type produced by this [ThreadIndex]
    type Error: std::error::Error + Send + Sync + 'static;

    /// The greatest key among the top-level nodes of `root`.
    async fn max_root_key(&self, root: RootId) -> Result<Option<ThreadKey>, Self::Error>;

    /// The greatest key among the direct children of `parent`.
    async fn max_child_key(&self, parent: NodeId) -> Result<Option<ThreadKey>, Self::Error>;

    /// The root and key of an existing node.
    async fn thread_of(&self, node: NodeId) -> Result<Option<(RootId, ThreadKey)>, Self::Error>;

    /// Every strict descendant of `ancestor` under `root`, in key order.
    ///
    /// A key is a strict descendant when it begins with the body of
    /// `ancestor` followed by `.`, see [ThreadKey::descendant_prefix].
    async fn descendant_keys(
        &self,
        root: RootId,
        ancestor: &ThreadKey,
    ) -> Result<Vec<ThreadKey>, Self::Error>;
}
