use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tracing::{debug, trace, warn};

use crate::{
    LockCoordinator, LockService, MemoryThreadIndex, Node, NodeId, Reservation, RootId,
    ThreadConfig, ThreadError, ThreadIndex, ThreadKey, ThreadKeyBuilder,
};

/// Mints unique thread keys for new nodes.
///
/// An allocation reads the current maximum key at the new node's level from
/// the [ThreadIndex], builds the next candidate, and claims it through the
/// [LockCoordinator]. If another writer already holds that candidate, the
/// allocator moves on to the next integer and tries again, without waiting
/// and without re-reading the index.
///
/// Allocations are requested through a [Writer], which may hold only one
/// outstanding [PendingAllocation] at a time.
pub struct ThreadAllocator<I, L>
where
    I: ThreadIndex,
    L: LockService,
{
    index: Arc<I>,
    coordinator: LockCoordinator<L>,
    config: Arc<ThreadConfig>,
}

impl<I, L> Clone for ThreadAllocator<I, L>
where
    I: ThreadIndex,
    L: LockService,
{
    fn clone(&self) -> Self {
        Self {
            index: self.index.clone(),
            coordinator: self.coordinator.clone(),
            config: self.config.clone(),
        }
    }
}

impl<I, L> ThreadAllocator<I, L>
where
    I: ThreadIndex,
    L: LockService,
{
    /// An allocator with the default [ThreadConfig]
    pub fn new(index: I, locks: L) -> Self {
        Self::with_config(index, locks, ThreadConfig::default())
    }

    /// An allocator with the given configuration
    pub fn with_config(index: I, locks: L, config: ThreadConfig) -> Self {
        Self {
            index: Arc::new(index),
            coordinator: LockCoordinator::new(locks, config.namespace.clone()),
            config: Arc::new(config),
        }
    }

    /// The index maxima are read from
    pub fn index(&self) -> &I {
        &self.index
    }

    /// The coordinator candidates are claimed through
    pub fn coordinator(&self) -> &LockCoordinator<L> {
        &self.coordinator
    }

    /// A new caller identity
    pub fn writer(&self) -> Writer<I, L> {
        Writer {
            allocator: self.clone(),
            outstanding: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn reserve(
        &self,
        root: RootId,
        parent: Option<NodeId>,
    ) -> Result<(ThreadKey, Reservation<L>), ThreadError> {
        let unavailable = |error: I::Error| ThreadError::StoreUnavailable(error.to_string());

        let (parent_key, max) = match parent {
            Some(parent) => {
                let parent_key = match self.index.thread_of(parent).await.map_err(unavailable)? {
                    Some((parent_root, key)) if parent_root == root => key,
                    Some((parent_root, _)) => {
                        debug!(%root, %parent_root, %parent, "parent is under another root");
                        return Err(ThreadError::UnknownParent(parent));
                    }
                    None => return Err(ThreadError::UnknownParent(parent)),
                };
                let max = self.index.max_child_key(parent).await.map_err(unavailable)?;
                (Some(parent_key), max)
            }
            None => (
                None,
                self.index.max_root_key(root).await.map_err(unavailable)?,
            ),
        };

        debug!(
            %root,
            parent = ?parent,
            max = ?max.as_ref().map(ThreadKey::as_str),
            "probed maximum thread key"
        );

        let builder = ThreadKeyBuilder::new(parent_key.as_ref());
        let mut n = builder.last_observed(max.as_ref())?;

        loop {
            n = builder.successor(n)?;
            let candidate = builder.candidate(n);

            if let Some(limit) = self.config.max_key_length {
                if candidate.as_str().len() > limit {
                    return Err(ThreadError::KeyTooLong {
                        key: candidate.to_string(),
                        limit,
                    });
                }
            }

            match self.coordinator.try_reserve(root, &candidate)? {
                Some(reservation) => {
                    debug!(%root, thread = %candidate, lock = reservation.name(), "reserved thread key");
                    return Ok((candidate, reservation));
                }
                None => {
                    trace!(%root, thread = %candidate, "candidate is held by another writer");
                }
            }
        }
    }
}

/// One caller of a [ThreadAllocator].
///
/// A writer holds at most one outstanding reservation: asking for another
/// key before the previous [PendingAllocation] has been committed, aborted or
/// dropped fails with [ThreadError::DoubleAllocation].
pub struct Writer<I, L>
where
    I: ThreadIndex,
    L: LockService,
{
    allocator: ThreadAllocator<I, L>,
    outstanding: Arc<AtomicBool>,
}

impl<I, L> Writer<I, L>
where
    I: ThreadIndex,
    L: LockService,
{
    /// Whether this writer currently holds a reservation
    pub fn is_reserved(&self) -> bool {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Reserve a thread key for a new node under `root`, replying to
    /// `parent` if given.
    pub async fn allocate(
        &self,
        root: RootId,
        parent: Option<NodeId>,
    ) -> Result<PendingAllocation<L>, ThreadError> {
        let outstanding =
            Outstanding::claim(&self.outstanding).ok_or(ThreadError::DoubleAllocation)?;

        // Dropping this future before it resolves drops `outstanding` too
        let (key, reservation) = self.allocator.reserve(root, parent).await?;

        Ok(PendingAllocation {
            key,
            root,
            parent,
            reservation: Some(reservation),
            outstanding: Some(outstanding),
        })
    }
}

/// The claim a [Writer] holds on its single allocation slot. The slot is
/// freed when the claim is dropped.
struct Outstanding(Arc<AtomicBool>);

impl Outstanding {
    fn claim(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag.clone()))
    }
}

impl Drop for Outstanding {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<L> Writer<MemoryThreadIndex, L>
where
    L: LockService,
{
    /// Allocate a key, store the node in the index and commit.
    ///
    /// If the index refuses the node the reservation is aborted and the
    /// index error is returned.
    pub async fn insert(
        &self,
        id: NodeId,
        root: RootId,
        parent: Option<NodeId>,
    ) -> Result<Node, ThreadError> {
        let pending = self.allocate(root, parent).await?;
        let node = pending.node(id);

        match self.allocator.index().insert(node.clone()).await {
            Ok(()) => {
                pending.commit()?;
                Ok(node)
            }
            Err(error) => {
                if let Err(abort_error) = pending.abort() {
                    warn!(
                        node = %id,
                        %root,
                        error = %abort_error,
                        "failed to abort refused allocation"
                    );
                }
                Err(error)
            }
        }
    }
}

/// A reserved thread key that has not been committed yet.
///
/// Holding a pending allocation keeps the key's lock held. The lock is
/// released exactly once: by [PendingAllocation::commit] after the node has
/// been stored, by [PendingAllocation::abort] if it will not be, or when the
/// pending allocation is dropped on any other path.
pub struct PendingAllocation<L>
where
    L: LockService,
{
    key: ThreadKey,
    root: RootId,
    parent: Option<NodeId>,
    reservation: Option<Reservation<L>>,
    outstanding: Option<Outstanding>,
}

impl<L> std::fmt::Debug for PendingAllocation<L>
where
    L: LockService,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingAllocation")
            .field("key", &self.key)
            .field("root", &self.root)
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}

impl<L> PendingAllocation<L>
where
    L: LockService,
{
    /// The reserved key
    pub fn key(&self) -> &ThreadKey {
        &self.key
    }

    /// The root entity the key was reserved under
    pub fn root(&self) -> RootId {
        self.root
    }

    /// The node the new node replies to
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// The node to store, given its id
    pub fn node(&self, id: NodeId) -> Node {
        Node {
            id,
            root: self.root,
            parent: self.parent,
            thread: self.key.clone(),
        }
    }

    /// Finish after the node has been stored with [PendingAllocation::key].
    pub fn commit(mut self) -> Result<ThreadKey, ThreadError> {
        self.finish()?;
        debug!(root = %self.root, thread = %self.key, "committed thread key");
        Ok(self.key.clone())
    }

    /// Give the key up without storing a node.
    pub fn abort(mut self) -> Result<(), ThreadError> {
        self.finish()?;
        debug!(root = %self.root, thread = %self.key, "aborted thread key");
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ThreadError> {
        let result = match self.reservation.take() {
            Some(reservation) => reservation.release(),
            None => Ok(()),
        };
        self.outstanding.take();
        result
    }
}

impl<L> Drop for PendingAllocation<L>
where
    L: LockService,
{
    fn drop(&mut self) {
        if self.reservation.is_some() {
            debug!(root = %self.root, thread = %self.key, "pending allocation dropped");
        }
        // Release failures are logged by the reservation
        let _ = self.finish();
    }
}
