use std::{
    collections::{BTreeSet, HashMap},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::Result;
use async_trait::async_trait;
use colloquy_thread::{
    FileLockService, LockError, LockService, MemoryLockService, MemoryThreadIndex, NodeId,
    PendingAllocation, RootId, ThreadAllocator, ThreadError, ThreadIndex, ThreadKey,
};
use pretty_assertions::assert_eq;
use rand::Rng;
use tokio::sync::Barrier;

const WRITERS: usize = 32;

/// Grants each name to a single holder, and yields before every attempt so
/// that racing writers interleave as much as possible.
#[derive(Clone, Default)]
struct Contended {
    locks: MemoryLockService,
    attempts: Arc<AtomicUsize>,
}

impl LockService for Contended {
    fn try_acquire(&self, name: &str) -> Result<bool, LockError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        std::thread::yield_now();
        self.locks.try_acquire(name)
    }

    fn release(&self, name: &str) -> Result<(), LockError> {
        self.locks.release(name)
    }
}

struct BrokenLocks;

impl LockService for BrokenLocks {
    fn try_acquire(&self, _name: &str) -> Result<bool, LockError> {
        Err(LockError::Backend("connection refused".into()))
    }

    fn release(&self, _name: &str) -> Result<(), LockError> {
        Err(LockError::Backend("connection refused".into()))
    }
}

struct OfflineIndex;

#[async_trait]
impl ThreadIndex for OfflineIndex {
    type Error = std::io::Error;

    async fn max_root_key(&self, _root: RootId) -> Result<Option<ThreadKey>, Self::Error> {
        Err(std::io::Error::other("database is offline"))
    }

    async fn max_child_key(&self, _parent: NodeId) -> Result<Option<ThreadKey>, Self::Error> {
        Err(std::io::Error::other("database is offline"))
    }

    async fn thread_of(&self, _node: NodeId) -> Result<Option<(RootId, ThreadKey)>, Self::Error> {
        Err(std::io::Error::other("database is offline"))
    }

    async fn descendant_keys(
        &self,
        _root: RootId,
        _ancestor: &ThreadKey,
    ) -> Result<Vec<ThreadKey>, Self::Error> {
        Err(std::io::Error::other("database is offline"))
    }
}

/// Never answers its first request for a root's maximum.
#[derive(Default)]
struct StallsOnce {
    index: MemoryThreadIndex,
    stalled: AtomicBool,
}

#[async_trait]
impl ThreadIndex for StallsOnce {
    type Error = std::convert::Infallible;

    async fn max_root_key(&self, root: RootId) -> Result<Option<ThreadKey>, Self::Error> {
        if !self.stalled.swap(true, Ordering::AcqRel) {
            std::future::pending::<()>().await;
        }
        self.index.max_root_key(root).await
    }

    async fn max_child_key(&self, parent: NodeId) -> Result<Option<ThreadKey>, Self::Error> {
        self.index.max_child_key(parent).await
    }

    async fn thread_of(&self, node: NodeId) -> Result<Option<(RootId, ThreadKey)>, Self::Error> {
        self.index.thread_of(node).await
    }

    async fn descendant_keys(
        &self,
        root: RootId,
        ancestor: &ThreadKey,
    ) -> Result<Vec<ThreadKey>, Self::Error> {
        self.index.descendant_keys(root, ancestor).await
    }
}

async fn race<L>(
    allocator: &ThreadAllocator<MemoryThreadIndex, L>,
    parent: Option<NodeId>,
) -> Result<Vec<PendingAllocation<L>>>
where
    L: LockService + 'static,
{
    let barrier = Arc::new(Barrier::new(WRITERS));

    let tasks = (0..WRITERS).map(|_| {
        let writer = allocator.writer();
        let barrier = barrier.clone();
        tokio::spawn(async move {
            barrier.wait().await;
            writer.allocate(RootId(1), parent).await
        })
    });

    let mut pending = Vec::new();
    for result in futures_util::future::join_all(tasks).await {
        pending.push(result??);
    }

    Ok(pending)
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn racing_writers_never_share_a_key() -> Result<()> {
    let locks = Contended::default();
    let allocator = ThreadAllocator::new(MemoryThreadIndex::default(), locks.clone());
    let parent = allocator
        .writer()
        .insert(NodeId(1), RootId(1), None)
        .await?;

    // Nothing is stored until every writer holds its key, so every writer
    // starts from the same (stale) maximum.
    let pending = race(&allocator, Some(parent.id)).await?;

    let keys: BTreeSet<ThreadKey> = pending.iter().map(|pending| pending.key().clone()).collect();
    assert_eq!(keys.len(), WRITERS);
    assert!(locks.attempts.load(Ordering::Relaxed) >= WRITERS);

    let expected: BTreeSet<u64> = (1..=WRITERS as u64).collect();
    let minted: BTreeSet<u64> = keys.iter().filter_map(|key| key.segment(1)).collect();
    assert_eq!(minted, expected);

    for key in &keys {
        assert!(key.as_str().starts_with("01."), "{key} is not under 01/");
        assert_eq!(key.depth(), 2);
    }

    for (offset, pending) in pending.into_iter().enumerate() {
        let node = pending.node(NodeId(100 + offset as u64));
        allocator.index().insert(node).await?;
        pending.commit()?;
    }

    assert_eq!(locks.locks.held_count(), 0);
    assert_eq!(
        allocator
            .index()
            .descendant_keys(RootId(1), &parent.thread)
            .await?
            .len(),
        WRITERS
    );

    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn racing_top_level_writers_never_share_a_key() -> Result<()> {
    let allocator =
        ThreadAllocator::new(MemoryThreadIndex::default(), MemoryLockService::default());

    let pending = race(&allocator, None).await?;
    let keys: BTreeSet<&str> = pending.iter().map(|pending| pending.key().as_str()).collect();

    assert_eq!(keys.len(), WRITERS);
    assert!(keys.contains("01/"));
    assert!(keys.contains("0w/"));

    Ok(())
}

#[test_log::test(tokio::test)]
async fn writers_in_separate_processes_exclude_each_other() -> Result<()> {
    let tempdir = tempfile::tempdir()?;
    let index = MemoryThreadIndex::default();

    let first = ThreadAllocator::new(index.clone(), FileLockService::new(tempdir.path())?);
    let second = ThreadAllocator::new(index.clone(), FileLockService::new(tempdir.path())?);

    let a = first.writer().allocate(RootId(1), None).await?;
    let b = second.writer().allocate(RootId(1), None).await?;
    let c = first.writer().allocate(RootId(1), None).await?;

    assert_eq!(a.key().as_str(), "01/");
    assert_eq!(b.key().as_str(), "02/");
    assert_eq!(c.key().as_str(), "03/");

    b.abort()?;
    let d = second.writer().allocate(RootId(1), None).await?;
    assert_eq!(d.key().as_str(), "02/");

    Ok(())
}

#[test_log::test(tokio::test)]
async fn index_failures_are_surfaced() -> Result<()> {
    let allocator = ThreadAllocator::new(OfflineIndex, MemoryLockService::default());
    let writer = allocator.writer();

    assert!(matches!(
        writer.allocate(RootId(1), None).await,
        Err(ThreadError::StoreUnavailable(_))
    ));
    assert!(matches!(
        writer.allocate(RootId(1), Some(NodeId(1))).await,
        Err(ThreadError::StoreUnavailable(_))
    ));
    assert!(!writer.is_reserved());

    Ok(())
}

#[test_log::test(tokio::test)]
async fn cancelled_allocations_free_the_writer() -> Result<()> {
    let allocator = ThreadAllocator::new(StallsOnce::default(), MemoryLockService::default());
    let writer = allocator.writer();

    let cancelled =
        tokio::time::timeout(Duration::from_millis(10), writer.allocate(RootId(1), None)).await;
    assert!(cancelled.is_err());
    assert!(!writer.is_reserved());

    let pending = writer.allocate(RootId(1), None).await?;
    assert_eq!(pending.key().as_str(), "01/");
    assert!(writer.is_reserved());

    Ok(())
}

#[test_log::test(tokio::test)]
async fn lock_service_failures_are_surfaced() -> Result<()> {
    let allocator = ThreadAllocator::new(MemoryThreadIndex::default(), BrokenLocks);
    let writer = allocator.writer();

    assert!(matches!(
        writer.allocate(RootId(1), None).await,
        Err(ThreadError::LockServiceUnavailable(_))
    ));
    assert!(!writer.is_reserved());

    Ok(())
}

#[test_log::test(tokio::test)]
async fn key_order_matches_depth_first_creation_order() -> Result<()> {
    let allocator =
        ThreadAllocator::new(MemoryThreadIndex::default(), MemoryLockService::default());
    let writer = allocator.writer();
    let mut rng = rand::thread_rng();

    let mut children: HashMap<Option<NodeId>, Vec<NodeId>> = HashMap::new();
    let mut created: Vec<NodeId> = Vec::new();

    for id in 1..=120u64 {
        let parent = if created.is_empty() || rng.gen_bool(0.2) {
            None
        } else {
            Some(created[rng.gen_range(0..created.len())])
        };

        let node = writer.insert(NodeId(id), RootId(7), parent).await?;
        children.entry(parent).or_default().push(node.id);
        created.push(node.id);
    }

    fn walk(
        parent: Option<NodeId>,
        children: &HashMap<Option<NodeId>, Vec<NodeId>>,
        order: &mut Vec<NodeId>,
    ) {
        for child in children.get(&parent).into_iter().flatten() {
            order.push(*child);
            walk(Some(*child), children, order);
        }
    }

    let mut expected = Vec::new();
    walk(None, &children, &mut expected);

    let thread = allocator.index().thread(RootId(7)).await;
    let actual: Vec<NodeId> = thread.iter().map(|node| node.id).collect();
    assert_eq!(actual, expected);

    // A plain sort of the key bodies gives the same order
    let mut bodies: Vec<&str> = thread.iter().map(|node| node.thread.body()).collect();
    let in_thread_order = bodies.clone();
    bodies.sort();
    assert_eq!(bodies, in_thread_order);

    Ok(())
}

#[test_log::test(tokio::test)]
async fn replies_extend_their_parent_key() -> Result<()> {
    let allocator =
        ThreadAllocator::new(MemoryThreadIndex::default(), MemoryLockService::default());
    let writer = allocator.writer();

    writer.insert(NodeId(1), RootId(1), None).await?;
    writer.insert(NodeId(2), RootId(1), Some(NodeId(1))).await?;
    let parent = writer.insert(NodeId(3), RootId(1), Some(NodeId(1))).await?;
    assert_eq!(parent.thread.as_str(), "01.02/");

    let reply = writer.insert(NodeId(4), RootId(1), Some(NodeId(3))).await?;
    assert_eq!(reply.thread.as_str(), "01.02.01/");
    assert!(reply.thread.as_str().starts_with("01.02."));
    assert!(parent.thread.is_ancestor_of(&reply.thread));

    assert_eq!(
        allocator
            .index()
            .descendant_keys(RootId(1), &ThreadKey::parse("01/")?)
            .await?,
        vec![
            ThreadKey::parse("01.01/")?,
            ThreadKey::parse("01.02/")?,
            ThreadKey::parse("01.02.01/")?,
        ]
    );

    Ok(())
}
