use std::sync::Arc;

use dashmap::DashSet;

use super::{LockError, LockService};

/// A [LockService] shared by the writers of a single process.
///
/// Clones share the same set of held locks.
#[derive(Clone, Debug, Default)]
pub struct MemoryLockService {
    held: Arc<DashSet<String>>,
}

impl MemoryLockService {
    /// Whether the lock called `name` is currently held
    pub fn is_held(&self, name: &str) -> bool {
        self.held.contains(name)
    }

    /// Number of currently held locks
    pub fn held_count(&self) -> usize {
        self.held.len()
    }
}

impl LockService for MemoryLockService {
    fn try_acquire(&self, name: &str) -> Result<bool, LockError> {
        Ok(self.held.insert(name.to_owned()))
    }

    fn release(&self, name: &str) -> Result<(), LockError> {
        self.held
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| LockError::NotHeld(name.to_owned()))
    }
}
