use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::{RootId, ThreadError, ThreadKey};

mod memory;
pub use memory::*;

mod fs;
pub use fs::*;

/// Failures reported by a [LockService]
#[derive(Error, Debug)]
pub enum LockError {
    /// The underlying mechanism failed
    #[error("Lock backend error: {0}")]
    Backend(String),

    /// Release of a lock that is not held by this service
    #[error("Lock {0:?} is not held")]
    NotHeld(String),
}

/// Named, advisory, non-reentrant mutual exclusion shared by every writer
/// that may mint keys for the same trees.
///
/// Acquisition never waits: contention is reported as `Ok(false)` so that the
/// caller can move on to another name.
pub trait LockService: Send + Sync {
    /// Take the lock called `name` if nobody holds it.
    fn try_acquire(&self, name: &str) -> Result<bool, LockError>;

    /// Give up a lock previously taken with [LockService::try_acquire].
    fn release(&self, name: &str) -> Result<(), LockError>;
}

impl<T> LockService for Arc<T>
where
    T: LockService + ?Sized,
{
    fn try_acquire(&self, name: &str) -> Result<bool, LockError> {
        self.as_ref().try_acquire(name)
    }

    fn release(&self, name: &str) -> Result<(), LockError> {
        self.as_ref().release(name)
    }
}

/// Claims candidate keys through a [LockService].
///
/// Lock names are scoped to the root entity and the exact candidate key, so
/// writers proposing different candidates never contend with each other.
pub struct LockCoordinator<L>
where
    L: LockService,
{
    service: Arc<L>,
    namespace: String,
}

impl<L> Clone for LockCoordinator<L>
where
    L: LockService,
{
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            namespace: self.namespace.clone(),
        }
    }
}

impl<L> LockCoordinator<L>
where
    L: LockService,
{
    /// Coordinate through `service`, prefixing lock names with `namespace`
    pub fn new(service: L, namespace: impl Into<String>) -> Self {
        Self {
            service: Arc::new(service),
            namespace: namespace.into(),
        }
    }

    /// The underlying lock service
    pub fn service(&self) -> &L {
        &self.service
    }

    /// The lock name guarding `candidate` under `root`
    pub fn lock_name(&self, root: RootId, candidate: &ThreadKey) -> String {
        format!("{}:{root}:{candidate}", self.namespace)
    }

    /// Try to claim `candidate`. `Ok(None)` means another writer holds it.
    pub fn try_reserve(
        &self,
        root: RootId,
        candidate: &ThreadKey,
    ) -> Result<Option<Reservation<L>>, ThreadError> {
        let name = self.lock_name(root, candidate);

        if !self.service.try_acquire(&name)? {
            return Ok(None);
        }

        Ok(Some(Reservation {
            name,
            service: self.service.clone(),
            held: true,
        }))
    }
}

/// A held lock over one candidate key.
///
/// The lock is released by [Reservation::release], or when the reservation is
/// dropped.
pub struct Reservation<L>
where
    L: LockService,
{
    name: String,
    service: Arc<L>,
    held: bool,
}

impl<L> Reservation<L>
where
    L: LockService,
{
    /// Name of the held lock
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release the lock, reporting any failure of the lock service.
    pub fn release(mut self) -> Result<(), ThreadError> {
        self.held = false;
        self.service.release(&self.name)?;
        debug!(lock = %self.name, "released reservation");
        Ok(())
    }
}

impl<L> Drop for Reservation<L>
where
    L: LockService,
{
    fn drop(&mut self) {
        if !self.held {
            return;
        }

        match self.service.release(&self.name) {
            Ok(()) => debug!(lock = %self.name, "released reservation on drop"),
            Err(error) => warn!(lock = %self.name, %error, "failed to release reservation"),
        }
    }
}
