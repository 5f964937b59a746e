//! Cross-process named locks on the filesystem.
//!
//! Each lock is a file in a shared directory holding the PID of its owner.
//! Lock names can contain arbitrary characters, so files are named by the
//! BLAKE3 hash of the lock name.
//!
//! A lock file is written in full under a private name and then linked into
//! place, so no other process ever observes a lock file without its PID.
//! Files whose PID names a process that no longer exists are reclaimed by
//! moving them aside under a private name first, so two processes reclaiming
//! the same stale lock cannot delete each other's fresh one.

use std::{
    collections::HashMap,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    process,
    sync::atomic::{AtomicU64, Ordering},
};

use base58::ToBase58;
use parking_lot::Mutex;
use pidlock::Pidlock;
use tempfile::NamedTempFile;
use tracing::{debug, trace, warn};

use super::{LockError, LockService};

static SCRATCH: AtomicU64 = AtomicU64::new(0);

/// A [LockService] shared by every process that points at the same
/// directory.
///
/// Lock files that do not hold a PID are never written by this service and
/// are left alone: they count as held until removed by hand.
pub struct FileLockService {
    directory: PathBuf,
    held: Mutex<HashMap<String, PathBuf>>,
}

impl FileLockService {
    /// Use `directory` (created if missing) for lock files
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self, LockError> {
        let directory = directory.into();

        std::fs::create_dir_all(&directory).map_err(|error| {
            LockError::Backend(format!(
                "Unable to create lock directory {}: {error}",
                directory.display()
            ))
        })?;

        Ok(Self {
            directory,
            held: Mutex::new(HashMap::new()),
        })
    }

    /// The directory holding the lock files
    pub fn directory(&self) -> &PathBuf {
        &self.directory
    }

    fn path(&self, name: &str) -> PathBuf {
        let digest = blake3::hash(name.as_bytes());
        self.directory
            .join(format!("{}.lock", digest.as_bytes().to_base58()))
    }

    /// A name in the lock directory that no other process or call uses
    fn scratch_path(&self, kind: &str) -> PathBuf {
        let sequence = SCRATCH.fetch_add(1, Ordering::Relaxed);
        self.directory
            .join(format!(".{kind}-{}-{sequence}", process::id()))
    }

    /// Link a lock file holding our PID into place. `Ok(false)` when the
    /// file already exists.
    fn publish(&self, path: &Path) -> Result<bool, LockError> {
        let mut file = NamedTempFile::new_in(&self.directory)
            .map_err(|error| LockError::Backend(format!("Unable to stage lock file: {error}")))?;

        write!(file, "{}", process::id())
            .and_then(|_| file.flush())
            .map_err(|error| LockError::Backend(format!("Unable to stage lock file: {error}")))?;

        match file.persist_noclobber(path) {
            Ok(_) => Ok(true),
            Err(error) if error.error.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(error) => Err(LockError::Backend(format!(
                "Unable to publish lock file {}: {}",
                path.display(),
                error.error
            ))),
        }
    }

    /// Whether `pid` names a running process.
    fn is_alive(&self, pid: u32) -> Result<bool, LockError> {
        // Pidlock removes its file when the owner is gone, so it is pointed
        // at a private copy rather than at the shared lock
        let witness = self.scratch_path("owner");
        std::fs::write(&witness, pid.to_string())
            .map_err(|error| LockError::Backend(format!("Unable to check lock owner: {error}")))?;

        let witness_str = witness
            .to_str()
            .ok_or_else(|| LockError::Backend("Lock path is not valid UTF-8".to_string()))?;
        let alive = Pidlock::new(witness_str).get_owner().is_some();

        if alive {
            let _ = std::fs::remove_file(&witness);
        }

        Ok(alive)
    }

    /// Remove the lock at `path` if it still holds `pid`.
    fn reclaim(&self, path: &Path, pid: &str) -> Result<(), LockError> {
        let aside = self.scratch_path("stale");

        match std::fs::rename(path, &aside) {
            Ok(()) => {}
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(()),
            Err(error) => {
                return Err(LockError::Backend(format!(
                    "Unable to reclaim lock file {}: {error}",
                    path.display()
                )));
            }
        }

        let moved = std::fs::read_to_string(&aside).unwrap_or_default();

        if moved.trim() != pid {
            // Another process reclaimed the lock and took it between our read
            // and our rename. Put its lock back.
            if let Err(error) = std::fs::hard_link(&aside, path) {
                warn!(path = %path.display(), %error, "unable to restore a live lock file");
            }
        }

        let _ = std::fs::remove_file(&aside);
        Ok(())
    }
}

impl LockService for FileLockService {
    fn try_acquire(&self, name: &str) -> Result<bool, LockError> {
        let mut held = self.held.lock();

        if held.contains_key(name) {
            return Ok(false);
        }

        let path = self.path(name);

        loop {
            if self.publish(&path)? {
                debug!(lock = name, path = %path.display(), "acquired file lock");
                held.insert(name.to_owned(), path);
                return Ok(true);
            }

            let contents = match std::fs::read_to_string(&path) {
                Ok(contents) => contents,
                // Released since we tried
                Err(error) if error.kind() == ErrorKind::NotFound => continue,
                Err(error) => {
                    return Err(LockError::Backend(format!(
                        "Unable to read lock file {}: {error}",
                        path.display()
                    )));
                }
            };

            let Ok(pid) = contents.trim().parse::<u32>() else {
                trace!(lock = name, "file lock has no owner pid");
                return Ok(false);
            };

            if self.is_alive(pid)? {
                trace!(lock = name, pid, "file lock held by another writer");
                return Ok(false);
            }

            debug!(lock = name, pid, "reclaiming stale file lock");
            self.reclaim(&path, contents.trim())?;
        }
    }

    fn release(&self, name: &str) -> Result<(), LockError> {
        let path = self
            .held
            .lock()
            .remove(name)
            .ok_or_else(|| LockError::NotHeld(name.to_owned()))?;

        std::fs::remove_file(&path)
            .map_err(|error| LockError::Backend(format!("Failed to release lock: {error}")))
    }
}

impl Drop for FileLockService {
    fn drop(&mut self) {
        for (_, path) in self.held.get_mut().drain() {
            let _ = std::fs::remove_file(path);
        }
    }
}
