//! The process-wide action lock.
//!
//! At most one enroll or unenroll action may run at a time, regardless of
//! realm or caller. The global configuration the external tool touches is
//! not protected by any file-level locking; this lock is the only thing
//! keeping concurrent workflows off it.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

/// Single-permit lock guarding privileged operations.
#[derive(Debug, Clone)]
pub struct ActionLock {
    permit: Arc<Semaphore>,
}

/// Held for the duration of one privileged operation. The permit is
/// released when this drops, which happens exactly once on every exit
/// path of the operation future.
#[derive(Debug)]
pub struct ActionPermit {
    _permit: OwnedSemaphorePermit,
}

impl ActionLock {
    pub fn new() -> Self {
        Self {
            permit: Arc::new(Semaphore::new(1)),
        }
    }

    /// Try to claim the lock. A second concurrent action is rejected
    /// immediately; it never queues.
    pub fn try_lock(&self) -> Option<ActionPermit> {
        match self.permit.clone().try_acquire_owned() {
            Ok(permit) => Some(ActionPermit { _permit: permit }),
            Err(TryAcquireError::NoPermits) => None,
            Err(TryAcquireError::Closed) => None,
        }
    }

    /// Whether the lock is currently free. Used by tests and diagnostics.
    pub fn is_free(&self) -> bool {
        self.permit.available_permits() > 0
    }
}

impl Default for ActionLock {
    fn default() -> Self {
        Self::new()
    }
}
