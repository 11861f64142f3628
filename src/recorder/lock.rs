//! Commit lock
//!
//! Serialises the recorder's click and change commits. A single permit guards the
//! critical section; acquiring waits up to a fixed timeout and then fails, and
//! dropping the [`CommitPermit`] releases the lock. Not reentrant: a holder that
//! acquires again waits for itself and times out.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{InspectorError, Result};
use crate::utils::InspectorConfig;

#[derive(Debug, Clone)]
pub struct CommitLock {
    semaphore: Arc<Semaphore>,
    timeout: Duration,
}

/// Proof of holding the lock; released on drop
#[derive(Debug)]
pub struct CommitPermit {
    _permit: OwnedSemaphorePermit,
}

impl CommitPermit {
    pub fn release(self) {}
}

impl CommitLock {
    pub fn new(timeout: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
            timeout,
        }
    }

    pub fn from_config(config: &InspectorConfig) -> Self {
        Self::new(config.lock_timeout())
    }

    /// Wait for the lock, failing with [`InspectorError::LockTimeout`]
    pub async fn acquire(&self) -> Result<CommitPermit> {
        match tokio::time::timeout(self.timeout, self.semaphore.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(CommitPermit { _permit: permit }),
            Ok(Err(_)) => Err(InspectorError::InvalidState("commit lock closed".to_string())),
            Err(_) => Err(InspectorError::LockTimeout(self.timeout.as_millis() as u64)),
        }
    }

    pub fn try_acquire(&self) -> Option<CommitPermit> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| CommitPermit { _permit: permit })
    }

    pub fn is_locked(&self) -> bool {
        self.semaphore.available_permits() == 0
    }
}
