//! Concurrency Gate
//!
//! Admits at most one pipeline run at a time. Admission never waits: a
//! second trigger while a run holds the gate is rejected immediately.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

#[derive(Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
}

/// Proof of admission
///
/// The gate reopens when the permit is released or dropped, whichever path
/// the holder takes (success, failure, panic unwind).
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
        }
    }

    /// Non-blocking admission
    pub fn try_acquire(&self) -> Option<GatePermit> {
        let permit = Arc::clone(&self.semaphore).try_acquire_owned().ok()?;
        debug!("Concurrency gate acquired");
        Some(GatePermit { _permit: permit })
    }

    /// Waits until the running job, if any, lets go of the gate
    ///
    /// The returned permit keeps new runs out until it is dropped.
    pub async fn wait_idle(&self) -> Option<GatePermit> {
        let permit = Arc::clone(&self.semaphore).acquire_owned().await.ok()?;
        Some(GatePermit { _permit: permit })
    }

    pub fn is_busy(&self) -> bool {
        self.semaphore.available_permits() == 0
    }
}

impl Default for ConcurrencyGate {
    fn default() -> Self {
        Self::new()
    }
}

impl GatePermit {
    pub fn release(self) {}
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        debug!("Concurrency gate released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_rejected() {
        let gate = ConcurrencyGate::new();
        let permit = gate.try_acquire().unwrap();
        assert!(gate.is_busy());
        assert!(gate.try_acquire().is_none());

        permit.release();
        assert!(!gate.is_busy());
        assert!(gate.try_acquire().is_some());
    }

    #[test]
    fn test_clones_share_the_gate() {
        let gate = ConcurrencyGate::new();
        let other = gate.clone();
        let _permit = gate.try_acquire().unwrap();
        assert!(other.try_acquire().is_none());
    }

    #[tokio::test]
    async fn test_permit_released_when_task_panics() {
        let gate = ConcurrencyGate::new();
        let permit = gate.try_acquire().unwrap();

        let handle = tokio::spawn(async move {
            let _permit = permit;
            panic!("stage blew up");
        });
        assert!(handle.await.unwrap_err().is_panic());

        assert!(gate.try_acquire().is_some());
    }

    #[tokio::test]
    async fn test_wait_idle_returns_once_released() {
        let gate = ConcurrencyGate::new();
        let permit = gate.try_acquire().unwrap();

        let waiter = tokio::spawn({
            let gate = gate.clone();
            async move { gate.wait_idle().await.is_some() }
        });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        permit.release();
        assert!(waiter.await.unwrap());
        assert!(!gate.is_busy());
    }

    #[tokio::test]
    async fn test_concurrent_triggers_admit_exactly_one() {
        let gate = ConcurrencyGate::new();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let gate = gate.clone();
            handles.push(tokio::spawn(async move {
                gate.try_acquire().map(|permit| {
                    std::mem::forget(permit);
                })
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }
}
