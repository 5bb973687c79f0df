//! Concurrency control for in-flight chunk uploads.
//!
//! The engine's only explicit concurrency primitive: a counting semaphore
//! that caps the number of simultaneous chunk transfers. Default limit is 4.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Caps the number of concurrently in-flight chunk uploads.
///
/// Permits are released automatically when dropped, so a slot is always freed
/// no matter how the holding task exits.
#[derive(Clone)]
pub struct UploadScheduler {
    sem: Arc<Semaphore>,
    max: usize,
}

impl UploadScheduler {
    /// Creates a scheduler allowing at most `max_concurrency` transfers.
    ///
    /// # Panics
    ///
    /// Panics if `max_concurrency` is 0.
    pub fn new(max_concurrency: usize) -> Self {
        assert!(max_concurrency > 0, "max_concurrency must be greater than 0");

        Self {
            sem: Arc::new(Semaphore::new(max_concurrency)),
            max: max_concurrency,
        }
    }

    /// Acquires a transfer slot, waiting if all slots are in use.
    pub async fn acquire(&self) -> UploadPermit {
        // The semaphore is never closed, so acquire_owned cannot fail
        let permit = self
            .sem
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore closed unexpectedly");

        UploadPermit { _permit: permit }
    }

    /// Returns the number of transfers currently in flight.
    pub fn in_flight(&self) -> usize {
        self.max - self.sem.available_permits()
    }
}

/// An active transfer slot; freed on drop.
pub struct UploadPermit {
    _permit: OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    #[should_panic(expected = "max_concurrency must be greater than 0")]
    fn zero_concurrency_panics() {
        let _ = UploadScheduler::new(0);
    }

    #[tokio::test]
    async fn permits_free_their_slot_on_drop() {
        let scheduler = UploadScheduler::new(2);

        let p1 = scheduler.acquire().await;
        let _p2 = scheduler.acquire().await;
        assert_eq!(scheduler.in_flight(), 2);

        drop(p1);
        assert_eq!(scheduler.in_flight(), 1);

        let reacquired = timeout(Duration::from_millis(100), scheduler.acquire()).await;
        assert!(reacquired.is_ok(), "freed slot must be reusable");
    }

    #[tokio::test]
    async fn acquire_blocks_until_slot_frees() {
        let scheduler = UploadScheduler::new(1);
        let permit = scheduler.acquire().await;

        let waiter = scheduler.clone();
        let handle = tokio::spawn(async move { waiter.acquire().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished(), "acquire should block while slot is held");

        drop(permit);

        let result = timeout(Duration::from_millis(100), handle).await;
        assert!(result.is_ok(), "acquire should complete once the slot frees");
    }

    #[tokio::test]
    async fn clones_share_the_same_slots() {
        let a = UploadScheduler::new(2);
        let b = a.clone();

        let _p = a.acquire().await;
        assert_eq!(a.in_flight(), 1);
        assert_eq!(b.in_flight(), 1);
    }
}
