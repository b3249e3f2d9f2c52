//! Per-user row lock registry.
//!
//! SQLite gives no `SELECT ... FOR UPDATE`, so per-user read-modify-write
//! sequences (password check + failure increment, OTP verify + attempt
//! increment, reset completion) are serialized in-process instead. Two
//! concurrent guesses must not both read `attempts = 2` and both write 3.
//!
//! Locks are scoped to a single user id; there is no cross-user ordering.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Default)]
pub struct RowLocks {
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl RowLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the exclusive lock for one user. The guard is owned so it can
    /// be held across awaits for the duration of the mutation sequence.
    pub async fn acquire(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut map = self.inner.lock().await;
            map.entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[tokio::test]
    async fn same_user_is_serialized() {
        let locks = RowLocks::new();
        let counter = Arc::new(AtomicI32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("U1").await;
                // Read-modify-write with a yield in the middle; without the
                // lock the increments would interleave and lose updates.
                let read = counter.load(Ordering::SeqCst);
                tokio::task::yield_now().await;
                counter.store(read + 1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.expect("task panicked");
        }

        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn different_users_do_not_block_each_other() {
        let locks = RowLocks::new();
        let guard_a = locks.acquire("U1").await;
        // Must complete while U1 is held.
        let _guard_b = locks.acquire("U2").await;
        drop(guard_a);
    }
}
