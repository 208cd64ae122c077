//! Async mutual exclusion per key
//!
//! Holders of different keys never block each other. Entries are dropped from
//! the map once the last guard for a key goes away.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

pub struct KeyedLock<K: Eq + Hash + Clone> {
    locks: Arc<Mutex<HashMap<K, Arc<AsyncMutex<()>>>>>,
}

impl<K: Eq + Hash + Clone> KeyedLock<K> {
    pub fn new() -> Self {
        Self {
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Wait until `key` is free and take it
    pub async fn lock(&self, key: K) -> KeyedGuard<K> {
        let slot = {
            let mut locks = self.locks.lock();
            locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let guard = slot.lock_owned().await;
        KeyedGuard {
            key,
            locks: self.locks.clone(),
            guard: Some(guard),
        }
    }

    /// Keys currently locked or waited on
    pub fn active(&self) -> usize {
        self.locks.lock().len()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLock<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Held lock on one key
pub struct KeyedGuard<K: Eq + Hash + Clone> {
    key: K,
    locks: Arc<Mutex<HashMap<K, Arc<AsyncMutex<()>>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash + Clone> Drop for KeyedGuard<K> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock();
        // Release first so the strong count reflects only the map and waiters
        self.guard.take();
        if let Some(slot) = locks.get(&self.key) {
            if Arc::strong_count(slot) == 1 {
                locks.remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_entry_removed_after_release() {
        let lock = KeyedLock::new();
        {
            let _a = lock.lock("a").await;
            let _b = lock.lock("b").await;
            assert_eq!(lock.active(), 2);
        }
        assert_eq!(lock.active(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_key_is_exclusive() {
        let lock = Arc::new(KeyedLock::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let lock = lock.clone();
            let inside = inside.clone();
            let max_seen = max_seen.clone();
            tasks.push(tokio::spawn(async move {
                let _guard = lock.lock(7u32).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(lock.active(), 0);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let lock = KeyedLock::new();
        let _a = lock.lock(1u32).await;
        // Would deadlock if keys shared a mutex
        let _b = tokio::time::timeout(Duration::from_secs(1), lock.lock(2u32))
            .await
            .unwrap();
    }
}
