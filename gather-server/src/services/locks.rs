use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::ids::{ChatId, PostId, UserId};
use crate::store::chats::pair_key;

/// Per-key async mutexes serializing read-modify-write on one chat.
///
/// Keys are namespaced so a chat, the post it will be bound to, and a user
/// pair that has no chat yet can each be locked before the row exists.
/// An entry lives only while someone holds or waits on it.
#[derive(Default)]
pub struct ChatLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Held lock on one key. Releasing the last handle evicts the key.
pub struct KeyGuard<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        // The owned guard holds its own Arc; release it before counting.
        drop(self.guard.take());
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl ChatLocks {
    pub fn new() -> Self {
        Self::default()
    }

    async fn acquire(&self, key: String) -> KeyGuard<'_> {
        let lock = Arc::clone(&self.locks.entry(key.clone()).or_default());
        let guard = lock.lock_owned().await;
        KeyGuard {
            locks: &self.locks,
            key,
            guard: Some(guard),
        }
    }

    pub async fn chat(&self, chat_id: &ChatId) -> KeyGuard<'_> {
        self.acquire(format!("chat:{}", chat_id)).await
    }

    pub async fn post(&self, post_id: &PostId) -> KeyGuard<'_> {
        self.acquire(format!("post:{}", post_id)).await
    }

    pub async fn pair(&self, a: &UserId, b: &UserId) -> KeyGuard<'_> {
        self.acquire(format!("pair:{}", pair_key(a, b))).await
    }

    /// Number of keys currently held or waited on.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
