//! Async key-value persistence interface.
//!
//! The engine never talks to a concrete backend. Everything it persists
//! (cooldown end times, loss-streak records, the instance token) goes through
//! [`Store`], so tests can inject a [`MemoryStore`] and the CLI can hand in a
//! [`SqliteStore`](super::SqliteStore).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::error::PersistenceError;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// A key was written or removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub key: String,
    /// `None` when the key was removed.
    pub new_value: Option<String>,
}

/// String-valued key-value store with change notifications.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError>;

    /// Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), PersistenceError>;

    /// Subscribe to every successful `set` / `remove` made through this store.
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

/// Read and decode a JSON value.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn Store,
    key: &str,
) -> Result<Option<T>, PersistenceError> {
    match store.get(key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| PersistenceError::Encode {
                key: key.to_string(),
                message: e.to_string(),
            }),
        None => Ok(None),
    }
}

/// Encode and write a JSON value.
pub async fn save_json<T: Serialize + ?Sized>(
    store: &dyn Store,
    key: &str,
    value: &T,
) -> Result<(), PersistenceError> {
    let raw = serde_json::to_string(value).map_err(|e| PersistenceError::Encode {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    store.set(key, &raw).await
}

/// Remove a key, logging instead of failing. Persistence is fire-and-forget
/// for the engine; the next poll re-persists whatever it needs.
pub async fn remove_logged(store: &dyn Store, key: &str) {
    if let Err(e) = store.remove(key).await {
        tracing::warn!(key, error = %e, "failed to remove persisted key");
    }
}

/// In-process store. Used for session scope and in tests.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    changes: broadcast::Sender<StoreChange>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            entries: Mutex::new(HashMap::new()),
            changes,
        }
    }

    /// Snapshot of the current contents.
    pub fn entries(&self) -> HashMap<String, String> {
        self.entries
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn publish(&self, key: &str, new_value: Option<String>) {
        // No subscribers is fine.
        let _ = self.changes.send(StoreChange {
            key: key.to_string(),
            new_value,
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let entries = self.entries.lock().map_err(|_| PersistenceError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        {
            let mut entries = self.entries.lock().map_err(|_| PersistenceError::Poisoned)?;
            entries.insert(key.to_string(), value.to_string());
        }
        self.publish(key, Some(value.to_string()));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        let removed = {
            let mut entries = self.entries.lock().map_err(|_| PersistenceError::Poisoned)?;
            entries.remove(key).is_some()
        };
        if removed {
            self.publish(key, None);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);

        // Removing twice is fine.
        store.remove("k").await.unwrap();
    }

    #[tokio::test]
    async fn json_helpers_roundtrip_integers() {
        let store = MemoryStore::new();
        save_json(&store, "lossStreak:alice:blitz", &3u32).await.unwrap();
        let loaded: Option<u32> = load_json(&store, "lossStreak:alice:blitz").await.unwrap();
        assert_eq!(loaded, Some(3));
    }

    #[tokio::test]
    async fn load_json_reports_garbage() {
        let store = MemoryStore::new();
        store.set("lastRating:alice:blitz", "not a number").await.unwrap();
        let loaded = load_json::<i32>(&store, "lastRating:alice:blitz").await;
        assert!(matches!(loaded, Err(PersistenceError::Encode { .. })));
    }

    #[tokio::test]
    async fn subscribers_see_writes_and_removals() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe();

        store.set("a", "1").await.unwrap();
        store.remove("a").await.unwrap();
        // Missing key: no notification.
        store.remove("a").await.unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            StoreChange {
                key: "a".into(),
                new_value: Some("1".into())
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            StoreChange {
                key: "a".into(),
                new_value: None
            }
        );
        assert!(rx.try_recv().is_err());
    }
}
