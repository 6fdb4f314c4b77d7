//! State of installed log filters (`eth_newFilter` and friends).

use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::{config::StoreConfig, error::StoreError};

/// Key/value store for filter state, shared by request handlers.
pub trait FilterStateStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;
    fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), StoreError>;
    fn delete(&self, key: &[u8]) -> Result<(), StoreError>;
}

/// Filter state kept in process memory. Entries expire `ttl` after their
/// last write.
#[derive(Debug)]
pub struct InMemoryFilterStore {
    ttl: Duration,
    entries: Mutex<FxHashMap<Vec<u8>, (Instant, Vec<u8>)>>,
}

impl InMemoryFilterStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::default(),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(Duration::from_secs(config.log_filter_ttl_minutes * 60))
    }

    /// Drops every expired entry and returns how many were dropped.
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::LockError)?;
        let before = entries.len();
        let now = Instant::now();
        entries.retain(|_, (expires, _)| *expires > now);
        let purged = before - entries.len();
        if purged > 0 {
            debug!(purged, "Purged expired log filters");
        }
        Ok(purged)
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.entries.lock().map_err(|_| StoreError::LockError)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

impl FilterStateStore for InMemoryFilterStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::LockError)?;
        match entries.get(key) {
            Some((expires, _)) if *expires <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((_, value)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), StoreError> {
        let expires = Instant::now() + self.ttl;
        self.entries
            .lock()
            .map_err(|_| StoreError::LockError)?
            .insert(key.to_vec(), (expires, value));
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::LockError)?
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn put_get_delete() {
        let store = InMemoryFilterStore::from_config(&StoreConfig::default());
        store.put(b"f1", b"state".to_vec()).unwrap();
        assert_eq!(store.get(b"f1").unwrap(), Some(b"state".to_vec()));
        store.delete(b"f1").unwrap();
        assert_eq!(store.get(b"f1").unwrap(), None);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn entries_expire() {
        let store = InMemoryFilterStore::new(Duration::from_millis(10));
        store.put(b"a", vec![1]).unwrap();
        store.put(b"b", vec![2]).unwrap();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(store.get(b"a").unwrap(), None);
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.purge_expired().unwrap(), 1);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn usable_as_trait_object() {
        let store: Box<dyn FilterStateStore> =
            Box::new(InMemoryFilterStore::new(Duration::from_secs(60)));
        store.put(b"k", vec![9]).unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(vec![9]));
    }
}
