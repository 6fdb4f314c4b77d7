use std::sync::Mutex;

use relayer_common::Hash;
use rustc_hash::FxHashMap;

use crate::error::StoreError;

/// Hashes already read within one read transaction, keyed by storage key.
///
/// Log scan processors share it, hence the lock.
#[derive(Debug, Default)]
pub(crate) struct HashCache {
    entries: Mutex<FxHashMap<Vec<u8>, Hash>>,
}

impl HashCache {
    pub fn get_or_fetch(
        &self,
        key: Vec<u8>,
        fetch: impl FnOnce(&[u8]) -> Result<Option<Hash>, StoreError>,
    ) -> Result<Option<Hash>, StoreError> {
        if let Some(hash) = self
            .entries
            .lock()
            .map_err(|_| StoreError::LockError)?
            .get(&key)
        {
            return Ok(Some(*hash));
        }
        let fetched = fetch(&key)?;
        if let Some(hash) = fetched {
            self.entries
                .lock()
                .map_err(|_| StoreError::LockError)?
                .insert(key, hash);
        }
        Ok(fetched)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }
}
