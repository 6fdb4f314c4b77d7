use std::sync::Arc;

use relayer_common::{Block, BlockKey, Hash, Log, LogKey, Transaction, TransactionKey};
use relayer_tinypack::{Codec, TinyEncode};
use rustc_hash::FxHashSet;
use tracing::{debug, warn};

use crate::{
    api::{StorageBackend, keys},
    config::StoreConfig,
    error::StoreError,
    logscan::features::{self, IndexParams},
};

/// Stages inserts in a batch that [`Writer::flush`] commits atomically.
///
/// Dropping a writer discards whatever was not flushed. Any failed insert
/// discards the whole pending batch.
pub struct Writer {
    backend: Arc<dyn StorageBackend>,
    codec: Codec,
    config: Arc<StoreConfig>,
    batch: Vec<(Vec<u8>, Vec<u8>)>,
    /// Chains whose index parameters were checked for the pending batch.
    params_checked: FxHashSet<u64>,
}

impl Writer {
    pub(crate) fn new(backend: Arc<dyn StorageBackend>, codec: Codec, config: Arc<StoreConfig>) -> Self {
        Self {
            backend,
            codec,
            config,
            batch: Vec::new(),
            params_checked: FxHashSet::default(),
        }
    }

    /// Number of staged key writes.
    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    pub fn insert_block(
        &mut self,
        chain: u64,
        height: u64,
        hash: &Hash,
        block: &Block,
    ) -> Result<(), StoreError> {
        self.staged(|w| {
            w.put(keys::block_hash(chain, height)?, hash)?;
            w.put(keys::block_data(chain, height)?, block)?;
            w.put(
                keys::block_key_by_hash(chain, hash.as_bytes())?,
                &BlockKey::new(height),
            )
        })
    }

    pub fn insert_transaction(
        &mut self,
        chain: u64,
        height: u64,
        tx_index: u64,
        hash: &Hash,
        tx: &Transaction,
    ) -> Result<(), StoreError> {
        self.staged(|w| {
            w.put(keys::tx_hash(chain, height, tx_index)?, hash)?;
            w.put(keys::tx_data(chain, height, tx_index)?, tx)?;
            w.put(
                keys::tx_key_by_hash(chain, hash.as_bytes())?,
                &TransactionKey::new(height, tx_index),
            )
        })
    }

    /// Stages the log and, when the feature index is enabled, one index
    /// entry per indexable combination of its address and leading topics.
    pub fn insert_log(
        &mut self,
        chain: u64,
        height: u64,
        tx_index: u64,
        log_index: u64,
        log: &Log,
    ) -> Result<(), StoreError> {
        let position = LogKey::new(height, tx_index, log_index);
        let scan = &self.config.log_scan;
        let index_entries = if scan.feature_index {
            features::index_entries(log, scan.max_indexed_topics, scan.max_indexed_features)
        } else {
            Vec::new()
        };
        self.staged(|w| {
            w.check_index_params(chain)?;
            w.put(keys::log(chain, &position)?, log)?;
            for (hash, bitmask) in &index_entries {
                let key = keys::log_scan_entry(chain, hash, *bitmask, &position)?;
                w.batch.push((key, vec![1]));
            }
            Ok(())
        })
    }

    /// Stages the chain's index parameters the first time a log of it is
    /// written, and resets them to disabled if they differ from the stored
    /// ones.
    fn check_index_params(&mut self, chain: u64) -> Result<(), StoreError> {
        if self.params_checked.contains(&chain) {
            return Ok(());
        }
        let key = keys::log_scan_params(chain)?;
        let current = IndexParams::from_config(&self.config.log_scan);
        let stored = match self.backend.begin_read()?.get(&key)? {
            Some(data) => match self.codec.unmarshal::<IndexParams>(&data) {
                Ok(stored) => Some(stored),
                Err(err) => {
                    warn!(chain, "Resetting corrupted log index parameters: {err}");
                    Some(IndexParams::DISABLED)
                }
            },
            None => None,
        };
        match stored {
            None => self.put(key, &current)?,
            Some(stored) if stored == current => {}
            Some(stored) => {
                if stored.enabled {
                    warn!(
                        chain,
                        ?stored,
                        ?current,
                        "Log index settings changed, wide scans fall back to linear"
                    );
                }
                self.put(key, &IndexParams::DISABLED)?;
            }
        }
        self.params_checked.insert(chain);
        Ok(())
    }

    /// Replaces the opaque ingester state.
    pub fn write_indexer_state(&mut self, state: &[u8]) -> Result<(), StoreError> {
        self.batch.push((keys::indexer_state(), state.to_vec()));
        Ok(())
    }

    /// Commits the pending batch. The batch is empty afterwards whether or
    /// not the commit succeeded.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        let batch = std::mem::take(&mut self.batch);
        self.params_checked.clear();
        if batch.is_empty() {
            return Ok(());
        }
        let ops = batch.len();
        let mut txn = self.backend.begin_write()?;
        txn.put_batch(batch)?;
        txn.commit()?;
        debug!(ops, "Flushed archive batch");
        Ok(())
    }

    fn put<T: TinyEncode + ?Sized>(&mut self, key: Vec<u8>, value: &T) -> Result<(), StoreError> {
        let value = self.codec.marshal(value)?;
        self.batch.push((key, value));
        Ok(())
    }

    fn staged(
        &mut self,
        insert: impl FnOnce(&mut Self) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        insert(self).inspect_err(|_| {
            self.batch.clear();
            self.params_checked.clear();
        })
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        if !self.batch.is_empty() {
            debug!(ops = self.batch.len(), "Discarding unflushed archive batch");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use relayer_common::{Address, MAX_BLOCK_HEIGHT, utils::keccak};

    #[test]
    fn block_insert_writes_three_keys() {
        let store = Store::new_in_memory().unwrap();
        let mut writer = store.writer();
        writer
            .insert_block(1, 10, &keccak(b"b10"), &Block::default())
            .unwrap();
        assert_eq!(writer.pending(), 3);
        writer.flush().unwrap();
        assert_eq!(writer.pending(), 0);
    }

    #[test]
    fn failed_insert_discards_batch() {
        let store = Store::new_in_memory().unwrap();
        let mut writer = store.writer();
        writer
            .insert_block(1, 10, &keccak(b"b10"), &Block::default())
            .unwrap();
        let err = writer
            .insert_block(1, MAX_BLOCK_HEIGHT + 1, &keccak(b"big"), &Block::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::KeyOutOfRange { field: "height", .. }));
        assert_eq!(writer.pending(), 0);
    }

    #[test]
    fn log_insert_adds_index_entries() {
        let store = Store::new_in_memory().unwrap();
        let mut writer = store.writer();
        let log = Log {
            address: Address::new([1; 20]),
            topics: vec![keccak(b"t0"), keccak(b"t1")],
            ..Default::default()
        };
        writer.insert_log(1, 10, 0, 0, &log).unwrap();
        // parameters, log, then address, t0, t1 and their three pairs
        assert_eq!(writer.pending(), 2 + 6);
        writer.insert_log(1, 10, 0, 1, &log).unwrap();
        assert_eq!(writer.pending(), 2 + 6 + 1 + 6);
    }

    #[test]
    fn log_insert_without_feature_index() {
        let mut config = StoreConfig::in_memory();
        config.log_scan.feature_index = false;
        let store = Store::new(config).unwrap();
        let mut writer = store.writer();
        writer.insert_log(1, 10, 0, 0, &Log::default()).unwrap();
        assert_eq!(writer.pending(), 2);
    }

    fn stored_params(store: &Store, chain: u64) -> Option<IndexParams> {
        let data = store
            .reader()
            .unwrap()
            .view()
            .get(&keys::log_scan_params(chain).unwrap())
            .unwrap()?;
        Some(relayer_tinypack::unmarshal(&data).unwrap())
    }

    #[test]
    fn index_params_are_recorded_once() {
        let store = Store::new_in_memory().unwrap();
        let mut writer = store.writer();
        writer.insert_log(1, 10, 0, 0, &Log::default()).unwrap();
        writer.flush().unwrap();
        let expected = IndexParams::from_config(&store.config().log_scan);
        assert_eq!(stored_params(&store, 1), Some(expected));
        assert_eq!(stored_params(&store, 2), None);

        writer.insert_log(1, 11, 0, 0, &Log::default()).unwrap();
        // index entry for the address only, no new parameters
        assert_eq!(writer.pending(), 1 + 1);
    }

    #[test]
    fn changed_index_settings_disable_the_index() {
        let store = Store::new_in_memory().unwrap();
        let mut writer = store.writer();
        writer.insert_log(1, 10, 0, 0, &Log::default()).unwrap();
        writer.flush().unwrap();

        let mut config = StoreConfig::in_memory();
        config.log_scan.max_indexed_topics = 1;
        let reopened = store.reopen_with(config);
        let mut writer = reopened.writer();
        writer.insert_log(1, 11, 0, 0, &Log::default()).unwrap();
        writer.flush().unwrap();
        assert_eq!(stored_params(&reopened, 1), Some(IndexParams::DISABLED));

        // Going back to the original settings keeps it disabled.
        let mut writer = store.writer();
        writer.insert_log(1, 12, 0, 0, &Log::default()).unwrap();
        writer.flush().unwrap();
        assert_eq!(stored_params(&store, 1), Some(IndexParams::DISABLED));
    }
}
