use std::time::Duration;

use relayer_common::{
    Block, BlockKey, Hash, LogKey, MAX_BLOCK_HEIGHT, MAX_LOG_INDEX, MAX_TX_INDEX, Transaction,
    TransactionKey,
};
use relayer_tinypack::{Codec, TinyDecode};
use tracing::warn;

use crate::{
    api::{IterOptions, StorageReadView, keys},
    cache::HashCache,
    config::StoreConfig,
    context::{Interruption, Page, QueryContext},
    error::StoreError,
    logscan::{self, LogFilter},
    response::{
        BlockResponse, LogResponse, ReceiptResponse, TransactionResponse, TxView,
        make_block_response, make_transaction_receipt_response, make_transaction_response,
    },
};

/// Read access to one committed snapshot of the archive.
///
/// Block and transaction hashes read through a reader are memoized for its
/// lifetime, so responses that repeat them fetch each one once.
pub struct Reader<'a> {
    view: Box<dyn StorageReadView + 'a>,
    codec: Codec,
    config: &'a StoreConfig,
    cache: HashCache,
}

/// Position of a transaction-level key and which record it holds.
enum TxRecord {
    Hash(TransactionKey),
    Data(TransactionKey),
}

fn tx_record(key: &[u8]) -> Option<TxRecord> {
    let path = if keys::TX_HASH.matches(key) {
        keys::TX_HASH
    } else if keys::TX_DATA.matches(key) {
        keys::TX_DATA
    } else {
        return None;
    };
    let position = TransactionKey::new(path.read_uint_var(key, 1)?, path.read_uint_var(key, 2)?);
    Some(if path == keys::TX_HASH {
        TxRecord::Hash(position)
    } else {
        TxRecord::Data(position)
    })
}

fn skip_corrupted(
    fetched: Result<Option<Hash>, StoreError>,
    record: &'static str,
    height: u64,
) -> Result<Option<Hash>, StoreError> {
    match fetched {
        Err(StoreError::Codec(err)) => {
            warn!(record, height, "Skipping corrupted hash: {err}");
            Ok(None)
        }
        other => other,
    }
}

impl<'a> Reader<'a> {
    pub(crate) fn new(view: Box<dyn StorageReadView + 'a>, codec: Codec, config: &'a StoreConfig) -> Self {
        Self {
            view,
            codec,
            config,
            cache: HashCache::default(),
        }
    }

    pub(crate) fn view(&self) -> &dyn StorageReadView {
        self.view.as_ref()
    }

    pub(crate) fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn config(&self) -> &StoreConfig {
        self.config
    }

    fn get_decoded<T: TinyDecode>(&self, key: &[u8]) -> Result<Option<T>, StoreError> {
        self.view
            .get(key)?
            .map(|value| self.codec.unmarshal(&value))
            .transpose()
            .map_err(StoreError::from)
    }

    /// Decodes a value met during a range walk; corrupted values are logged
    /// and skipped.
    fn decode_in_range<T: TinyDecode>(&self, key: &[u8], value: &[u8]) -> Option<T> {
        self.codec
            .unmarshal(value)
            .inspect_err(|err| warn!(key = %hex::encode(key), "Skipping corrupted record: {err}"))
            .ok()
    }

    pub(crate) fn cached_block_hash(&self, chain: u64, height: u64) -> Result<Option<Hash>, StoreError> {
        self.cache
            .get_or_fetch(keys::block_hash(chain, height)?, |key| self.get_decoded(key))
    }

    pub(crate) fn cached_tx_hash(
        &self,
        chain: u64,
        height: u64,
        tx_index: u64,
    ) -> Result<Option<Hash>, StoreError> {
        self.cache
            .get_or_fetch(keys::tx_hash(chain, height, tx_index)?, |key| self.get_decoded(key))
    }

    /// Block hash for a record met during a range walk. A corrupted hash is
    /// logged and reported as missing so the walk can skip the record.
    pub(crate) fn block_hash_in_range(&self, chain: u64, height: u64) -> Result<Option<Hash>, StoreError> {
        skip_corrupted(self.cached_block_hash(chain, height), "block", height)
    }

    /// Same as [`Reader::block_hash_in_range`] for transaction hashes.
    pub(crate) fn tx_hash_in_range(
        &self,
        chain: u64,
        height: u64,
        tx_index: u64,
    ) -> Result<Option<Hash>, StoreError> {
        skip_corrupted(self.cached_tx_hash(chain, height, tx_index), "transaction", height)
    }

    fn effective_limit(&self, limit: usize) -> usize {
        if limit == 0 {
            self.config.iteration_max_items
        } else {
            limit
        }
    }

    fn query_context(&self, ctx: &QueryContext) -> QueryContext {
        ctx.capped(Duration::from_secs(self.config.iteration_timeout_seconds))
    }

    pub fn read_block_key(&self, chain: u64, hash: &Hash) -> Result<Option<BlockKey>, StoreError> {
        self.get_decoded(&keys::block_key_by_hash(chain, hash.as_bytes())?)
    }

    pub fn read_tx_key(&self, chain: u64, hash: &Hash) -> Result<Option<TransactionKey>, StoreError> {
        self.get_decoded(&keys::tx_key_by_hash(chain, hash.as_bytes())?)
    }

    pub fn read_earliest_block_key(&self, chain: u64) -> Result<Option<BlockKey>, StoreError> {
        let options = IterOptions::forward(keys::blocks(chain)?, None);
        for item in self.view.iter(options)? {
            let (key, _) = item?;
            if let Some(height) = keys::BLOCK_HASH.read_uint_var(&key, 1) {
                return Ok(Some(BlockKey::new(height)));
            }
            warn!(key = %hex::encode(&key), "Expected a block hash key");
        }
        Ok(None)
    }

    pub fn read_latest_block_key(&self, chain: u64) -> Result<Option<BlockKey>, StoreError> {
        let options = IterOptions::reverse(
            keys::blocks(chain)?,
            Some(keys::block_hash(chain, MAX_BLOCK_HEIGHT)?),
        );
        for item in self.view.iter(options)? {
            let (key, _) = item?;
            if let Some(height) = keys::BLOCK_HASH.read_uint_var(&key, 1) {
                return Ok(Some(BlockKey::new(height)));
            }
            // Block data sorts right after its hash and is met first.
            if !keys::BLOCK_DATA.matches(&key) {
                warn!(key = %hex::encode(&key), "Expected a block key");
            }
        }
        Ok(None)
    }

    /// Reads a block with its transaction hashes, or full transactions when
    /// `full` is set.
    pub fn read_block(
        &self,
        chain: u64,
        key: BlockKey,
        full: bool,
    ) -> Result<Option<BlockResponse>, StoreError> {
        let Some(hash) = self.cached_block_hash(chain, key.height)? else {
            return Ok(None);
        };
        let block: Block = self
            .get_decoded(&keys::block_data(chain, key.height)?)?
            .ok_or_else(|| StoreError::KeyNotFound(format!("block data at height {}", key.height)))?;
        let transactions = self.read_transactions(
            &QueryContext::default(),
            chain,
            TransactionKey::new(key.height, 0),
            TransactionKey::new(key.height, MAX_TX_INDEX),
            full,
            MAX_TX_INDEX as usize + 1,
        )?;
        if let Some(interruption) = transactions.interruption {
            return Err(StoreError::Interrupted(interruption));
        }
        Ok(Some(make_block_response(key, hash, block, transactions.items)))
    }

    /// Number of transactions in the block, `None` when the block is unknown.
    pub fn read_block_tx_count(&self, chain: u64, key: BlockKey) -> Result<Option<u64>, StoreError> {
        let options = IterOptions {
            prefetch: false,
            ..IterOptions::reverse(
                keys::txs_for_block(chain, key.height)?,
                Some(keys::tx_data(chain, key.height, MAX_TX_INDEX)?),
            )
        };
        for item in self.view.iter(options)? {
            let (raw, _) = item?;
            match tx_record(&raw) {
                Some(TxRecord::Hash(position) | TxRecord::Data(position)) => {
                    return Ok(Some(position.tx_index + 1));
                }
                None => warn!(key = %hex::encode(&raw), "Expected a transaction key"),
            }
        }
        if self.view.get(&keys::block_hash(chain, key.height)?)?.is_some() {
            Ok(Some(0))
        } else {
            Ok(None)
        }
    }

    pub fn read_tx(&self, chain: u64, key: TransactionKey) -> Result<Option<TransactionResponse>, StoreError> {
        let Some((block_hash, hash, tx)) = self.read_tx_parts(chain, key)? else {
            return Ok(None);
        };
        Ok(Some(make_transaction_response(chain, key, block_hash, hash, tx)))
    }

    pub fn read_tx_receipt(
        &self,
        ctx: &QueryContext,
        chain: u64,
        key: TransactionKey,
    ) -> Result<Option<ReceiptResponse>, StoreError> {
        let Some((block_hash, hash, tx)) = self.read_tx_parts(chain, key)? else {
            return Ok(None);
        };
        let filter = LogFilter::new(
            LogKey::new(key.height, key.tx_index, 0),
            LogKey::new(key.height, key.tx_index, MAX_LOG_INDEX),
        );
        let logs = self.read_logs(ctx, chain, &filter, MAX_LOG_INDEX as usize + 1)?;
        match logs.interruption {
            None | Some(Interruption::Limited) => {}
            Some(interruption) => return Err(StoreError::Interrupted(interruption)),
        }
        Ok(Some(make_transaction_receipt_response(
            key, block_hash, hash, tx, logs.items,
        )))
    }

    fn read_tx_parts(
        &self,
        chain: u64,
        key: TransactionKey,
    ) -> Result<Option<(Hash, Hash, Transaction)>, StoreError> {
        let Some(hash) = self.cached_tx_hash(chain, key.height, key.tx_index)? else {
            return Ok(None);
        };
        let block_hash = self
            .cached_block_hash(chain, key.height)?
            .ok_or_else(|| StoreError::KeyNotFound(format!("block hash at height {}", key.height)))?;
        let tx = self
            .get_decoded(&keys::tx_data(chain, key.height, key.tx_index)?)?
            .ok_or_else(|| StoreError::KeyNotFound(format!("transaction data at {key:?}")))?;
        Ok(Some((block_hash, hash, tx)))
    }

    /// Transactions between two positions, inclusive. A zero `limit` means
    /// the configured iteration cap.
    pub fn read_transactions(
        &self,
        ctx: &QueryContext,
        chain: u64,
        from: TransactionKey,
        to: TransactionKey,
        full: bool,
        limit: usize,
    ) -> Result<Page<TxView, TransactionKey>, StoreError> {
        let ctx = self.query_context(ctx);
        let limit = self.effective_limit(limit);
        let to = if to.height > MAX_BLOCK_HEIGHT {
            TransactionKey::new(MAX_BLOCK_HEIGHT, MAX_TX_INDEX)
        } else {
            TransactionKey::new(to.height, to.tx_index.min(MAX_TX_INDEX))
        };
        let mut page = Page {
            items: Vec::new(),
            last_key: from.prev(),
            interruption: None,
        };
        if from > to {
            page.last_key = Some(to);
            return Ok(page);
        }
        let options = IterOptions::forward(
            keys::txs(chain)?,
            Some(keys::tx(chain, from.height, from.tx_index)?),
        );
        let mut pending: Option<(TransactionKey, Hash)> = None;
        for item in self.view.iter(options)? {
            if let Some(interruption) = ctx.check() {
                page.interruption = Some(interruption);
                return Ok(page);
            }
            let (raw, value) = item?;
            let Some(record) = tx_record(&raw) else {
                warn!(key = %hex::encode(&raw), "Expected a transaction key");
                continue;
            };
            let position = match &record {
                TxRecord::Hash(position) | TxRecord::Data(position) => *position,
            };
            if position > to {
                break;
            }
            // A full page is only cut short when a later transaction exists.
            if page.items.len() >= limit && page.last_key.is_some_and(|last| position > last) {
                page.interruption = Some(Interruption::Limited);
                return Ok(page);
            }
            let entry = match record {
                TxRecord::Hash(_) => {
                    let Some(hash) = self.decode_in_range::<Hash>(&raw, &value) else {
                        continue;
                    };
                    if let Some((orphan, _)) = pending.take() {
                        warn!(?orphan, "Transaction hash without data");
                    }
                    if full {
                        pending = Some((position, hash));
                        continue;
                    }
                    TxView::Hash(hash)
                }
                TxRecord::Data(_) => {
                    if !full {
                        continue;
                    }
                    let hash = match pending.take() {
                        Some((hashed, hash)) if hashed == position => hash,
                        _ => {
                            warn!(error = %StoreError::schema_mismatch("TxHash", &raw), "Skipping transaction");
                            continue;
                        }
                    };
                    let Some(tx) = self.decode_in_range::<Transaction>(&raw, &value) else {
                        continue;
                    };
                    let Some(block_hash) = self.block_hash_in_range(chain, position.height)? else {
                        warn!(?position, "Skipping transaction without a readable block hash");
                        continue;
                    };
                    let response = make_transaction_response(chain, position, block_hash, hash, tx);
                    TxView::Full(Box::new(response))
                }
            };
            page.items.push(entry);
            page.last_key = Some(position);
        }
        page.last_key = Some(to);
        Ok(page)
    }

    /// Block hashes between two heights, inclusive. A zero `limit` means the
    /// configured iteration cap.
    pub fn read_block_hashes(
        &self,
        ctx: &QueryContext,
        chain: u64,
        from: BlockKey,
        to: BlockKey,
        limit: usize,
    ) -> Result<Page<Hash, BlockKey>, StoreError> {
        let ctx = self.query_context(ctx);
        let limit = self.effective_limit(limit);
        let to = BlockKey::new(to.height.min(MAX_BLOCK_HEIGHT));
        let mut page = Page {
            items: Vec::new(),
            last_key: from.prev(),
            interruption: None,
        };
        if from > to {
            page.last_key = Some(to);
            return Ok(page);
        }
        let options = IterOptions::forward(keys::blocks(chain)?, Some(keys::block(chain, from.height)?));
        for item in self.view.iter(options)? {
            if let Some(interruption) = ctx.check() {
                page.interruption = Some(interruption);
                return Ok(page);
            }
            let (raw, value) = item?;
            let Some(height) = keys::BLOCK_HASH.read_uint_var(&raw, 1) else {
                if !keys::BLOCK_DATA.matches(&raw) {
                    warn!(key = %hex::encode(&raw), "Expected a block key");
                }
                continue;
            };
            if height > to.height {
                break;
            }
            if page.items.len() >= limit {
                page.interruption = Some(Interruption::Limited);
                return Ok(page);
            }
            let Some(hash) = self.decode_in_range::<Hash>(&raw, &value) else {
                continue;
            };
            page.items.push(hash);
            page.last_key = Some(BlockKey::new(height));
        }
        page.last_key = Some(to);
        Ok(page)
    }

    /// Logs matching `filter`, in position order. A zero `limit` means the
    /// configured iteration cap.
    pub fn read_logs(
        &self,
        ctx: &QueryContext,
        chain: u64,
        filter: &LogFilter,
        limit: usize,
    ) -> Result<Page<LogResponse, LogKey>, StoreError> {
        let ctx = self.query_context(ctx);
        logscan::read_logs(self, &ctx, chain, filter, self.effective_limit(limit))
    }

    pub fn read_indexer_state(&self) -> Result<Option<Vec<u8>>, StoreError> {
        self.view.get(&keys::indexer_state())
    }
}
