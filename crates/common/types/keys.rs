//! Positional keys for blocks, transactions and logs.
//!
//! Heights are stored in 4 bytes and transaction/log indexes in 2 bytes each,
//! so the cursor arithmetic on [`LogKey`] stays inside those widths.

use relayer_tinypack::{Decoder, Encoder, Reader, TinyDecode, TinyEncode, TinypackError};
use serde::{Deserialize, Serialize};

pub const MAX_BLOCK_HEIGHT: u64 = u32::MAX as u64;
pub const MAX_TX_INDEX: u64 = u16::MAX as u64;
pub const MAX_LOG_INDEX: u64 = u16::MAX as u64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockKey {
    pub height: u64,
}

impl BlockKey {
    pub const fn new(height: u64) -> Self {
        Self { height }
    }

    pub fn next(&self) -> Option<BlockKey> {
        (self.height < MAX_BLOCK_HEIGHT).then(|| BlockKey::new(self.height + 1))
    }

    pub fn prev(&self) -> Option<BlockKey> {
        self.height.checked_sub(1).map(BlockKey::new)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionKey {
    pub height: u64,
    pub tx_index: u64,
}

impl TransactionKey {
    pub const fn new(height: u64, tx_index: u64) -> Self {
        Self { height, tx_index }
    }

    pub const fn block_key(&self) -> BlockKey {
        BlockKey::new(self.height)
    }

    /// Following position, or `None` past the last representable one.
    pub fn next(&self) -> Option<TransactionKey> {
        if self.tx_index < MAX_TX_INDEX {
            Some(TransactionKey::new(self.height, self.tx_index + 1))
        } else if self.height < MAX_BLOCK_HEIGHT {
            Some(TransactionKey::new(self.height + 1, 0))
        } else {
            None
        }
    }

    /// Preceding position, or `None` before `(0, 0)`.
    pub fn prev(&self) -> Option<TransactionKey> {
        if self.tx_index > 0 {
            Some(TransactionKey::new(self.height, self.tx_index - 1))
        } else if self.height > 0 {
            Some(TransactionKey::new(self.height - 1, MAX_TX_INDEX))
        } else {
            None
        }
    }
}

/// Position of a log. Ordering is lexicographic over
/// `(height, tx_index, log_index)`, matching the storage key order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogKey {
    pub height: u64,
    pub tx_index: u64,
    pub log_index: u64,
}

impl LogKey {
    pub const MIN: LogKey = LogKey::new(0, 0, 0);
    pub const MAX: LogKey = LogKey::new(MAX_BLOCK_HEIGHT, MAX_TX_INDEX, MAX_LOG_INDEX);

    pub const fn new(height: u64, tx_index: u64, log_index: u64) -> Self {
        Self {
            height,
            tx_index,
            log_index,
        }
    }

    pub const fn block_key(&self) -> BlockKey {
        BlockKey::new(self.height)
    }

    pub const fn tx_key(&self) -> TransactionKey {
        TransactionKey::new(self.height, self.tx_index)
    }

    /// Following position, or `None` past [`LogKey::MAX`].
    pub fn next(&self) -> Option<LogKey> {
        if self.log_index < MAX_LOG_INDEX {
            Some(LogKey::new(self.height, self.tx_index, self.log_index + 1))
        } else if self.tx_index < MAX_TX_INDEX {
            Some(LogKey::new(self.height, self.tx_index + 1, 0))
        } else if self.height < MAX_BLOCK_HEIGHT {
            Some(LogKey::new(self.height + 1, 0, 0))
        } else {
            None
        }
    }

    /// Preceding position, or `None` before [`LogKey::MIN`].
    pub fn prev(&self) -> Option<LogKey> {
        if self.log_index > 0 {
            Some(LogKey::new(self.height, self.tx_index, self.log_index - 1))
        } else if self.tx_index > 0 {
            Some(LogKey::new(self.height, self.tx_index - 1, MAX_LOG_INDEX))
        } else if self.height > 0 {
            Some(LogKey::new(self.height - 1, MAX_TX_INDEX, MAX_LOG_INDEX))
        } else {
            None
        }
    }
}

impl TinyEncode for BlockKey {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), TinypackError> {
        Encoder::new(buf, "BlockKey")
            .encode_field("height", &self.height)
            .finish()
    }
}

impl TinyDecode for BlockKey {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, TinypackError> {
        let mut decoder = Decoder::new(reader, "BlockKey");
        Ok(BlockKey {
            height: decoder.decode_field("height")?,
        })
    }
}

impl TinyEncode for TransactionKey {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), TinypackError> {
        Encoder::new(buf, "TransactionKey")
            .encode_field("height", &self.height)
            .encode_field("txIndex", &self.tx_index)
            .finish()
    }
}

impl TinyDecode for TransactionKey {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, TinypackError> {
        let mut decoder = Decoder::new(reader, "TransactionKey");
        Ok(TransactionKey {
            height: decoder.decode_field("height")?,
            tx_index: decoder.decode_field("txIndex")?,
        })
    }
}
