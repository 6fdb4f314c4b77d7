//! Key layout of the archive.
//!
//! Every key is built from a [`Path`]: constant tag bytes interleaved with
//! fixed-width big-endian variables, so byte order equals the order of the
//! variables. Chain data lives under tag `0`, the indexer state under `1`.
//!
//! Values stored under each path:
//! - [`BLOCK_HASH`] => packed [`Hash`](relayer_common::Hash)
//! - [`BLOCK_DATA`] => packed [`Block`](relayer_common::Block)
//! - [`BLOCK_KEY_BY_HASH`] => packed [`BlockKey`](relayer_common::BlockKey)
//! - [`TX_HASH`] => packed `Hash`
//! - [`TX_DATA`] => packed [`Transaction`](relayer_common::Transaction)
//! - [`TX_KEY_BY_HASH`] => packed [`TransactionKey`](relayer_common::TransactionKey)
//! - [`LOG`] => packed [`Log`](relayer_common::Log)
//! - [`LOG_SCAN_INDEX`] => packed index parameters of the chain
//! - [`LOG_SCAN_ENTRY`] => `[1]`
//! - [`INDEXER_STATE`] => opaque bytes owned by the ingester

use relayer_common::{LogKey, MAX_BLOCK_HEIGHT, MAX_LOG_INDEX, MAX_TX_INDEX};

use crate::error::StoreError;

pub const CHAIN_WIDTH: usize = 8;
pub const HEIGHT_WIDTH: usize = 4;
pub const TX_INDEX_WIDTH: usize = 2;
pub const LOG_INDEX_WIDTH: usize = 2;
pub const HASH_WIDTH: usize = 32;
/// Truncated keccak of the indexed features.
pub const FEATURE_HASH_WIDTH: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Tag(u8),
    Uint { name: &'static str, width: usize },
    Bytes { name: &'static str, len: usize },
}

impl Segment {
    const fn len(&self) -> usize {
        match self {
            Segment::Tag(_) => 1,
            Segment::Uint { width, .. } => *width,
            Segment::Bytes { len, .. } => *len,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arg<'a> {
    Uint(u64),
    Bytes(&'a [u8]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Path {
    pub name: &'static str,
    pub segments: &'static [Segment],
}

const T0: Segment = Segment::Tag(0);
const T1: Segment = Segment::Tag(1);
const T2: Segment = Segment::Tag(2);
const T3: Segment = Segment::Tag(3);
const T4: Segment = Segment::Tag(4);
const T5: Segment = Segment::Tag(5);
const C: Segment = Segment::Uint {
    name: "chain",
    width: CHAIN_WIDTH,
};
const H: Segment = Segment::Uint {
    name: "height",
    width: HEIGHT_WIDTH,
};
const I: Segment = Segment::Uint {
    name: "txIndex",
    width: TX_INDEX_WIDTH,
};
const J: Segment = Segment::Uint {
    name: "logIndex",
    width: LOG_INDEX_WIDTH,
};
const HASH: Segment = Segment::Bytes {
    name: "hash",
    len: HASH_WIDTH,
};
const FEATURE_HASH: Segment = Segment::Bytes {
    name: "featureHash",
    len: FEATURE_HASH_WIDTH,
};
const BITMASK: Segment = Segment::Uint {
    name: "bitmask",
    width: 1,
};

macro_rules! path {
    ($name:ident, [$($segment:expr),* $(,)?]) => {
        pub const $name: Path = Path {
            name: stringify!($name),
            segments: &[$($segment),*],
        };
    };
}

path!(CHAINS, [T0]);
path!(CHAIN, [T0, C]);
path!(BLOCKS, [T0, C, T0]);
path!(BLOCK, [T0, C, T0, H]);
path!(BLOCK_HASH, [T0, C, T0, H, T0]);
path!(BLOCK_DATA, [T0, C, T0, H, T1]);
path!(BLOCK_KEY_BY_HASH, [T0, C, T1, HASH]);
path!(TXS, [T0, C, T2]);
path!(TXS_FOR_BLOCK, [T0, C, T2, H]);
path!(TX, [T0, C, T2, H, I]);
path!(TX_HASH, [T0, C, T2, H, I, T0]);
path!(TX_DATA, [T0, C, T2, H, I, T1]);
path!(TX_KEY_BY_HASH, [T0, C, T3, HASH]);
path!(LOGS, [T0, C, T4]);
path!(LOGS_FOR_BLOCK, [T0, C, T4, H]);
path!(LOGS_FOR_TX, [T0, C, T4, H, I]);
path!(LOG, [T0, C, T4, H, I, J]);
path!(LOG_SCAN_INDEX, [T0, C, T5]);
path!(LOG_SCAN_FEATURE, [T0, C, T5, FEATURE_HASH, BITMASK]);
path!(LOG_SCAN_ENTRY, [T0, C, T5, FEATURE_HASH, BITMASK, H, I, J]);
path!(INDEXER_STATE, [T1]);

impl Path {
    /// Total key length in bytes.
    pub fn len(&self) -> usize {
        self.segments.iter().map(Segment::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Builds the key from one argument per variable segment.
    pub fn get(&self, args: &[Arg<'_>]) -> Result<Vec<u8>, StoreError> {
        let mut key = Vec::with_capacity(self.len());
        let mut args = args.iter();
        for segment in self.segments {
            if let Segment::Tag(tag) = segment {
                key.push(*tag);
                continue;
            }
            match (segment, args.next()) {
                (Segment::Uint { name, width }, Some(Arg::Uint(value))) => {
                    if *width < 8 && *value >> (width * 8) != 0 {
                        return Err(StoreError::KeyOutOfRange {
                            field: *name,
                            value: *value,
                        });
                    }
                    key.extend_from_slice(&value.to_be_bytes()[8 - width..]);
                }
                (Segment::Bytes { len, .. }, Some(Arg::Bytes(bytes))) if bytes.len() == *len => {
                    key.extend_from_slice(bytes);
                }
                (segment, arg) => {
                    return Err(StoreError::Custom(format!(
                        "{}: argument {arg:?} does not fit segment {segment:?}",
                        self.name
                    )));
                }
            }
        }
        if args.next().is_some() {
            return Err(StoreError::Custom(format!(
                "{}: too many key arguments",
                self.name
            )));
        }
        Ok(key)
    }

    /// Whether `key` has exactly this path's shape.
    pub fn matches(&self, key: &[u8]) -> bool {
        if key.len() != self.len() {
            return false;
        }
        let mut offset = 0;
        for segment in self.segments {
            if let Segment::Tag(tag) = segment {
                if key[offset] != *tag {
                    return false;
                }
            }
            offset += segment.len();
        }
        true
    }

    /// Reads the `index`-th variable of a matching key as an integer.
    pub fn read_uint_var(&self, key: &[u8], index: usize) -> Option<u64> {
        let (segment, bytes) = self.var(key, index)?;
        match segment {
            Segment::Uint { .. } => Some(
                bytes
                    .iter()
                    .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte)),
            ),
            _ => None,
        }
    }

    /// Reads the `index`-th variable of a matching key as raw bytes.
    pub fn read_bytes_var<'k>(&self, key: &'k [u8], index: usize) -> Option<&'k [u8]> {
        self.var(key, index).map(|(_, bytes)| bytes)
    }

    fn var<'k>(&self, key: &'k [u8], index: usize) -> Option<(Segment, &'k [u8])> {
        if !self.matches(key) {
            return None;
        }
        let mut offset = 0;
        let mut seen = 0;
        for segment in self.segments {
            let len = segment.len();
            if !matches!(segment, Segment::Tag(_)) {
                if seen == index {
                    return Some((*segment, &key[offset..offset + len]));
                }
                seen += 1;
            }
            offset += len;
        }
        None
    }
}

pub fn chain(chain: u64) -> Result<Vec<u8>, StoreError> {
    CHAIN.get(&[Arg::Uint(chain)])
}

pub fn blocks(chain: u64) -> Result<Vec<u8>, StoreError> {
    BLOCKS.get(&[Arg::Uint(chain)])
}

pub fn block(chain: u64, height: u64) -> Result<Vec<u8>, StoreError> {
    BLOCK.get(&[Arg::Uint(chain), Arg::Uint(height)])
}

pub fn block_hash(chain: u64, height: u64) -> Result<Vec<u8>, StoreError> {
    BLOCK_HASH.get(&[Arg::Uint(chain), Arg::Uint(height)])
}

pub fn block_data(chain: u64, height: u64) -> Result<Vec<u8>, StoreError> {
    BLOCK_DATA.get(&[Arg::Uint(chain), Arg::Uint(height)])
}

pub fn block_key_by_hash(chain: u64, hash: &[u8]) -> Result<Vec<u8>, StoreError> {
    BLOCK_KEY_BY_HASH.get(&[Arg::Uint(chain), Arg::Bytes(hash)])
}

pub fn txs(chain: u64) -> Result<Vec<u8>, StoreError> {
    TXS.get(&[Arg::Uint(chain)])
}

pub fn txs_for_block(chain: u64, height: u64) -> Result<Vec<u8>, StoreError> {
    TXS_FOR_BLOCK.get(&[Arg::Uint(chain), Arg::Uint(height)])
}

pub fn tx(chain: u64, height: u64, tx_index: u64) -> Result<Vec<u8>, StoreError> {
    TX.get(&[Arg::Uint(chain), Arg::Uint(height), Arg::Uint(tx_index)])
}

pub fn tx_hash(chain: u64, height: u64, tx_index: u64) -> Result<Vec<u8>, StoreError> {
    TX_HASH.get(&[Arg::Uint(chain), Arg::Uint(height), Arg::Uint(tx_index)])
}

pub fn tx_data(chain: u64, height: u64, tx_index: u64) -> Result<Vec<u8>, StoreError> {
    TX_DATA.get(&[Arg::Uint(chain), Arg::Uint(height), Arg::Uint(tx_index)])
}

pub fn tx_key_by_hash(chain: u64, hash: &[u8]) -> Result<Vec<u8>, StoreError> {
    TX_KEY_BY_HASH.get(&[Arg::Uint(chain), Arg::Bytes(hash)])
}

pub fn logs(chain: u64) -> Result<Vec<u8>, StoreError> {
    LOGS.get(&[Arg::Uint(chain)])
}

pub fn logs_for_tx(chain: u64, height: u64, tx_index: u64) -> Result<Vec<u8>, StoreError> {
    LOGS_FOR_TX.get(&[Arg::Uint(chain), Arg::Uint(height), Arg::Uint(tx_index)])
}

pub fn log(chain: u64, key: &LogKey) -> Result<Vec<u8>, StoreError> {
    LOG.get(&[
        Arg::Uint(chain),
        Arg::Uint(key.height),
        Arg::Uint(key.tx_index),
        Arg::Uint(key.log_index),
    ])
}

/// Where the chain's index parameters are kept. Shorter than every
/// [`LOG_SCAN_ENTRY`] key, so feature prefixes never cover it.
pub fn log_scan_params(chain: u64) -> Result<Vec<u8>, StoreError> {
    LOG_SCAN_INDEX.get(&[Arg::Uint(chain)])
}

pub fn log_scan_feature(chain: u64, feature_hash: &[u8], bitmask: u8) -> Result<Vec<u8>, StoreError> {
    LOG_SCAN_FEATURE.get(&[
        Arg::Uint(chain),
        Arg::Bytes(feature_hash),
        Arg::Uint(u64::from(bitmask)),
    ])
}

pub fn log_scan_entry(
    chain: u64,
    feature_hash: &[u8],
    bitmask: u8,
    key: &LogKey,
) -> Result<Vec<u8>, StoreError> {
    LOG_SCAN_ENTRY.get(&[
        Arg::Uint(chain),
        Arg::Bytes(feature_hash),
        Arg::Uint(u64::from(bitmask)),
        Arg::Uint(key.height),
        Arg::Uint(key.tx_index),
        Arg::Uint(key.log_index),
    ])
}

pub fn indexer_state() -> Vec<u8> {
    vec![1]
}

/// Decodes the position from a [`LOG`] key.
pub fn read_log_key(key: &[u8]) -> Option<LogKey> {
    Some(LogKey::new(
        LOG.read_uint_var(key, 1)?,
        LOG.read_uint_var(key, 2)?,
        LOG.read_uint_var(key, 3)?,
    ))
}

/// Decodes the position from a [`LOG_SCAN_ENTRY`] key.
pub fn read_log_scan_entry_key(key: &[u8]) -> Option<LogKey> {
    Some(LogKey::new(
        LOG_SCAN_ENTRY.read_uint_var(key, 3)?,
        LOG_SCAN_ENTRY.read_uint_var(key, 4)?,
        LOG_SCAN_ENTRY.read_uint_var(key, 5)?,
    ))
}

/// Largest representable position not above `key`.
pub fn clamp_log_key(key: LogKey) -> LogKey {
    if key.height > MAX_BLOCK_HEIGHT {
        LogKey::MAX
    } else if key.tx_index > MAX_TX_INDEX {
        LogKey::new(key.height, MAX_TX_INDEX, MAX_LOG_INDEX)
    } else {
        LogKey::new(key.height, key.tx_index, key.log_index.min(MAX_LOG_INDEX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use proptest::prelude::*;

    const CHAIN_ID: u64 = 88005553535;

    #[test]
    fn block_hash_layout() {
        let key = block_hash(1, 0x0102).unwrap();
        assert_eq!(key, hex!("00 0000000000000001 00 00000102 00").to_vec());
        assert!(BLOCK_HASH.matches(&key));
        assert!(!BLOCK_DATA.matches(&key));
        assert_eq!(BLOCK_HASH.read_uint_var(&key, 0), Some(1));
        assert_eq!(BLOCK_HASH.read_uint_var(&key, 1), Some(0x0102));
        assert_eq!(BLOCK_HASH.read_uint_var(&key, 2), None);
    }

    #[test]
    fn hash_keys_carry_the_hash() {
        let hash = [0xab; 32];
        let key = tx_key_by_hash(CHAIN_ID, &hash).unwrap();
        assert_eq!(key.len(), 1 + 8 + 1 + 32);
        assert_eq!(TX_KEY_BY_HASH.read_bytes_var(&key, 1), Some(&hash[..]));
        assert!(tx_key_by_hash(CHAIN_ID, &hash[..31]).is_err());
    }

    #[test]
    fn out_of_range_variables_are_rejected() {
        assert!(matches!(
            block(CHAIN_ID, MAX_BLOCK_HEIGHT + 1),
            Err(StoreError::KeyOutOfRange { field: "height", .. })
        ));
        assert!(matches!(
            tx(CHAIN_ID, 1, MAX_TX_INDEX + 1),
            Err(StoreError::KeyOutOfRange { field: "txIndex", .. })
        ));
    }

    #[test]
    fn wrong_argument_count_is_an_error() {
        assert!(BLOCK.get(&[Arg::Uint(1)]).is_err());
        assert!(BLOCK.get(&[Arg::Uint(1), Arg::Uint(2), Arg::Uint(3)]).is_err());
    }

    #[test]
    fn chains_nest_their_children() {
        let next_chain_blocks = blocks(CHAIN_ID + 1).unwrap();
        let blocks_prefix = blocks(CHAIN_ID).unwrap();
        let child = block_data(CHAIN_ID, MAX_BLOCK_HEIGHT).unwrap();
        assert!(blocks_prefix < child);
        assert!(child < next_chain_blocks);
        assert!(child.starts_with(&chain(CHAIN_ID).unwrap()));
    }

    #[test]
    fn data_sorts_after_hash_for_same_position() {
        assert!(block_hash(CHAIN_ID, 5).unwrap() < block_data(CHAIN_ID, 5).unwrap());
        assert!(block_data(CHAIN_ID, 5).unwrap() < block_hash(CHAIN_ID, 6).unwrap());
        assert!(tx_hash(CHAIN_ID, 5, 1).unwrap() < tx_data(CHAIN_ID, 5, 1).unwrap());
    }

    #[test]
    fn log_key_roundtrip() {
        let key = LogKey::new(104, 1, 3);
        assert_eq!(read_log_key(&log(CHAIN_ID, &key).unwrap()), Some(key));
        let entry = log_scan_entry(CHAIN_ID, &[1, 2, 3, 4, 5], 0b11, &key).unwrap();
        assert!(entry.starts_with(&log_scan_feature(CHAIN_ID, &[1, 2, 3, 4, 5], 0b11).unwrap()));
        assert_eq!(read_log_scan_entry_key(&entry), Some(key));
    }

    fn arb_position() -> impl Strategy<Value = LogKey> {
        (0..=MAX_BLOCK_HEIGHT, 0..=MAX_TX_INDEX, 0..=MAX_LOG_INDEX)
            .prop_map(|(h, i, j)| LogKey::new(h, i, j))
    }

    proptest! {
        #[test]
        fn log_keys_sort_like_positions(a in arb_position(), b in arb_position()) {
            let ka = log(CHAIN_ID, &a).unwrap();
            let kb = log(CHAIN_ID, &b).unwrap();
            prop_assert_eq!(a.cmp(&b), ka.cmp(&kb));
        }
    }

    #[test]
    fn clamping_keeps_every_position_below_the_bound() {
        assert_eq!(clamp_log_key(LogKey::new(MAX_BLOCK_HEIGHT + 1, 0, 0)), LogKey::MAX);
        assert_eq!(
            clamp_log_key(LogKey::new(7, MAX_TX_INDEX + 1, 0)),
            LogKey::new(7, MAX_TX_INDEX, MAX_LOG_INDEX)
        );
        assert_eq!(
            clamp_log_key(LogKey::new(7, 1, MAX_LOG_INDEX + 9)),
            LogKey::new(7, 1, MAX_LOG_INDEX)
        );
    }
}
