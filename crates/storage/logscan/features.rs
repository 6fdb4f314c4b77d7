//! Hash features for the log scan index.
//!
//! Feature 0 is the log address, feature `t + 1` is topic `t`. A bitmask
//! selects a combination of features; the index key for that combination is
//! the truncated keccak of the selected features in ascending bit order
//! followed by the bitmask byte.

use relayer_common::{Log, utils::keccak_concat};
use relayer_tinypack::{Decoder, Encoder, Reader, TinyDecode, TinyEncode, TinypackError};

use crate::{api::keys::FEATURE_HASH_WIDTH, config::LogScanConfig};

pub type FeatureHash = [u8; FEATURE_HASH_WIDTH];

/// Settings the index entries of a chain were written with.
///
/// The writer records them with the first log of a chain. Once logs of one
/// chain are written under different settings the record is reset to
/// [`IndexParams::DISABLED`] and stays there, since the index no longer
/// covers every log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexParams {
    pub enabled: bool,
    pub max_indexed_topics: u64,
    pub max_indexed_features: u64,
}

impl IndexParams {
    pub const DISABLED: Self = Self {
        enabled: false,
        max_indexed_topics: 0,
        max_indexed_features: 0,
    };

    pub fn from_config(settings: &LogScanConfig) -> Self {
        if !settings.feature_index {
            return Self::DISABLED;
        }
        Self {
            enabled: true,
            max_indexed_topics: settings.max_indexed_topics as u64,
            max_indexed_features: u64::from(settings.max_indexed_features),
        }
    }
}

impl TinyEncode for IndexParams {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), TinypackError> {
        Encoder::new(buf, "IndexParams")
            .encode_field("enabled", &self.enabled)
            .encode_field("maxIndexedTopics", &self.max_indexed_topics)
            .encode_field("maxIndexedFeatures", &self.max_indexed_features)
            .finish()
    }
}

impl TinyDecode for IndexParams {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, TinypackError> {
        let mut decoder = Decoder::new(reader, "IndexParams");
        Ok(IndexParams {
            enabled: decoder.decode_field("enabled")?,
            max_indexed_topics: decoder.decode_field("maxIndexedTopics")?,
            max_indexed_features: decoder.decode_field("maxIndexedFeatures")?,
        })
    }
}

pub fn feature_hash(features: &[&[u8]], bitmask: u8) -> FeatureHash {
    let tag = [bitmask];
    let digest = keccak_concat(features.iter().copied().chain([&tag[..]]));
    let mut hash = [0u8; FEATURE_HASH_WIDTH];
    hash.copy_from_slice(&digest.as_bytes()[..FEATURE_HASH_WIDTH]);
    hash
}

fn selected<'a>(features: &[&'a [u8]], bitmask: u8) -> Vec<&'a [u8]> {
    features
        .iter()
        .enumerate()
        .filter(|(bit, _)| bitmask & (1 << bit) != 0)
        .map(|(_, feature)| *feature)
        .collect()
}

/// Index entries for `log`: one per non-empty combination of at most
/// `max_features` of its address and first `max_topics` topics.
pub fn index_entries(log: &Log, max_topics: usize, max_features: u32) -> Vec<(FeatureHash, u8)> {
    let mut features: Vec<&[u8]> = vec![log.address.as_bytes()];
    features.extend(log.topics.iter().take(max_topics).map(|t| t.as_bytes()));
    let count = features.len().min(8);
    (1..(1u16 << count))
        .filter_map(|mask| u8::try_from(mask).ok())
        .filter(|mask| mask.count_ones() <= max_features)
        .map(|mask| (feature_hash(&selected(&features, mask), mask), mask))
        .collect()
}

/// Picks the feature combination used to query the index.
///
/// `set_sizes[f]` is the number of accepted values for feature `f`. The
/// chosen bitmask includes as many features as possible, then has the
/// smallest number of value combinations, then the lowest value. Features
/// with no accepted values cannot be included, and the number of
/// combinations may not exceed `max_iterators`. Returns 0 when no bitmask
/// qualifies.
pub fn select_bitmask(set_sizes: &[usize], max_iterators: usize, max_features: u32) -> u8 {
    let count = set_sizes.len().min(8);
    let mut best: Option<(u32, usize, u8)> = None;
    for mask in (1..(1u16 << count)).filter_map(|mask| u8::try_from(mask).ok()) {
        let bits = mask.count_ones();
        if bits > max_features {
            continue;
        }
        let mut product = 1usize;
        let mut viable = true;
        for (bit, size) in set_sizes.iter().take(count).enumerate() {
            if mask & (1 << bit) == 0 {
                continue;
            }
            match product.checked_mul(*size) {
                Some(p) if *size > 0 && p <= max_iterators => product = p,
                _ => {
                    viable = false;
                    break;
                }
            }
        }
        if !viable {
            continue;
        }
        let better = match best {
            None => true,
            Some((best_bits, best_product, _)) => {
                bits > best_bits || (bits == best_bits && product < best_product)
            }
        };
        if better {
            best = Some((bits, product, mask));
        }
    }
    best.map_or(0, |(_, _, mask)| mask)
}

/// Index hashes of every value combination allowed by `sets` under `bitmask`.
pub fn query_hashes(sets: &[Vec<&[u8]>], bitmask: u8) -> Vec<FeatureHash> {
    let mut combos: Vec<Vec<&[u8]>> = vec![Vec::new()];
    for (bit, set) in sets.iter().enumerate().take(8) {
        if bitmask & (1 << bit) == 0 {
            continue;
        }
        combos = combos
            .into_iter()
            .flat_map(|prefix| {
                set.iter().map(move |value| {
                    let mut combo = prefix.clone();
                    combo.push(*value);
                    combo
                })
            })
            .collect();
    }
    combos
        .iter()
        .map(|combo| feature_hash(combo, bitmask))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use relayer_common::{Address, Hash};

    #[test]
    fn prefers_more_features() {
        assert_eq!(select_bitmask(&[3, 2, 0], 10_000, 2), 0b011);
        assert_eq!(select_bitmask(&[1, 1, 1], 10_000, 3), 0b111);
    }

    #[test]
    fn prefers_smaller_product_among_equal_counts() {
        assert_eq!(select_bitmask(&[10, 2, 3], 10_000, 2), 0b110);
    }

    #[test]
    fn ties_pick_lowest_mask() {
        assert_eq!(select_bitmask(&[2, 2, 2], 10_000, 2), 0b011);
    }

    #[test]
    fn respects_iterator_cap() {
        assert_eq!(select_bitmask(&[100, 200], 10_000, 2), 0b01);
        assert_eq!(select_bitmask(&[20_000, 200], 10_000, 2), 0b10);
        assert_eq!(select_bitmask(&[20_000, 0], 10_000, 2), 0);
    }

    #[test]
    fn empty_sets_yield_no_mask() {
        assert_eq!(select_bitmask(&[0, 0, 0], 10_000, 2), 0);
        assert_eq!(select_bitmask(&[], 10_000, 2), 0);
    }

    #[test]
    fn query_hash_matches_indexed_entry() {
        let address = Address::new([1; 20]);
        let topic = Hash::new([2; 32]);
        let log = Log {
            address,
            topics: vec![topic],
            ..Default::default()
        };
        let entries = index_entries(&log, 4, 2);
        assert_eq!(entries.len(), 3);
        let other = [3u8; 20];
        let sets = vec![vec![address.as_bytes(), &other[..]], vec![topic.as_bytes()]];
        let hashes = query_hashes(&sets, 0b11);
        assert_eq!(hashes.len(), 2);
        assert!(entries.contains(&(hashes[0], 0b11)));
        assert!(!entries.contains(&(hashes[1], 0b11)));
    }

    #[test]
    fn topics_past_limit_are_not_indexed() {
        let log = Log {
            topics: vec![Hash::zero(); 4],
            ..Default::default()
        };
        assert_eq!(index_entries(&log, 1, 2).len(), 3);
        // 5 features, all singles and pairs
        assert_eq!(index_entries(&log, 4, 2).len(), 5 + 10);
    }

    #[test]
    fn params_follow_the_index_flag() {
        let mut settings = LogScanConfig::default();
        let params = IndexParams::from_config(&settings);
        assert!(params.enabled);
        assert_eq!(params.max_indexed_topics, 4);
        settings.max_indexed_topics = 1;
        assert_ne!(IndexParams::from_config(&settings), params);
        settings.feature_index = false;
        assert_eq!(IndexParams::from_config(&settings), IndexParams::DISABLED);
    }
}
