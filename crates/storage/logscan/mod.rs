//! Filtered log scans over a position range.
//!
//! Narrow height ranges are scanned linearly. Wide ranges use the hash
//! feature index when the chain's index was written with the current index
//! settings and the filter selects a small enough set of feature
//! combinations. Candidates from either strategy go through the same filter,
//! so both return the same logs.

pub mod features;
mod pipeline;
mod source;

use relayer_common::{Address, Hash, Log, LogKey};
use tracing::{debug, warn};

use crate::{
    api::keys,
    context::{Page, QueryContext},
    error::StoreError,
    reader::Reader,
    response::LogResponse,
};

pub(crate) use source::ScanPlan;

/// Address and topic constraints over an inclusive position range.
///
/// A log matches when its address is in `addresses` (or `addresses` is
/// empty) and, for every position `i` with a non-empty `topics[i]`, its
/// topic `i` exists and is in `topics[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    pub from: LogKey,
    pub to: LogKey,
    pub addresses: Vec<Address>,
    pub topics: Vec<Vec<Hash>>,
}

impl LogFilter {
    pub fn new(from: LogKey, to: LogKey) -> Self {
        Self {
            from,
            to,
            ..Default::default()
        }
    }

    pub fn with_addresses(mut self, addresses: impl IntoIterator<Item = Address>) -> Self {
        self.addresses = addresses.into_iter().collect();
        self
    }

    pub fn with_topics(mut self, topics: Vec<Vec<Hash>>) -> Self {
        self.topics = topics;
        self
    }

    /// Sorted, deduplicated sets with trailing wildcard positions removed.
    pub fn normalized(&self) -> Self {
        let mut filter = self.clone();
        filter.addresses.sort_unstable();
        filter.addresses.dedup();
        for set in &mut filter.topics {
            set.sort_unstable();
            set.dedup();
        }
        while filter.topics.last().is_some_and(Vec::is_empty) {
            filter.topics.pop();
        }
        filter
    }

    pub fn matches(&self, log: &Log) -> bool {
        if !self.addresses.is_empty() && !self.addresses.contains(&log.address) {
            return false;
        }
        self.topics.iter().enumerate().all(|(position, set)| {
            set.is_empty() || log.topics.get(position).is_some_and(|topic| set.contains(topic))
        })
    }

    /// Accepted values per feature: addresses, then the first `max_topics`
    /// topic positions.
    fn feature_sets(&self, max_topics: usize) -> Vec<Vec<&[u8]>> {
        let mut sets: Vec<Vec<&[u8]>> = vec![self.addresses.iter().map(|a| a.as_bytes()).collect()];
        sets.extend(
            self.topics
                .iter()
                .take(max_topics)
                .map(|set| set.iter().map(|t| t.as_bytes()).collect()),
        );
        sets
    }
}

/// Whether the chain's index entries were all written with the current
/// index settings.
fn index_usable(reader: &Reader<'_>, chain: u64) -> Result<bool, StoreError> {
    let current = features::IndexParams::from_config(&reader.config().log_scan);
    if !current.enabled {
        return Ok(false);
    }
    let Some(data) = reader.view().get(&keys::log_scan_params(chain)?)? else {
        return Ok(false);
    };
    match reader.codec().unmarshal::<features::IndexParams>(&data) {
        Ok(stored) => Ok(stored == current),
        Err(err) => {
            warn!(chain, "Ignoring corrupted log index parameters: {err}");
            Ok(false)
        }
    }
}

fn plan(
    reader: &Reader<'_>,
    chain: u64,
    filter: &LogFilter,
    from: LogKey,
    to: LogKey,
) -> Result<ScanPlan, StoreError> {
    let settings = &reader.config().log_scan;
    let span = to.height.saturating_sub(from.height);
    if span <= settings.range_threshold {
        debug!(span, "Scanning logs linearly");
        return Ok(ScanPlan::Linear { from, to });
    }
    if !index_usable(reader, chain)? {
        debug!(span, chain, "Feature index unavailable, scanning logs linearly");
        return Ok(ScanPlan::Linear { from, to });
    }
    let sets = filter.feature_sets(settings.max_indexed_topics);
    let sizes: Vec<usize> = sets.iter().map(Vec::len).collect();
    let bitmask = features::select_bitmask(
        &sizes,
        settings.max_iterators,
        settings.max_indexed_features,
    );
    if bitmask == 0 {
        debug!(span, "No viable feature bitmask, scanning logs linearly");
        return Ok(ScanPlan::Linear { from, to });
    }
    let hashes = features::query_hashes(&sets, bitmask);
    debug!(span, bitmask, iterators = hashes.len(), "Scanning logs through the feature index");
    Ok(ScanPlan::Index {
        from,
        to,
        bitmask,
        hashes,
    })
}

pub(crate) fn read_logs(
    reader: &Reader<'_>,
    ctx: &QueryContext,
    chain: u64,
    filter: &LogFilter,
    limit: usize,
) -> Result<Page<LogResponse, LogKey>, StoreError> {
    let filter = filter.normalized();
    let from = keys::clamp_log_key(filter.from);
    let to = keys::clamp_log_key(filter.to);
    if from > to || filter.from > LogKey::MAX {
        return Ok(Page {
            items: Vec::new(),
            last_key: Some(to),
            interruption: None,
        });
    }
    let plan = plan(reader, chain, &filter, from, to)?;
    let outcome = pipeline::run(
        reader,
        chain,
        &filter,
        &plan,
        ctx,
        limit,
        &reader.config().log_scan,
    )?;
    let last_key = match outcome.interruption {
        None => Some(to),
        Some(_) => outcome.last_processed.or_else(|| from.prev()),
    };
    Ok(Page {
        items: outcome.items,
        last_key,
        interruption: outcome.interruption,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::StoreConfig, store::Store};

    fn hash(byte: u8) -> Hash {
        Hash::new([byte; 32])
    }

    fn log(address: u8, topics: &[u8]) -> Log {
        Log {
            address: Address::new([address; 20]),
            topics: topics.iter().map(|t| hash(*t)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = LogFilter::default();
        assert!(filter.matches(&log(1, &[])));
        assert!(filter.matches(&log(2, &[3, 4])));
    }

    #[test]
    fn address_filter() {
        let filter = LogFilter::default().with_addresses([Address::new([1; 20])]);
        assert!(filter.matches(&log(1, &[])));
        assert!(!filter.matches(&log(2, &[])));
    }

    #[test]
    fn topic_positions_are_independent() {
        let filter = LogFilter::default().with_topics(vec![vec![], vec![hash(7), hash(8)]]);
        assert!(filter.matches(&log(1, &[1, 8])));
        assert!(!filter.matches(&log(1, &[8])));
        assert!(!filter.matches(&log(1, &[8, 1])));
    }

    #[test]
    fn topic_filter_skips_logs_without_topics() {
        let filter = LogFilter::default().with_topics(vec![vec![hash(7)]]);
        assert!(!filter.matches(&log(1, &[])));
        assert!(filter.matches(&log(1, &[7, 9])));
    }

    #[test]
    fn normalization_dedups_and_trims() {
        let filter = LogFilter::default()
            .with_addresses([Address::new([2; 20]), Address::new([1; 20]), Address::new([2; 20])])
            .with_topics(vec![vec![hash(3), hash(3)], vec![]])
            .normalized();
        assert_eq!(filter.addresses, vec![Address::new([1; 20]), Address::new([2; 20])]);
        assert_eq!(filter.topics, vec![vec![hash(3)]]);
    }

    #[test]
    fn filter_matching() {
        let filter = LogFilter::new(LogKey::MIN, LogKey::MAX)
            .with_addresses([Address::new([1; 20])])
            .with_topics(vec![vec![], vec![hash(7)]]);
        assert!(filter.matches(&log(1, &[0, 7])));
        assert!(!filter.matches(&log(1, &[7])));
        assert!(!filter.matches(&log(2, &[0, 7])));
        assert!(LogFilter::new(LogKey::MIN, LogKey::MAX).matches(&log(9, &[])));
    }

    #[test]
    fn normalization_drops_trailing_wildcards() {
        let filter = LogFilter::new(LogKey::MIN, LogKey::MAX)
            .with_topics(vec![vec![hash(2), hash(1), hash(2)], vec![], vec![]])
            .normalized();
        assert_eq!(filter.topics, vec![vec![hash(1), hash(2)]]);
    }

    fn store_with(feature_index: bool) -> Store {
        let mut config = StoreConfig::in_memory();
        config.log_scan.feature_index = feature_index;
        config.log_scan.range_threshold = 10;
        Store::new(config).unwrap()
    }

    #[test]
    fn plan_choice() {
        let store = store_with(true);
        let reader = store.reader().unwrap();
        let narrow = LogFilter::new(LogKey::new(0, 0, 0), LogKey::new(5, 0, 0));
        let wide = LogFilter::new(LogKey::new(0, 0, 0), LogKey::new(500, 0, 0))
            .with_addresses([Address::new([1; 20])]);
        // Nothing indexed for the chain yet.
        assert!(matches!(
            plan(&reader, 3, &wide, wide.from, wide.to).unwrap(),
            ScanPlan::Linear { .. }
        ));

        let mut writer = store.writer();
        writer.insert_log(3, 1, 0, 0, &log(1, &[])).unwrap();
        writer.flush().unwrap();
        let reader = store.reader().unwrap();
        assert!(matches!(
            plan(&reader, 3, &narrow, narrow.from, narrow.to).unwrap(),
            ScanPlan::Linear { .. }
        ));
        assert!(matches!(
            plan(&reader, 3, &wide, wide.from, wide.to).unwrap(),
            ScanPlan::Index { bitmask: 1, .. }
        ));
        // Nothing to look up without a constrained feature.
        let unconstrained = LogFilter::new(wide.from, wide.to);
        assert!(matches!(
            plan(&reader, 3, &unconstrained, wide.from, wide.to).unwrap(),
            ScanPlan::Linear { .. }
        ));

        let mut config = store.config().clone();
        config.log_scan.feature_index = false;
        let disabled = store.reopen_with(config);
        let reader = disabled.reader().unwrap();
        assert!(matches!(
            plan(&reader, 3, &wide, wide.from, wide.to).unwrap(),
            ScanPlan::Linear { .. }
        ));
    }

    #[test]
    fn index_settings_change_falls_back_to_linear() {
        let mut config = StoreConfig::in_memory();
        config.log_scan.range_threshold = 10;
        config.log_scan.max_indexed_topics = 1;
        let store = Store::new(config).unwrap();
        let mut writer = store.writer();
        for (height, tx_hash) in [(2u64, 20u8), (500, 50)] {
            writer.insert_block(3, height, &hash(tx_hash), &Default::default()).unwrap();
            writer
                .insert_transaction(3, height, 0, &hash(tx_hash + 1), &Default::default())
                .unwrap();
            writer.insert_log(3, height, 0, 0, &log(1, &[7, 8])).unwrap();
        }
        writer.flush().unwrap();

        let mut config = store.config().clone();
        config.log_scan.max_indexed_topics = 4;
        let reopened = store.reopen_with(config);
        let reader = reopened.reader().unwrap();
        let filter = LogFilter::new(LogKey::MIN, LogKey::MAX).with_topics(vec![vec![], vec![hash(8)]]);
        assert!(matches!(
            plan(&reader, 3, &filter, filter.from, filter.to).unwrap(),
            ScanPlan::Linear { .. }
        ));
        let page = read_logs(&reader, &QueryContext::default(), 3, &filter, 100).unwrap();
        let keys: Vec<LogKey> = page.items.iter().map(LogResponse::key).collect();
        assert_eq!(keys, vec![LogKey::new(2, 0, 0), LogKey::new(500, 0, 0)]);

        // The original settings still find both through the index.
        let reader = store.reader().unwrap();
        assert!(matches!(
            plan(&reader, 3, &filter, filter.from, filter.to).unwrap(),
            ScanPlan::Linear { .. }
        ));
        let filter = filter.with_topics(vec![vec![hash(7)]]);
        assert!(matches!(
            plan(&reader, 3, &filter, filter.from, filter.to).unwrap(),
            ScanPlan::Index { .. }
        ));
        let page = read_logs(&reader, &QueryContext::default(), 3, &filter, 100).unwrap();
        assert_eq!(page.items.len(), 2);
    }

    #[test]
    fn index_and_linear_scans_agree() {
        let store = store_with(true);
        let mut writer = store.writer();
        for height in [1u64, 40, 400] {
            let seed = height as u8;
            writer.insert_block(3, height, &hash(seed), &Default::default()).unwrap();
            writer
                .insert_transaction(3, height, 0, &hash(seed.wrapping_add(100)), &Default::default())
                .unwrap();
            writer.insert_log(3, height, 0, 0, &log(1, &[7])).unwrap();
            writer.insert_log(3, height, 0, 1, &log(2, &[7])).unwrap();
        }
        writer.flush().unwrap();
        let reader = store.reader().unwrap();
        let ctx = QueryContext::default();
        let filter = LogFilter::new(LogKey::new(0, 0, 0), LogKey::new(1000, 0, 0))
            .with_addresses([Address::new([1; 20])]);
        let indexed = read_logs(&reader, &ctx, 3, &filter, 100).unwrap();

        let keys: Vec<LogKey> = indexed.items.iter().map(LogResponse::key).collect();
        assert_eq!(
            keys,
            vec![LogKey::new(1, 0, 0), LogKey::new(40, 0, 0), LogKey::new(400, 0, 0)]
        );
        assert!(indexed.is_complete());
        assert_eq!(indexed.last_key, Some(LogKey::new(1000, 0, 0)));
        let narrow = LogFilter {
            to: LogKey::new(9, 0, 0),
            ..filter
        };
        let linear = read_logs(&reader, &ctx, 3, &narrow, 100).unwrap();
        assert_eq!(linear.items.len(), 1);
        assert_eq!(linear.items[0], indexed.items[0]);
    }

    #[test]
    fn empty_and_inverted_ranges() {
        let store = store_with(true);
        let reader = store.reader().unwrap();
        let ctx = QueryContext::default();
        let inverted = LogFilter::new(LogKey::new(5, 0, 0), LogKey::new(4, 0, 0));
        let page = read_logs(&reader, &ctx, 3, &inverted, 10).unwrap();
        assert!(page.items.is_empty());
        assert!(page.is_complete());
    }

    #[test]
    fn limit_reports_last_returned_position() {
        let store = store_with(true);
        let mut writer = store.writer();
        writer.insert_block(3, 2, &hash(2), &Default::default()).unwrap();
        writer.insert_transaction(3, 2, 0, &hash(3), &Default::default()).unwrap();
        for index in 0..4 {
            writer.insert_log(3, 2, 0, index, &log(1, &[])).unwrap();
        }
        writer.flush().unwrap();
        let reader = store.reader().unwrap();
        let filter = LogFilter::new(LogKey::MIN, LogKey::new(3, 0, 0));
        let page = read_logs(&reader, &QueryContext::default(), 3, &filter, 2).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.interruption, Some(crate::context::Interruption::Limited));
        assert_eq!(page.last_key, Some(LogKey::new(2, 0, 1)));
    }
}
