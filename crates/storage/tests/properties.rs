use std::collections::BTreeSet;

use proptest::prelude::*;
use relayer_common::{BlockKey, LogKey, MAX_BLOCK_HEIGHT};
use relayer_storage::{
    LogFilter, QueryContext, Store,
    test_utils::{LogSeed, block_hash_seed, gen_address, gen_block, gen_hash, gen_log},
};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn earliest_and_latest_bound_inserted_heights(
        heights in prop::collection::btree_set(0..=MAX_BLOCK_HEIGHT, 1..20),
    ) {
        let store = Store::new_in_memory().unwrap();
        let mut writer = store.writer();
        for height in &heights {
            writer.insert_block(1, *height, &gen_hash(block_hash_seed(*height)), &gen_block(*height)).unwrap();
        }
        writer.flush().unwrap();
        let reader = store.reader().unwrap();
        prop_assert_eq!(
            reader.read_earliest_block_key(1).unwrap(),
            heights.first().copied().map(BlockKey::new)
        );
        prop_assert_eq!(
            reader.read_latest_block_key(1).unwrap(),
            heights.last().copied().map(BlockKey::new)
        );
    }

    #[test]
    fn scans_return_logs_in_position_order(
        positions in prop::collection::btree_set((0u64..5000, 0u64..4, 0u64..4), 1..40),
        address_seeds in prop::collection::vec(0u64..3, 40),
    ) {
        let store = Store::new_in_memory().unwrap();
        let mut writer = store.writer();
        let heights: BTreeSet<u64> = positions.iter().map(|(h, _, _)| *h).collect();
        for height in &heights {
            writer.insert_block(1, *height, &gen_hash(block_hash_seed(*height)), &gen_block(*height)).unwrap();
            for tx_index in 0..4 {
                writer.insert_transaction(1, *height, tx_index, &gen_hash(height * 10 + tx_index), &Default::default()).unwrap();
            }
        }
        for (n, (height, tx_index, log_index)) in positions.iter().enumerate() {
            let seed = LogSeed {
                height: *height,
                tx_index: *tx_index,
                log_index: *log_index,
                address: address_seeds[n],
                topics: &[],
            };
            writer.insert_log(1, *height, *tx_index, *log_index, &gen_log(&seed)).unwrap();
        }
        writer.flush().unwrap();

        let filter = LogFilter::new(LogKey::MIN, LogKey::MAX).with_addresses([gen_address(0)]);
        let page = store
            .reader()
            .unwrap()
            .read_logs(&QueryContext::default(), 1, &filter, 0)
            .unwrap();
        let keys: Vec<LogKey> = page.items.iter().map(|log| log.key()).collect();
        prop_assert!(keys.windows(2).all(|pair| pair[0] < pair[1]));
        let expected: Vec<LogKey> = positions
            .iter()
            .zip(&address_seeds)
            .filter(|(_, address)| **address == 0)
            .map(|((h, i, j), _)| LogKey::new(*h, *i, *j))
            .collect();
        prop_assert_eq!(keys, expected);
    }
}

#[test]
fn repeated_ingestion_leaves_the_same_state() {
    use relayer_storage::test_utils::{CHAIN, populate};

    let store = Store::new_in_memory().unwrap();
    populate(&store, CHAIN).unwrap();
    let snapshot = |store: &Store| {
        let reader = store.reader().unwrap();
        let logs = reader
            .read_logs(&QueryContext::default(), CHAIN, &LogFilter::new(LogKey::MIN, LogKey::MAX), 0)
            .unwrap()
            .items;
        let block = reader.read_block(CHAIN, BlockKey::new(104), true).unwrap();
        let latest = reader.read_latest_block_key(CHAIN).unwrap();
        (logs, block, latest)
    };
    let before = snapshot(&store);
    populate(&store, CHAIN).unwrap();
    assert_eq!(snapshot(&store), before);
}
