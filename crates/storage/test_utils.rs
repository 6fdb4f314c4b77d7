//! Deterministic archive contents for tests.
//!
//! Every hash and address is derived from an integer seed, so expected values
//! can be recomputed from the seed tables below without reading the store.

use std::sync::{Arc, LazyLock};

use relayer_common::{
    AccessListEntry, Address, Block, Hash, Log, LogKey, Transaction, VarBlob, sync::LockablePtr,
    utils::keccak,
};

use crate::{error::StoreError, store::Store};

pub const CHAIN: u64 = 88005553535;

/// Heights of the fixture blocks.
pub fn block_heights() -> Vec<u64> {
    let mut heights = vec![101, 103, 104, 105, 120, 121, 1000001];
    heights.extend(9000001..=9000008);
    heights
}

/// Transaction count per height; unlisted blocks have none.
pub const TX_COUNTS: &[(u64, u64)] = &[(103, 5), (104, 3), (105, 2), (121, 1), (9000003, 2)];

pub fn tx_count(height: u64) -> u64 {
    TX_COUNTS
        .iter()
        .find(|(h, _)| *h == height)
        .map_or(0, |(_, count)| *count)
}

#[derive(Debug, Clone, Copy)]
pub struct LogSeed {
    pub height: u64,
    pub tx_index: u64,
    pub log_index: u64,
    pub address: u64,
    pub topics: &'static [u64],
}

impl LogSeed {
    pub const fn key(&self) -> LogKey {
        LogKey::new(self.height, self.tx_index, self.log_index)
    }
}

const fn seed(
    height: u64,
    tx_index: u64,
    log_index: u64,
    address: u64,
    topics: &'static [u64],
) -> LogSeed {
    LogSeed {
        height,
        tx_index,
        log_index,
        address,
        topics,
    }
}

/// Fixture logs in position order.
pub const LOG_SEEDS: &[LogSeed] = &[
    seed(103, 0, 0, 555_0_0, &[555_1_2, 777]),
    seed(103, 0, 1, 555_0_1, &[555_1_2]),
    seed(103, 2, 0, 555_0_0, &[]),
    seed(104, 1, 0, 555_0_0, &[555_1_3, 555_2_2]),
    seed(104, 1, 1, 555_0_2, &[555_1_2]),
    seed(104, 2, 0, 555_0_1, &[]),
    seed(105, 1, 0, 555_0_0, &[555_1_2, 555_2_1]),
    seed(121, 0, 0, 555_0_1, &[555_1_2]),
    seed(9000003, 0, 0, 555_0_0, &[555_1_4]),
    seed(9000003, 1, 0, 555_0_0, &[555_1_2]),
];

pub fn gen_hash(seed: u64) -> Hash {
    keccak(seed.to_be_bytes())
}

pub fn gen_address(seed: u64) -> Address {
    let mut address = [0u8; 20];
    address.copy_from_slice(&gen_hash(seed).0[12..]);
    Address::new(address)
}

pub const fn block_hash_seed(height: u64) -> u64 {
    height * 10 + 1
}

pub const fn tx_hash_seed(height: u64, tx_index: u64) -> u64 {
    (height * 1000 + tx_index) * 10 + 2
}

pub fn gen_block(height: u64) -> Block {
    Block {
        parent_hash: gen_hash(block_hash_seed(height.saturating_sub(1))),
        miner: gen_address(height * 10 + 3),
        timestamp: 1_600_000_000 + height,
        gas_limit: 30_000_000u64.into(),
        gas_used: (21_000 * tx_count(height)).into(),
        transactions_root: gen_hash(height * 10 + 4),
        state_root: gen_hash(height * 10 + 5),
        receipts_root: gen_hash(height * 10 + 6),
        size: 512 + height % 1000,
        ..Default::default()
    }
}

/// Transaction types cycle through legacy, access list and dynamic fee by
/// index; index 4 is a contract deployment.
pub fn gen_tx(height: u64, tx_index: u64) -> Transaction {
    let seed = tx_hash_seed(height, tx_index);
    let tx_type = tx_index % 3;
    let mut tx = Transaction {
        tx_type,
        from: gen_address(seed + 3),
        is_contract_deployment: tx_index == 4,
        to_or_contract: gen_address(seed + 4),
        nonce: tx_index.into(),
        gas_price: 1_000_000_000u64.into(),
        gas_limit: 100_000u64.into(),
        gas_used: 21_000 + tx_index,
        value: (seed % 997).into(),
        input: VarBlob::from(seed.to_be_bytes().to_vec()),
        near_hash: gen_hash(seed + 5),
        near_receipt_hash: gen_hash(seed + 6),
        status: true,
        v: 27 + tx_index % 2,
        r: seed.into(),
        s: (seed + 1).into(),
        ..Default::default()
    };
    if tx.has_access_list() {
        tx.access_list = vec![AccessListEntry {
            address: gen_address(seed + 7),
            storage_keys: vec![gen_hash(seed + 8)],
        }];
    }
    if tx.has_dynamic_fee() {
        tx.max_priority_fee_per_gas = 2_000_000_000u64.into();
        tx.max_fee_per_gas = 3_000_000_000u64.into();
    }
    tx
}

pub fn gen_log(seed: &LogSeed) -> Log {
    Log {
        address: gen_address(seed.address),
        data: VarBlob::from(seed.log_index.to_be_bytes().to_vec()),
        topics: seed.topics.iter().copied().map(gen_hash).collect(),
    }
}

/// Writes the fixture for `chain`, one batch per block.
pub fn populate(store: &Store, chain: u64) -> Result<(), StoreError> {
    let mut writer = store.writer();
    for height in block_heights() {
        writer.insert_block(chain, height, &gen_hash(block_hash_seed(height)), &gen_block(height))?;
        for tx_index in 0..tx_count(height) {
            writer.insert_transaction(
                chain,
                height,
                tx_index,
                &gen_hash(tx_hash_seed(height, tx_index)),
                &gen_tx(height, tx_index),
            )?;
        }
        for seed in LOG_SEEDS.iter().filter(|seed| seed.height == height) {
            writer.insert_log(chain, seed.height, seed.tx_index, seed.log_index, &gen_log(seed))?;
        }
        writer.flush()?;
    }
    Ok(())
}

static FIXTURE: LazyLock<LockablePtr<Store>> = LazyLock::new(LockablePtr::default);

/// Shared in-memory store holding the fixture for [`CHAIN`], built on first
/// use.
pub fn fixture_store() -> Result<Arc<Store>, StoreError> {
    FIXTURE.get_or_try_init(|| {
        let store = Store::new_in_memory()?;
        populate(&store, CHAIN)?;
        Ok(store)
    })
}

/// Keys of the fixture logs accepted by `predicate`, in position order.
pub fn expected_log_keys(predicate: impl Fn(&LogSeed) -> bool) -> Vec<LogKey> {
    LOG_SEEDS
        .iter()
        .filter(|seed| predicate(seed))
        .map(LogSeed::key)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_are_sorted_and_reference_existing_transactions() {
        let keys: Vec<LogKey> = LOG_SEEDS.iter().map(LogSeed::key).collect();
        assert!(keys.windows(2).all(|pair| pair[0] < pair[1]));
        let heights = block_heights();
        for seed in LOG_SEEDS {
            assert!(heights.contains(&seed.height));
            assert!(seed.tx_index < tx_count(seed.height));
        }
    }

    #[test]
    fn generated_values_are_deterministic() {
        assert_eq!(gen_hash(7), gen_hash(7));
        assert_ne!(gen_hash(7), gen_hash(8));
        assert_eq!(&gen_address(7).0[..], &gen_hash(7).0[12..]);
        assert_eq!(gen_tx(104, 1), gen_tx(104, 1));
        assert!(gen_tx(103, 4).is_contract_deployment);
    }

    #[test]
    fn generated_transactions_round_trip() {
        let codec = relayer_tinypack::Codec::default();
        for tx_index in 0..5 {
            let tx = gen_tx(103, tx_index);
            let packed = codec.marshal(&tx).unwrap();
            assert_eq!(codec.unmarshal::<Transaction>(&packed).unwrap(), tx);
        }
    }
}
