//! JSON-RPC response shapes composed from stored records and their keys.
//!
//! Fields the archive has no source for are emitted as zero or empty values:
//! `nonce`, `sha3Uncles`, `difficulty`, `totalDifficulty` and `extraData` on
//! blocks and `cumulativeGasUsed` on receipts. A transaction's `gas` reports
//! the gas it used, not its gas limit.

use relayer_common::{
    AccessListEntry, Address, Block, BlockKey, Bloom, Data8, Hash, HexUint, Log, LogKey,
    Quantity, Transaction, TransactionKey, VarBlob,
};
use serde::{Deserialize, Serialize};

/// Transaction entry of a block response: the hash, or the full object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TxView {
    Hash(Hash),
    Full(Box<TransactionResponse>),
}

impl TxView {
    pub fn hash(&self) -> Hash {
        match self {
            TxView::Hash(hash) => *hash,
            TxView::Full(tx) => tx.hash,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockResponse {
    pub number: HexUint,
    pub hash: Hash,
    pub parent_hash: Hash,
    pub nonce: Data8,
    pub sha3_uncles: Hash,
    pub logs_bloom: Bloom,
    pub transactions_root: Hash,
    pub state_root: Hash,
    pub receipts_root: Hash,
    pub miner: Address,
    pub mix_hash: Hash,
    pub difficulty: HexUint,
    pub total_difficulty: HexUint,
    pub extra_data: VarBlob,
    pub size: HexUint,
    pub gas_limit: Quantity,
    pub gas_used: Quantity,
    pub timestamp: HexUint,
    pub transactions: Vec<TxView>,
    pub uncles: Vec<Hash>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub block_hash: Hash,
    pub block_number: HexUint,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub chain_id: Option<HexUint>,
    pub from: Address,
    pub gas: HexUint,
    pub gas_price: Quantity,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_fee_per_gas: Option<Quantity>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_priority_fee_per_gas: Option<Quantity>,
    pub hash: Hash,
    pub input: VarBlob,
    pub nonce: Quantity,
    pub to: Option<Address>,
    pub transaction_index: HexUint,
    pub value: Quantity,
    #[serde(rename = "type")]
    pub tx_type: HexUint,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub access_list: Option<Vec<AccessListEntry>>,
    pub v: HexUint,
    pub r: Quantity,
    pub s: Quantity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptResponse {
    pub transaction_hash: Hash,
    pub transaction_index: HexUint,
    pub block_hash: Hash,
    pub block_number: HexUint,
    pub from: Address,
    pub to: Option<Address>,
    pub cumulative_gas_used: HexUint,
    pub gas_used: HexUint,
    pub contract_address: Option<Address>,
    pub logs: Vec<LogResponse>,
    pub logs_bloom: Bloom,
    pub status: HexUint,
    pub effective_gas_price: Quantity,
    #[serde(rename = "type")]
    pub tx_type: HexUint,
    pub near_transaction_hash: Hash,
    pub near_receipt_hash: Hash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogResponse {
    pub removed: bool,
    /// Position of the log within its transaction.
    pub log_index: HexUint,
    pub transaction_index: HexUint,
    pub transaction_hash: Hash,
    pub block_hash: Hash,
    pub block_number: HexUint,
    pub address: Address,
    pub data: VarBlob,
    pub topics: Vec<Hash>,
}

impl LogResponse {
    pub fn key(&self) -> LogKey {
        LogKey::new(
            self.block_number.0,
            self.transaction_index.0,
            self.log_index.0,
        )
    }
}

pub fn make_block_response(
    key: BlockKey,
    hash: Hash,
    block: Block,
    transactions: Vec<TxView>,
) -> BlockResponse {
    BlockResponse {
        number: key.height.into(),
        hash,
        parent_hash: block.parent_hash,
        nonce: Data8::zero(),
        sha3_uncles: Hash::zero(),
        logs_bloom: block.logs_bloom,
        transactions_root: block.transactions_root,
        state_root: block.state_root,
        receipts_root: block.receipts_root,
        miner: block.miner,
        mix_hash: Hash::zero(),
        difficulty: HexUint(0),
        total_difficulty: HexUint(0),
        extra_data: VarBlob::default(),
        size: block.size.into(),
        gas_limit: block.gas_limit,
        gas_used: block.gas_used,
        timestamp: block.timestamp.into(),
        transactions,
        uncles: Vec::new(),
    }
}

fn recipient(tx: &Transaction) -> Option<Address> {
    (!tx.is_contract_deployment).then_some(tx.to_or_contract)
}

pub fn make_transaction_response(
    chain: u64,
    key: TransactionKey,
    block_hash: Hash,
    hash: Hash,
    tx: Transaction,
) -> TransactionResponse {
    let dynamic_fee = tx.has_dynamic_fee();
    let has_access_list = tx.has_access_list();
    let to = recipient(&tx);
    TransactionResponse {
        block_hash,
        block_number: key.height.into(),
        chain_id: dynamic_fee.then_some(HexUint(chain)),
        from: tx.from,
        gas: tx.gas_used.into(),
        gas_price: tx.gas_price,
        max_fee_per_gas: dynamic_fee.then_some(tx.max_fee_per_gas),
        max_priority_fee_per_gas: dynamic_fee.then_some(tx.max_priority_fee_per_gas),
        hash,
        to,
        input: tx.input,
        nonce: tx.nonce,
        transaction_index: key.tx_index.into(),
        value: tx.value,
        tx_type: tx.tx_type.into(),
        access_list: has_access_list.then_some(tx.access_list),
        v: tx.v.into(),
        r: tx.r,
        s: tx.s,
    }
}

pub fn make_transaction_receipt_response(
    key: TransactionKey,
    block_hash: Hash,
    hash: Hash,
    tx: Transaction,
    logs: Vec<LogResponse>,
) -> ReceiptResponse {
    ReceiptResponse {
        transaction_hash: hash,
        transaction_index: key.tx_index.into(),
        block_hash,
        block_number: key.height.into(),
        from: tx.from,
        to: recipient(&tx),
        cumulative_gas_used: HexUint(0),
        gas_used: tx.gas_used.into(),
        contract_address: tx.is_contract_deployment.then_some(tx.to_or_contract),
        logs,
        logs_bloom: tx.logs_bloom,
        status: HexUint(u64::from(tx.status)),
        effective_gas_price: tx.gas_price,
        tx_type: tx.tx_type.into(),
        near_transaction_hash: tx.near_hash,
        near_receipt_hash: tx.near_receipt_hash,
    }
}

pub fn make_log_response(key: LogKey, block_hash: Hash, tx_hash: Hash, log: Log) -> LogResponse {
    LogResponse {
        removed: false,
        log_index: key.log_index.into(),
        transaction_index: key.tx_index.into(),
        transaction_hash: tx_hash,
        block_hash,
        block_number: key.height.into(),
        address: log.address,
        data: log.data,
        topics: log.topics,
    }
}
