pub use ethereum_types::{H64, H160, H256, U256};

pub mod sync;
pub mod types;
pub mod utils;

pub use types::{
    AccessListEntry, Address, Block, BlockKey, Bloom, Data8, FixedBlob, Hash, HexUint, Log,
    LogKey, MAX_BLOCK_HEIGHT, MAX_LOG_INDEX, MAX_TX_INDEX, Quantity, Transaction,
    TransactionKey, VarBlob,
};
