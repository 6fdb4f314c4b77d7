mod block;
mod keys;
mod log;
mod primitives;
mod transaction;

pub use block::Block;
pub use keys::{BlockKey, LogKey, MAX_BLOCK_HEIGHT, MAX_LOG_INDEX, MAX_TX_INDEX, TransactionKey};
pub use log::Log;
pub use primitives::{
    Address, Bloom, Data8, FixedBlob, Hash, HexError, HexUint, Quantity, VarBlob,
};
pub use transaction::{AccessListEntry, Transaction};
