use relayer_tinypack::{Decoder, Encoder, Reader, TinyDecode, TinyEncode, TinypackError};

use super::{Address, Bloom, Hash, Quantity};

/// Stored block header. The block hash itself lives under its own key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    pub parent_hash: Hash,
    pub miner: Address,
    pub timestamp: u64,
    pub gas_limit: Quantity,
    pub gas_used: Quantity,
    pub logs_bloom: Bloom,
    pub transactions_root: Hash,
    pub state_root: Hash,
    pub receipts_root: Hash,
    pub size: u64,
}

impl TinyEncode for Block {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), TinypackError> {
        Encoder::new(buf, "Block")
            .encode_field("parentHash", &self.parent_hash)
            .encode_field("miner", &self.miner)
            .encode_field("timestamp", &self.timestamp)
            .encode_field("gasLimit", &self.gas_limit)
            .encode_field("gasUsed", &self.gas_used)
            .encode_field("logsBloom", &self.logs_bloom)
            .encode_field("transactionsRoot", &self.transactions_root)
            .encode_field("stateRoot", &self.state_root)
            .encode_field("receiptsRoot", &self.receipts_root)
            .encode_field("size", &self.size)
            .finish()
    }
}

impl TinyDecode for Block {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, TinypackError> {
        let mut decoder = Decoder::new(reader, "Block");
        Ok(Block {
            parent_hash: decoder.decode_field("parentHash")?,
            miner: decoder.decode_field("miner")?,
            timestamp: decoder.decode_field("timestamp")?,
            gas_limit: decoder.decode_field("gasLimit")?,
            gas_used: decoder.decode_field("gasUsed")?,
            logs_bloom: decoder.decode_field("logsBloom")?,
            transactions_root: decoder.decode_field("transactionsRoot")?,
            state_root: decoder.decode_field("stateRoot")?,
            receipts_root: decoder.decode_field("receiptsRoot")?,
            size: decoder.decode_field("size")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::keccak;

    #[test]
    fn block_roundtrip() {
        let block = Block {
            parent_hash: keccak(b"parent"),
            miner: Address::new([7; 20]),
            timestamp: 1_700_000_000,
            gas_limit: 30_000_000.into(),
            gas_used: 21_000.into(),
            transactions_root: keccak(b"txs"),
            size: 1234,
            ..Default::default()
        };
        let packed = relayer_tinypack::marshal(&block).unwrap();
        assert_eq!(relayer_tinypack::unmarshal::<Block>(&packed).unwrap(), block);
    }

    #[test]
    fn empty_block_packs_small() {
        let packed = relayer_tinypack::marshal(&Block::default()).unwrap();
        // Every word is zero, so each one packs to its tag byte.
        assert!(packed.iter().all(|b| *b == 0));
        assert!(packed.len() < 80);
    }

    #[test]
    fn truncated_block_reports_field() {
        let packed = relayer_tinypack::marshal(&Block::default()).unwrap();
        let err = relayer_tinypack::unmarshal::<Block>(&packed[..4]).unwrap_err();
        assert!(matches!(err, TinypackError::Field { record: "Block", .. }));
    }
}
