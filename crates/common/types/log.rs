use relayer_tinypack::{Decoder, Encoder, Reader, TinyDecode, TinyEncode, TinypackError};

use super::{Address, Hash, VarBlob};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Log {
    pub address: Address,
    pub data: VarBlob,
    pub topics: Vec<Hash>,
}

impl TinyEncode for Log {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), TinypackError> {
        Encoder::new(buf, "Log")
            .encode_field("address", &self.address)
            .encode_field("data", &self.data)
            .encode_field("topics", &self.topics)
            .finish()
    }
}

impl TinyDecode for Log {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, TinypackError> {
        let mut decoder = Decoder::new(reader, "Log");
        Ok(Log {
            address: decoder.decode_field("address")?,
            data: decoder.decode_field("data")?,
            topics: decoder.decode_field("topics")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::keccak;
    use relayer_tinypack::Codec;

    #[test]
    fn log_roundtrip() {
        let log = Log {
            address: Address::new([0x11; 20]),
            data: vec![0, 0, 1, 2].into(),
            topics: vec![keccak(b"Transfer"), Hash::zero()],
        };
        let packed = relayer_tinypack::marshal(&log).unwrap();
        assert_eq!(relayer_tinypack::unmarshal::<Log>(&packed).unwrap(), log);
    }

    #[test]
    fn topic_count_respects_cap() {
        let log = Log {
            topics: vec![Hash::zero(); 3],
            ..Default::default()
        };
        let packed = relayer_tinypack::marshal(&log).unwrap();
        let err = Codec::new(2).unmarshal::<Log>(&packed).unwrap_err();
        assert!(matches!(
            err.root_cause(),
            TinypackError::VariadicLengthExceeded { length: 3, max: 2 }
        ));
    }
}
