//! Tinypack: a compact, schema-driven binary codec.
//!
//! Records carry no type tags; reader and writer share the schema. A record
//! is serialized structurally (see [`TinyEncode`]) and the resulting stream is
//! then word-packed (see [`packing`]), which elides zero bytes.
//!
//! Schema evolution is not supported: adding a field to a record is a
//! breaking change for every stored value of that record.

pub mod containers;
pub mod decode;
pub mod encode;
pub mod error;
pub mod packing;

pub use containers::{Fixed, FixedList, Length, List, Nullable, Pointer, VarList, Variadic};
pub use decode::{DEFAULT_MAX_VARIADIC_LENGTH, Decoder, Reader, TinyDecode};
pub use encode::{Encoder, TinyEncode};
pub use error::TinypackError;

/// Codec parameters shared by marshal and unmarshal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Codec {
    max_variadic_length: u64,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_VARIADIC_LENGTH)
    }
}

impl Codec {
    pub const fn new(max_variadic_length: u64) -> Self {
        Self {
            max_variadic_length,
        }
    }

    pub const fn max_variadic_length(&self) -> u64 {
        self.max_variadic_length
    }

    pub fn marshal<T: TinyEncode + ?Sized>(&self, value: &T) -> Result<Vec<u8>, TinypackError> {
        let mut stream = Vec::new();
        value.encode(&mut stream)?;
        Ok(packing::pack(&stream))
    }

    pub fn unmarshal<T: TinyDecode>(&self, packed: &[u8]) -> Result<T, TinypackError> {
        let stream = packing::unpack(packed)?;
        let mut reader = Reader::new(&stream, self.max_variadic_length);
        let value = T::decode(&mut reader)?;
        // Only the zero padding of the last word may remain.
        let rest = reader.remaining();
        if rest.len() >= packing::WORD_SIZE || rest.iter().any(|b| *b != 0) {
            return Err(TinypackError::TrailingBytes(rest.len()));
        }
        Ok(value)
    }
}

/// Marshals with the default codec parameters.
pub fn marshal<T: TinyEncode + ?Sized>(value: &T) -> Result<Vec<u8>, TinypackError> {
    Codec::default().marshal(value)
}

/// Unmarshals with the default codec parameters.
pub fn unmarshal<T: TinyDecode>(packed: &[u8]) -> Result<T, TinypackError> {
    Codec::default().unmarshal(packed)
}
