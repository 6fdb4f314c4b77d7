//! Primitive value types shared by stored records and JSON-RPC responses.
//!
//! Fixed and variadic blobs hex-encode with every leading zero kept;
//! quantities and [`HexUint`] strip leading zero nibbles.

use std::{fmt, str::FromStr};

use bytes::Bytes;
use ethereum_types::{H64, H160, H256, U256};
use relayer_tinypack::{Reader, TinyDecode, TinyEncode, TinypackError};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HexError {
    #[error("missing 0x prefix")]
    MissingPrefix,
    #[error("expected {expected} bytes, found {found}")]
    WrongLength { expected: usize, found: usize },
    #[error("invalid hex: {0}")]
    Invalid(String),
}

fn strip_prefix(s: &str) -> Result<&str, HexError> {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .ok_or(HexError::MissingPrefix)
}

/// Exactly `N` bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FixedBlob<const N: usize>(pub [u8; N]);

pub type Data8 = FixedBlob<8>;
pub type Address = FixedBlob<20>;
pub type Hash = FixedBlob<32>;
pub type Bloom = FixedBlob<256>;

impl<const N: usize> FixedBlob<N> {
    pub const fn new(bytes: [u8; N]) -> Self {
        Self(bytes)
    }

    pub const fn zero() -> Self {
        Self([0; N])
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl<const N: usize> Default for FixedBlob<N> {
    fn default() -> Self {
        Self::zero()
    }
}

impl<const N: usize> AsRef<[u8]> for FixedBlob<N> {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl<const N: usize> From<[u8; N]> for FixedBlob<N> {
    fn from(bytes: [u8; N]) -> Self {
        Self(bytes)
    }
}

impl<const N: usize> fmt::Display for FixedBlob<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl<const N: usize> fmt::Debug for FixedBlob<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl<const N: usize> FromStr for FixedBlob<N> {
    type Err = HexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(strip_prefix(s)?).map_err(|e| HexError::Invalid(e.to_string()))?;
        Self::from_slice(&bytes).ok_or(HexError::WrongLength {
            expected: N,
            found: bytes.len(),
        })
    }
}

impl<const N: usize> Serialize for FixedBlob<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de, const N: usize> Deserialize<'de> for FixedBlob<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

impl<const N: usize> TinyEncode for FixedBlob<N> {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), TinypackError> {
        self.0.encode(buf)
    }
}

impl<const N: usize> TinyDecode for FixedBlob<N> {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, TinypackError> {
        reader.take_array().map(Self)
    }
}

macro_rules! impl_eth_conversions {
    ($eth:ty, $n:literal) => {
        impl From<$eth> for FixedBlob<$n> {
            fn from(value: $eth) -> Self {
                Self(value.0)
            }
        }

        impl From<FixedBlob<$n>> for $eth {
            fn from(value: FixedBlob<$n>) -> Self {
                <$eth>::from(value.0)
            }
        }
    };
}

impl_eth_conversions!(H64, 8);
impl_eth_conversions!(H160, 20);
impl_eth_conversions!(H256, 32);
impl_eth_conversions!(ethereum_types::Bloom, 256);

/// Variable-length byte string.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct VarBlob(pub Bytes);

impl VarBlob {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for VarBlob {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<&[u8]> for VarBlob {
    fn from(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }
}

impl fmt::Display for VarBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

impl fmt::Debug for VarBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for VarBlob {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for VarBlob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let body = strip_prefix(&s).map_err(D::Error::custom)?;
        hex::decode(body).map(Self::from).map_err(D::Error::custom)
    }
}

impl TinyEncode for VarBlob {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), TinypackError> {
        self.0.encode(buf)
    }
}

impl TinyDecode for VarBlob {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, TinypackError> {
        Bytes::decode(reader).map(Self)
    }
}

/// 256-bit unsigned integer stored as 32 big-endian bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Quantity(pub U256);

impl Quantity {
    pub const fn zero() -> Self {
        Self(U256::zero())
    }
}

impl From<u64> for Quantity {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl From<U256> for Quantity {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Debug for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let body = strip_prefix(&s).map_err(D::Error::custom)?;
        U256::from_str_radix(body, 16)
            .map(Self)
            .map_err(|_| D::Error::custom(format!("invalid quantity {s}")))
    }
}

impl TinyEncode for Quantity {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), TinypackError> {
        buf.extend_from_slice(&self.0.to_big_endian());
        Ok(())
    }
}

impl TinyDecode for Quantity {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, TinypackError> {
        let bytes: [u8; 32] = reader.take_array()?;
        Ok(Self(U256::from_big_endian(&bytes)))
    }
}

/// Response-only unsigned integer rendered as stripped hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct HexUint(pub u64);

impl From<u64> for HexUint {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for HexUint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Debug for HexUint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for HexUint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for HexUint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let body = strip_prefix(&s).map_err(D::Error::custom)?;
        u64::from_str_radix(body, 16)
            .map(Self)
            .map_err(|_| D::Error::custom(format!("invalid hex uint {s}")))
    }
}
