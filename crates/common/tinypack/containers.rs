//! Container holders: length-described lists, nullable and pointer holders.

use std::marker::PhantomData;

use bytes::Bytes;

use crate::{
    decode::{Reader, TinyDecode},
    encode::{TinyEncode, put_uvarint},
    error::TinypackError,
};

/// Length descriptor of a [`List`].
pub trait Length {
    /// `Some(n)` for fixed lists, `None` for variadic ones.
    const FIXED: Option<usize>;
}

/// Length is written as an unsigned varint prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Variadic;

/// Length is part of the schema; no prefix is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Fixed<const N: usize>;

impl Length for Variadic {
    const FIXED: Option<usize> = None;
}

impl<const N: usize> Length for Fixed<N> {
    const FIXED: Option<usize> = Some(N);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct List<L, T> {
    items: Vec<T>,
    _length: PhantomData<L>,
}

pub type VarList<T> = List<Variadic, T>;
pub type FixedList<const N: usize, T> = List<Fixed<N>, T>;

impl<L, T> List<L, T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            _length: PhantomData,
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_inner(self) -> Vec<T> {
        self.items
    }
}

impl<L, T> Default for List<L, T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<L, T> From<Vec<T>> for List<L, T> {
    fn from(items: Vec<T>) -> Self {
        Self::new(items)
    }
}

fn encode_list<L: Length, T: TinyEncode>(
    items: &[T],
    buf: &mut Vec<u8>,
) -> Result<(), TinypackError> {
    match L::FIXED {
        Some(expected) if items.len() != expected => {
            return Err(TinypackError::FixedLengthMismatch {
                expected,
                found: items.len(),
            });
        }
        Some(_) => {}
        None => put_uvarint(buf, items.len() as u64),
    }
    T::encode_items(items, buf)
}

fn decode_list<L: Length, T: TinyDecode>(reader: &mut Reader<'_>) -> Result<Vec<T>, TinypackError> {
    let count = match L::FIXED {
        Some(count) => count,
        None => reader.read_variadic_length()?,
    };
    T::decode_items(reader, count)
}

impl<L: Length, T: TinyEncode> TinyEncode for List<L, T> {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), TinypackError> {
        encode_list::<L, T>(&self.items, buf)
    }
}

impl<L: Length, T: TinyDecode> TinyDecode for List<L, T> {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, TinypackError> {
        decode_list::<L, T>(reader).map(Self::new)
    }
}

// A bare `Vec<T>` field is a variadic list.
impl<T: TinyEncode> TinyEncode for Vec<T> {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), TinypackError> {
        encode_list::<Variadic, T>(self, buf)
    }
}

impl<T: TinyDecode> TinyDecode for Vec<T> {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, TinypackError> {
        decode_list::<Variadic, T>(reader)
    }
}

impl TinyEncode for Bytes {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), TinypackError> {
        encode_list::<Variadic, u8>(self, buf)
    }
}

impl TinyDecode for Bytes {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, TinypackError> {
        decode_list::<Variadic, u8>(reader).map(Bytes::from)
    }
}

// A bare byte array is a fixed list of bytes.
impl<const N: usize> TinyEncode for [u8; N] {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), TinypackError> {
        buf.extend_from_slice(self);
        Ok(())
    }
}

impl<const N: usize> TinyDecode for [u8; N] {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, TinypackError> {
        reader.take_array()
    }
}

/// Optional value behind a one-byte presence header.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Nullable<T>(pub Option<T>);

impl<T: TinyEncode> TinyEncode for Nullable<T> {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), TinypackError> {
        match &self.0 {
            None => {
                buf.push(0);
                Ok(())
            }
            Some(value) => {
                buf.push(1);
                value.encode(buf)
            }
        }
    }
}

impl<T: TinyDecode> TinyDecode for Nullable<T> {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, TinypackError> {
        match reader.read_byte()? {
            0 => Ok(Nullable(None)),
            1 => T::decode(reader).map(|value| Nullable(Some(value))),
            other => Err(TinypackError::InvalidNullableHeader(other)),
        }
    }
}

/// Mandatory value without a header byte. Encoding an empty pointer fails.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pointer<T>(pub Option<T>);

impl<T> Pointer<T> {
    pub fn new(value: T) -> Self {
        Pointer(Some(value))
    }
}

impl<T: TinyEncode> TinyEncode for Pointer<T> {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), TinypackError> {
        self.0
            .as_ref()
            .ok_or(TinypackError::MissingPointer)?
            .encode(buf)
    }
}

impl<T: TinyDecode> TinyDecode for Pointer<T> {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, TinypackError> {
        T::decode(reader).map(Pointer::new)
    }
}
