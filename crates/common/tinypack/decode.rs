use crate::error::TinypackError;

/// Upper bound on variadic list lengths accepted while decoding.
pub const DEFAULT_MAX_VARIADIC_LENGTH: u64 = 10_000_000;

/// Cursor over an unpacked structural stream.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    input: &'a [u8],
    max_variadic_length: u64,
}

impl<'a> Reader<'a> {
    pub fn new(input: &'a [u8], max_variadic_length: u64) -> Self {
        Self {
            input,
            max_variadic_length,
        }
    }

    pub fn remaining(&self) -> &'a [u8] {
        self.input
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8], TinypackError> {
        if self.input.len() < len {
            return Err(TinypackError::Truncated);
        }
        let (head, tail) = self.input.split_at(len);
        self.input = tail;
        Ok(head)
    }

    pub fn take_array<const N: usize>(&mut self) -> Result<[u8; N], TinypackError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_byte(&mut self) -> Result<u8, TinypackError> {
        let (&first, rest) = self.input.split_first().ok_or(TinypackError::Truncated)?;
        self.input = rest;
        Ok(first)
    }

    pub fn read_uvarint(&mut self) -> Result<u64, TinypackError> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = self.read_byte()?;
            if shift == 63 && byte > 1 {
                return Err(TinypackError::VarintOverflow);
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(TinypackError::VarintOverflow)
    }

    pub fn read_varint(&mut self) -> Result<i64, TinypackError> {
        let zigzag = self.read_uvarint()?;
        Ok(((zigzag >> 1) as i64) ^ -((zigzag & 1) as i64))
    }

    /// Reads a variadic length prefix, rejecting it before any allocation
    /// when it exceeds the configured maximum.
    pub fn read_variadic_length(&mut self) -> Result<usize, TinypackError> {
        let length = self.read_uvarint()?;
        if length > self.max_variadic_length {
            return Err(TinypackError::VariadicLengthExceeded {
                length,
                max: self.max_variadic_length,
            });
        }
        usize::try_from(length).map_err(|_| TinypackError::VariadicLengthExceeded {
            length,
            max: self.max_variadic_length,
        })
    }
}

/// A value that can be read back from its structural tinypack encoding.
pub trait TinyDecode: Sized {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, TinypackError>;

    /// Decodes `count` list items. Byte primitives override this to read a raw run.
    fn decode_items(reader: &mut Reader<'_>, count: usize) -> Result<Vec<Self>, TinypackError> {
        // Every item takes at least one byte, so the remaining input bounds the
        // allocation even when the declared count is large.
        let mut items = Vec::with_capacity(count.min(reader.remaining().len()));
        for _ in 0..count {
            items.push(Self::decode(reader)?);
        }
        Ok(items)
    }
}

impl TinyDecode for bool {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, TinypackError> {
        match reader.read_byte()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(TinypackError::InvalidBool(other)),
        }
    }
}

impl TinyDecode for u8 {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, TinypackError> {
        reader.read_byte()
    }

    fn decode_items(reader: &mut Reader<'_>, count: usize) -> Result<Vec<Self>, TinypackError> {
        Ok(reader.take(count)?.to_vec())
    }
}

impl TinyDecode for u64 {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, TinypackError> {
        reader.read_uvarint()
    }
}

impl TinyDecode for i64 {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, TinypackError> {
        reader.read_varint()
    }
}

impl TinyDecode for f64 {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, TinypackError> {
        Ok(f64::from_bits(u64::from_be_bytes(reader.take_array()?)))
    }
}

impl<T: TinyDecode> TinyDecode for Box<T> {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, TinypackError> {
        T::decode(reader).map(Box::new)
    }
}

/// Field-by-field decoder for composite records, attaching the record and
/// field name to any error raised underneath.
pub struct Decoder<'r, 'a> {
    reader: &'r mut Reader<'a>,
    record: &'static str,
}

impl<'r, 'a> Decoder<'r, 'a> {
    pub fn new(reader: &'r mut Reader<'a>, record: &'static str) -> Self {
        Self { reader, record }
    }

    pub fn decode_field<T: TinyDecode>(&mut self, name: &'static str) -> Result<T, TinypackError> {
        T::decode(self.reader).map_err(|err| err.in_field(self.record, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(input: &[u8]) -> Reader<'_> {
        Reader::new(input, DEFAULT_MAX_VARIADIC_LENGTH)
    }

    #[test]
    fn uvarint_decodes_multibyte() {
        assert_eq!(reader(&[0xac, 0x02]).read_uvarint(), Ok(300));
        let max = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01];
        assert_eq!(reader(&max).read_uvarint(), Ok(u64::MAX));
    }

    #[test]
    fn uvarint_rejects_overflow_and_truncation() {
        let overflow = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x02];
        assert_eq!(
            reader(&overflow).read_uvarint(),
            Err(TinypackError::VarintOverflow)
        );
        assert_eq!(reader(&[0x80]).read_uvarint(), Err(TinypackError::Truncated));
    }

    #[test]
    fn varint_decodes_negative() {
        assert_eq!(reader(&[0x01]).read_varint(), Ok(-1));
        assert_eq!(reader(&[0x7f]).read_varint(), Ok(-64));
    }

    #[test]
    fn bool_rejects_other_bytes() {
        assert_eq!(bool::decode(&mut reader(&[1])), Ok(true));
        assert_eq!(
            bool::decode(&mut reader(&[2])),
            Err(TinypackError::InvalidBool(2))
        );
    }

    #[test]
    fn variadic_length_is_capped() {
        let mut r = Reader::new(&[0x0b], 10);
        assert_eq!(
            r.read_variadic_length(),
            Err(TinypackError::VariadicLengthExceeded { length: 11, max: 10 })
        );
    }

    #[test]
    fn huge_item_count_does_not_preallocate() {
        let mut r = reader(&[1, 0]);
        let err = u64::decode_items(&mut r, usize::MAX).unwrap_err();
        assert_eq!(err, TinypackError::Truncated);
    }
}
