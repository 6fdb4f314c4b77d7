use crate::error::TinypackError;

/// A value with a structural tinypack encoding.
pub trait TinyEncode {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), TinypackError>;

    /// Encodes a run of list items. Byte primitives override this to emit a raw run.
    fn encode_items(items: &[Self], buf: &mut Vec<u8>) -> Result<(), TinypackError>
    where
        Self: Sized,
    {
        for item in items {
            item.encode(buf)?;
        }
        Ok(())
    }
}

pub fn put_uvarint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Zig-zag maps the sign into the low bit so small negatives stay short.
pub fn put_varint(buf: &mut Vec<u8>, value: i64) {
    let zigzag = ((value << 1) ^ (value >> 63)) as u64;
    put_uvarint(buf, zigzag);
}

impl TinyEncode for bool {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), TinypackError> {
        buf.push(u8::from(*self));
        Ok(())
    }
}

impl TinyEncode for u8 {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), TinypackError> {
        buf.push(*self);
        Ok(())
    }

    fn encode_items(items: &[Self], buf: &mut Vec<u8>) -> Result<(), TinypackError> {
        buf.extend_from_slice(items);
        Ok(())
    }
}

impl TinyEncode for u64 {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), TinypackError> {
        put_uvarint(buf, *self);
        Ok(())
    }
}

impl TinyEncode for i64 {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), TinypackError> {
        put_varint(buf, *self);
        Ok(())
    }
}

impl TinyEncode for f64 {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), TinypackError> {
        buf.extend_from_slice(&self.to_bits().to_be_bytes());
        Ok(())
    }
}

impl<T: TinyEncode> TinyEncode for Box<T> {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), TinypackError> {
        self.as_ref().encode(buf)
    }
}

/// Field-by-field encoder for composite records.
///
/// The first failing field is kept and returned by [`Encoder::finish`];
/// later fields are skipped.
#[must_use = "`Encoder` must be consumed with `finish` to surface errors"]
pub struct Encoder<'a> {
    buf: &'a mut Vec<u8>,
    record: &'static str,
    error: Option<TinypackError>,
}

impl<'a> Encoder<'a> {
    pub fn new(buf: &'a mut Vec<u8>, record: &'static str) -> Self {
        Self {
            buf,
            record,
            error: None,
        }
    }

    pub fn encode_field<T: TinyEncode>(mut self, name: &'static str, value: &T) -> Self {
        if self.error.is_none() {
            if let Err(err) = value.encode(self.buf) {
                self.error = Some(err.in_field(self.record, name));
            }
        }
        self
    }

    pub fn finish(self) -> Result<(), TinypackError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded<T: TinyEncode>(value: T) -> Vec<u8> {
        let mut buf = Vec::new();
        value.encode(&mut buf).unwrap();
        buf
    }

    #[test]
    fn uvarint_uses_continuation_bits() {
        assert_eq!(encoded(0u64), vec![0x00]);
        assert_eq!(encoded(127u64), vec![0x7f]);
        assert_eq!(encoded(128u64), vec![0x80, 0x01]);
        assert_eq!(encoded(300u64), vec![0xac, 0x02]);
        assert_eq!(encoded(u64::MAX).len(), 10);
    }

    #[test]
    fn varint_is_zigzag() {
        assert_eq!(encoded(0i64), vec![0x00]);
        assert_eq!(encoded(-1i64), vec![0x01]);
        assert_eq!(encoded(1i64), vec![0x02]);
        assert_eq!(encoded(-64i64), vec![0x7f]);
        assert_eq!(encoded(64i64), vec![0x80, 0x01]);
    }

    #[test]
    fn float_is_big_endian_bits() {
        assert_eq!(encoded(1.0f64), 1.0f64.to_bits().to_be_bytes().to_vec());
    }

    #[test]
    fn encoder_reports_first_failing_field() {
        struct Failing;
        impl TinyEncode for Failing {
            fn encode(&self, _buf: &mut Vec<u8>) -> Result<(), TinypackError> {
                Err(TinypackError::MissingPointer)
            }
        }

        let mut buf = Vec::new();
        let err = Encoder::new(&mut buf, "Record")
            .encode_field("a", &true)
            .encode_field("b", &Failing)
            .encode_field("c", &7u64)
            .finish()
            .unwrap_err();
        assert_eq!(buf, vec![1]);
        assert_eq!(
            err,
            TinypackError::MissingPointer.in_field("Record", "b")
        );
    }
}
