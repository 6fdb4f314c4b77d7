use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum TinypackError {
    #[error("unexpected end of input")]
    Truncated,
    #[error("invalid bool byte: {0:#04x}")]
    InvalidBool(u8),
    #[error("invalid nullable header: {0:#04x}")]
    InvalidNullableHeader(u8),
    #[error("varint overflows 64 bits")]
    VarintOverflow,
    #[error("variadic length {length} exceeds maximum {max}")]
    VariadicLengthExceeded { length: u64, max: u64 },
    #[error("fixed list expects {expected} items, found {found}")]
    FixedLengthMismatch { expected: usize, found: usize },
    #[error("pointer holder has no content")]
    MissingPointer,
    #[error("{0} unexpected bytes after record")]
    TrailingBytes(usize),
    #[error("packed stream is malformed: {0}")]
    InvalidPacking(&'static str),
    #[error("{record}.{field}: {source}")]
    Field {
        record: &'static str,
        field: &'static str,
        source: Box<TinypackError>,
    },
}

impl TinypackError {
    /// Wraps the error with the record and field it was raised for.
    pub fn in_field(self, record: &'static str, field: &'static str) -> Self {
        TinypackError::Field {
            record,
            field,
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, skipping field context.
    pub fn root_cause(&self) -> &TinypackError {
        match self {
            TinypackError::Field { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
