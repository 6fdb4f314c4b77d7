use sha3::{Digest, Keccak256};

use crate::types::Hash;

pub fn keccak(data: impl AsRef<[u8]>) -> Hash {
    Hash::new(Keccak256::digest(data.as_ref()).into())
}

/// Keccak over several byte slices, as if they were concatenated.
pub fn keccak_concat<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> Hash {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    Hash::new(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn keccak_of_empty_input() {
        assert_eq!(
            keccak(b"").0,
            hex!("c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470")
        );
    }

    #[test]
    fn concat_matches_single_digest() {
        let parts: [&[u8]; 3] = [b"ab", b"", b"cd"];
        assert_eq!(keccak_concat(parts), keccak(b"abcd"));
    }
}
