//! Word packing applied after the structural pass.
//!
//! The structural stream is zero-padded to a multiple of 8 bytes. Every 8-byte
//! word becomes a presence bitmask (bit `i` set when byte `i` is nonzero)
//! followed by the nonzero bytes only.

use crate::error::TinypackError;

pub const WORD_SIZE: usize = 8;

pub fn pack(stream: &[u8]) -> Vec<u8> {
    let mut packed = Vec::with_capacity(stream.len() / 2 + WORD_SIZE);
    for chunk in stream.chunks(WORD_SIZE) {
        let mut word = [0u8; WORD_SIZE];
        word[..chunk.len()].copy_from_slice(chunk);

        let tag_pos = packed.len();
        packed.push(0);
        let mut tag = 0u8;
        for (i, byte) in word.iter().enumerate() {
            if *byte != 0 {
                tag |= 1 << i;
                packed.push(*byte);
            }
        }
        packed[tag_pos] = tag;
    }
    packed
}

/// Reverses [`pack`]. The result length is always a multiple of 8.
pub fn unpack(packed: &[u8]) -> Result<Vec<u8>, TinypackError> {
    let mut stream = Vec::with_capacity(packed.len() * 2);
    let mut rest = packed;
    while let Some((&tag, tail)) = rest.split_first() {
        let present = tag.count_ones() as usize;
        if tail.len() < present {
            return Err(TinypackError::InvalidPacking("word shorter than its tag"));
        }
        let (nonzero, tail) = tail.split_at(present);
        let mut nonzero = nonzero.iter();
        for i in 0..WORD_SIZE {
            if tag & (1 << i) == 0 {
                stream.push(0);
                continue;
            }
            match nonzero.next() {
                Some(0) => return Err(TinypackError::InvalidPacking("zero byte marked present")),
                Some(byte) => stream.push(*byte),
                None => return Err(TinypackError::InvalidPacking("word shorter than its tag")),
            }
        }
        rest = tail;
    }
    Ok(stream)
}
