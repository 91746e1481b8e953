//! Bit helpers for bitfield sub-fields. Offsets count from the least significant bit.

#[inline]
pub fn mask_bits(len: u32) -> u64 {
    if len >= 64 { u64::MAX } else { (1u64 << len) - 1 }
}

pub fn sign_extend(value: u64, bits: u32) -> i64 {
    if bits == 0 {
        return 0;
    }
    let shift = 64u32.saturating_sub(bits);
    ((value << shift) as i64) >> shift
}

/// Reads `width` bits at `offset`, right-aligned.
#[inline]
pub fn extract(word: u64, offset: u32, width: u32) -> u64 {
    if offset >= 64 {
        return 0;
    }
    (word >> offset) & mask_bits(width)
}

/// Replaces `width` bits at `offset` with the low bits of `value`, leaving the rest untouched.
#[inline]
pub fn insert(word: u64, offset: u32, width: u32, value: u64) -> u64 {
    if offset >= 64 {
        return word;
    }
    let mask = mask_bits(width) << offset;
    (word & !mask) | ((value << offset) & mask)
}
