//! Byte-order conversion for machine words plus the partial-width load/store used by scalars.

use crate::layout::Endianness;

pub trait EndianWord: Copy {
    fn to_host(self, source: Endianness) -> Self;
    fn from_host(self, target: Endianness) -> Self;
}

macro_rules! impl_word {
    ($t:ty) => {
        impl EndianWord for $t {
            #[inline(always)]
            fn to_host(self, source: Endianness) -> Self {
                match source.resolve() {
                    Endianness::Big => Self::from_be(self),
                    _ => Self::from_le(self),
                }
            }

            #[inline(always)]
            fn from_host(self, target: Endianness) -> Self {
                match target.resolve() {
                    Endianness::Big => Self::to_be(self),
                    _ => Self::to_le(self),
                }
            }
        }
    };
}

impl_word!(u8);
impl_word!(u16);
impl_word!(u32);
impl_word!(u64);

/// Reads a 1..=8 byte word stored in `source` order, right-aligned in the result.
pub fn load_word(bytes: &[u8], source: Endianness) -> u64 {
    let len = bytes.len().min(8);
    let mut buf = [0u8; 8];
    match source.resolve() {
        Endianness::Big => buf[8 - len..].copy_from_slice(&bytes[..len]),
        _ => buf[..len].copy_from_slice(&bytes[..len]),
    }
    u64::from_ne_bytes(buf).to_host(source)
}

/// Writes the low `out.len()` bytes of `value` in `target` order.
pub fn store_word(value: u64, out: &mut [u8], target: Endianness) {
    let len = out.len().min(8);
    let buf = value.from_host(target).to_ne_bytes();
    match target.resolve() {
        Endianness::Big => out[..len].copy_from_slice(&buf[8 - len..]),
        _ => out[..len].copy_from_slice(&buf[..len]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_and_little_are_mirrors() {
        let bytes = [0x12, 0x34, 0x56];
        assert_eq!(load_word(&bytes, Endianness::Big), 0x12_3456);
        assert_eq!(load_word(&bytes, Endianness::Little), 0x56_3412);
    }

    #[test]
    fn native_follows_host() {
        let value = 0x0102_0304u32;
        assert_eq!(value.to_host(Endianness::Native), value);
        let mut out = [0u8; 4];
        store_word(u64::from(value), &mut out, Endianness::Native);
        assert_eq!(out, value.to_ne_bytes(), "native stores match host layout");
    }

    #[test]
    fn store_then_load_with_odd_width() {
        // three byte words keep only their low 24 bits
        let mut out = [0u8; 3];
        store_word(0xAA_BBCC_DD, &mut out, Endianness::Big);
        assert_eq!(out, [0xBB, 0xCC, 0xDD]);
        assert_eq!(load_word(&out, Endianness::Big), 0xBB_CCDD);
    }
}
