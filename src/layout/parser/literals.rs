//! Numeric literals used for counts and explicit bit widths.

/// Parses a count or bit width: `123`, `0x7B`, `0b1111011` or `0o173`, with `_` separators.
///
/// A hex count swallows every hex digit that follows it, so `0x2c` is the count `0x2c` and
/// never `0x2` of `c`; separate such a count from its element with `@`.
pub(super) fn parse_numeric_literal(text: &str) -> Result<u64, &'static str> {
    if text.starts_with('-') {
        return Err("negative values are not supported here");
    }
    let digits: String = text.chars().filter(|ch| *ch != '_').collect();
    let (radix, body) = match digits.as_bytes() {
        [b'0', b'x', ..] => (16, &digits[2..]),
        [b'0', b'b', ..] => (2, &digits[2..]),
        [b'0', b'o', ..] => (8, &digits[2..]),
        _ => (10, digits.as_str()),
    };
    if body.is_empty() {
        return Err("numeric literal missing digits");
    }
    u64::from_str_radix(body, radix).map_err(|_| "numeric literal out of range")
}

/// Length of the literal starting at `bytes[0]`, honouring a radix prefix.
pub(super) fn literal_len(bytes: &[u8]) -> usize {
    let (skip, accept): (usize, fn(u8) -> bool) = match bytes {
        [b'0', b'x', ..] => (2, |b| b.is_ascii_hexdigit() || b == b'_'),
        [b'0', b'b', ..] => (2, |b| matches!(b, b'0' | b'1' | b'_')),
        [b'0', b'o', ..] => (2, |b| matches!(b, b'0'..=b'7' | b'_')),
        _ => (0, |b| b.is_ascii_digit() || b == b'_'),
    };
    skip + bytes[skip..].iter().take_while(|b| accept(**b)).count()
}

/// Length of a plain decimal run, used where a radix prefix would be ambiguous.
pub(super) fn decimal_len(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_digit()).count()
}
