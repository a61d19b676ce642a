//! Hexadecimal codec used to build wire payloads.
//!
//! Commands are written as upper-case, zero-padded hex whose width is twice the
//! byte width of the command's integer type. Raw bytes are rendered in the
//! canonical lower-case form.

use std::fmt::Write;

use crate::error::CodecError;

/// Unsigned integer with a declared byte width.
pub trait HexInt: Copy + Eq + std::hash::Hash + std::fmt::Debug + Send + Sync + 'static {
    /// Width in bytes.
    const WIDTH: usize;

    fn to_u128(self) -> u128;

    /// Returns `None` if `value` does not fit in `Self`.
    fn from_u128(value: u128) -> Option<Self>;
}

macro_rules! impl_hex_int {
    ($($t:ty),*) => {
        $(
            impl HexInt for $t {
                const WIDTH: usize = std::mem::size_of::<$t>();

                fn to_u128(self) -> u128 {
                    self as u128
                }

                fn from_u128(value: u128) -> Option<Self> {
                    <$t>::try_from(value).ok()
                }
            }
        )*
    };
}

impl_hex_int!(u8, u16, u32, u64);

/// Formats `value` as `2 * T::WIDTH` upper-case hex digits.
pub fn encode<T: HexInt>(value: T) -> String {
    format!("{:0width$X}", value.to_u128(), width = T::WIDTH * 2)
}

/// Formats `value` as `2 * width` upper-case hex digits, failing instead of truncating.
pub fn encode_width(value: u128, width: usize) -> Result<String, CodecError> {
    if width < 16 && value >> (width * 8) != 0 {
        return Err(CodecError::Overflow { value, width });
    }
    Ok(format!("{:0w$X}", value, w = width * 2))
}

/// Joins hex strings in the given order.
pub fn concat<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    parts.into_iter().fold(String::new(), |mut acc, part| {
        acc.push_str(part.as_ref());
        acc
    })
}

/// Parses a hex string into bytes. Characters that are not hex digits are ignored
/// (so `"<0a 1B>"` is `[0x0a, 0x1b]`); an odd or zero count of hex digits is an error.
pub fn hex_to_bytes(s: &str) -> Result<Vec<u8>, CodecError> {
    let digits: Vec<u8> = s
        .chars()
        .filter_map(|c| c.to_digit(16))
        .map(|d| d as u8)
        .collect();
    if digits.is_empty() || digits.len() % 2 != 0 {
        return Err(CodecError::InvalidHex(s.to_string()));
    }
    Ok(digits.chunks_exact(2).map(|p| (p[0] << 4) | p[1]).collect())
}

/// Renders bytes as lower-case hex, two digits per byte.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// The byte count as two upper-case hex digits, as used by length-prefixed commands.
pub fn byte_count_hex(bytes: &[u8]) -> Result<String, CodecError> {
    encode_width(bytes.len() as u128, 1)
}

/// The first two bytes as a big-endian `u16`.
pub fn be_u16(bytes: &[u8]) -> Option<u16> {
    let pair = bytes.get(..2)?;
    Some(u16::from_be_bytes([pair[0], pair[1]]))
}
