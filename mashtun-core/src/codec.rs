//! Numeric codec for the persistent region
//!
//! Values are packed as self-delimiting byte sequences so records of
//! different lengths can sit back to back and be walked without look-ahead.
//!
//! ```text
//! 0..=249   [value]                                  1 byte
//! >= 250    [EXT][times 250][remainder]?[EXT]        3-4 bytes
//! fraction  [EXT][times 250][remainder][cents][EXT]  5 bytes (decode only)
//! negative  [NEG][...]                               reserved, never written
//! ```
//!
//! Examples: `250 = [EXT][1][EXT]`, `350 = [EXT][1][100][EXT]`,
//! `567 = [EXT][2][67][EXT]`, `1.5 = [EXT][0][1][50][EXT]`.
//!
//! Bytes 252..=255 are structural markers of the recipe layout and are never
//! valid as the first byte of a value.

use heapless::Vec;

use crate::error::Error;

/// Largest value stored as a single literal byte
pub const MAX_LITERAL: u8 = 249;

/// Prefix of the (unimplemented) negative-number form
pub const NEGATIVE_PREFIX: u8 = 250;

/// Prefix and terminator of the extended-number form
pub const EXTENDED_PREFIX: u8 = 251;

/// Base of the extended form's multiplier byte
const BASE: u32 = MAX_LITERAL as u32 + 1;

/// Largest value the encoder accepts (249 * 250 + 249)
pub const MAX_ENCODABLE: u32 = MAX_LITERAL as u32 * BASE + MAX_LITERAL as u32;

/// Longest encoding the codec produces or accepts
pub const MAX_ENCODED_LEN: usize = 5;

/// Maximum inner bytes between the extended prefix and its terminator
const MAX_EXTENDED_INNER: usize = 3;

/// Encoded byte sequence of a single value
pub type Encoded = Vec<u8, MAX_ENCODED_LEN>;

/// Codec failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CodecError {
    /// Value is negative, fractional, NaN or larger than [`MAX_ENCODABLE`]
    Unencodable,
    /// Bytes at the address do not form a valid value
    Corrupt,
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Unencodable => Error::InvalidArgument,
            CodecError::Corrupt => Error::CorruptStore,
        }
    }
}

/// Convert a value into the integer the encoder stores
fn to_storable(value: f32) -> Result<u32, CodecError> {
    // Also rejects NaN, which fails every comparison
    if !(value >= 0.0 && value <= MAX_ENCODABLE as f32) {
        return Err(CodecError::Unencodable);
    }

    let whole = value as u32;
    if whole as f32 != value {
        return Err(CodecError::Unencodable);
    }

    Ok(whole)
}

/// Check whether a value can be stored
pub fn is_encodable(value: f32) -> bool {
    to_storable(value).is_ok()
}

/// Number of bytes `value` occupies once encoded
pub fn encoded_len(value: f32) -> Result<usize, CodecError> {
    let whole = to_storable(value)?;
    Ok(if whole <= MAX_LITERAL as u32 {
        1
    } else if whole % BASE == 0 {
        3
    } else {
        4
    })
}

/// Encode a value
pub fn encode(value: f32) -> Result<Encoded, CodecError> {
    let whole = to_storable(value)?;
    let mut out = Encoded::new();

    // Capacity is MAX_ENCODED_LEN, pushes below never exceed four bytes
    if whole <= MAX_LITERAL as u32 {
        let _ = out.push(whole as u8);
    } else {
        let times = (whole / BASE) as u8;
        let remainder = (whole % BASE) as u8;
        let _ = out.push(EXTENDED_PREFIX);
        let _ = out.push(times);
        if remainder != 0 {
            let _ = out.push(remainder);
        }
        let _ = out.push(EXTENDED_PREFIX);
    }

    Ok(out)
}

/// Decode the value starting at `addr`
///
/// Returns the value and the number of bytes it spans.
pub fn decode(bytes: &[u8], addr: usize) -> Result<(f32, usize), CodecError> {
    let first = *bytes.get(addr).ok_or(CodecError::Corrupt)?;

    match first {
        0..=MAX_LITERAL => Ok((first as f32, 1)),
        EXTENDED_PREFIX => decode_extended(bytes, addr),
        // Negative form is reserved, structural markers are not values
        _ => Err(CodecError::Corrupt),
    }
}

fn decode_extended(bytes: &[u8], addr: usize) -> Result<(f32, usize), CodecError> {
    let mut inner = [0u8; MAX_EXTENDED_INNER];
    let mut count = 0;
    let mut pos = addr + 1;

    loop {
        let byte = *bytes.get(pos).ok_or(CodecError::Corrupt)?;
        pos += 1;

        if byte == EXTENDED_PREFIX {
            break;
        }
        if byte > MAX_LITERAL || count == MAX_EXTENDED_INNER {
            return Err(CodecError::Corrupt);
        }
        inner[count] = byte;
        count += 1;
    }

    let value = match count {
        1 => inner[0] as u32 * BASE,
        2 | 3 => inner[0] as u32 * BASE + inner[1] as u32,
        _ => return Err(CodecError::Corrupt),
    };

    let value = if count == 3 {
        if inner[2] > 99 {
            return Err(CodecError::Corrupt);
        }
        value as f32 + inner[2] as f32 / 100.0
    } else {
        value as f32
    };

    Ok((value, pos - addr))
}

/// Decode a value that must be a small non-negative integer (pins, counts)
pub fn decode_u8(bytes: &[u8], addr: usize) -> Result<(u8, usize), CodecError> {
    let (value, len) = decode(bytes, addr)?;
    let whole = value as u8;
    if whole as f32 != value {
        return Err(CodecError::Corrupt);
    }
    Ok((whole, len))
}
