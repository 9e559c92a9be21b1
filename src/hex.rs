//! Hex text to bytes (and back)
//!
//! Patch producers emit method bodies as hex digits, sometimes with line breaks or spacing mixed
//! in. Whitespace is always ignored. What happens on a bad digit depends on [`HexDecoding`].

use std::fmt;

/// How to treat malformed hex input
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HexDecoding {
    /// A pair containing a non-hex digit becomes a zero byte, and a dangling final digit is
    /// dropped. Output length is always half the number of non-whitespace characters.
    Lenient,

    /// Any non-hex digit or an odd number of digits is an error
    Strict,
}

impl Default for HexDecoding {
    fn default() -> Self {
        HexDecoding::Lenient
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HexError {
    /// Character that isn't a hex digit (`position` counts non-whitespace characters)
    InvalidDigit { position: usize, found: char },

    /// Number of digits is odd
    OddLength(usize),
}

impl fmt::Display for HexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HexError::InvalidDigit { position, found } => {
                write!(f, "invalid hex digit {:?} at position {}", found, position)
            }
            HexError::OddLength(len) => write!(f, "odd number of hex digits ({})", len),
        }
    }
}

impl std::error::Error for HexError {}

/// Decode with the given strictness
pub fn decode(text: &str, decoding: HexDecoding) -> Result<Vec<u8>, HexError> {
    match decoding {
        HexDecoding::Lenient => Ok(decode_lenient(text)),
        HexDecoding::Strict => decode_strict(text),
    }
}

fn digits(text: &str) -> Vec<char> {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Decode, substituting a zero byte for every pair that isn't two hex digits
pub fn decode_lenient(text: &str) -> Vec<u8> {
    let digits = digits(text);
    if digits.len() % 2 != 0 {
        log::warn!(
            "Ignoring dangling hex digit {:?} at the end of the input",
            digits[digits.len() - 1]
        );
    }

    let mut bytes = vec![0u8; digits.len() / 2];
    let mut malformed = 0;
    for (byte, pair) in bytes.iter_mut().zip(digits.chunks_exact(2)) {
        match (pair[0].to_digit(16), pair[1].to_digit(16)) {
            (Some(hi), Some(lo)) => *byte = (hi << 4 | lo) as u8,
            _ => malformed += 1,
        }
    }
    if malformed > 0 {
        log::warn!("Zero-filled {} malformed hex pair(s)", malformed);
    }
    bytes
}

/// Decode, rejecting anything but an even number of hex digits
pub fn decode_strict(text: &str) -> Result<Vec<u8>, HexError> {
    let digits = digits(text);
    let mut nibbles = Vec::with_capacity(digits.len());
    for (position, found) in digits.iter().enumerate() {
        let nibble = found.to_digit(16).ok_or(HexError::InvalidDigit {
            position,
            found: *found,
        })?;
        nibbles.push(nibble as u8);
    }
    if nibbles.len() % 2 != 0 {
        return Err(HexError::OddLength(nibbles.len()));
    }
    Ok(nibbles
        .chunks_exact(2)
        .map(|pair| pair[0] << 4 | pair[1])
        .collect())
}

/// Lower-case hex with no separators
pub fn encode(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        text.push_str(&format!("{:02x}", byte));
    }
    text
}
