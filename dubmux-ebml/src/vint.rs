//! Variable-length integer codecs.
//!
//! EBML uses two distinct self-describing width rules that are easy to conflate and
//! deliberately kept apart here:
//!
//! - *Lengths* (element/content sizes) are value-encoded: the smallest width B in
//!   1..=8 such that the value fits in 7*B bits, with a single marker bit at position
//!   7*B from the top.
//! - *IDs* are identity-encoded: the leading-zero count of the first byte (capped at
//!   4 bytes) gives the width, and the raw bytes themselves are the canonical form —
//!   an ID's value is never re-encoded at a different width.
//!
//! Fixed-width payload encodings (minimal big-endian unsigned integers, IEEE754
//! float32/float64) also live here.

use crate::error::{EbmlError, Result};
use std::io::Read;

/// Largest value encodable as a self-delimiting length (56 usable bits).
pub const MAX_LENGTH: u64 = (1 << 56) - 1;

/// Encode a content length into its smallest self-delimiting form (1..=8 bytes).
pub fn encode_length(n: u64) -> Result<Vec<u8>> {
    if n > MAX_LENGTH {
        return Err(EbmlError::LengthOutOfRange(n));
    }
    let mut width = 1usize;
    while width < 8 && n >= (1u64 << (7 * width)) {
        width += 1;
    }
    let marked = (1u64 << (7 * width)) | n;
    let mut out = vec![0u8; width];
    for (i, b) in out.iter_mut().enumerate() {
        *b = (marked >> (8 * (width - 1 - i))) as u8;
    }
    Ok(out)
}

/// Number of bytes a length encoding occupies, derived from its first byte.
///
/// A first byte of 0x00 signals a width beyond 8 bytes and is rejected.
pub fn length_width(first: u8) -> Result<usize> {
    if first == 0 {
        return Err(EbmlError::InvalidLengthMarker);
    }
    Ok(first.leading_zeros() as usize + 1)
}

/// Decode a self-delimiting length from the start of `buf`.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_length(buf: &[u8]) -> Result<(u64, usize)> {
    let first = *buf.first().ok_or(EbmlError::Truncated(0))?;
    let width = length_width(first)?;
    if buf.len() < width {
        return Err(EbmlError::Truncated(buf.len() as u64));
    }
    let mut value = u64::from(first) - (1u64 << (8 - width));
    for &b in &buf[1..width] {
        value = (value << 8) | u64::from(b);
    }
    Ok((value, width))
}

/// Read a self-delimiting length from a stream.
pub fn read_length<R: Read>(input: &mut R) -> Result<u64> {
    let mut first = [0u8; 1];
    input.read_exact(&mut first)?;
    let width = length_width(first[0])?;
    let mut value = u64::from(first[0]) - (1u64 << (8 - width));
    let mut rest = vec![0u8; width - 1];
    input.read_exact(&mut rest)?;
    for b in rest {
        value = (value << 8) | u64::from(b);
    }
    Ok(value)
}

/// Number of bytes an element ID occupies, derived from its first byte.
///
/// Width is the leading-zero count plus one, capped at 4 bytes.
pub fn id_width(first: u8) -> usize {
    if first >= 0x80 {
        1
    } else if first >= 0x40 {
        2
    } else if first >= 0x20 {
        3
    } else {
        4
    }
}

/// Read raw element ID bytes from a stream.
pub fn read_id_bytes<R: Read>(input: &mut R) -> Result<Vec<u8>> {
    let mut first = [0u8; 1];
    input.read_exact(&mut first)?;
    let width = id_width(first[0]);
    let mut out = vec![0u8; width];
    out[0] = first[0];
    input.read_exact(&mut out[1..])?;
    Ok(out)
}

/// Encode an unsigned integer as minimal-width big-endian bytes, at least
/// `min_bytes` wide.
pub fn encode_uint(value: u64, min_bytes: usize) -> Vec<u8> {
    let mut width = 1usize;
    while width < 8 && value >= (1u64 << (8 * width)) {
        width += 1;
    }
    let width = width.max(min_bytes.clamp(1, 8));
    let mut out = vec![0u8; width];
    for (i, b) in out.iter_mut().enumerate() {
        *b = (value >> (8 * (width - 1 - i))) as u8;
    }
    out
}

/// Decode a big-endian unsigned integer payload (up to 8 bytes).
pub fn decode_uint(buf: &[u8]) -> Result<u64> {
    if buf.len() > 8 {
        return Err(EbmlError::InvalidPayload(format!(
            "integer payload of {} bytes",
            buf.len()
        )));
    }
    Ok(buf.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}

/// Encode an IEEE754 float32 payload (exactly 4 bytes).
pub fn encode_f32(value: f32) -> [u8; 4] {
    value.to_be_bytes()
}

/// Encode an IEEE754 float64 payload (exactly 8 bytes).
pub fn encode_f64(value: f64) -> [u8; 8] {
    value.to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_roundtrip_boundaries() {
        let cases = [
            0u64,
            1,
            126,
            127,
            128,
            (1 << 14) - 1,
            1 << 14,
            (1 << 21) - 1,
            1 << 21,
            (1 << 28) - 1,
            1 << 28,
            (1 << 35) - 1,
            (1 << 42) - 1,
            (1 << 49) - 1,
            (1 << 56) - 1,
        ];
        for &n in &cases {
            let enc = encode_length(n).unwrap();
            let (value, consumed) = decode_length(&enc).unwrap();
            assert_eq!(value, n, "roundtrip failed for {n}");
            assert_eq!(consumed, enc.len());
        }
    }

    #[test]
    fn test_length_widths() {
        assert_eq!(encode_length(0).unwrap(), vec![0x80]);
        assert_eq!(encode_length(5).unwrap(), vec![0x85]);
        assert_eq!(encode_length(127).unwrap(), vec![0xFF]);
        assert_eq!(encode_length(128).unwrap(), vec![0x40, 0x80]);
        assert_eq!(encode_length(MAX_LENGTH).unwrap().len(), 8);
        assert_eq!(encode_length(MAX_LENGTH).unwrap()[0], 0x01);
    }

    #[test]
    fn test_length_out_of_range() {
        assert!(matches!(
            encode_length(MAX_LENGTH + 1),
            Err(EbmlError::LengthOutOfRange(_))
        ));
    }

    #[test]
    fn test_decode_rejects_zero_marker() {
        assert!(matches!(
            decode_length(&[0x00, 0xFF]),
            Err(EbmlError::InvalidLengthMarker)
        ));
    }

    #[test]
    fn test_unknown_size_sentinel_decodes_to_max() {
        let sentinel = [0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        let (value, consumed) = decode_length(&sentinel).unwrap();
        assert_eq!(value, MAX_LENGTH);
        assert_eq!(consumed, 8);
    }

    #[test]
    fn test_id_widths() {
        assert_eq!(id_width(0x80), 1);
        assert_eq!(id_width(0xAE), 1);
        assert_eq!(id_width(0x42), 2);
        assert_eq!(id_width(0x2A), 3);
        assert_eq!(id_width(0x18), 4);
        assert_eq!(id_width(0x01), 4);
    }

    #[test]
    fn test_read_id_bytes() {
        let mut input: &[u8] = &[0x18, 0x53, 0x80, 0x67, 0xAA];
        let id = read_id_bytes(&mut input).unwrap();
        assert_eq!(id, vec![0x18, 0x53, 0x80, 0x67]);
        let mut input: &[u8] = &[0xAE, 0x01];
        assert_eq!(read_id_bytes(&mut input).unwrap(), vec![0xAE]);
    }

    #[test]
    fn test_uint_minimal_width() {
        assert_eq!(encode_uint(0, 1), vec![0]);
        assert_eq!(encode_uint(2, 1), vec![2]);
        assert_eq!(encode_uint(255, 1), vec![255]);
        assert_eq!(encode_uint(256, 1), vec![1, 0]);
        assert_eq!(encode_uint(5, 7), vec![0, 0, 0, 0, 0, 0, 5]);
        assert_eq!(decode_uint(&encode_uint(123_456_789, 1)).unwrap(), 123_456_789);
    }

    #[test]
    fn test_float_widths() {
        assert_eq!(encode_f32(44100.0).len(), 4);
        assert_eq!(encode_f64(2.5).len(), 8);
        assert_eq!(f32::from_be_bytes(encode_f32(44100.0)), 44100.0);
    }
}
