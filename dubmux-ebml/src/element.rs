//! Typed element model.
//!
//! An element is identified by its raw ID bytes (1..=4, immutable once parsed,
//! compared by exact byte equality) and is either a leaf carrying a typed payload or
//! a container whose children are streamed through the writer/reader.

use crate::vint;
use std::fmt;

/// Matroska `TrackEntry` — a known container with a short (1-byte) ID.
const TRACK_ENTRY: u32 = 0xAE;
/// Matroska `Audio` — a known container with a short (1-byte) ID.
const AUDIO: u32 = 0xE1;

/// An EBML element identity: 1..=4 raw bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId {
    bytes: [u8; 4],
    len: u8,
}

impl ElementId {
    /// Build an ID from its numeric big-endian form, e.g. `0x1A45DFA3` or `0xAE`.
    pub const fn from_u32(raw: u32) -> Self {
        let len = if raw <= 0xFF {
            1
        } else if raw <= 0xFFFF {
            2
        } else if raw <= 0xFF_FFFF {
            3
        } else {
            4
        };
        let mut bytes = [0u8; 4];
        let mut i = 0;
        while i < len {
            bytes[i] = (raw >> (8 * (len - 1 - i))) as u8;
            i += 1;
        }
        ElementId {
            bytes,
            len: len as u8,
        }
    }

    /// Build an ID from raw parsed bytes. Panics if `raw` is not 1..=4 bytes.
    pub fn from_bytes(raw: &[u8]) -> Self {
        assert!((1..=4).contains(&raw.len()), "element IDs are 1..=4 bytes");
        let mut bytes = [0u8; 4];
        bytes[..raw.len()].copy_from_slice(raw);
        ElementId {
            bytes,
            len: raw.len() as u8,
        }
    }

    /// The raw ID bytes — the canonical form, never re-encoded.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// ID length in bytes (1..=4).
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// True when the ID is empty (never, for valid IDs; kept for slice-like API).
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Canonical lowercase hex form, used for lookups and diagnostics.
    pub fn hex(&self) -> String {
        self.bytes().iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Numeric big-endian form of the raw bytes.
    pub fn as_u32(&self) -> u32 {
        self.bytes()
            .iter()
            .fold(0u32, |acc, &b| (acc << 8) | u32::from(b))
    }

    /// Container classification: every 4-byte-ID element is a container, plus a
    /// small fixed set of known short-ID containers.
    pub fn is_container(&self) -> bool {
        self.len == 4 || matches!(self.as_u32(), TRACK_ENTRY | AUDIO)
    }
}

impl fmt::Debug for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElementId(0x{})", self.hex())
    }
}

/// A leaf element's typed payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    /// Raw payload bytes, written as-is.
    Bytes(Vec<u8>),
    /// Unsigned integer, minimal-width big-endian.
    Uint(u64),
    /// IEEE754 float32, exactly 4 bytes.
    Float(f32),
    /// IEEE754 float64, exactly 8 bytes.
    Double(f64),
    /// UTF-8 text.
    Text(String),
}

impl ElementValue {
    /// Serialize the payload to its on-disk byte form.
    pub fn to_payload(&self) -> Vec<u8> {
        match self {
            ElementValue::Bytes(b) => b.clone(),
            ElementValue::Uint(v) => vint::encode_uint(*v, 1),
            ElementValue::Float(v) => vint::encode_f32(*v).to_vec(),
            ElementValue::Double(v) => vint::encode_f64(*v).to_vec(),
            ElementValue::Text(s) => s.as_bytes().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_from_u32_bytes() {
        assert_eq!(ElementId::from_u32(0xAE).bytes(), &[0xAE]);
        assert_eq!(ElementId::from_u32(0x4286).bytes(), &[0x42, 0x86]);
        assert_eq!(
            ElementId::from_u32(0x1A45DFA3).bytes(),
            &[0x1A, 0x45, 0xDF, 0xA3]
        );
    }

    #[test]
    fn test_id_roundtrip_through_raw_bytes() {
        let id = ElementId::from_u32(0x18538067);
        assert_eq!(ElementId::from_bytes(id.bytes()), id);
        assert_eq!(id.as_u32(), 0x18538067);
    }

    #[test]
    fn test_hex_canonicalization() {
        assert_eq!(ElementId::from_u32(0x1A45DFA3).hex(), "1a45dfa3");
        assert_eq!(ElementId::from_u32(0x80).hex(), "80");
    }

    #[test]
    fn test_container_classification() {
        // any 4-byte ID
        assert!(ElementId::from_u32(0x18538067).is_container());
        assert!(ElementId::from_u32(0x1F43B675).is_container());
        // known short-ID containers
        assert!(ElementId::from_u32(0xAE).is_container());
        assert!(ElementId::from_u32(0xE1).is_container());
        // leaves
        assert!(!ElementId::from_u32(0x80).is_container());
        assert!(!ElementId::from_u32(0xE7).is_container());
        assert!(!ElementId::from_u32(0xA3).is_container());
    }

    #[test]
    fn test_payload_encodings() {
        assert_eq!(ElementValue::Uint(2).to_payload(), vec![2]);
        assert_eq!(ElementValue::Uint(300).to_payload(), vec![1, 44]);
        assert_eq!(ElementValue::Float(44100.0).to_payload().len(), 4);
        assert_eq!(ElementValue::Double(1.0).to_payload().len(), 8);
        assert_eq!(
            ElementValue::Text("und".into()).to_payload(),
            b"und".to_vec()
        );
    }
}
