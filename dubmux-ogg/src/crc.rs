//! Page checksum.
//!
//! CRC32 with polynomial 0x04c11db7, unreflected, initial register 0, no final xor —
//! the Ogg framing variant, distinct from the zlib CRC.

const POLY: u32 = 0x04c1_1db7;

/// The 256-entry lookup table, built once at startup.
pub struct CrcTable([u32; 256]);

impl CrcTable {
    const fn build() -> Self {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut r = (i as u32) << 24;
            let mut j = 0;
            while j < 8 {
                r = if r & 0x8000_0000 != 0 {
                    (r << 1) ^ POLY
                } else {
                    r << 1
                };
                j += 1;
            }
            table[i] = r;
            i += 1;
        }
        CrcTable(table)
    }
}

static TABLE: CrcTable = CrcTable::build();

/// Fold `data` into a running CRC register.
pub fn update(mut reg: u32, data: &[u8]) -> u32 {
    for &b in data {
        reg = (reg << 8) ^ TABLE.0[(((reg >> 24) & 0xff) as u8 ^ b) as usize];
    }
    reg
}

/// Checksum a complete buffer from a zero register.
pub fn checksum(data: &[u8]) -> u32 {
    update(0, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn test_idempotent() {
        let data = b"OggS test vector";
        assert_eq!(checksum(data), checksum(data));
    }

    #[test]
    fn test_single_byte_sensitivity() {
        let a = b"OggS test vector".to_vec();
        let mut b = a.clone();
        b[7] ^= 0x01;
        assert_ne!(checksum(&a), checksum(&b));
    }

    #[test]
    fn test_incremental_matches_whole() {
        let data = b"split checksum input";
        let whole = checksum(data);
        let split = update(update(0, &data[..9]), &data[9..]);
        assert_eq!(whole, split);
    }
}
