//! LSB-first bit packing.
//!
//! Codec packets are assembled bit-by-bit, least-significant bit first, into a
//! growable byte buffer. This is the write half only; nothing in this library decodes
//! the packed stream.

const BUFFER_INCREMENT: usize = 256;

const MASK: [u32; 33] = [
    0x0000_0000,
    0x0000_0001,
    0x0000_0003,
    0x0000_0007,
    0x0000_000f,
    0x0000_001f,
    0x0000_003f,
    0x0000_007f,
    0x0000_00ff,
    0x0000_01ff,
    0x0000_03ff,
    0x0000_07ff,
    0x0000_0fff,
    0x0000_1fff,
    0x0000_3fff,
    0x0000_7fff,
    0x0000_ffff,
    0x0001_ffff,
    0x0003_ffff,
    0x0007_ffff,
    0x000f_ffff,
    0x001f_ffff,
    0x003f_ffff,
    0x007f_ffff,
    0x00ff_ffff,
    0x01ff_ffff,
    0x03ff_ffff,
    0x07ff_ffff,
    0x0fff_ffff,
    0x1fff_ffff,
    0x3fff_ffff,
    0x7fff_ffff,
    0xffff_ffff,
];

/// Growable, byte-aligned-but-bit-addressable write buffer (LSB-first).
#[derive(Debug, Clone)]
pub struct BitPacker {
    buffer: Vec<u8>,
    endbyte: usize,
    endbit: u32,
}

impl BitPacker {
    /// Create an empty packer.
    pub fn new() -> Self {
        BitPacker {
            buffer: vec![0; BUFFER_INCREMENT],
            endbyte: 0,
            endbit: 0,
        }
    }

    /// Reset to empty without releasing storage.
    pub fn reset(&mut self) {
        self.buffer.fill(0);
        self.endbyte = 0;
        self.endbit = 0;
    }

    /// Number of whole-or-partial bytes written so far.
    pub fn bytes(&self) -> usize {
        self.endbyte + ((self.endbit + 7) / 8) as usize
    }

    /// Number of bits written so far.
    pub fn bits(&self) -> usize {
        self.endbyte * 8 + self.endbit as usize
    }

    /// Append the low `bits` bits of `value`, LSB first. `bits` must be <= 32.
    pub fn write(&mut self, value: u32, bits: u32) {
        debug_assert!(bits <= 32);
        if self.endbyte + 5 >= self.buffer.len() {
            let new_len = self.buffer.len() + BUFFER_INCREMENT;
            self.buffer.resize(new_len, 0);
        }
        let shifted = ((value & MASK[bits as usize]) as u64) << self.endbit;
        let total = bits + self.endbit;
        self.buffer[self.endbyte] |= shifted as u8;
        if total >= 8 {
            self.buffer[self.endbyte + 1] = (shifted >> 8) as u8;
            if total >= 16 {
                self.buffer[self.endbyte + 2] = (shifted >> 16) as u8;
                if total >= 24 {
                    self.buffer[self.endbyte + 3] = (shifted >> 24) as u8;
                    if total >= 32 {
                        self.buffer[self.endbyte + 4] = (shifted >> 32) as u8;
                    }
                }
            }
        }
        self.endbyte += (total / 8) as usize;
        self.endbit = total & 7;
    }

    /// Append a byte string, 8 bits per byte.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.write(u32::from(b), 8);
        }
    }

    /// Truncate the stream to `bits` bits, masking the now-partial final byte.
    pub fn write_trunc(&mut self, bits: usize) {
        let bytes = bits >> 3;
        let bits = (bits & 7) as u32;
        self.endbyte = bytes;
        self.endbit = bits;
        self.buffer[bytes] &= MASK[bits as usize] as u8;
    }

    /// The packed bytes written so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer[..self.bytes()]
    }
}

impl Default for BitPacker {
    fn default() -> Self {
        Self::new()
    }
}
