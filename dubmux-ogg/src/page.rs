//! Ogg page structure.
//!
//! A page is a 27-byte header, a segment table, and a body. Field offsets:
//! magic "OggS" at 0, version at 4, flags at 5, granule position (LE) at 6,
//! serial (LE) at 14, page number (LE) at 18, CRC at 22, segment count at 26.

use crate::crc;

/// Header flag: this page continues a packet from the previous page.
pub const FLAG_CONTINUED: u8 = 0x01;
/// Header flag: beginning of stream.
pub const FLAG_BOS: u8 = 0x02;
/// Header flag: end of stream.
pub const FLAG_EOS: u8 = 0x04;

/// One emitted Ogg page: header (including segment table) plus body.
#[derive(Debug, Clone, Default)]
pub struct OggPage {
    /// Header bytes, 27 + segment count.
    pub header: Vec<u8>,
    /// Body bytes.
    pub body: Vec<u8>,
}

impl OggPage {
    /// Segment count from the header.
    pub fn segments(&self) -> usize {
        self.header[26] as usize
    }

    /// The lacing/segment table.
    pub fn segment_table(&self) -> &[u8] {
        &self.header[27..27 + self.segments()]
    }

    /// True when this page continues a packet from the previous page.
    pub fn is_continued(&self) -> bool {
        self.header[5] & FLAG_CONTINUED != 0
    }

    /// True for the beginning-of-stream page.
    pub fn is_bos(&self) -> bool {
        self.header[5] & FLAG_BOS != 0
    }

    /// True for the end-of-stream page.
    pub fn is_eos(&self) -> bool {
        self.header[5] & FLAG_EOS != 0
    }

    /// Granule position carried by this page.
    pub fn granulepos(&self) -> i64 {
        i64::from_le_bytes(self.header[6..14].try_into().expect("8 granule bytes"))
    }

    /// Stream serial number.
    pub fn serialno(&self) -> u32 {
        u32::from_le_bytes(self.header[14..18].try_into().expect("4 serial bytes"))
    }

    /// Rolling page sequence number.
    pub fn pageno(&self) -> u32 {
        u32::from_le_bytes(self.header[18..22].try_into().expect("4 pageno bytes"))
    }

    /// Recompute and store the page checksum.
    ///
    /// The CRC field is zeroed, the CRC is computed over header then body, and the
    /// result is stored LSB first at offset 22. Must be re-run after any mutation.
    pub fn set_checksum(&mut self) {
        self.header[22] = 0;
        self.header[23] = 0;
        self.header[24] = 0;
        self.header[25] = 0;
        let reg = crc::update(crc::update(0, &self.header), &self.body);
        self.header[22..26].copy_from_slice(&reg.to_le_bytes());
    }

    /// The stored checksum field.
    pub fn checksum(&self) -> u32 {
        u32::from_le_bytes(self.header[22..26].try_into().expect("4 crc bytes"))
    }
}
