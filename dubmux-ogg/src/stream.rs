//! Packet paginator.
//!
//! Packets are appended to a body FIFO with 255-run lacing values; pages are cut at
//! the framing boundaries (first page carries only the first packet, >4096 body
//! bytes, full segment table, or end of stream) and emitted with their checksum set.

use crate::page::{OggPage, FLAG_BOS, FLAG_CONTINUED, FLAG_EOS};

/// Begin-of-packet marker OR'd into the first lacing value of each packet.
const LACE_BEGIN: u32 = 0x100;

/// One codec packet handed to the paginator.
#[derive(Debug, Clone, Default)]
pub struct OggPacket {
    /// Packet bytes.
    pub data: Vec<u8>,
    /// True on the final packet of the logical stream.
    pub eos: bool,
    /// Codec granule position at the end of this packet.
    pub granulepos: i64,
    /// Packet sequence number.
    pub packetno: i64,
}

/// Paginator state for one logical stream.
#[derive(Debug)]
pub struct OggStreamState {
    body_data: Vec<u8>,
    body_returned: usize,
    lacing_vals: Vec<u32>,
    granule_vals: Vec<i64>,
    eos: bool,
    bos_written: bool,
    serialno: u32,
    pageno: u32,
    packetno: i64,
    granulepos: i64,
}

impl OggStreamState {
    /// Create a paginator for a stream with the given serial number.
    pub fn new(serialno: u32) -> Self {
        OggStreamState {
            body_data: Vec::with_capacity(16 * 1024),
            body_returned: 0,
            lacing_vals: Vec::with_capacity(1024),
            granule_vals: Vec::with_capacity(1024),
            eos: false,
            bos_written: false,
            serialno,
            pageno: 0,
            packetno: 0,
            granulepos: 0,
        }
    }

    /// Stream serial number.
    pub fn serialno(&self) -> u32 {
        self.serialno
    }

    /// True once the final packet has been buffered.
    pub fn eos_buffered(&self) -> bool {
        self.eos
    }

    /// True when no packet data remains unpaged.
    pub fn is_drained(&self) -> bool {
        self.lacing_vals.is_empty()
    }

    /// Buffer one packet, recording its lacing values and granule position.
    pub fn packetin(&mut self, packet: &OggPacket) {
        let lacing_count = packet.data.len() / 255 + 1;

        if self.body_returned > 0 {
            self.body_data.drain(..self.body_returned);
            self.body_returned = 0;
        }

        self.body_data.extend_from_slice(&packet.data);

        for _ in 0..lacing_count - 1 {
            self.lacing_vals.push(255);
            self.granule_vals.push(self.granulepos);
        }
        self.lacing_vals.push((packet.data.len() % 255) as u32);
        self.granule_vals.push(packet.granulepos);
        self.granulepos = packet.granulepos;

        let first = self.lacing_vals.len() - lacing_count;
        self.lacing_vals[first] |= LACE_BEGIN;

        self.packetno += 1;
        if packet.eos {
            self.eos = true;
        }
    }

    /// Force a page out of whatever is buffered, even undersized.
    ///
    /// Returns None when nothing at all is pending. A nonzero-size stream may need
    /// several flush calls to drain.
    pub fn flush(&mut self) -> Option<OggPage> {
        let maxvals = self.lacing_vals.len().min(255);
        if maxvals == 0 {
            return None;
        }

        let mut vals = 0;
        let mut acc = 0usize;
        let mut granule_pos = self.granule_vals[0];

        if !self.bos_written {
            // the initial page must carry only the first packet
            granule_pos = 0;
            while vals < maxvals {
                let done = (self.lacing_vals[vals] & 0xFF) < 255;
                vals += 1;
                if done {
                    break;
                }
            }
        } else {
            while vals < maxvals {
                if acc > 4096 {
                    break;
                }
                acc += (self.lacing_vals[vals] & 0xFF) as usize;
                granule_pos = self.granule_vals[vals];
                vals += 1;
            }
        }

        let mut header = vec![0u8; 27 + vals];
        header[..4].copy_from_slice(b"OggS");
        header[4] = 0;

        let mut flags = 0u8;
        if self.lacing_vals[0] & LACE_BEGIN == 0 {
            flags |= FLAG_CONTINUED;
        }
        if !self.bos_written {
            flags |= FLAG_BOS;
        }
        if self.eos && self.lacing_vals.len() == vals {
            flags |= FLAG_EOS;
        }
        header[5] = flags;
        self.bos_written = true;

        header[6..14].copy_from_slice(&granule_pos.to_le_bytes());
        header[14..18].copy_from_slice(&self.serialno.to_le_bytes());
        header[18..22].copy_from_slice(&self.pageno.to_le_bytes());
        self.pageno += 1;

        header[26] = vals as u8;
        let mut bytes = 0usize;
        for i in 0..vals {
            header[27 + i] = (self.lacing_vals[i] & 0xFF) as u8;
            bytes += (self.lacing_vals[i] & 0xFF) as usize;
        }

        let body = self.body_data[self.body_returned..self.body_returned + bytes].to_vec();
        self.lacing_vals.drain(..vals);
        self.granule_vals.drain(..vals);
        self.body_returned += bytes;

        let mut page = OggPage { header, body };
        page.set_checksum();
        Some(page)
    }

    /// Emit a page only when one is due by the framing rules.
    pub fn pageout(&mut self) -> Option<OggPage> {
        let pending_body = self.body_data.len() - self.body_returned;
        let due = (self.eos && !self.lacing_vals.is_empty())
            || pending_body > 4096
            || self.lacing_vals.len() >= 255
            || (!self.lacing_vals.is_empty() && !self.bos_written);
        if due {
            self.flush()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(len: usize, granulepos: i64, eos: bool) -> OggPacket {
        OggPacket {
            data: vec![0x5A; len],
            eos,
            granulepos,
            packetno: 0,
        }
    }

    #[test]
    fn test_first_page_carries_only_first_packet() {
        let mut os = OggStreamState::new(99);
        os.packetin(&packet(30, 0, false));
        os.packetin(&packet(40, 0, false));
        let page = os.flush().expect("first page");
        assert!(page.is_bos());
        assert_eq!(page.segments(), 1);
        assert_eq!(page.body.len(), 30);
        assert_eq!(page.pageno(), 0);
        assert_eq!(page.serialno(), 99);
    }

    #[test]
    fn test_lacing_255_runs() {
        let mut os = OggStreamState::new(1);
        os.packetin(&packet(600, 512, false));
        let page = os.flush().expect("page");
        // 600 = 255 + 255 + 90
        assert_eq!(page.segment_table(), &[255, 255, 90]);
        assert_eq!(page.body.len(), 600);
        assert_eq!(page.granulepos(), 512);
    }

    #[test]
    fn test_multiple_of_255_gets_zero_segment() {
        let mut os = OggStreamState::new(1);
        os.packetin(&packet(510, 0, false));
        let page = os.flush().expect("page");
        assert_eq!(page.segment_table(), &[255, 255, 0]);
    }

    #[test]
    fn test_pageout_waits_for_nominal_size() {
        let mut os = OggStreamState::new(1);
        // consume the mandatory initial page first
        os.packetin(&packet(10, 0, false));
        assert!(os.pageout().is_some());
        // small follow-up packet: not due yet
        os.packetin(&packet(100, 0, false));
        assert!(os.pageout().is_none());
        // pile on until body exceeds the nominal page size
        for _ in 0..50 {
            os.packetin(&packet(100, 0, false));
        }
        let page = os.pageout().expect("nominal page");
        assert!(page.body.len() > 4096);
    }

    #[test]
    fn test_eos_flag_only_on_final_page() {
        let mut os = OggStreamState::new(1);
        os.packetin(&packet(10, 0, false));
        let first = os.flush().unwrap();
        assert!(!first.is_eos());
        os.packetin(&packet(10, 4096, true));
        let page = os.pageout().expect("eos page drains immediately");
        assert!(page.is_eos());
        assert!(os.is_drained());
    }

    #[test]
    fn test_page_numbers_increment() {
        let mut os = OggStreamState::new(1);
        os.packetin(&packet(10, 0, false));
        assert_eq!(os.flush().unwrap().pageno(), 0);
        os.packetin(&packet(10, 0, false));
        assert_eq!(os.flush().unwrap().pageno(), 1);
    }

    #[test]
    fn test_checksum_valid_on_emitted_page() {
        let mut os = OggStreamState::new(1);
        os.packetin(&packet(64, 0, false));
        let page = os.flush().unwrap();
        let stored = page.checksum();
        let mut copy = page.clone();
        copy.set_checksum();
        assert_eq!(copy.checksum(), stored);
    }
}
