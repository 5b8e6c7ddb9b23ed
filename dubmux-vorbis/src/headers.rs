//! The three stream headers.
//!
//! Identification carries channel/rate/blocksize facts, comment the vendor
//! tag, setup the full codebook/floor/residue/mapping/mode tables. The
//! private initialization blob used by container tracks concatenates all
//! three with a two-entry lacing table.

use crate::codebook::pack_static;
use crate::setup;
use crate::tables::ilog2;
use dubmux_core::BitPacker;

const VENDOR: &str = "dubmux vorbis encoder";

/// Stream parameters the headers are built from.
#[derive(Debug, Clone, Copy)]
pub struct HeaderParams {
    pub channels: u8,
    pub rate: u32,
    pub bitrate_upper: u32,
    pub bitrate_nominal: u32,
    pub bitrate_lower: u32,
}

/// The three header packets, in stream order.
#[derive(Debug, Clone)]
pub struct HeaderSet {
    pub ident: Vec<u8>,
    pub comment: Vec<u8>,
    pub setup: Vec<u8>,
}

fn common_header(opb: &mut BitPacker, packet_type: u8) {
    opb.write(packet_type as u32, 8);
    for &b in b"vorbis" {
        opb.write(b as u32, 8);
    }
}

pub fn pack_ident(p: &HeaderParams) -> Vec<u8> {
    let mut opb = BitPacker::new();
    common_header(&mut opb, 0x01);
    opb.write(0, 32);
    opb.write(p.channels as u32, 8);
    opb.write(p.rate, 32);
    opb.write(p.bitrate_upper, 32);
    opb.write(p.bitrate_nominal, 32);
    opb.write(p.bitrate_lower, 32);
    opb.write(ilog2(setup::BLOCKSIZES[0] as u32), 4);
    opb.write(ilog2(setup::BLOCKSIZES[1] as u32), 4);
    opb.write(1, 1);
    opb.as_slice().to_vec()
}

pub fn pack_comment() -> Vec<u8> {
    let mut opb = BitPacker::new();
    common_header(&mut opb, 0x03);
    opb.write(VENDOR.len() as u32, 32);
    opb.write_bytes(VENDOR.as_bytes());
    opb.write(0, 32);
    opb.write(1, 1);
    opb.as_slice().to_vec()
}

pub fn pack_setup() -> Vec<u8> {
    let mut opb = BitPacker::new();
    common_header(&mut opb, 0x05);

    let books = setup::static_books();
    opb.write(books.len() as u32 - 1, 8);
    for b in &books {
        pack_static(b, &mut opb);
    }

    // time domain transforms, a placeholder in the format
    opb.write(0, 6);
    opb.write(0, 16);

    opb.write(1, 6);
    for block in 0..2 {
        opb.write(1, 16);
        setup::floor_info(block).pack(&mut opb);
    }

    opb.write(1, 6);
    for block in 0..2 {
        opb.write(2, 16);
        setup::residue_info(block).pack(&mut opb);
    }

    opb.write(1, 6);
    for block in 0..2 {
        opb.write(0, 16);
        setup::mapping_info(block).pack(2, &mut opb);
    }

    let modes = setup::modes();
    opb.write(modes.len() as u32 - 1, 6);
    for m in &modes {
        m.pack(&mut opb);
    }

    opb.write(1, 1);
    opb.as_slice().to_vec()
}

pub fn headers(p: &HeaderParams) -> HeaderSet {
    HeaderSet {
        ident: pack_ident(p),
        comment: pack_comment(),
        setup: pack_setup(),
    }
}

impl HeaderSet {
    /// Codec initialization blob: lacing table for the first two headers
    /// followed by all three packets.
    pub fn codec_private(&self) -> Vec<u8> {
        let mut out = vec![0x02u8];
        for len in [self.ident.len(), self.comment.len()] {
            let mut rest = len;
            while rest >= 255 {
                out.push(255);
                rest -= 255;
            }
            out.push(rest as u8);
        }
        out.extend_from_slice(&self.ident);
        out.extend_from_slice(&self.comment);
        out.extend_from_slice(&self.setup);
        out
    }
}
