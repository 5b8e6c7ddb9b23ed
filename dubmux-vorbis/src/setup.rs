//! Static encoder profile.
//!
//! One fixed stereo setup: 256/2048 sample blocks, a scalar floor book, a
//! residue phrase book and three nested two-dimensional lattice books sized
//! for quiet, moderate and loud partitions.

use crate::codebook::{float32_pack, Codebook, MapType, StaticCodebook};
use crate::error::Result;
use crate::floor::Floor1Info;
use crate::psy::{PsyGlobal, PsyInfo};
use crate::residue::ResidueInfo;
use crate::tables::ilog2;
use dubmux_core::BitPacker;

pub const BLOCKSIZES: [usize; 2] = [256, 2048];

/// Channel mapping configuration.
#[derive(Debug, Clone)]
pub struct MappingInfo {
    pub submaps: usize,
    pub chmuxlist: Vec<usize>,
    pub coupling_steps: usize,
    pub coupling_mag: Vec<usize>,
    pub coupling_ang: Vec<usize>,
    pub floorsubmap: Vec<usize>,
    pub residuesubmap: Vec<usize>,
}

impl MappingInfo {
    pub fn pack(&self, channels: usize, opb: &mut BitPacker) {
        if self.submaps > 1 {
            opb.write(1, 1);
            opb.write(self.submaps as u32 - 1, 4);
        } else {
            opb.write(0, 1);
        }

        if self.coupling_steps > 0 {
            opb.write(1, 1);
            opb.write(self.coupling_steps as u32 - 1, 8);
            let bits = ilog2(channels as u32);
            for i in 0..self.coupling_steps {
                opb.write(self.coupling_mag[i] as u32, bits);
                opb.write(self.coupling_ang[i] as u32, bits);
            }
        } else {
            opb.write(0, 1);
        }

        opb.write(0, 2);

        if self.submaps > 1 {
            for &m in self.chmuxlist.iter().take(channels) {
                opb.write(m as u32, 4);
            }
        }
        for i in 0..self.submaps {
            opb.write(0, 8);
            opb.write(self.floorsubmap[i] as u32, 8);
            opb.write(self.residuesubmap[i] as u32, 8);
        }
    }
}

/// Frame mode: block size flag plus its mapping.
#[derive(Debug, Clone, Copy)]
pub struct ModeInfo {
    pub blockflag: usize,
    pub mapping: usize,
}

impl ModeInfo {
    pub fn pack(&self, opb: &mut BitPacker) {
        opb.write(self.blockflag as u32, 1);
        opb.write(0, 16);
        opb.write(0, 16);
        opb.write(self.mapping as u32, 8);
    }
}

/// Square lattice lengths: the `n_short` entries nearest the origin get
/// `base_len` bits, the rest one more.
fn lattice_lengths(quantvals: usize, base_len: i32, n_short: usize) -> Vec<i32> {
    let entries = quantvals * quantvals;
    let center = (quantvals / 2) as i32;
    let mut order: Vec<usize> = (0..entries).collect();
    order.sort_by_key(|&e| {
        let x = (e % quantvals) as i32 - center;
        let y = (e / quantvals) as i32 - center;
        (x * x + y * y, e)
    });
    let mut lengths = vec![base_len + 1; entries];
    for &e in order.iter().take(n_short) {
        lengths[e] = base_len;
    }
    lengths
}

fn lattice_book(quantvals: usize, base_len: i32, n_short: usize, q_quant: u32) -> StaticCodebook {
    let half = (quantvals / 2) as f32;
    StaticCodebook {
        dim: 2,
        entries: quantvals * quantvals,
        lengthlist: lattice_lengths(quantvals, base_len, n_short),
        maptype: MapType::Lattice,
        q_min: float32_pack(-half),
        q_delta: float32_pack(1.0),
        q_quant,
        q_sequencep: false,
        quantlist: (0..quantvals as u32).collect(),
    }
}

/// The five codebooks of the setup header.
///
/// Book 0 codes floor post deviations, book 1 the residue partition phrases,
/// books 2..=4 the residue vectors at increasing amplitude ranges.
pub fn static_books() -> Vec<StaticCodebook> {
    let scalar = |dim: usize, entries: usize, len: i32| StaticCodebook {
        dim,
        entries,
        lengthlist: vec![len; entries],
        maptype: MapType::None,
        q_min: 0,
        q_delta: 0,
        q_quant: 0,
        q_sequencep: false,
        quantlist: Vec::new(),
    };
    vec![
        scalar(1, 128, 7),
        scalar(2, 16, 4),
        lattice_book(5, 4, 7, 3),
        lattice_book(9, 6, 47, 4),
        lattice_book(17, 8, 223, 5),
    ]
}

pub fn build_books() -> Result<Vec<Codebook>> {
    static_books().iter().map(Codebook::new).collect()
}

pub fn floor_info(block: usize) -> Floor1Info {
    let postlist = if block == 0 {
        vec![0, 128, 16, 32, 48, 64, 80, 96, 112, 120]
    } else {
        vec![0, 1024, 128, 256, 384, 512, 640, 768, 896, 960]
    };
    Floor1Info {
        partitions: 2,
        partitionclass: vec![0, 0],
        class_dim: vec![4],
        class_subs: vec![0],
        class_book: vec![0],
        class_subbook: vec![vec![0]],
        mult: 2,
        postlist,
        maxover: 60.0,
        maxunder: 30.0,
        maxerr: 500.0,
        twofitatten: 3.0,
        twofitweight: 0,
    }
}

pub fn residue_info(block: usize) -> ResidueInfo {
    let (end, grouping) = if block == 0 { (256, 16) } else { (2048, 32) };
    ResidueInfo {
        begin: 0,
        end,
        grouping,
        partitions: 4,
        groupbook: 1,
        secondstages: vec![0, 1, 1, 1],
        booklist: vec![2, 3, 4],
        classmetric1: vec![0.5, 2.5, 4.5, 9e10],
        classmetric2: vec![0.5, 2.5, 4.5, 9e10],
    }
}

pub fn mapping_info(block: usize) -> MappingInfo {
    MappingInfo {
        submaps: 1,
        chmuxlist: vec![0, 0],
        coupling_steps: 1,
        coupling_mag: vec![0],
        coupling_ang: vec![1],
        floorsubmap: vec![block],
        residuesubmap: vec![block],
    }
}

pub fn modes() -> [ModeInfo; 2] {
    [
        ModeInfo { blockflag: 0, mapping: 0 },
        ModeInfo { blockflag: 1, mapping: 1 },
    ]
}

/// Four psychoacoustic tunings: impulse, padding, transition, long.
pub fn psy_infos() -> [PsyInfo; 4] {
    [
        PsyInfo::for_block(0),
        PsyInfo::for_block(0),
        PsyInfo::for_block(1),
        PsyInfo::for_block(1),
    ]
}

pub fn psy_global() -> PsyGlobal {
    PsyGlobal::new(BLOCKSIZES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_books_satisfy_kraft() {
        for (i, b) in static_books().iter().enumerate() {
            let sum: f64 = b
                .lengthlist
                .iter()
                .filter(|&&l| l > 0)
                .map(|&l| 2f64.powi(-l))
                .sum();
            assert!((sum - 1.0).abs() < 1e-12, "book {i} kraft sum {sum}");
        }
    }

    #[test]
    fn test_books_build() {
        let books = build_books().unwrap();
        assert_eq!(books.len(), 5);
        assert_eq!(books[0].dim, 1);
        assert_eq!(books[1].entries, 16);
        assert_eq!(books[4].entries, 289);
    }

    #[test]
    fn test_lattice_lengths_center_is_short() {
        let lengths = lattice_lengths(5, 4, 7);
        // center entry (2,2) and its four neighbors get the short length
        assert_eq!(lengths[12], 4);
        assert_eq!(lengths[7], 4);
        assert_eq!(lengths[11], 4);
        assert_eq!(lengths[13], 4);
        assert_eq!(lengths[17], 4);
        assert_eq!(lengths[0], 5);
        assert_eq!(lengths.iter().filter(|&&l| l == 4).count(), 7);
    }

    #[test]
    fn test_floor_covers_half_spectrum() {
        for block in 0..2 {
            let info = floor_info(block);
            assert_eq!(info.postlist[1] as usize, BLOCKSIZES[block] / 2);
            let posts: usize = 2 + info
                .partitionclass
                .iter()
                .map(|&c| info.class_dim[c])
                .sum::<usize>();
            assert_eq!(posts, info.postlist.len());
        }
    }

    #[test]
    fn test_residue_covers_interleaved_stereo() {
        for block in 0..2 {
            let info = residue_info(block);
            assert_eq!(info.end, BLOCKSIZES[block]);
            assert_eq!((info.end - info.begin) % info.grouping, 0);
        }
    }

    #[test]
    fn test_mapping_pack_layout() {
        let mut opb = BitPacker::new();
        mapping_info(0).pack(2, &mut opb);
        // flat submap (1 bit), coupling flag + count (9 bits), mag/ang (2 bits),
        // reserved (2 bits), one submap triple (24 bits)
        assert_eq!(opb.bits(), 1 + 1 + 8 + 2 + 2 + 24);
    }

    #[test]
    fn test_mode_pack_layout() {
        let mut opb = BitPacker::new();
        modes()[1].pack(&mut opb);
        assert_eq!(opb.bits(), 1 + 16 + 16 + 8);
        // blockflag is the first bit on the wire
        assert_eq!(opb.as_slice()[0] & 1, 1);
    }
}
