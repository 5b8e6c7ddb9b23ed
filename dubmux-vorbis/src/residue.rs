//! Residue vector quantization.
//!
//! Channel residues are interleaved into one vector, classified per partition
//! by peak magnitude, then coded as a phrase codeword per partition group
//! followed by VQ codewords for every partition whose class has a book.

use crate::codebook::Codebook;
use crate::tables::{icount, ilog};
use dubmux_core::BitPacker;

/// Residue configuration as carried in the setup header.
#[derive(Debug, Clone)]
pub struct ResidueInfo {
    pub begin: usize,
    pub end: usize,
    /// Interleaved samples per partition.
    pub grouping: usize,
    /// Number of partition classes.
    pub partitions: usize,
    pub groupbook: usize,
    /// Bitmask of coding stages per class.
    pub secondstages: Vec<u32>,
    pub booklist: Vec<usize>,
    pub classmetric1: Vec<f32>,
    pub classmetric2: Vec<f32>,
}

impl ResidueInfo {
    /// Serialize into the setup header.
    pub fn pack(&self, opb: &mut BitPacker) {
        opb.write(self.begin as u32, 24);
        opb.write(self.end as u32, 24);
        opb.write(self.grouping as u32 - 1, 24);
        opb.write(self.partitions as u32 - 1, 6);
        opb.write(self.groupbook as u32, 8);

        for &ss in &self.secondstages {
            if ilog(ss) > 3 {
                opb.write(ss, 3);
                opb.write(1, 1);
                opb.write(ss >> 3, 5);
            } else {
                opb.write(ss, 4);
            }
        }
        let acc: u32 = self.secondstages.iter().map(|&s| icount(s)).sum();
        for &b in self.booklist.iter().take(acc as usize) {
            opb.write(b as u32, 8);
        }
    }
}

/// Derived encode state for one residue configuration.
#[derive(Debug, Clone)]
pub struct ResidueLook {
    pub info: ResidueInfo,
    pub stages: usize,
    /// Book index per class and stage.
    pub partbooks: Vec<Vec<Option<usize>>>,
    /// Entry count of the phrase book.
    phrase_entries: usize,
    /// Partitions grouped into one phrase codeword (phrase book dimension).
    partitions_per_word: usize,
}

impl ResidueLook {
    pub fn new(info: ResidueInfo, books: &[Codebook]) -> Self {
        let stages = info
            .secondstages
            .iter()
            .map(|&s| ilog(s) as usize)
            .max()
            .unwrap_or(0);

        let mut partbooks = vec![vec![None; stages]; info.partitions];
        let mut acc = 0usize;
        for (j, row) in partbooks.iter_mut().enumerate() {
            for (k, slot) in row.iter_mut().enumerate() {
                if info.secondstages[j] & (1 << k) != 0 {
                    *slot = Some(info.booklist[acc]);
                    acc += 1;
                }
            }
        }

        let phrasebook = &books[info.groupbook];
        ResidueLook {
            info,
            stages,
            partbooks,
            phrase_entries: phrasebook.entries,
            partitions_per_word: phrasebook.dim,
        }
    }

    /// Classify each partition of the coupled channel bundle.
    ///
    /// `bundle` holds the quantized residue of each channel in the submap;
    /// channel 0 is the magnitude vector. Returns `None` when every channel
    /// was floored to silence.
    pub fn class2(&self, bundle: &[&[f32]], nonzero: &[bool]) -> Option<Vec<usize>> {
        if !nonzero.iter().any(|&z| z) {
            return None;
        }

        let info = &self.info;
        let ch = bundle.len();
        let n = info.end - info.begin;
        let partvals = n / info.grouping;
        let mut partword = vec![0usize; partvals];

        let mut l = info.begin / ch;
        for word in partword.iter_mut() {
            let mut magmax = 0.0f32;
            let mut angmax = 0.0f32;
            let mut j = 0;
            while j < info.grouping {
                if bundle[0][l].abs() > magmax {
                    magmax = bundle[0][l].abs();
                }
                for k in bundle.iter().take(ch).skip(1) {
                    if k[l].abs() > angmax {
                        angmax = k[l].abs();
                    }
                }
                l += 1;
                j += ch;
            }

            let mut class = info.partitions - 1;
            for j in 0..info.partitions - 1 {
                if magmax <= info.classmetric1[j] && angmax <= info.classmetric2[j] {
                    class = j;
                    break;
                }
            }
            *word = class;
        }
        Some(partword)
    }

    /// Interleave the bundle and emit phrase plus VQ codewords.
    pub fn forward2(
        &self,
        opb: &mut BitPacker,
        books: &[Codebook],
        bundle: &[&[f32]],
        nonzero: &[bool],
        partword: &[usize],
    ) {
        let ch = bundle.len();
        let n = bundle[0].len();
        if !nonzero.iter().any(|&z| z) {
            return;
        }

        let mut work = vec![0.0f32; ch * n];
        for (i, pcm) in bundle.iter().enumerate() {
            let mut k = i;
            for &v in pcm.iter().take(n) {
                work[k] = v;
                k += ch;
            }
        }

        self.forward_01(opb, books, &mut work, partword);
    }

    fn forward_01(&self, opb: &mut BitPacker, books: &[Codebook], work: &mut [f32], partword: &[usize]) {
        let info = &self.info;
        let n = info.end - info.begin;
        let partvals = n / info.grouping;
        let samples_per_partition = info.grouping;
        let phrasebook = &books[info.groupbook];

        for s in 0..self.stages {
            let mut i = 0usize;
            while i < partvals {
                if s == 0 {
                    let mut val = partword[i];
                    for k in 1..self.partitions_per_word {
                        val *= info.partitions;
                        if i + k < partvals {
                            val += partword[i + k];
                        }
                    }
                    if val < self.phrase_entries {
                        phrasebook.encode(val, opb);
                    }
                }

                let mut k = 0;
                while k < self.partitions_per_word && i < partvals {
                    if info.secondstages[partword[i]] & (1 << s) != 0 {
                        if let Some(book) = self.partbooks[partword[i]][s] {
                            let offset = i * samples_per_partition + info.begin;
                            encode_part(
                                &books[book],
                                &mut work[offset..offset + samples_per_partition],
                                opb,
                            );
                        }
                    }
                    k += 1;
                    i += 1;
                }
            }
        }
    }
}

fn encode_part(book: &Codebook, vec: &mut [f32], opb: &mut BitPacker) -> u32 {
    let dim = book.dim;
    let step = vec.len() / dim;
    let mut bits = 0;
    for i in 0..step {
        let entry = book.besterror(&mut vec[i * dim..(i + 1) * dim]);
        bits += book.encode(entry, opb);
    }
    bits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup;

    fn look() -> (ResidueLook, Vec<Codebook>) {
        let books = setup::build_books().unwrap();
        let look = ResidueLook::new(setup::residue_info(0), &books);
        (look, books)
    }

    #[test]
    fn test_look_partbooks() {
        let (look, _) = look();
        assert_eq!(look.stages, 1);
        assert_eq!(look.partbooks[0][0], None);
        assert_eq!(look.partbooks[1][0], Some(2));
        assert_eq!(look.partbooks[2][0], Some(3));
        assert_eq!(look.partbooks[3][0], Some(4));
    }

    #[test]
    fn test_class2_silence() {
        let (look, _) = look();
        let a = vec![0.0f32; 128];
        let b = vec![0.0f32; 128];
        let bundle = [&a[..], &b[..]];
        assert!(look.class2(&bundle, &[false, false]).is_none());
    }

    #[test]
    fn test_class2_levels() {
        let (look, _) = look();
        let mut a = vec![0.0f32; 128];
        let b = vec![0.0f32; 128];
        // partition 0 quiet, partition 3 loud (8 samples per channel per partition)
        a[3 * 8] = 7.5;
        let bundle = [&a[..], &b[..]];
        let word = look.class2(&bundle, &[true, false]).unwrap();
        assert_eq!(word.len(), 16);
        assert_eq!(word[0], 0);
        assert_eq!(word[3], 3);
    }

    #[test]
    fn test_forward2_emits_codewords() {
        let (look, books) = look();
        let mut a = vec![0.0f32; 128];
        let b = vec![0.0f32; 128];
        for v in a.iter_mut().take(16) {
            *v = 1.0;
        }
        let bundle = [&a[..], &b[..]];
        let word = look.class2(&bundle, &[true, true]).unwrap();
        assert_eq!(word[0], 1);
        assert_eq!(word[1], 1);

        let mut opb = BitPacker::new();
        look.forward2(&mut opb, &books, &bundle, &[true, true], &word);
        // 8 phrase words (4 bits each) plus VQ words for the two hot partitions
        assert!(opb.bits() > 32);
    }

    #[test]
    fn test_encode_part_consumes_vector() {
        let (_, books) = look();
        let mut vec = vec![1.0f32, -1.0, 2.0, 0.0];
        let mut opb = BitPacker::new();
        let bits = encode_part(&books[2], &mut vec, &mut opb);
        assert_eq!(bits, opb.bits() as u32);
        // codebook vectors subtracted in place leave near-zero remainder
        for v in &vec {
            assert!(v.abs() < 0.51);
        }
    }

    #[test]
    fn test_pack_header_fields() {
        let info = setup::residue_info(1);
        let mut opb = BitPacker::new();
        info.pack(&mut opb);
        let bytes = opb.as_slice();
        // begin=0 (24 bits), end=2048 little-endian across the next 24 bits
        assert_eq!(bytes[0], 0);
        assert_eq!(bytes[1], 0);
        assert_eq!(bytes[2], 0);
        assert_eq!(bytes[3], 0x00);
        assert_eq!(bytes[4], 0x08);
    }
}
