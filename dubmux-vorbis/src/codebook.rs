//! Huffman/VQ codebooks.
//!
//! A static codebook carries the entry lengths plus the quantized value list;
//! the runtime form adds the assigned codewords, the unquantized vectors and a
//! threshold tree used to map residue vectors onto their nearest entry.

use crate::error::{Result, VorbisError};
use crate::tables::ilog;
use dubmux_core::BitPacker;

/// Value list interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapType {
    /// No value list; entries are bare codewords.
    None,
    /// Implicit lattice built from `quantvals` scalar values.
    Lattice,
}

/// Codebook as it appears in the setup header.
#[derive(Debug, Clone)]
pub struct StaticCodebook {
    pub dim: usize,
    pub entries: usize,
    /// Codeword length per entry; 0 marks an unused entry.
    pub lengthlist: Vec<i32>,
    pub maptype: MapType,
    pub q_min: u32,
    pub q_delta: u32,
    pub q_quant: u32,
    pub q_sequencep: bool,
    pub quantlist: Vec<u32>,
}

/// Pack a float into the 32-bit exponent/mantissa wire format.
pub fn float32_pack(val: f32) -> u32 {
    if val == 0.0 {
        return 0;
    }
    let sign = if val < 0.0 { 0x8000_0000u32 } else { 0 };
    let mut val = val.abs() as f64;
    let mut exp = val.log2().floor() as i32;
    val = (val * 2f64.powi(20 - exp)).round();
    // normalize in case rounding crossed a power of two
    if val >= (1 << 21) as f64 {
        val /= 2.0;
        exp += 1;
    }
    let mant = val as u32 & 0x1f_ffff;
    sign | (((exp + 768) as u32) << 21) | mant
}

/// Unpack the 32-bit float wire format.
pub fn float32_unpack(val: u32) -> f32 {
    let mant = (val & 0x1f_ffff) as f64;
    let sign = val & 0x8000_0000 != 0;
    let exp = ((val & 0x7fe0_0000) >> 21) as i32;
    let mant = if sign { -mant } else { mant };
    (mant * 2f64.powi(exp - 20 - 768)) as f32
}

/// Largest `q` with `q.pow(dim) <= entries` for lattice books.
pub fn maptype1_quantvals(entries: usize, dim: usize) -> usize {
    if entries < 1 {
        return 0;
    }
    let mut vals = (entries as f64).powf(1.0 / dim as f64).floor() as usize;
    loop {
        let mut acc: u64 = 1;
        let mut acc1: u64 = 1;
        for _ in 0..dim {
            acc = acc.saturating_mul(vals as u64);
            acc1 = acc1.saturating_mul(vals as u64 + 1);
        }
        if acc <= entries as u64 && acc1 > entries as u64 {
            return vals;
        }
        if acc > entries as u64 {
            vals -= 1;
        } else {
            vals += 1;
        }
    }
}

/// Assign canonical Huffman codewords from the length list.
///
/// Words come back bit-reversed within their length so they can be written
/// LSB first. Returns an error if the lengths overpopulate the code space.
pub fn make_words(lengths: &[i32]) -> Result<Vec<u32>> {
    let mut marker = [0u32; 33];
    let mut r = vec![0u32; lengths.len()];
    let mut count = 0usize;

    for &length in lengths {
        if length <= 0 {
            continue;
        }
        let l = length as usize;
        let mut entry = marker[l];
        if l < 32 && (entry >> l) != 0 {
            return Err(VorbisError::InvalidCodebook(
                "codeword lengths overpopulate the tree".into(),
            ));
        }
        r[count] = entry;
        count += 1;

        // increment the tree along this branch
        for j in (1..=l).rev() {
            if marker[j] & 1 != 0 {
                if j == 1 {
                    marker[1] += 1;
                } else {
                    marker[j] = marker[j - 1] << 1;
                }
                break;
            }
            marker[j] += 1;
        }
        // prune now-unreachable deeper prefixes
        for j in l + 1..33 {
            if (marker[j] >> 1) == entry {
                entry = marker[j];
                marker[j] = marker[j - 1] << 1;
            } else {
                break;
            }
        }
    }

    let mut out = vec![0u32; lengths.len()];
    let mut count = 0usize;
    for (i, &length) in lengths.iter().enumerate() {
        if length <= 0 {
            continue;
        }
        let mut temp = 0u32;
        for j in 0..length as u32 {
            temp <<= 1;
            temp |= (r[count] >> j) & 1;
        }
        out[i] = temp;
        count += 1;
    }
    Ok(out)
}

fn unquantize(b: &StaticCodebook) -> Vec<f32> {
    match b.maptype {
        MapType::None => Vec::new(),
        MapType::Lattice => {
            let quantvals = maptype1_quantvals(b.entries, b.dim);
            let mindel = float32_unpack(b.q_min);
            let delta = float32_unpack(b.q_delta);
            let mut r = vec![0.0f32; b.entries * b.dim];
            for j in 0..b.entries {
                let mut last = 0.0f32;
                let mut indexdiv = 1usize;
                for k in 0..b.dim {
                    let index = (j / indexdiv) % quantvals;
                    let val = b.quantlist[index] as f32 * delta + mindel + last;
                    if b.q_sequencep {
                        last = val;
                    }
                    r[j * b.dim + k] = val;
                    indexdiv *= quantvals;
                }
            }
            r
        }
    }
}

/// Runtime codebook with assigned codewords and the nearest-entry search tree.
#[derive(Debug, Clone)]
pub struct Codebook {
    pub dim: usize,
    pub entries: usize,
    pub lengthlist: Vec<i32>,
    pub codelist: Vec<u32>,
    pub valuelist: Vec<f32>,
    quantvals: usize,
    quantthresh: Vec<f32>,
    quantmap: Vec<usize>,
}

impl Codebook {
    pub fn new(b: &StaticCodebook) -> Result<Self> {
        let codelist = make_words(&b.lengthlist)?;
        let valuelist = unquantize(b);

        let (quantvals, quantthresh, quantmap) = match b.maptype {
            MapType::None => (0, Vec::new(), Vec::new()),
            MapType::Lattice => {
                let quantvals = maptype1_quantvals(b.entries, b.dim);
                let mindel = float32_unpack(b.q_min);
                let delta = float32_unpack(b.q_delta);
                let vals: Vec<f32> = (0..quantvals)
                    .map(|i| b.quantlist[i] as f32 * delta + mindel)
                    .collect();
                let thresh: Vec<f32> = (0..quantvals - 1)
                    .map(|i| (vals[i] + vals[i + 1]) * 0.5)
                    .collect();
                let map: Vec<usize> = (0..quantvals).collect();
                (quantvals, thresh, map)
            }
        };

        Ok(Codebook {
            dim: b.dim,
            entries: b.entries,
            lengthlist: b.lengthlist.clone(),
            codelist,
            valuelist,
            quantvals,
            quantthresh,
            quantmap,
        })
    }

    /// Write the codeword for `entry`; returns the number of bits emitted.
    pub fn encode(&self, entry: usize, packer: &mut BitPacker) -> u32 {
        let bits = self.lengthlist[entry] as u32;
        packer.write(self.codelist[entry], bits);
        bits
    }

    /// Map `a` (one `dim`-sized vector) onto its best entry and subtract the
    /// chosen codebook vector in place.
    pub fn besterror(&self, a: &mut [f32]) -> usize {
        let dim = self.dim;
        let threshvals = self.quantvals;

        let mut best = 0usize;
        let mut o = dim;
        for _ in 0..dim {
            o -= 1;
            let val = a[o];
            let mut i = threshvals >> 1;
            if i > 0 && val < self.quantthresh[i - 1] {
                while i > 1 {
                    if val >= self.quantthresh[i - 2] {
                        break;
                    }
                    i -= 1;
                }
                i -= 1;
            } else {
                while i + 1 < threshvals {
                    if val < self.quantthresh[i] {
                        break;
                    }
                    i += 1;
                }
            }
            best = best * self.quantvals + self.quantmap[i];
        }

        if self.lengthlist[best] <= 0 {
            // threshold pick landed on an unused entry; fall back to a full scan
            let mut bestf = f32::INFINITY;
            let mut found = best;
            for i in 0..self.entries {
                if self.lengthlist[i] > 0 {
                    let mut acc = 0.0f32;
                    for j in 0..dim {
                        let d = self.valuelist[i * dim + j] - a[j];
                        acc += d * d;
                    }
                    if acc < bestf {
                        bestf = acc;
                        found = i;
                    }
                }
            }
            best = found;
        }

        for j in 0..dim {
            a[j] -= self.valuelist[best * dim + j];
        }
        best
    }
}

/// Serialize a static codebook into the setup header.
pub fn pack_static(b: &StaticCodebook, packer: &mut BitPacker) {
    packer.write(0x564342, 24);
    packer.write(b.dim as u32, 16);
    packer.write(b.entries as u32, 24);

    // ordered packing applies only when lengths never decrease and no entry
    // is unused
    let ordered = b.lengthlist.iter().all(|&l| l > 0)
        && b.lengthlist.windows(2).all(|w| w[0] <= w[1]);

    if ordered {
        packer.write(1, 1);
        packer.write(b.lengthlist[0] as u32 - 1, 5);
        let mut count = 0u32;
        let mut i = 0usize;
        while i < b.entries {
            let this = b.lengthlist[i];
            let mut run = i;
            while run < b.entries && b.lengthlist[run] == this {
                run += 1;
            }
            packer.write(run as u32 - count, ilog(b.entries as u32 - count));
            count = run as u32;
            i = run;
        }
    } else {
        packer.write(0, 1);
        let sparse = b.lengthlist.iter().any(|&l| l == 0);
        if sparse {
            packer.write(1, 1);
            for &l in &b.lengthlist {
                if l > 0 {
                    packer.write(1, 1);
                    packer.write(l as u32 - 1, 5);
                } else {
                    packer.write(0, 1);
                }
            }
        } else {
            packer.write(0, 1);
            for &l in &b.lengthlist {
                packer.write(l as u32 - 1, 5);
            }
        }
    }

    match b.maptype {
        MapType::None => packer.write(0, 4),
        MapType::Lattice => {
            packer.write(1, 4);
            packer.write(b.q_min, 32);
            packer.write(b.q_delta, 32);
            packer.write(b.q_quant - 1, 4);
            packer.write(u32::from(b.q_sequencep), 1);
            let quantvals = maptype1_quantvals(b.entries, b.dim);
            for &q in b.quantlist.iter().take(quantvals) {
                packer.write(q, b.q_quant);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lattice_book() -> StaticCodebook {
        // dim-2 lattice over values -2..=2, full binary tree
        let mut lengthlist = vec![5i32; 25];
        for l in lengthlist.iter_mut().take(7) {
            *l = 4;
        }
        // 7 entries at 4 bits + 18 at 5 bits: 7/16 + 18/32 = 1
        StaticCodebook {
            dim: 2,
            entries: 25,
            lengthlist,
            maptype: MapType::Lattice,
            q_min: float32_pack(-2.0),
            q_delta: float32_pack(1.0),
            q_quant: 3,
            q_sequencep: false,
            quantlist: vec![0, 1, 2, 3, 4],
        }
    }

    #[test]
    fn test_float32_pack_known_values() {
        assert_eq!(float32_pack(1.0), 0x60100000);
        assert_eq!(float32_pack(2.0), 0x60300000);
        assert_eq!(float32_pack(-2.0), 0xE0300000);
        assert_eq!(float32_pack(0.0), 0);
    }

    #[test]
    fn test_float32_round_trip() {
        for v in [-8.0f32, -2.0, -0.5, 0.25, 1.0, 3.0, 1000.0] {
            let got = float32_unpack(float32_pack(v));
            assert!((got - v).abs() < v.abs() * 1e-5, "{v} -> {got}");
        }
    }

    #[test]
    fn test_maptype1_quantvals() {
        assert_eq!(maptype1_quantvals(25, 2), 5);
        assert_eq!(maptype1_quantvals(81, 2), 9);
        assert_eq!(maptype1_quantvals(289, 2), 17);
        assert_eq!(maptype1_quantvals(128, 1), 128);
    }

    #[test]
    fn test_make_words_canonical() {
        // lengths 1,2,3,3 -> canonical codes 0, 10, 110, 111, then reversed
        let words = make_words(&[1, 2, 3, 3]).unwrap();
        assert_eq!(words, vec![0, 1, 3, 7]);
    }

    #[test]
    fn test_make_words_balanced() {
        let words = make_words(&[2, 2, 2, 2]).unwrap();
        // all four 2-bit codes, each assigned once
        let mut sorted = words.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_make_words_overpopulated() {
        assert!(make_words(&[1, 1, 2]).is_err());
    }

    #[test]
    fn test_unquantize_lattice_values() {
        let book = Codebook::new(&lattice_book()).unwrap();
        // entry 0 is (-2,-2), entry 24 is (2,2)
        assert!((book.valuelist[0] + 2.0).abs() < 1e-6);
        assert!((book.valuelist[1] + 2.0).abs() < 1e-6);
        assert!((book.valuelist[48] - 2.0).abs() < 1e-6);
        assert!((book.valuelist[49] - 2.0).abs() < 1e-6);
        // entry 7: index (7%5, 7/5) = (2,1) -> (0,-1)
        assert!((book.valuelist[14]).abs() < 1e-6);
        assert!((book.valuelist[15] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_besterror_picks_nearest_and_subtracts() {
        let book = Codebook::new(&lattice_book()).unwrap();
        let mut a = [0.9f32, -1.2];
        let entry = book.besterror(&mut a);
        // nearest lattice point is (1,-1)
        assert!((book.valuelist[entry * 2] - 1.0).abs() < 1e-6);
        assert!((book.valuelist[entry * 2 + 1] + 1.0).abs() < 1e-6);
        assert!((a[0] + 0.1).abs() < 1e-5);
        assert!((a[1] + 0.2).abs() < 1e-5);
    }

    #[test]
    fn test_encode_emits_length_bits() {
        let book = Codebook::new(&lattice_book()).unwrap();
        let mut packer = BitPacker::new();
        let bits = book.encode(0, &mut packer);
        assert_eq!(bits, 4);
        assert_eq!(packer.bits(), 4);
    }

    #[test]
    fn test_pack_static_sync_pattern() {
        let b = lattice_book();
        let mut packer = BitPacker::new();
        pack_static(&b, &mut packer);
        let bytes = packer.as_slice();
        assert_eq!(bytes[0], 0x42);
        assert_eq!(bytes[1], 0x43);
        assert_eq!(bytes[2], 0x56);
    }
}
