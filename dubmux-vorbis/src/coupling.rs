//! Channel coupling and noise normalization.
//!
//! Stereo pairs are rotated into magnitude/angle form. Quiet bins collapse to
//! point stereo (magnitude only, scaled by the coupled floor), loud bins keep
//! a lossless angle term. Noise normalization preserves partition energy that
//! rounding would otherwise delete by forcing unit pulses at the loudest bins.

use crate::psy::{PsyGlobal, PsyLook};
use crate::setup::MappingInfo;
use crate::tables::{unitnorm, FLOOR1_FROMDB_INV_LOOKUP};

pub static STEREO_THRESHOLDS: [f32; 9] = [0.0, 0.5, 1.0, 1.5, 2.5, 4.5, 8.5, 16.5, 9e10];
pub static STEREO_THRESHOLDS_LIMITED: [f32; 9] = [0.0, 0.5, 1.0, 1.5, 2.0, 2.5, 4.5, 8.5, 9e10];

/// Floor magnitude correction for point stereo, indexed by floor dB distance.
static HYPOT_LOOKUP: [f32; 32] = [
    -0.009935, -0.011245, -0.012726, -0.014397,
    -0.016282, -0.018407, -0.020800, -0.023494,
    -0.026522, -0.029923, -0.033737, -0.038010,
    -0.042787, -0.048121, -0.054064, -0.060671,
    -0.068000, -0.076109, -0.085054, -0.094892,
    -0.105675, -0.117451, -0.130260, -0.144134,
    -0.159093, -0.175146, -0.192286, -0.210490,
    -0.229718, -0.249913, -0.271001, -0.292893,
];

/// Signed magnitude for in-phase pairs; antiphase energy subtracts.
pub fn dipole_hypot(a: f32, b: f32) -> f32 {
    if a > 0.0 {
        if b > 0.0 {
            return (a * a + b * b).sqrt();
        }
        if a > -b {
            return (a * a - b * b).sqrt();
        }
        return -(b * b - a * a).sqrt();
    }
    if b < 0.0 {
        return -(a * a + b * b).sqrt();
    }
    if -a > b {
        return -(a * a + b * b).sqrt();
    }
    (b * b + a * a).sqrt()
}

/// Signed magnitude with energy always summed.
pub fn round_hypot(a: f32, b: f32) -> f32 {
    let h = (a * a + b * b).sqrt();
    if a > 0.0 {
        if b > 0.0 || a > -b {
            h
        } else {
            -h
        }
    } else if b < 0.0 || -a > b {
        -h
    } else {
        h
    }
}

fn precomputed_couple_point(premag: f32, floor_m: i32, floor_a: i32) -> (f32, f32) {
    let offset = 31 - (floor_m - floor_a).abs();
    let floormag = if offset < 0 {
        HYPOT_LOOKUP[0] + 1.0
    } else {
        HYPOT_LOOKUP[offset as usize] + 1.0
    };
    let flr = if floor_m > floor_a { floor_m } else { floor_a };
    let floormag = floormag * FLOOR1_FROMDB_INV_LOOKUP[flr as usize];
    (premag * floormag, 0.0)
}

fn couple_lossless(a: f32, b: f32, q_a: f32, q_b: f32) -> (f32, f32) {
    let mut qa = q_a;
    let mut qb = q_b;

    let mut test1 = match qa.abs().partial_cmp(&qb.abs()) {
        Some(std::cmp::Ordering::Greater) => 1,
        Some(std::cmp::Ordering::Less) => -1,
        _ => 0,
    };
    if test1 <= 0 {
        test1 = if a.abs() > b.abs() { 1 } else { -1 };
    }

    if test1 == 1 {
        qb = if qa > 0.0 { qa - qb } else { qb - qa };
    } else {
        let temp = qb;
        qb = if qb > 0.0 { qa - qb } else { qb - qa };
        qa = temp;
    }

    if qb > qa.abs() * 1.9999 {
        qb = -qa.abs() * 2.0;
        qa = -qa;
    }
    (qa, qb)
}

/// Signed coupled magnitudes per coupling step, before quantization.
pub fn quantize_couple_memo(
    g: &PsyGlobal,
    p: &PsyLook,
    vi: &MappingInfo,
    gmdct: &[Vec<f32>],
) -> Vec<Vec<f32>> {
    let n = p.n;
    let limit = g.coupling_pointlimit[p.info.blockflag][crate::PACKETBLOBS / 2];
    let mut ret = vec![vec![0.0f32; n]; vi.coupling_steps];

    for (i, row) in ret.iter_mut().enumerate() {
        let mdct_m = &gmdct[vi.coupling_mag[i]];
        let mdct_a = &gmdct[vi.coupling_ang[i]];
        for (j, v) in row.iter_mut().enumerate() {
            *v = if j < limit {
                dipole_hypot(mdct_m[j], mdct_a[j])
            } else {
                round_hypot(mdct_m[j], mdct_a[j])
            };
        }
    }
    ret
}

/// Indices of `data[offset..offset+count]`, ordered by descending magnitude.
fn sortindex(index: &mut [usize], ioff: usize, data: &[f32], offset: usize, count: usize) {
    let slot = &mut index[ioff..ioff + count];
    for (i, s) in slot.iter_mut().enumerate() {
        *s = offset + i;
    }
    slot.sort_by(|&a, &b| {
        data[b]
            .abs()
            .partial_cmp(&data[a].abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Per-partition magnitude ordering of the couple memo.
pub fn quantize_couple_sort(
    p: &PsyLook,
    vi: &MappingInfo,
    mags: &[Vec<f32>],
) -> Option<Vec<Vec<usize>>> {
    if !p.info.normal_point_p {
        return None;
    }
    let n = p.n;
    let partition = p.info.normal_partition;
    let mut ret = vec![vec![0usize; n]; vi.coupling_steps];

    for (i, row) in ret.iter_mut().enumerate() {
        let mut j = 0;
        while j < n {
            sortindex(row, j, &mags[i], j, partition);
            j += partition;
        }
    }
    Some(ret)
}

/// Magnitude ordering of a single channel's spectrum for noise normalization.
pub fn noise_normalize_sort(p: &PsyLook, magnitudes: &[f32]) -> Vec<usize> {
    let n = p.n;
    let start = p.info.normal_start;
    let mut partition = p.info.normal_partition;
    let mut index = vec![0usize; n.saturating_sub(start)];

    let mut j = start;
    while j < n {
        if j + partition > n {
            partition = n - j;
        }
        sortindex(&mut index, j - start, magnitudes, j, partition);
        j += partition;
    }
    index
}

/// Collapse coupled high frequencies toward mono ahead of quantization.
pub fn hf_reduction(g: &PsyGlobal, p: &PsyLook, vi: &MappingInfo, mag_memo: &mut [Vec<f32>]) {
    let n = p.n;
    let de = 0.3 * p.info.m_val;
    let limit = g.coupling_pointlimit[p.info.blockflag][crate::PACKETBLOBS / 2];

    for row in mag_memo.iter_mut().take(vi.coupling_steps) {
        for j in limit..n {
            row[j] *= 1.0 - de * (j - limit) as f32 / (n - limit) as f32;
        }
    }
}

/// Divide the spectrum by the coded floor curve to form the residue vector.
pub fn remove_floor(
    n: usize,
    mdct: &[f32],
    codedflr: &[i32],
    residue: &mut [f32],
    sliding_lowpass: usize,
) {
    let stop = sliding_lowpass.min(n);
    for i in 0..stop {
        residue[i] = mdct[i] * FLOOR1_FROMDB_INV_LOOKUP[codedflr[i] as usize];
    }
    for r in residue.iter_mut().take(n).skip(stop) {
        *r = 0.0;
    }
}

/// Quantize a residue vector into `vec[n..2n]`, spending unit pulses on the
/// loudest sub-unity bins while partition energy remains.
pub fn noise_normalize(p: &PsyLook, vec: &mut [f32], sortedindex: &[usize]) {
    let n = p.n;
    let info = &p.info;
    let partition = info.normal_partition;
    let start = info.normal_start.min(n);
    let out = n;

    let mut j = 0usize;
    if info.normal_channel_p {
        while j < start {
            vec[out + j] = vec[j].round_ties_even();
            j += 1;
        }

        while j + partition <= n {
            let mut acc = 0.0f32;
            for i in j..j + partition {
                acc += vec[i] * vec[i];
            }

            let mut i = 0usize;
            while i < partition {
                let k = sortedindex[i + j - start];
                if vec[k] * vec[k] >= 0.25 {
                    vec[out + k] = vec[k].round_ties_even();
                    acc -= vec[k] * vec[k];
                } else {
                    if acc < info.normal_thresh {
                        break;
                    }
                    vec[out + k] = unitnorm(vec[k]);
                    acc -= 1.0;
                }
                i += 1;
            }

            while i < partition {
                let k = sortedindex[i + j - start];
                vec[out + k] = 0.0;
                i += 1;
            }
            j += partition;
        }
    }

    while j < n {
        vec[out + j] = vec[j].round_ties_even();
        j += 1;
    }
}

/// Apply stereo coupling for one packetblob across all coupling steps.
///
/// `res` holds per-channel vectors of length `2n`: raw residues in the first
/// half, quantized output in the second. `ifloor` carries each channel's coded
/// floor curve.
#[allow(clippy::too_many_arguments)]
pub fn couple(
    blobno: usize,
    g: &PsyGlobal,
    p: &PsyLook,
    vi: &MappingInfo,
    res: &mut [Vec<f32>],
    mag_memo: &[Vec<f32>],
    mag_sort: Option<&[Vec<usize>]>,
    ifloor: &[Vec<i32>],
    nonzero: &mut [bool],
    sliding_lowpass: usize,
) {
    let n = p.n;

    for i in 0..vi.coupling_steps {
        let mi = vi.coupling_mag[i];
        let ai = vi.coupling_ang[i];
        if !(nonzero[mi] || nonzero[ai]) {
            continue;
        }

        // coupling a zero and a nonzero channel leaves two nonzero channels
        nonzero[mi] = true;
        nonzero[ai] = true;

        let prepoint = STEREO_THRESHOLDS[g.coupling_prepointamp[blobno]];
        let mut postpoint = STEREO_THRESHOLDS[g.coupling_postpointamp[blobno]];
        if n > 1000 {
            postpoint = STEREO_THRESHOLDS_LIMITED[g.coupling_postpointamp[blobno]];
        }
        let partition = if p.info.normal_point_p { p.info.normal_partition } else { n };
        let limit = g.coupling_pointlimit[p.info.blockflag][blobno];
        let pointlimit = limit;

        let (r_m, r_a) = pair_mut(res, mi, ai);
        let floor_m = &ifloor[mi];
        let floor_a = &ifloor[ai];

        let mut j = 0usize;
        while j < n {
            let mut acc = 0.0f32;

            for k in 0..partition {
                let l = k + j;
                if l < sliding_lowpass {
                    let point = (l >= limit && r_m[l].abs() < postpoint && r_a[l].abs() < postpoint)
                        || (r_m[l].abs() < prepoint && r_a[l].abs() < prepoint);
                    if point {
                        let (qm, qa) = precomputed_couple_point(mag_memo[i][l], floor_m[l], floor_a[l]);
                        r_m[n + l] = qm;
                        r_a[n + l] = qa;
                        if r_m[n + l].round_ties_even() == 0.0 {
                            acc += r_m[n + l] * r_m[n + l];
                        }
                    } else {
                        let (qm, qa) = couple_lossless(r_m[l], r_a[l], r_m[n + l], r_a[n + l]);
                        r_m[n + l] = qm;
                        r_a[n + l] = qa;
                    }
                } else {
                    r_m[n + l] = 0.0;
                    r_a[n + l] = 0.0;
                }
            }

            if p.info.normal_point_p {
                if let Some(sort) = mag_sort {
                    let mut k = 0usize;
                    while k < partition && acc >= p.info.normal_thresh {
                        let l = sort[i][j + k];
                        if l < sliding_lowpass
                            && l >= pointlimit
                            && r_m[n + l].round_ties_even() == 0.0
                        {
                            r_m[n + l] = unitnorm(r_m[n + l]);
                            acc -= 1.0;
                        }
                        k += 1;
                    }
                }
            }
            j += partition;
        }
    }
}

/// Mutable references to two distinct rows.
fn pair_mut(rows: &mut [Vec<f32>], a: usize, b: usize) -> (&mut Vec<f32>, &mut Vec<f32>) {
    assert_ne!(a, b);
    if a < b {
        let (lo, hi) = rows.split_at_mut(b);
        (&mut lo[a], &mut hi[0])
    } else {
        let (lo, hi) = rows.split_at_mut(a);
        (&mut hi[0], &mut lo[b])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psy::{PsyInfo, PsyLook};

    #[test]
    fn test_dipole_hypot_signs() {
        assert!((dipole_hypot(3.0, 4.0) - 5.0).abs() < 1e-6);
        assert!((dipole_hypot(-3.0, -4.0) + 5.0).abs() < 1e-6);
        // antiphase subtracts energy
        assert!((dipole_hypot(4.0, -3.0) - (7.0f32).sqrt()).abs() < 1e-6);
        assert!((dipole_hypot(3.0, -4.0) + (7.0f32).sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_round_hypot_magnitude() {
        assert!((round_hypot(3.0, -4.0).abs() - 5.0).abs() < 1e-6);
        assert!(round_hypot(3.0, -4.0) > 0.0);
        assert!(round_hypot(-4.0, 3.0) < 0.0);
    }

    #[test]
    fn test_couple_lossless_round_trip() {
        // mag dominant: angle becomes a small difference
        let (qa, qb) = couple_lossless(4.0, 3.0, 4.0, 3.0);
        assert_eq!(qa, 4.0);
        assert_eq!(qb, 1.0);
        // ang dominant: swap
        let (qa, qb) = couple_lossless(1.0, -3.0, 1.0, -3.0);
        assert_eq!(qa, -3.0);
        assert_eq!(qb, -4.0);
    }

    #[test]
    fn test_noise_normalize_keeps_partition_energy() {
        let look = PsyLook::new(PsyInfo::for_block(0), 128, 44100);
        let mut vec = vec![0.0f32; 256];
        // partition at bins 16..24: all sub-unity but energetic
        for v in vec.iter_mut().take(24).skip(16) {
            *v = 0.45;
        }
        let sorted = noise_normalize_sort(&look, &vec[..128]);
        noise_normalize(&look, &mut vec, &sorted);
        // energy 8*0.2025 = 1.62: at least one unit pulse survives rounding
        let pulses: f32 = vec[128 + 16..128 + 24].iter().map(|v| v.abs()).sum();
        assert!(pulses >= 1.0);
    }

    #[test]
    fn test_pair_mut_disjoint() {
        let mut rows = vec![vec![1.0f32], vec![2.0f32]];
        let (a, b) = pair_mut(&mut rows, 1, 0);
        assert_eq!(a[0], 2.0);
        assert_eq!(b[0], 1.0);
    }
}
