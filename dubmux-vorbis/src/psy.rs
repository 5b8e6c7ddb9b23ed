//! Psychoacoustic masking curves.
//!
//! Two curves are computed per channel and block: a noise floor estimate from
//! bark-scale smoothing of the log-MDCT spectrum, and a tone masking curve from
//! peak spreading over the log-FFT spectrum. Their maximum (after a per-quality
//! bias) becomes the floor target handed to the floor fitter.

use crate::envelope::VE_BANDS;
use crate::PACKETBLOBS;

/// Frame-global tuning shared by all four block-type looks.
#[derive(Debug, Clone)]
pub struct PsyGlobal {
    pub preecho_thresh: [f32; VE_BANDS],
    pub postecho_thresh: [f32; VE_BANDS],
    pub stretch_penalty: f32,
    pub preecho_minenergy: f32,
    pub ampmax_att_per_sec: f32,
    /// Point-stereo crossover bin per block size and packetblob.
    pub coupling_pointlimit: [[usize; PACKETBLOBS]; 2],
    pub coupling_prepointamp: [usize; PACKETBLOBS],
    pub coupling_postpointamp: [usize; PACKETBLOBS],
    pub sliding_lowpass: [[usize; PACKETBLOBS]; 2],
}

impl PsyGlobal {
    pub fn new(blocksizes: [usize; 2]) -> Self {
        let mut coupling_pointlimit = [[0usize; PACKETBLOBS]; 2];
        let mut sliding_lowpass = [[0usize; PACKETBLOBS]; 2];
        let mut coupling_prepointamp = [0usize; PACKETBLOBS];
        let mut coupling_postpointamp = [0usize; PACKETBLOBS];
        for k in 0..PACKETBLOBS {
            coupling_pointlimit[0][k] = 32 + 96 * k / (PACKETBLOBS - 1);
            coupling_pointlimit[1][k] = 256 + 768 * k / (PACKETBLOBS - 1);
            sliding_lowpass[0][k] = blocksizes[0];
            sliding_lowpass[1][k] = blocksizes[1];
            coupling_prepointamp[k] = 3usize.saturating_sub(k / 5);
            coupling_postpointamp[k] = 5usize.saturating_sub(k / 3);
        }
        PsyGlobal {
            preecho_thresh: [8.0, 8.0, 8.0, 8.0, 6.0, 6.0, 6.0],
            postecho_thresh: [-20.0; VE_BANDS],
            stretch_penalty: 7.0,
            preecho_minenergy: -30.0,
            ampmax_att_per_sec: -6.0,
            coupling_pointlimit,
            coupling_prepointamp,
            coupling_postpointamp,
            sliding_lowpass,
        }
    }
}

/// Per-blocktype tuning.
#[derive(Debug, Clone)]
pub struct PsyInfo {
    pub blockflag: usize,
    /// First bin subject to noise normalization.
    pub normal_start: usize,
    pub normal_partition: usize,
    pub normal_thresh: f32,
    pub normal_point_p: bool,
    pub normal_channel_p: bool,
    /// Noise floor bias in dB per aggressiveness select.
    pub noise_bias: [f32; 3],
    /// High-frequency collapse strength for coupled magnitude channels.
    pub m_val: f32,
}

impl PsyInfo {
    pub fn for_block(blockflag: usize) -> Self {
        PsyInfo {
            blockflag,
            normal_start: 16,
            normal_partition: 8,
            normal_thresh: 0.2,
            normal_point_p: true,
            normal_channel_p: true,
            noise_bias: [4.0, 0.0, -4.0],
            m_val: 0.5,
        }
    }
}

fn bark(f: f64) -> f64 {
    13.1 * (0.00074 * f).atan() + 2.24 * (f * f * 1.85e-8).atan() + 1e-4 * f
}

/// Precomputed masking state for one block size.
#[derive(Debug, Clone)]
pub struct PsyLook {
    pub info: PsyInfo,
    pub n: usize,
    /// Inclusive smoothing window per bin, spanning roughly one bark.
    lo: Vec<usize>,
    hi: Vec<usize>,
    /// Tone spreading decay per bin step, in dB.
    decay: Vec<f32>,
}

impl PsyLook {
    /// `n` is the spectrum length (half the block size).
    pub fn new(info: PsyInfo, n: usize, rate: u32) -> Self {
        let mut lo = vec![0usize; n];
        let mut hi = vec![0usize; n];
        let mut decay = vec![0.0f32; n];
        let binhz = rate as f64 / 2.0 / n as f64;
        for i in 0..n {
            let b = bark(i as f64 * binhz);
            let mut l = i;
            while l > 0 && bark((l - 1) as f64 * binhz) > b - 0.5 {
                l -= 1;
            }
            let mut h = i;
            while h + 1 < n && bark((h + 1) as f64 * binhz) < b + 0.5 {
                h += 1;
            }
            lo[i] = l;
            hi[i] = h;
            // about 8 dB of rolloff per bark on either side of a peak
            let width = (h - l + 1) as f32;
            decay[i] = 8.0 / width;
        }
        PsyLook { info, n, lo, hi, decay }
    }

    /// Noise floor estimate: bark-window mean of the log-MDCT spectrum.
    pub fn noisemask(&self, logmdct: &[f32], noise: &mut [f32]) {
        let n = self.n;
        let mut prefix = vec![0.0f64; n + 1];
        for i in 0..n {
            prefix[i + 1] = prefix[i] + logmdct[i] as f64;
        }
        for i in 0..n {
            let (l, h) = (self.lo[i], self.hi[i]);
            noise[i] = ((prefix[h + 1] - prefix[l]) / (h - l + 1) as f64) as f32;
        }
    }

    /// Tone masking curve: bidirectional peak decay over the log-FFT spectrum.
    pub fn tonemask(&self, logfft: &[f32], tone: &mut [f32], global_ampmax: f32, local_ampmax: f32) {
        let n = self.n;
        // quieter frames get less masking headroom
        let att = ((local_ampmax - global_ampmax) * 0.5).clamp(-10.0, 0.0);

        let mut run = crate::NEGINF;
        for i in 0..n {
            run -= self.decay[i];
            let seed = logfft[i] - 6.0;
            if seed > run {
                run = seed;
            }
            tone[i] = run;
        }
        run = crate::NEGINF;
        for i in (0..n).rev() {
            run -= self.decay[i];
            let seed = logfft[i] - 6.0;
            if seed > run {
                run = seed;
            }
            if run > tone[i] {
                tone[i] = run;
            }
            tone[i] += att;
        }
    }

    /// Combine the two curves into the final floor target.
    pub fn offset_and_mix(
        &self,
        noise: &[f32],
        tone: &[f32],
        offset_select: usize,
        logmask: &mut [f32],
    ) {
        let bias = self.info.noise_bias[offset_select];
        for i in 0..self.n {
            let nv = noise[i] + bias;
            logmask[i] = if tone[i] > nv { tone[i] } else { nv };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn look(n: usize) -> PsyLook {
        PsyLook::new(PsyInfo::for_block(0), n, 44100)
    }

    #[test]
    fn test_pointlimit_monotone() {
        let g = PsyGlobal::new([256, 2048]);
        for k in 1..PACKETBLOBS {
            assert!(g.coupling_pointlimit[0][k] >= g.coupling_pointlimit[0][k - 1]);
            assert!(g.coupling_pointlimit[1][k] >= g.coupling_pointlimit[1][k - 1]);
        }
        assert_eq!(g.coupling_pointlimit[0][0], 32);
        assert_eq!(g.coupling_pointlimit[1][PACKETBLOBS - 1], 1024);
    }

    #[test]
    fn test_noisemask_flat_spectrum_stays_flat() {
        let l = look(128);
        let logmdct = vec![-40.0f32; 128];
        let mut noise = vec![0.0f32; 128];
        l.noisemask(&logmdct, &mut noise);
        for v in &noise {
            assert!((v + 40.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_tonemask_spreads_from_peak() {
        let l = look(128);
        let mut logfft = vec![-90.0f32; 128];
        logfft[40] = -10.0;
        let mut tone = vec![0.0f32; 128];
        l.tonemask(&logfft, &mut tone, 0.0, 0.0);
        assert!(tone[40] > tone[50]);
        assert!(tone[50] > tone[70]);
        // spreading is bidirectional
        assert!(tone[35] > tone[20]);
        assert!(tone[41] > -90.0);
    }

    #[test]
    fn test_offset_and_mix_takes_maximum() {
        let l = look(8);
        let noise = vec![-50.0f32; 8];
        let mut tone = vec![-90.0f32; 8];
        tone[3] = -20.0;
        let mut mask = vec![0.0f32; 8];
        l.offset_and_mix(&noise, &tone, 1, &mut mask);
        assert_eq!(mask[0], -50.0);
        assert_eq!(mask[3], -20.0);
    }
}
