//! Transient detection.
//!
//! A sliding 128-sample MDCT scans ahead of the analysis center in 64-sample
//! steps; per-band amplitude deltas against a stretchable history trigger
//! pre-echo and post-echo marks that force short blocks.

use crate::mdct::Mdct;
use crate::psy::PsyGlobal;
use crate::tables::todb;

pub const VE_PRE: usize = 16;
pub const VE_WIN: usize = 4;
pub const VE_POST: usize = 2;
pub const VE_AMP: usize = VE_PRE + VE_POST - 1;
pub const VE_BANDS: usize = 7;
pub const VE_NEARDC: usize = 15;
pub const VE_MINSTRETCH: i32 = 2;
pub const VE_MAXSTRETCH: i32 = 12;

#[derive(Debug, Clone)]
struct EnvelopeFilterState {
    ampbuf: [f32; VE_AMP],
    ampptr: usize,
    near_dc: [f32; VE_NEARDC],
    near_dc_acc: f32,
    near_dc_partialacc: f32,
    nearptr: usize,
}

impl EnvelopeFilterState {
    fn new() -> Self {
        EnvelopeFilterState {
            ampbuf: [0.0; VE_AMP],
            ampptr: 0,
            near_dc: [0.0; VE_NEARDC],
            near_dc_acc: 0.0,
            near_dc_partialacc: 0.0,
            nearptr: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct EnvelopeBand {
    begin: usize,
    window: Vec<f32>,
    total: f32,
}

impl EnvelopeBand {
    fn new(begin: usize, end: usize) -> Self {
        let window: Vec<f32> = (0..end)
            .map(|i| ((i as f64 + 0.5) / end as f64 * std::f64::consts::PI).sin() as f32)
            .collect();
        let total = 1.0 / window.iter().sum::<f32>();
        EnvelopeBand { begin, window, total }
    }
}

/// Envelope tracker state for one stream.
#[derive(Debug, Clone)]
pub struct Envelope {
    ch: usize,
    winlength: usize,
    pub searchstep: usize,
    minenergy: f32,
    mdct: Mdct,
    mdct_win: Vec<f32>,
    bands: Vec<EnvelopeBand>,
    filters: Vec<EnvelopeFilterState>,
    mark: Vec<u8>,
    current: i64,
    curmark: i64,
    pub cursor: i64,
    stretch: i32,
}

impl Envelope {
    pub fn new(ch: usize, blocksizes: [usize; 2], gi: &PsyGlobal) -> Self {
        let winlength = 128;
        let n = winlength;
        let mdct_win: Vec<f32> = (0..n)
            .map(|i| {
                let s = (i as f64 / (n - 1) as f64 * std::f64::consts::PI).sin();
                (s * s) as f32
            })
            .collect();
        let bands = vec![
            EnvelopeBand::new(2, 4),
            EnvelopeBand::new(4, 5),
            EnvelopeBand::new(6, 6),
            EnvelopeBand::new(9, 8),
            EnvelopeBand::new(13, 8),
            EnvelopeBand::new(17, 8),
            EnvelopeBand::new(22, 8),
        ];
        Envelope {
            ch,
            winlength,
            searchstep: 64,
            minenergy: gi.preecho_minenergy,
            mdct: Mdct::new(winlength),
            mdct_win,
            bands,
            filters: vec![EnvelopeFilterState::new(); VE_BANDS * ch],
            mark: vec![0; 128],
            current: 0,
            curmark: -1,
            cursor: blocksizes[1] as i64 / 2,
            stretch: 0,
        }
    }

    fn amp(&mut self, gi: &PsyGlobal, data: &[f32], filter_base: usize) -> u32 {
        let n = self.winlength;
        let mut ret = 0u32;
        let min_v = self.minenergy;

        let stretch = VE_MINSTRETCH.max(self.stretch / 2) as usize;
        let penalty = (gi.stretch_penalty - (self.stretch / 2 - VE_MINSTRETCH) as f32)
            .clamp(0.0, gi.stretch_penalty);

        let work: Vec<f32> = (0..n).map(|i| data[i] * self.mdct_win[i]).collect();
        let mut spec = vec![0.0f32; n / 2];
        self.mdct.forward(&work, &mut spec);

        // near-DC sidelobe energy, tracked over a short ring with a periodic
        // from-scratch refresh to stop float creep
        let mut decay;
        {
            let temp = spec[0] * spec[0] + 0.7 * spec[1] * spec[1] + 0.2 * spec[2] * spec[2];
            let f = &mut self.filters[filter_base];
            let ptr = f.nearptr;

            if ptr == 0 {
                f.near_dc_acc = f.near_dc_partialacc + temp;
                decay = f.near_dc_acc;
                f.near_dc_partialacc = temp;
            } else {
                f.near_dc_acc += temp;
                decay = f.near_dc_acc;
                f.near_dc_partialacc += temp;
            }
            f.near_dc_acc -= f.near_dc[ptr];
            f.near_dc[ptr] = temp;

            decay *= 1.0 / (VE_NEARDC + 1) as f32;
            f.nearptr += 1;
            if f.nearptr >= VE_NEARDC {
                f.nearptr = 0;
            }
            decay = todb(decay) * 0.5 - 15.0;
        }

        // spread, limit and smooth the spectrum into half resolution
        let mut i = 0;
        while i < n / 2 {
            let mut val = spec[i] * spec[i] + spec[i + 1] * spec[i + 1];
            val = todb(val) * 0.5;
            if val < decay {
                val = decay;
            }
            if val < min_v {
                val = min_v;
            }
            spec[i >> 1] = val;
            decay -= 8.0;
            i += 2;
        }

        for (j, band) in self.bands.iter().enumerate() {
            let mut acc = 0.0f32;
            for (i, w) in band.window.iter().enumerate() {
                acc += spec[band.begin + i] * w;
            }
            acc *= band.total;

            let f = &mut self.filters[filter_base + j];
            let this = f.ampptr;

            let mut p = if this == 0 { VE_AMP - 1 } else { this - 1 };
            let postmax = acc.max(f.ampbuf[p]);
            let postmin = acc.min(f.ampbuf[p]);

            let mut premax = -99999.0f32;
            let mut premin = 99999.0f32;
            for _ in 0..stretch {
                p = if p == 0 { VE_AMP - 1 } else { p - 1 };
                premax = premax.max(f.ampbuf[p]);
                premin = premin.min(f.ampbuf[p]);
            }

            let valmin = postmin - premin;
            let valmax = postmax - premax;

            f.ampbuf[this] = acc;
            f.ampptr += 1;
            if f.ampptr >= VE_AMP {
                f.ampptr = 0;
            }

            if valmax > gi.preecho_thresh[j] + penalty {
                ret |= 1;
                ret |= 4;
            }
            if valmin < gi.postecho_thresh[j] - penalty {
                ret |= 2;
            }
        }

        ret
    }

    /// Scan newly buffered PCM for transients and decide the next block size.
    ///
    /// Returns `Some(1)` when a long next block is safe, `Some(0)` when a mark
    /// forces a short one, and `None` when not enough data has arrived yet.
    pub fn search(
        &mut self,
        gi: &PsyGlobal,
        pcm: &[Vec<f32>],
        pcm_current: usize,
        center_w: usize,
        test_w: usize,
    ) -> Option<usize> {
        let step = self.searchstep as i64;
        let first = self.current / step;
        let last = pcm_current as i64 / step - VE_WIN as i64;
        if last < first {
            return None;
        }

        let need = (last as usize) + VE_WIN + VE_POST;
        if need > self.mark.len() {
            self.mark.resize(need, 0);
        }

        for j in first..last {
            let mut ret = 0u32;
            self.stretch += 1;
            if self.stretch > VE_MAXSTRETCH * 2 {
                self.stretch = VE_MAXSTRETCH * 2;
            }

            for i in 0..self.ch {
                let off = self.searchstep * j as usize;
                ret |= self.amp(gi, &pcm[i][off..off + self.winlength], i * VE_BANDS);
            }

            let j = j as usize;
            self.mark[j + VE_POST] = 0;
            if ret & 1 != 0 {
                self.mark[j] = 1;
                self.mark[j + 1] = 1;
            }
            if ret & 2 != 0 {
                self.mark[j] = 1;
                if j > 0 {
                    self.mark[j - 1] = 1;
                }
            }
            if ret & 4 != 0 {
                self.stretch = -1;
            }
        }

        self.current = last * step;

        let center_w = center_w as i64;
        let test_w = test_w as i64;
        let mut j = self.cursor;
        while j < self.current - step {
            // postecho can work back one window
            if j >= test_w {
                return Some(1);
            }
            self.cursor = j;
            if self.mark[(j / step) as usize] != 0 && j > center_w {
                self.curmark = j;
                return Some(0);
            }
            j += step;
        }

        None
    }

    /// True when a transient mark falls inside the current block's window.
    pub fn mark_in(&self, begin_w: i64, end_w: i64) -> bool {
        if self.curmark >= begin_w && self.curmark < end_w {
            return true;
        }
        let step = self.searchstep as i64;
        let first = (begin_w / step).max(0);
        let last = end_w / step;
        for i in first..last {
            if (i as usize) < self.mark.len() && self.mark[i as usize] != 0 {
                return true;
            }
        }
        false
    }

    /// Discard `shift` samples of history after the analysis window advances.
    pub fn shift(&mut self, shift: i64) {
        let step = self.searchstep as i64;
        let smallsize = (self.current / step + VE_POST as i64) as usize;
        let smallshift = (shift / step) as usize;

        self.mark.copy_within(smallshift..smallsize, 0);

        self.current -= shift;
        if self.curmark >= 0 {
            self.curmark -= shift;
        }
        self.cursor -= shift;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global() -> PsyGlobal {
        PsyGlobal::new([256, 2048])
    }

    fn silence(ch: usize, len: usize) -> Vec<Vec<f32>> {
        vec![vec![0.0f32; len]; ch]
    }

    #[test]
    fn test_search_needs_data() {
        let gi = global();
        let mut env = Envelope::new(2, [256, 2048], &gi);
        let pcm = silence(2, 128);
        assert_eq!(env.search(&gi, &pcm, 128, 1024, 2048), None);
    }

    #[test]
    fn test_silence_allows_long_blocks() {
        let gi = global();
        let mut env = Envelope::new(2, [256, 2048], &gi);
        let pcm = silence(2, 8192);
        // enough quiet data: a long next block is fine
        assert_eq!(env.search(&gi, &pcm, 8192, 1024, 1024 + 512 + 1024 + 64), Some(1));
    }

    #[test]
    fn test_transient_forces_short_block() {
        let gi = global();
        let mut env = Envelope::new(1, [256, 2048], &gi);
        let mut pcm = silence(1, 16384);
        // sharp attack between the analysis center and the long-block bound
        for (i, x) in pcm[0][1472..1664].iter_mut().enumerate() {
            *x = ((i as f32) * 0.9).sin() * 0.8;
        }
        let got = env.search(&gi, &pcm, 16384, 1024, 2624);
        assert_eq!(got, Some(0));
        assert!(env.mark_in(1300, 1800));
    }

    #[test]
    fn test_shift_moves_marks() {
        let gi = global();
        let mut env = Envelope::new(1, [256, 2048], &gi);
        let mut pcm = silence(1, 16384);
        for (i, x) in pcm[0][1472..1664].iter_mut().enumerate() {
            *x = ((i as f32) * 0.9).sin() * 0.8;
        }
        env.search(&gi, &pcm, 16384, 1024, 2624);
        env.shift(1024);
        assert!(env.mark_in(1300 - 1024, 1800 - 1024));
    }
}
