//! Per-block analysis.
//!
//! A block carved out by the DSP state carries its windowed PCM through the
//! transform, masking, floor, coupling and residue stages, producing one
//! candidate packet per aggressiveness level for rate control to pick from.

use crate::coupling;
use crate::dsp::DspState;
use crate::error::Result;
use crate::tables::todb;
use crate::window::apply_window;
use crate::{NEGINF, PACKETBLOBS};
use dubmux_core::BitPacker;

/// One analysis block in flight.
pub struct Block {
    /// Per channel: windowed samples, reused as scratch through analysis.
    pub pcm: Vec<Vec<f32>>,
    pub pcmend: usize,
    pub lw: usize,
    pub w: usize,
    pub nw: usize,
    pub blocktype: usize,
    pub granulepos: i64,
    pub sequence: i64,
    pub eofflag: bool,
    pub ampmax: f32,
    pub packetblobs: [BitPacker; PACKETBLOBS],
}

impl Block {
    pub const IMPULSE: usize = 0;
    pub const PADDING: usize = 1;
    pub const TRANSITION: usize = 0;
    pub const LONG: usize = 1;

    pub fn new(channels: usize) -> Self {
        Block {
            pcm: vec![Vec::new(); channels],
            pcmend: 0,
            lw: 0,
            w: 0,
            nw: 0,
            blocktype: Block::PADDING,
            granulepos: 0,
            sequence: 0,
            eofflag: false,
            ampmax: NEGINF,
            packetblobs: std::array::from_fn(|_| BitPacker::new()),
        }
    }

    /// Run the full analysis chain, filling every packetblob.
    pub fn analysis(&mut self, d: &DspState) -> Result<()> {
        let ch = self.pcm.len();
        let w = self.w;
        let n = self.pcmend;
        let n2 = n / 2;
        let info = &d.mappings[w];
        let psy_look = &d.psy[self.blocktype + if w != 0 { 2 } else { 0 }];
        let floor_look = &d.floor[info.floorsubmap[0]];
        let managed = d.bitrate.managed();

        let scale = 4.0 / n as f32;
        let scale_db = todb(scale) + 0.345;

        let mut gmdct = vec![vec![0.0f32; n2]; ch];
        let mut local_ampmax = vec![0.0f32; ch];
        let mut global_ampmax = self.ampmax;

        for i in 0..ch {
            let v = &mut self.pcm[i];
            apply_window(
                v,
                [&d.windows[0], &d.windows[1]],
                d.blocksizes,
                self.lw,
                w,
                self.nw,
            );
            d.mdct[w].forward(v, &mut gmdct[i]);

            // log magnitude spectrum of the same windowed data, in place
            d.fft[w].forward(v);
            v[0] = scale_db + todb(v[0]) + 0.345;
            local_ampmax[i] = v[0];
            let mut j = 1;
            while j + 1 < n {
                let temp = v[j] * v[j] + v[j + 1] * v[j + 1];
                let t = scale_db + 0.5 * todb(temp) + 0.345;
                v[(j + 1) >> 1] = t;
                if t > local_ampmax[i] {
                    local_ampmax[i] = t;
                }
                j += 2;
            }
            if local_ampmax[i] > 0.0 {
                local_ampmax[i] = 0.0;
            }
            if local_ampmax[i] > global_ampmax {
                global_ampmax = local_ampmax[i];
            }
        }

        // masking curves and floor fits per channel
        let mut floor_posts: Vec<[Option<Vec<i32>>; PACKETBLOBS]> = (0..ch)
            .map(|_| std::array::from_fn(|_| None))
            .collect();
        let mut noise = vec![0.0f32; n2];
        let mut tone = vec![0.0f32; n2];
        let mut logmask = vec![0.0f32; n2];

        for i in 0..ch {
            for j in 0..n2 {
                self.pcm[i][n2 + j] = todb(gmdct[i][j]) + 0.345;
            }
            let (logfft, logmdct) = self.pcm[i].split_at(n2);

            psy_look.noisemask(logmdct, &mut noise);
            psy_look.tonemask(logfft, &mut tone, global_ampmax, local_ampmax[i]);
            psy_look.offset_and_mix(&noise, &tone, 1, &mut logmask);

            floor_posts[i][PACKETBLOBS / 2] = floor_look.fit(logmdct, &logmask);

            if managed {
                psy_look.offset_and_mix(&noise, &tone, 2, &mut logmask);
                floor_posts[i][PACKETBLOBS - 1] = floor_look.fit(logmdct, &logmask);
                psy_look.offset_and_mix(&noise, &tone, 0, &mut logmask);
                floor_posts[i][0] = floor_look.fit(logmdct, &logmask);

                // interpolate the middle aggressiveness levels
                for k in 1..PACKETBLOBS / 2 {
                    let del = (k * 65536 / (PACKETBLOBS / 2)) as i32;
                    floor_posts[i][k] = floor_look.interpolate_fit(
                        floor_posts[i][0].as_deref(),
                        floor_posts[i][PACKETBLOBS / 2].as_deref(),
                        del,
                    );
                }
                for k in PACKETBLOBS / 2 + 1..PACKETBLOBS - 1 {
                    let del = ((k - PACKETBLOBS / 2) * 65536 / (PACKETBLOBS / 2)) as i32;
                    floor_posts[i][k] = floor_look.interpolate_fit(
                        floor_posts[i][PACKETBLOBS / 2].as_deref(),
                        floor_posts[i][PACKETBLOBS - 1].as_deref(),
                        del,
                    );
                }
            }
        }
        self.ampmax = global_ampmax;

        // stereo coupling precomputation, shared by every blob
        let (mag_memo, mag_sort) = if info.coupling_steps > 0 {
            let mut memo = coupling::quantize_couple_memo(&d.psy_global, psy_look, info, &gmdct);
            let sort = coupling::quantize_couple_sort(psy_look, info, &memo);
            coupling::hf_reduction(&d.psy_global, psy_look, info, &mut memo);
            (memo, sort)
        } else {
            (Vec::new(), None)
        };

        let sortindex: Vec<Vec<usize>> = (0..ch)
            .map(|i| {
                if psy_look.info.normal_channel_p {
                    coupling::noise_normalize_sort(psy_look, &gmdct[i])
                } else {
                    Vec::new()
                }
            })
            .collect();

        let blob_range = if managed { 0..PACKETBLOBS } else { PACKETBLOBS / 2..PACKETBLOBS / 2 + 1 };
        for k in blob_range {
            self.packetblobs[k].reset();
            let opb = &mut self.packetblobs[k];

            opb.write(0, 1);
            opb.write(w as u32, d.modebits);
            if w != 0 {
                opb.write(u32::from(self.lw != 0), 1);
                opb.write(u32::from(self.nw != 0), 1);
            }

            let sliding_lowpass = d.psy_global.sliding_lowpass[w][k];
            let mut nonzero = vec![false; ch];
            let mut ilogmask = vec![vec![0i32; n2]; ch];

            for i in 0..ch {
                nonzero[i] = floor_look.encode(
                    opb,
                    &d.books,
                    floor_posts[i][k].as_mut(),
                    &mut ilogmask[i],
                );

                let (res, _) = self.pcm[i].split_at_mut(n2);
                coupling::remove_floor(n2, &gmdct[i], &ilogmask[i], res, sliding_lowpass);
                coupling::noise_normalize(psy_look, &mut self.pcm[i], &sortindex[i]);
            }

            if info.coupling_steps > 0 {
                coupling::couple(
                    k,
                    &d.psy_global,
                    psy_look,
                    info,
                    &mut self.pcm,
                    &mag_memo,
                    mag_sort.as_deref(),
                    &ilogmask,
                    &mut nonzero,
                    sliding_lowpass,
                );
            }

            for s in 0..info.submaps {
                let bundle: Vec<&[f32]> = (0..ch)
                    .filter(|&i| info.chmuxlist[i] == s)
                    .map(|i| &self.pcm[i][n2..])
                    .collect();
                let zero: Vec<bool> = (0..ch)
                    .filter(|&i| info.chmuxlist[i] == s)
                    .map(|i| nonzero[i])
                    .collect();

                let res_look = &d.residue[info.residuesubmap[s]];
                if let Some(partword) = res_look.class2(&bundle, &zero) {
                    res_look.forward2(opb, &d.books, &bundle, &zero, &partword);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitrate::BitrateInfo;
    use crate::dsp::DspState;

    fn run_blocks(pcm: &[f32], managed: bool) -> Vec<Block> {
        let info = if managed {
            BitrateInfo::from_nominal(128_000)
        } else {
            BitrateInfo::unmanaged()
        };
        let mut d = DspState::new(2, 44100, info).unwrap();
        d.write_audio(&[pcm, pcm]).unwrap();
        d.finish().unwrap();

        let mut out = Vec::new();
        let mut vb = Block::new(2);
        while d.blockout(&mut vb).unwrap() {
            vb.analysis(&d).unwrap();
            out.push(std::mem::replace(&mut vb, Block::new(2)));
        }
        out
    }

    #[test]
    fn test_silence_produces_nonempty_packets() {
        let pcm = vec![0.0f32; 8192];
        let blocks = run_blocks(&pcm, false);
        assert!(!blocks.is_empty());
        for b in &blocks {
            // mode header plus a zero floor per channel at minimum
            assert!(b.packetblobs[PACKETBLOBS / 2].bits() >= 4);
        }
        assert!(blocks.last().unwrap().eofflag);
    }

    #[test]
    fn test_unmanaged_fills_only_middle_blob() {
        let pcm: Vec<f32> = (0..8192).map(|i| (i as f32 * 0.05).sin() * 0.3).collect();
        let blocks = run_blocks(&pcm, false);
        let b = &blocks[0];
        assert!(b.packetblobs[PACKETBLOBS / 2].bits() > 0);
        assert_eq!(b.packetblobs[0].bits(), 0);
        assert_eq!(b.packetblobs[PACKETBLOBS - 1].bits(), 0);
    }

    #[test]
    fn test_managed_fills_every_blob() {
        let pcm: Vec<f32> = (0..8192).map(|i| (i as f32 * 0.05).sin() * 0.3).collect();
        let blocks = run_blocks(&pcm, true);
        for blob in &blocks[0].packetblobs {
            assert!(blob.bits() > 0);
        }
    }

    #[test]
    fn test_packet_starts_with_audio_type_bit() {
        let pcm: Vec<f32> = (0..8192).map(|i| (i as f32 * 0.01).sin() * 0.5).collect();
        let blocks = run_blocks(&pcm, false);
        for b in &blocks {
            // first bit zero marks an audio packet
            assert_eq!(b.packetblobs[PACKETBLOBS / 2].as_slice()[0] & 1, 0);
        }
    }
}
