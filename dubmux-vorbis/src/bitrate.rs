//! Bitrate management.
//!
//! Each analyzed block arrives as a fan of candidate packets at different
//! aggressiveness levels. A floating average selector slews between them to
//! track the nominal rate, a min/max reservoir pads or truncates frames when
//! hard bounds are configured, and the chosen packet is buffered until the
//! caller collects it.

use crate::error::{Result, VorbisError};
use crate::PACKETBLOBS;
use dubmux_core::BitPacker;

/// Rate control targets, all in bits per second except the reservoir.
#[derive(Debug, Clone)]
pub struct BitrateInfo {
    pub avg_rate: i64,
    pub min_rate: i64,
    pub max_rate: i64,
    /// Reservoir depth in bits; zero disables management entirely.
    pub reservoir_bits: i64,
    pub reservoir_bias: f64,
    pub slew_damp: f64,
}

impl BitrateInfo {
    /// Average-tracking management around a nominal rate.
    pub fn from_nominal(nominal: u32) -> Self {
        BitrateInfo {
            avg_rate: nominal as i64,
            min_rate: 0,
            max_rate: 0,
            reservoir_bits: nominal as i64,
            reservoir_bias: 0.1,
            slew_damp: 1.5,
        }
    }

    /// Pure VBR; every frame uses the middle packetblob.
    pub fn unmanaged() -> Self {
        BitrateInfo {
            avg_rate: 0,
            min_rate: 0,
            max_rate: 0,
            reservoir_bits: 0,
            reservoir_bias: 0.0,
            slew_damp: 0.0,
        }
    }
}

/// A finished packet waiting for the caller.
#[derive(Debug, Clone)]
pub struct VorbisPacket {
    pub data: Vec<u8>,
    pub eos: bool,
    pub granulepos: i64,
    pub packetno: i64,
}

/// Reservoir state across blocks.
#[derive(Debug)]
pub struct BitrateManager {
    info: BitrateInfo,
    managed: bool,
    rate: u32,
    blocksizes: [usize; 2],
    short_per_long: i64,
    avg_bitsper: i64,
    min_bitsper: i64,
    max_bitsper: i64,
    avgfloat: f64,
    avg_reservoir: i64,
    minmax_reservoir: i64,
    choice: usize,
    pending: Option<VorbisPacket>,
}

impl BitrateManager {
    pub fn new(info: BitrateInfo, blocksizes: [usize; 2], rate: u32) -> Self {
        let halfsamples = (blocksizes[0] >> 1) as f64;
        let bitsper = |r: i64| (r as f64 * halfsamples / rate as f64).round_ties_even() as i64;
        let desired_fill = (info.reservoir_bits as f64 * info.reservoir_bias) as i64;
        let managed = info.reservoir_bits > 0;

        BitrateManager {
            managed,
            rate,
            blocksizes,
            short_per_long: (blocksizes[1] / blocksizes[0]) as i64,
            avg_bitsper: bitsper(info.avg_rate),
            min_bitsper: bitsper(info.min_rate),
            max_bitsper: bitsper(info.max_rate),
            avgfloat: (PACKETBLOBS / 2) as f64,
            avg_reservoir: desired_fill,
            minmax_reservoir: desired_fill,
            choice: PACKETBLOBS / 2,
            info,
            pending: None,
        }
    }

    pub fn managed(&self) -> bool {
        self.managed
    }

    /// Pick a packetblob for this block and buffer its bytes.
    #[allow(clippy::too_many_arguments)]
    pub fn add_block(
        &mut self,
        w: usize,
        eos: bool,
        granulepos: i64,
        packetno: i64,
        blobs: &mut [BitPacker; PACKETBLOBS],
    ) -> Result<()> {
        if self.pending.is_some() {
            return Err(VorbisError::State(
                "previous packet was never collected".into(),
            ));
        }

        if !self.managed {
            let blob = &blobs[PACKETBLOBS / 2];
            self.pending = Some(VorbisPacket {
                data: blob.as_slice().to_vec(),
                eos,
                granulepos,
                packetno,
            });
            return Ok(());
        }

        let mut choice = self.avgfloat.round_ties_even() as i64;
        let mut this_bits = blobs[choice as usize].bytes() as i64 * 8;
        let scale = if w > 0 { self.short_per_long } else { 1 };
        let min_target_bits = self.min_bitsper * scale;
        let max_target_bits = self.max_bitsper * scale;
        let samples = (self.blocksizes[w] >> 1) as f64;
        let desired_fill = (self.info.reservoir_bits as f64 * self.info.reservoir_bias) as i64;

        // average floater
        if self.avg_bitsper > 0 {
            let avg_target_bits = self.avg_bitsper * scale;
            let slewlimit = 15.0 / self.info.slew_damp;

            if self.avg_reservoir + (this_bits - avg_target_bits) > desired_fill {
                while choice > 0
                    && this_bits > avg_target_bits
                    && self.avg_reservoir + (this_bits - avg_target_bits) > desired_fill
                {
                    choice -= 1;
                    this_bits = blobs[choice as usize].bytes() as i64 * 8;
                }
            } else if self.avg_reservoir + (this_bits - avg_target_bits) < desired_fill {
                while choice + 1 < PACKETBLOBS as i64
                    && this_bits < avg_target_bits
                    && self.avg_reservoir + (this_bits - avg_target_bits) < desired_fill
                {
                    choice += 1;
                    this_bits = blobs[choice as usize].bytes() as i64 * 8;
                }
            }

            let mut slew =
                (choice as f64 - self.avgfloat).round_ties_even() / samples * self.rate as f64;
            slew = slew.clamp(-slewlimit, slewlimit);
            self.avgfloat += slew / self.rate as f64 * samples;
            choice = self.avgfloat.round_ties_even() as i64;
            this_bits = blobs[choice as usize].bytes() as i64 * 8;
        }

        // force the rate up to min
        if self.min_bitsper > 0 && this_bits < min_target_bits {
            while self.minmax_reservoir - (min_target_bits - this_bits) < 0 {
                choice += 1;
                if choice >= PACKETBLOBS as i64 {
                    break;
                }
                this_bits = blobs[choice as usize].bytes() as i64 * 8;
            }
        }

        // force the rate down to max
        if self.max_bitsper > 0 && this_bits > max_target_bits {
            while self.minmax_reservoir + (this_bits - max_target_bits) > self.info.reservoir_bits {
                choice -= 1;
                if choice < 0 {
                    break;
                }
                this_bits = blobs[choice as usize].bytes() as i64 * 8;
            }
        }

        if choice < 0 {
            // even the smallest blob blows the reservoir; truncate the frame
            let maxsize = (max_target_bits + (self.info.reservoir_bits - self.minmax_reservoir)) / 8;
            self.choice = 0;
            if blobs[0].bytes() as i64 > maxsize {
                blobs[0].write_trunc(maxsize as usize * 8);
            }
            this_bits = blobs[0].bytes() as i64 * 8;
        } else {
            let mut minsize = (min_target_bits - self.minmax_reservoir + 7) / 8;
            if choice >= PACKETBLOBS as i64 {
                choice = PACKETBLOBS as i64 - 1;
            }
            self.choice = choice as usize;

            // pad up to demand with zero bytes
            minsize -= blobs[self.choice].bytes() as i64;
            while minsize > 0 {
                blobs[self.choice].write(0, 8);
                minsize -= 1;
            }
            this_bits = blobs[self.choice].bytes() as i64 * 8;
        }

        // min/max reservoir update
        if self.min_bitsper > 0 || self.max_bitsper > 0 {
            if max_target_bits > 0 && this_bits > max_target_bits {
                self.minmax_reservoir += this_bits - max_target_bits;
            } else if min_target_bits > 0 && this_bits < min_target_bits {
                self.minmax_reservoir += this_bits - min_target_bits;
            } else if self.minmax_reservoir > desired_fill {
                if max_target_bits > 0 {
                    self.minmax_reservoir += this_bits - max_target_bits;
                    if self.minmax_reservoir < desired_fill {
                        self.minmax_reservoir = desired_fill;
                    }
                } else {
                    self.minmax_reservoir = desired_fill;
                }
            } else if min_target_bits > 0 {
                self.minmax_reservoir += this_bits - min_target_bits;
                if self.minmax_reservoir > desired_fill {
                    self.minmax_reservoir = desired_fill;
                }
            } else {
                self.minmax_reservoir = desired_fill;
            }
        }

        if self.avg_bitsper > 0 {
            let avg_target_bits = self.avg_bitsper * scale;
            self.avg_reservoir += this_bits - avg_target_bits;
        }

        self.pending = Some(VorbisPacket {
            data: blobs[self.choice].as_slice().to_vec(),
            eos,
            granulepos,
            packetno,
        });
        Ok(())
    }

    /// Collect the packet buffered by the last [`add_block`](Self::add_block).
    pub fn flush_packet(&mut self) -> Option<VorbisPacket> {
        self.pending.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs_with_bytes(sizes: [usize; PACKETBLOBS]) -> [BitPacker; PACKETBLOBS] {
        let mut blobs: [BitPacker; PACKETBLOBS] = std::array::from_fn(|_| BitPacker::new());
        for (blob, &size) in blobs.iter_mut().zip(sizes.iter()) {
            for _ in 0..size {
                blob.write(0xa5, 8);
            }
        }
        blobs
    }

    #[test]
    fn test_unmanaged_uses_middle_blob() {
        let mut bm = BitrateManager::new(BitrateInfo::unmanaged(), [256, 2048], 44100);
        assert!(!bm.managed());
        let mut sizes = [0usize; PACKETBLOBS];
        for (k, s) in sizes.iter_mut().enumerate() {
            *s = 10 + k;
        }
        let mut blobs = blobs_with_bytes(sizes);
        bm.add_block(0, false, 256, 4, &mut blobs).unwrap();
        let pkt = bm.flush_packet().unwrap();
        assert_eq!(pkt.data.len(), 10 + PACKETBLOBS / 2);
        assert_eq!(pkt.granulepos, 256);
        assert_eq!(pkt.packetno, 4);
        assert!(bm.flush_packet().is_none());
    }

    #[test]
    fn test_double_add_without_flush_fails() {
        let mut bm = BitrateManager::new(BitrateInfo::unmanaged(), [256, 2048], 44100);
        let mut blobs = blobs_with_bytes([4; PACKETBLOBS]);
        bm.add_block(0, false, 0, 0, &mut blobs).unwrap();
        assert!(bm.add_block(0, false, 0, 1, &mut blobs).is_err());
    }

    #[test]
    fn test_avg_floater_slews_up_when_underfull() {
        let info = BitrateInfo {
            avg_rate: 8000,
            min_rate: 0,
            max_rate: 0,
            reservoir_bits: 5000,
            reservoir_bias: 0.1,
            slew_damp: 1.5,
        };
        let mut bm = BitrateManager::new(info, [256, 2048], 1000);
        assert_eq!(bm.avg_bitsper, 1024);
        let mut sizes = [0usize; PACKETBLOBS];
        for (k, s) in sizes.iter_mut().enumerate() {
            *s = (k + 1) * 10;
        }
        let mut blobs = blobs_with_bytes(sizes);
        bm.add_block(0, false, 128, 0, &mut blobs).unwrap();
        // slew limit caps the move at one step above the old floater
        assert_eq!(bm.choice, 8);
        let pkt = bm.flush_packet().unwrap();
        assert_eq!(pkt.data.len(), 90);
        assert_eq!(bm.avg_reservoir, 500 + 720 - 1024);
    }

    #[test]
    fn test_min_rate_pads_small_frames() {
        let info = BitrateInfo {
            avg_rate: 0,
            min_rate: 8000,
            max_rate: 0,
            reservoir_bits: 5000,
            reservoir_bias: 0.1,
            slew_damp: 1.5,
        };
        let mut bm = BitrateManager::new(info, [256, 2048], 1000);
        let mut blobs = blobs_with_bytes([10; PACKETBLOBS]);
        bm.add_block(0, false, 128, 0, &mut blobs).unwrap();
        let pkt = bm.flush_packet().unwrap();
        // min target 1024 bits, reservoir 500: pad to (1024-500+7)/8 = 66 bytes
        assert_eq!(pkt.data.len(), 66);
        assert_eq!(bm.minmax_reservoir, 500 + 66 * 8 - 1024);
    }

    #[test]
    fn test_managed_window_stays_within_rate_bounds() {
        use crate::block::Block;
        use crate::dsp::DspState;

        let info = BitrateInfo {
            avg_rate: 64_000,
            min_rate: 32_000,
            max_rate: 128_000,
            reservoir_bits: 16_384,
            reservoir_bias: 0.1,
            slew_damp: 1.5,
        };
        let mut d = DspState::new(2, 44100, info.clone()).unwrap();
        let pcm = vec![0.0f32; 44100];
        d.write_audio(&[&pcm, &pcm]).unwrap();
        d.finish().unwrap();

        let mut packets = Vec::new();
        let mut vb = Block::new(2);
        while d.blockout(&mut vb).unwrap() {
            vb.analysis(&d).unwrap();
            d.commit_block(&mut vb).unwrap();
            packets.push(d.flush_packet().expect("committed block yields a packet"));
        }
        assert!(packets.len() > 16);

        // sliding windows over the interior of the stream; granulepos deltas
        // give each window's duration, the reservoir depth bounds how far a
        // window may stray from the configured rates
        let window = 8;
        let inner = &packets[3..packets.len() - 3];
        let slack = (info.reservoir_bits + 8 * window as i64) as f64;
        for w in inner.windows(window + 1) {
            let samples = (w[window].granulepos - w[0].granulepos) as f64;
            let secs = samples / 44100.0;
            let bits: i64 = w[..window].iter().map(|p| p.data.len() as i64 * 8).sum();
            assert!(bits as f64 >= info.min_rate as f64 * secs - slack);
            assert!(bits as f64 <= info.max_rate as f64 * secs + slack);
        }
    }

    #[test]
    fn test_max_rate_truncates_large_frames() {
        let info = BitrateInfo {
            avg_rate: 0,
            min_rate: 0,
            max_rate: 4000,
            reservoir_bits: 1000,
            reservoir_bias: 0.5,
            slew_damp: 1.5,
        };
        let mut bm = BitrateManager::new(info, [256, 2048], 1000);
        let mut blobs = blobs_with_bytes([200; PACKETBLOBS]);
        bm.add_block(0, false, 128, 0, &mut blobs).unwrap();
        let pkt = bm.flush_packet().unwrap();
        // max target 512 bits, headroom 500: truncate to (512+500)/8 = 126 bytes
        assert_eq!(pkt.data.len(), 126);
        assert_eq!(bm.minmax_reservoir, 500 + 126 * 8 - 512);
    }
}
