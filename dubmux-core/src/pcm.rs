//! PCM sample sources.
//!
//! The encoder pulls interleaved signed 16-bit samples from a [`PcmSource`] in
//! arbitrary-sized chunks; a short or zero-length read signals end of data.

/// A synchronous pull source of interleaved 16-bit PCM samples.
pub trait PcmSource {
    /// Fill `out` with up to `out.len()` interleaved samples.
    ///
    /// Returns the number of samples produced; 0 means the source is exhausted.
    fn read(&mut self, out: &mut [i16]) -> usize;

    /// Number of interleaved channels in the stream.
    fn channels(&self) -> usize;

    /// Sample rate in Hz.
    fn sample_rate(&self) -> u32;
}

/// A [`PcmSource`] over an in-memory interleaved sample buffer.
#[derive(Debug, Clone)]
pub struct SlicePcmSource {
    samples: Vec<i16>,
    pos: usize,
    channels: usize,
    sample_rate: u32,
}

impl SlicePcmSource {
    /// Wrap an interleaved sample buffer.
    pub fn new(samples: Vec<i16>, channels: usize, sample_rate: u32) -> Self {
        SlicePcmSource {
            samples,
            pos: 0,
            channels,
            sample_rate,
        }
    }

    /// A silent source of `frames` sample frames.
    pub fn silence(frames: usize, channels: usize, sample_rate: u32) -> Self {
        Self::new(vec![0; frames * channels], channels, sample_rate)
    }
}

impl PcmSource for SlicePcmSource {
    fn read(&mut self, out: &mut [i16]) -> usize {
        let n = out.len().min(self.samples.len() - self.pos);
        out[..n].copy_from_slice(&self.samples[self.pos..self.pos + n]);
        self.pos += n;
        n
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
