//! Pull-based encoding facade.
//!
//! Wires a PCM source through analysis, rate control and pagination. Each
//! call to [`VorbisEncoder::produce_next`] resumes the inner loop exactly
//! where the previous call left off: a page may require several reads of
//! look-ahead PCM, and one read may eventually yield several pages.

use crate::bitrate::BitrateInfo;
use crate::block::Block;
use crate::dsp::DspState;
use crate::error::{Result, VorbisError};
use crate::headers::HeaderSet;
use dubmux_core::PcmSource;
use dubmux_ogg::{OggPacket, OggPage, OggStreamState};
use tracing::debug;

/// Sample frames pulled from the source per read.
const READ_FRAMES: usize = 1024;

/// Where the inner encode loop resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Read,
    Blockout,
    Flush,
    Pageout,
}

/// Builder-style encoder configuration.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    serialno: u32,
    bitrate: BitrateInfo,
}

impl EncoderConfig {
    pub fn new(serialno: u32) -> Self {
        EncoderConfig {
            serialno,
            bitrate: BitrateInfo::unmanaged(),
        }
    }

    /// Enable rate management tracking a nominal bits-per-second target.
    pub fn nominal_bitrate(mut self, rate: u32) -> Self {
        self.bitrate = BitrateInfo::from_nominal(rate);
        self
    }

    pub fn bitrate(mut self, bitrate: BitrateInfo) -> Self {
        self.bitrate = bitrate;
        self
    }

    pub fn build<S: PcmSource>(self, source: S) -> Result<VorbisEncoder<S>> {
        VorbisEncoder::with_bitrate(source, self.serialno, self.bitrate)
    }
}

/// Streaming encoder producing Ogg pages from a PCM source.
///
/// Mono input is mirrored onto both channels; the encoded stream is always
/// stereo.
pub struct VorbisEncoder<S: PcmSource> {
    source: S,
    source_channels: usize,
    rate: u32,
    dsp: DspState,
    block: Block,
    stream: OggStreamState,
    headers: HeaderSet,
    phase: Phase,
    in_header: bool,
    source_done: bool,
    eos: bool,
    frames_read: u64,
    previous_frames_read: u64,
}

impl<S: PcmSource> VorbisEncoder<S> {
    pub fn new(source: S, serialno: u32) -> Result<Self> {
        Self::with_bitrate(source, serialno, BitrateInfo::unmanaged())
    }

    pub fn with_bitrate(source: S, serialno: u32, bitrate: BitrateInfo) -> Result<Self> {
        let source_channels = source.channels();
        if source_channels == 0 || source_channels > 2 {
            return Err(VorbisError::UnsupportedChannels(source_channels as u8));
        }
        let rate = source.sample_rate();

        let dsp = DspState::new(2, rate, bitrate)?;
        let headers = dsp.headers();
        debug!(source_channels, rate, serialno, "encoder initialized");

        let mut stream = OggStreamState::new(serialno);
        for (i, data) in [&headers.ident, &headers.comment, &headers.setup]
            .into_iter()
            .enumerate()
        {
            stream.packetin(&OggPacket {
                data: data.clone(),
                eos: false,
                granulepos: 0,
                packetno: i as i64,
            });
        }

        Ok(VorbisEncoder {
            source,
            source_channels,
            rate,
            dsp,
            block: Block::new(2),
            stream,
            headers,
            phase: Phase::Read,
            in_header: true,
            source_done: false,
            eos: false,
            frames_read: 0,
            previous_frames_read: 0,
        })
    }

    pub fn headers(&self) -> &HeaderSet {
        &self.headers
    }

    /// Initialization blob for container tracks, built from the three header
    /// packets.
    pub fn codec_private(&self) -> Vec<u8> {
        self.headers.codec_private()
    }

    pub fn serialno(&self) -> u32 {
        self.stream.serialno()
    }

    pub fn sample_rate(&self) -> u32 {
        self.rate
    }

    /// True while [`produce_next`](Self::produce_next) is emitting header
    /// pages. The flag clears on the first call after the final header page,
    /// so callers checking it after each pull see every header page flagged.
    /// Container muxers skip those pages and use
    /// [`codec_private`](Self::codec_private) instead.
    pub fn in_header(&self) -> bool {
        self.in_header
    }

    /// True until the end-of-stream page has been produced.
    pub fn has_next(&self) -> bool {
        !self.eos
    }

    /// Timestamp in seconds of the start of the last page produced.
    pub fn last_page_time(&self) -> f64 {
        self.previous_frames_read as f64 / self.rate as f64
    }

    /// Timestamp in seconds of the next page to be produced.
    pub fn next_page_time(&self) -> f64 {
        self.frames_read as f64 / self.rate as f64
    }

    fn read_input(&mut self) -> Result<()> {
        let mut buf = vec![0i16; READ_FRAMES * self.source_channels];
        let n = self.source.read(&mut buf);
        if n == 0 {
            self.source_done = true;
            debug!(frames = self.frames_read, "input drained");
            return self.dsp.finish();
        }

        let frames = n / self.source_channels;
        let mut left = vec![0.0f32; frames];
        let mut right = vec![0.0f32; frames];
        match self.source_channels {
            1 => {
                for i in 0..frames {
                    let v = buf[i] as f32 / 32768.0;
                    left[i] = v;
                    right[i] = v;
                }
            }
            _ => {
                for i in 0..frames {
                    left[i] = buf[i * 2] as f32 / 32768.0;
                    right[i] = buf[i * 2 + 1] as f32 / 32768.0;
                }
            }
        }

        self.frames_read += frames as u64;
        self.dsp.write_audio(&[&left, &right])
    }

    /// Produce the next Ogg page, or None once the stream has ended.
    pub fn produce_next(&mut self) -> Result<Option<OggPage>> {
        if self.eos {
            return Ok(None);
        }

        if self.in_header {
            match self.stream.flush() {
                Some(page) => return Ok(Some(page)),
                None => self.in_header = false,
            }
        }

        self.previous_frames_read = self.frames_read;
        loop {
            if self.phase == Phase::Pageout {
                if let Some(page) = self.stream.pageout() {
                    self.eos = page.is_eos();
                    return Ok(Some(page));
                }
                self.phase = Phase::Flush;
            }

            if self.phase == Phase::Flush {
                if let Some(pkt) = self.dsp.flush_packet() {
                    self.stream.packetin(&OggPacket {
                        data: pkt.data,
                        eos: pkt.eos,
                        granulepos: pkt.granulepos,
                        packetno: pkt.packetno,
                    });
                    self.phase = Phase::Pageout;
                    continue;
                }
                self.phase = Phase::Blockout;
            }

            if self.phase == Phase::Blockout {
                if self.dsp.blockout(&mut self.block)? {
                    self.block.analysis(&self.dsp)?;
                    self.dsp.commit_block(&mut self.block)?;
                    self.phase = Phase::Flush;
                    continue;
                }
                self.phase = Phase::Read;
            }

            if self.source_done {
                // fully drained without an end-of-stream page; nothing left
                return Ok(None);
            }
            self.read_input()?;
            self.phase = Phase::Blockout;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dubmux_core::SlicePcmSource;

    fn silence_encoder(seconds: f64, channels: usize) -> VorbisEncoder<SlicePcmSource> {
        let frames = (44100.0 * seconds) as usize;
        VorbisEncoder::new(SlicePcmSource::silence(frames, channels, 44100), 7).unwrap()
    }

    #[test]
    fn test_one_second_silence_headers_first() {
        let mut enc = silence_encoder(1.0, 2);

        assert_eq!(enc.headers().ident[11], 2);
        assert_eq!(
            u32::from_le_bytes(enc.headers().ident[12..16].try_into().unwrap()),
            44100
        );

        let mut header_packets = 0;
        let mut header_pages = 0;
        let mut audio_pages = 0;
        let mut saw_eos = false;
        while let Some(page) = enc.produce_next().unwrap() {
            if enc.in_header() {
                assert_eq!(audio_pages, 0);
                header_pages += 1;
                header_packets += page
                    .segment_table()
                    .iter()
                    .filter(|&&v| v < 255)
                    .count();
            } else {
                audio_pages += 1;
                saw_eos = page.is_eos();
            }
        }
        assert_eq!(header_packets, 3);
        assert!(header_pages >= 2);
        assert!(audio_pages > 0);
        assert!(saw_eos);
        assert!(!enc.has_next());
    }

    #[test]
    fn test_first_page_is_bos_with_ident_only() {
        let mut enc = silence_encoder(0.25, 2);
        let page = enc.produce_next().unwrap().unwrap();
        assert!(page.is_bos());
        assert_eq!(page.segments(), 1);
        assert_eq!(page.body.len(), 30);
        assert_eq!(page.body[0], 0x01);
        assert_eq!(&page.body[1..7], b"vorbis");
        assert_eq!(page.serialno(), 7);
    }

    #[test]
    fn test_in_header_clears_only_after_last_header_page() {
        let mut enc = silence_encoder(0.25, 2);

        let first = enc.produce_next().unwrap().unwrap();
        assert!(enc.in_header());
        assert_eq!(first.body[0], 0x01);

        // the flag must survive every remaining header page so callers
        // checking after each pull can skip all three header packets
        let mut header_pages = 1;
        let audio = loop {
            let page = enc.produce_next().unwrap().unwrap();
            if enc.in_header() {
                header_pages += 1;
            } else {
                break page;
            }
        };
        assert!(header_pages >= 2);
        // audio packets carry a zero type bit; header types 0x03/0x05 are odd
        assert_eq!(audio.body[0] & 1, 0);
    }

    #[test]
    fn test_mono_source_is_mirrored_to_stereo() {
        let samples: Vec<i16> = (0..8820).map(|i| ((i % 100) * 300 - 15000) as i16).collect();
        let mut enc =
            VorbisEncoder::new(SlicePcmSource::new(samples, 1, 44100), 9).unwrap();
        assert_eq!(enc.headers().ident[11], 2);
        let mut pages = 0;
        while let Some(_) = enc.produce_next().unwrap() {
            pages += 1;
        }
        assert!(pages >= 3);
    }

    #[test]
    fn test_page_times_track_consumption() {
        let mut enc = silence_encoder(0.5, 2);
        let mut last = 0.0;
        while let Some(_) = enc.produce_next().unwrap() {
            assert!(enc.last_page_time() >= last - 1e-9);
            assert!(enc.next_page_time() >= enc.last_page_time());
            assert!(enc.next_page_time() <= 0.6);
            last = enc.last_page_time();
        }
    }

    #[test]
    fn test_config_builder_with_managed_rate() {
        let mut enc = EncoderConfig::new(11)
            .nominal_bitrate(128_000)
            .build(SlicePcmSource::silence(22050, 2, 44100))
            .unwrap();
        assert_eq!(enc.serialno(), 11);
        // nominal rate lands in the identification header (LE at offset 20)
        assert_eq!(
            u32::from_le_bytes(enc.headers().ident[20..24].try_into().unwrap()),
            128_000
        );
        let mut saw_eos = false;
        while let Some(page) = enc.produce_next().unwrap() {
            saw_eos = page.is_eos();
        }
        assert!(saw_eos);
    }

    #[test]
    fn test_empty_source_still_terminates() {
        let mut enc = VorbisEncoder::new(SlicePcmSource::silence(0, 2, 44100), 3).unwrap();
        let mut saw_eos = false;
        while let Some(page) = enc.produce_next().unwrap() {
            saw_eos = page.is_eos();
        }
        assert!(saw_eos);
    }
}
