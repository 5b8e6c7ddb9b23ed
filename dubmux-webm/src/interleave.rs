//! Timecode-driven audio/video interleaving.
//!
//! The interleaver replays an existing WebM stream through the push parser,
//! mirroring every element into the output writer. Video blocks act as time
//! anchors: before a source block is copied, all pending encoded audio pages
//! with timestamps at or before that block's absolute time are wrapped as
//! audio `SimpleBlock` elements and written ahead of it. After the source's
//! video `TrackEntry` closes, a parallel audio track description is
//! synthesized; audio left over after the last video anchor is drained into a
//! final cluster before the mirrored `Segment` closes.

use crate::elements;
use crate::error::{Result, WebmError};
use dubmux_core::PcmSource;
use dubmux_ebml::{EbmlError, EbmlHandler, EbmlReader, EbmlWriter, ElementId, ElementValue, LeafElement};
use dubmux_ogg::OggPage;
use dubmux_vorbis::VorbisEncoder;
use std::io::{Read, Seek, Write};
use tracing::debug;

/// Track number assigned to the synthesized audio track.
pub const AUDIO_TRACK_NUMBER: u64 = 2;

/// Build a `SimpleBlock` payload from one Ogg page.
///
/// The page's segment table becomes Xiph lacing: all but the last segment
/// length are emitted, with a 0x00 continuation terminator after each 0xFF.
pub fn simple_block_payload(page: &OggPage, timecode: u16) -> Vec<u8> {
    let segments = page.segment_table();
    let mut out = Vec::with_capacity(page.body.len() + segments.len() + 8);

    out.push(0x80 | AUDIO_TRACK_NUMBER as u8);
    out.extend_from_slice(&timecode.to_be_bytes());
    // flags: keyframe plus Xiph lacing
    out.push(0x82);
    out.push((segments.len() - 1) as u8);
    for &len in &segments[..segments.len() - 1] {
        out.push(len);
        if len == 0xFF {
            out.push(0x00);
        }
    }
    out.extend_from_slice(&page.body);
    out
}

/// Merges encoded audio into an existing video-only WebM stream.
pub struct ContainerInterleaver<W: Write + Seek, S: PcmSource> {
    writer: EbmlWriter<W>,
    encoder: VorbisEncoder<S>,
    cluster_timecode: u64,
    audio_track_written: bool,
    failed: Option<WebmError>,
}

impl<W: Write + Seek, S: PcmSource> ContainerInterleaver<W, S> {
    pub fn new(encoder: VorbisEncoder<S>, out: W) -> Self {
        ContainerInterleaver {
            writer: EbmlWriter::new(out),
            encoder,
            cluster_timecode: 0,
            audio_track_written: false,
            failed: None,
        }
    }

    /// Run the merge over a source stream and return the finished sink.
    pub fn run<R: Read>(mut self, input: R) -> Result<W> {
        let parse = EbmlReader::new(input).run(&mut self);
        if let Some(err) = self.failed.take() {
            return Err(err);
        }
        parse?;

        // an unknown-size source segment never fires container_end; drain and
        // close whatever is still mirrored open
        if self.writer.depth() > 0 {
            self.drain_trailing_audio()?;
            while self.writer.depth() > 0 {
                self.writer.close_container()?;
            }
        }
        Ok(self.writer.finish()?)
    }

    /// Write pending audio blocks with page times at or before `limit`
    /// seconds; no limit drains the encoder completely.
    fn write_audio_blocks(&mut self, limit: Option<f64>) -> Result<()> {
        while self.encoder.has_next()
            && limit.map_or(true, |l| self.encoder.next_page_time() <= l)
        {
            let page = match self.encoder.produce_next()? {
                Some(page) => page,
                None => break,
            };
            if self.encoder.in_header() {
                continue;
            }

            let millis = (1000.0 * self.encoder.last_page_time()) as i64;
            let timecode = (millis - self.cluster_timecode as i64).max(0) as u16;
            self.writer
                .write_raw_leaf(elements::SIMPLE_BLOCK, &simple_block_payload(&page, timecode))?;
        }
        Ok(())
    }

    /// Audio left after the last video anchor goes into one final cluster.
    fn drain_trailing_audio(&mut self) -> Result<()> {
        if !self.encoder.has_next() {
            return Ok(());
        }
        debug!(timecode = self.cluster_timecode, "draining trailing audio");
        self.writer.open_container(elements::CLUSTER)?;
        self.writer
            .write_leaf(elements::TIMECODE, &ElementValue::Uint(self.cluster_timecode))?;
        self.write_audio_blocks(None)?;
        self.writer.close_container()?;
        Ok(())
    }

    fn write_audio_track_entry(&mut self) -> Result<()> {
        let rate = self.encoder.sample_rate() as f32;
        debug!(rate, track = AUDIO_TRACK_NUMBER, "writing audio track entry");

        self.writer.open_container(elements::TRACK_ENTRY)?;
        self.writer
            .write_leaf(elements::TRACK_NUMBER, &ElementValue::Uint(AUDIO_TRACK_NUMBER))?;
        self.writer
            .write_leaf(elements::TRACK_UID, &ElementValue::Uint(42))?;
        self.writer.write_leaf(
            elements::TRACK_TYPE,
            &ElementValue::Uint(elements::TRACK_TYPE_AUDIO),
        )?;
        self.writer
            .write_leaf(elements::CODEC_ID, &ElementValue::Text("A_VORBIS".into()))?;
        self.writer.write_leaf(
            elements::CODEC_PRIVATE,
            &ElementValue::Bytes(self.encoder.codec_private()),
        )?;
        self.writer
            .write_leaf(elements::LANGUAGE, &ElementValue::Text("und".into()))?;
        self.writer.open_container(elements::AUDIO)?;
        self.writer.write_leaf(
            elements::SAMPLING_FREQUENCY,
            &ElementValue::Float(rate),
        )?;
        self.writer
            .write_leaf(elements::CHANNELS, &ElementValue::Uint(2))?;
        self.writer.close_container()?;
        self.writer.close_container()?;
        Ok(())
    }

    fn handle_leaf(&mut self, leaf: &LeafElement) -> Result<()> {
        if leaf.id == elements::TIMECODE {
            self.cluster_timecode = leaf.as_uint()?;
        } else if leaf.id == elements::SIMPLE_BLOCK {
            if leaf.data.len() < 3 {
                return Err(WebmError::MalformedBlock(format!(
                    "{} byte SimpleBlock",
                    leaf.data.len()
                )));
            }
            // audio up to this video frame's absolute time goes first
            let offset = u16::from_be_bytes([leaf.data[1], leaf.data[2]]);
            let limit = (self.cluster_timecode + u64::from(offset)) as f64 / 1000.0;
            self.write_audio_blocks(Some(limit))?;
        }
        self.writer.write_raw_leaf(leaf.id, &leaf.data)?;
        Ok(())
    }

    fn handle_container_end(&mut self, id: &ElementId) -> Result<()> {
        if *id == elements::SEGMENT {
            self.drain_trailing_audio()?;
        }
        self.writer.close_container()?;
        if *id == elements::TRACK_ENTRY && !self.audio_track_written {
            self.write_audio_track_entry()?;
            self.audio_track_written = true;
        }
        Ok(())
    }

    /// Stash the first failure; the parser only needs to know to abort.
    fn guard(&mut self, r: Result<()>) -> dubmux_ebml::Result<()> {
        match r {
            Ok(()) => Ok(()),
            Err(err) => {
                let abort = EbmlError::Contract("interleave aborted".into());
                self.failed = Some(err);
                Err(abort)
            }
        }
    }
}

impl<W: Write + Seek, S: PcmSource> EbmlHandler for ContainerInterleaver<W, S> {
    fn leaf(&mut self, leaf: &LeafElement) -> dubmux_ebml::Result<()> {
        let r = self.handle_leaf(leaf);
        self.guard(r)
    }

    fn container_start(&mut self, id: &ElementId, _size: u64) -> dubmux_ebml::Result<()> {
        let r = self.writer.open_container(*id).map_err(WebmError::from);
        self.guard(r)
    }

    fn container_end(&mut self, id: &ElementId) -> dubmux_ebml::Result<()> {
        let r = self.handle_container_end(id);
        self.guard(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dubmux_core::SlicePcmSource;
    use std::io::Cursor;

    fn video_only_webm(block_times: &[u16]) -> Vec<u8> {
        let mut w = EbmlWriter::new(Cursor::new(Vec::new()));
        w.open_container(elements::SEGMENT).unwrap();

        w.open_container(elements::TRACKS).unwrap();
        w.open_container(elements::TRACK_ENTRY).unwrap();
        w.write_leaf(elements::TRACK_NUMBER, &ElementValue::Uint(1)).unwrap();
        w.write_leaf(elements::TRACK_UID, &ElementValue::Uint(1)).unwrap();
        w.write_leaf(
            elements::TRACK_TYPE,
            &ElementValue::Uint(elements::TRACK_TYPE_VIDEO),
        )
        .unwrap();
        w.write_leaf(elements::CODEC_ID, &ElementValue::Text("V_VP8".into())).unwrap();
        w.close_container().unwrap();
        w.close_container().unwrap();

        w.open_container(elements::CLUSTER).unwrap();
        w.write_leaf(elements::TIMECODE, &ElementValue::Uint(0)).unwrap();
        for &t in block_times {
            let mut payload = vec![0x81];
            payload.extend_from_slice(&t.to_be_bytes());
            payload.push(0x80);
            payload.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
            w.write_raw_leaf(elements::SIMPLE_BLOCK, &payload).unwrap();
        }
        w.close_container().unwrap();

        w.close_container().unwrap();
        w.finish().unwrap().into_inner()
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<(String, Vec<u8>)>,
    }

    impl EbmlHandler for Recorder {
        fn leaf(&mut self, leaf: &LeafElement) -> dubmux_ebml::Result<()> {
            self.events.push((format!("leaf:{}", leaf.id.hex()), leaf.data.clone()));
            Ok(())
        }
        fn container_start(&mut self, id: &ElementId, _size: u64) -> dubmux_ebml::Result<()> {
            self.events.push((format!("start:{}", id.hex()), Vec::new()));
            Ok(())
        }
        fn container_end(&mut self, id: &ElementId) -> dubmux_ebml::Result<()> {
            self.events.push((format!("end:{}", id.hex()), Vec::new()));
            Ok(())
        }
    }

    fn interleave_silence(video: Vec<u8>, seconds: f64) -> Recorder {
        let frames = (44100.0 * seconds) as usize;
        let encoder =
            VorbisEncoder::new(SlicePcmSource::silence(frames, 2, 44100), 5).unwrap();
        let out = ContainerInterleaver::new(encoder, Cursor::new(Vec::new()))
            .run(Cursor::new(video))
            .unwrap()
            .into_inner();

        let mut rec = Recorder::default();
        EbmlReader::new(Cursor::new(out)).run(&mut rec).unwrap();
        rec
    }

    #[test]
    fn test_audio_track_entry_follows_video_entry() {
        let rec = interleave_silence(video_only_webm(&[0, 500, 1000, 1500]), 2.0);
        let events: Vec<&str> = rec.events.iter().map(|(e, _)| e.as_str()).collect();

        let video_end = events.iter().position(|&e| e == "end:ae").unwrap();
        assert_eq!(events[video_end + 1], "start:ae");

        // synthesized entry fields
        let entry = &rec.events[video_end + 1..];
        let synth_end = entry.iter().position(|(e, _)| e == "end:ae").unwrap();
        let leaves: Vec<&(String, Vec<u8>)> = entry[..synth_end].iter().collect();
        let field = |id: &str| {
            leaves
                .iter()
                .find(|(e, _)| e == &format!("leaf:{id}"))
                .map(|(_, d)| d.clone())
                .unwrap_or_else(|| panic!("missing {id}"))
        };
        assert_eq!(field("86"), b"A_VORBIS".to_vec());
        assert_eq!(field("d7"), vec![AUDIO_TRACK_NUMBER as u8]);
        assert_eq!(field("83"), vec![elements::TRACK_TYPE_AUDIO as u8]);
        assert_eq!(field("63a2")[0], 0x02);
        assert_eq!(field("9f"), vec![2]);
        assert_eq!(
            f32::from_be_bytes(field("b5").try_into().unwrap()),
            44100.0
        );
        assert!(entry[..synth_end].iter().any(|(e, _)| e == "start:e1"));
    }

    #[test]
    fn test_audio_blocks_interleaved_and_video_copied() {
        let rec = interleave_silence(video_only_webm(&[0, 500, 1000, 1500]), 2.0);

        let audio_blocks = rec
            .events
            .iter()
            .filter(|(e, d)| e == "leaf:a3" && d.first() == Some(&0x82))
            .count();
        let video_blocks = rec
            .events
            .iter()
            .filter(|(e, d)| e == "leaf:a3" && d.first() == Some(&0x81))
            .count();
        assert!(audio_blocks > 0);
        assert_eq!(video_blocks, 4);

        // source video payload copied untouched
        assert!(rec.events.iter().any(|(e, d)| e == "leaf:a3"
            && d.first() == Some(&0x81)
            && d.ends_with(&[0xDE, 0xAD, 0xBE, 0xEF])));
    }

    #[test]
    fn test_no_header_packets_leak_into_blocks() {
        let rec = interleave_silence(video_only_webm(&[0, 500, 1000]), 1.5);

        let mut audio_blocks = 0;
        for (e, d) in &rec.events {
            if e != "leaf:a3" {
                continue;
            }
            if d.first() == Some(&0x82) {
                audio_blocks += 1;
            }
            // header packets start 0x01/0x03/0x05 + "vorbis"; they belong in
            // CodecPrivate, never in a block
            for win in d.windows(7) {
                let header_magic =
                    matches!(win[0], 0x01 | 0x03 | 0x05) && &win[1..] == b"vorbis";
                assert!(!header_magic, "header packet bytes inside a SimpleBlock");
            }
        }
        assert!(audio_blocks > 0);
    }

    #[test]
    fn test_trailing_audio_gets_its_own_cluster() {
        // audio runs a half second past the last video anchor
        let rec = interleave_silence(video_only_webm(&[0, 500, 1000, 1500]), 2.0);
        let events: Vec<&str> = rec.events.iter().map(|(e, _)| e.as_str()).collect();

        let cluster_starts: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, &e)| e == "start:1f43b675")
            .map(|(i, _)| i)
            .collect();
        assert_eq!(cluster_starts.len(), 2);

        // trailing cluster holds only audio blocks
        let last = cluster_starts[1];
        let end = events[last..].iter().position(|&e| e == "end:1f43b675").unwrap() + last;
        for (e, d) in &rec.events[last + 1..end] {
            if e == "leaf:a3" {
                assert_eq!(d.first(), Some(&0x82));
            }
        }
        // every audio page was flushed
        assert!(rec.events[last..end]
            .iter()
            .any(|(e, _)| e == "leaf:a3"));
    }

    #[test]
    fn test_audio_timecodes_are_nondecreasing() {
        // both clusters carry timecode 0 here, so block timecodes are
        // absolute milliseconds and must grow in production order
        let rec = interleave_silence(video_only_webm(&[0, 700, 1400]), 1.5);

        let mut last = 0u16;
        let mut seen = 0;
        for (e, d) in &rec.events {
            if e == "leaf:a3" && d.first() == Some(&0x82) {
                let tc = u16::from_be_bytes([d[1], d[2]]);
                assert!(tc >= last);
                last = tc;
                seen += 1;
            }
        }
        assert!(seen > 0);
    }

    #[test]
    fn test_xiph_lacing_from_segment_table() {
        let mut header = vec![0u8; 27];
        header[26] = 3;
        header.extend_from_slice(&[255, 255, 4]);
        let page = OggPage {
            header,
            body: vec![7; 514],
        };
        let payload = simple_block_payload(&page, 0x0102);

        assert_eq!(payload[0], 0x82);
        assert_eq!(&payload[1..3], &[0x01, 0x02]);
        assert_eq!(payload[3], 0x82);
        assert_eq!(payload[4], 2);
        // each 255 length gets a 0x00 continuation terminator
        assert_eq!(&payload[5..9], &[255, 0, 255, 0]);
        assert_eq!(&payload[9..], vec![7u8; 514].as_slice());
    }

    #[test]
    fn test_short_block_is_rejected() {
        let mut w = EbmlWriter::new(Cursor::new(Vec::new()));
        w.open_container(elements::SEGMENT).unwrap();
        w.write_raw_leaf(elements::SIMPLE_BLOCK, &[0x81]).unwrap();
        w.close_container().unwrap();
        let video = w.finish().unwrap().into_inner();

        let encoder =
            VorbisEncoder::new(SlicePcmSource::silence(4410, 2, 44100), 5).unwrap();
        let err = ContainerInterleaver::new(encoder, Cursor::new(Vec::new()))
            .run(Cursor::new(video))
            .unwrap_err();
        assert!(matches!(err, WebmError::MalformedBlock(_)));
    }
}
