//! # Dubmux Vorbis
//!
//! A perceptual audio encoder producing Vorbis packets and Ogg pages from
//! 16-bit PCM. The analysis pipeline windows overlapping MDCT blocks with
//! transient-adaptive sizing, shapes quantization noise under psychoacoustic
//! masking curves, codes a piecewise-linear spectral floor plus a
//! vector-quantized residue with lossy stereo coupling, and selects among
//! candidate packets with leaky-bucket rate control.
//!
//! [`VorbisEncoder`] is the streaming entry point; container muxers use its
//! header packets via [`HeaderSet::codec_private`].

pub mod bitrate;
pub mod block;
pub mod codebook;
pub mod coupling;
pub mod dsp;
pub mod envelope;
pub mod error;
pub mod fft;
pub mod floor;
pub mod headers;
pub mod lpc;
pub mod mdct;
pub mod psy;
pub mod residue;
pub mod setup;
pub mod tables;
pub mod window;

pub mod encoder;

pub use bitrate::{BitrateInfo, BitrateManager, VorbisPacket};
pub use block::Block;
pub use dsp::DspState;
pub use encoder::{EncoderConfig, VorbisEncoder};
pub use error::{Result, VorbisError};
pub use headers::{HeaderParams, HeaderSet};

/// Candidate packets produced per analyzed block under rate management.
pub const PACKETBLOBS: usize = 15;

/// Silence floor used throughout the masking math, in dB.
pub(crate) const NEGINF: f32 = -9999.0;
