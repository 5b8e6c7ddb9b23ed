//! # Dubmux WebM
//!
//! WebM-specific muxing on top of the EBML codec: Matroska element
//! identities, audio `SimpleBlock` wrapping of encoded Ogg pages, and the
//! [`ContainerInterleaver`] that merges an encoded audio stream into an
//! existing video-only WebM file by timecode.

pub mod elements;
pub mod error;
pub mod interleave;

pub use error::{Result, WebmError};
pub use interleave::{simple_block_payload, ContainerInterleaver, AUDIO_TRACK_NUMBER};
