//! # Dubmux Core
//!
//! Core types and utilities shared by the dubmux container and codec crates:
//! - Error handling types
//! - LSB-first bit packing for codec packet assembly
//! - PCM sample source abstraction

pub mod bitpack;
pub mod error;
pub mod pcm;

pub use bitpack::BitPacker;
pub use error::{Error, Result};
pub use pcm::{PcmSource, SlicePcmSource};
