//! # Dubmux Ogg
//!
//! Ogg transport framing for encoded audio packets:
//! - CRC32 page checksums (polynomial 0x04c11db7, unreflected)
//! - Page structure with the fixed 27-byte header + segment table layout
//! - A paginator packing variable-length packets into pages with lacing

pub mod crc;
pub mod error;
pub mod page;
pub mod stream;

pub use error::{OggError, Result};
pub use page::OggPage;
pub use stream::{OggPacket, OggStreamState};
