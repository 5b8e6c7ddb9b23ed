//! Ogg error types.

use thiserror::Error;

/// Ogg transport errors.
#[derive(Error, Debug)]
pub enum OggError {
    /// Page header is malformed.
    #[error("Invalid page header: {0}")]
    InvalidHeader(String),

    /// Packet exceeds representable size.
    #[error("Packet too large: {0} bytes")]
    PacketTooLarge(usize),

    /// Stream state contract violation.
    #[error("Stream state error: {0}")]
    State(String),
}

/// Ogg result type.
pub type Result<T> = std::result::Result<T, OggError>;

impl From<OggError> for dubmux_core::Error {
    fn from(err: OggError) -> Self {
        dubmux_core::Error::Bitstream(dubmux_core::error::BitstreamError::Other(err.to_string()))
    }
}
