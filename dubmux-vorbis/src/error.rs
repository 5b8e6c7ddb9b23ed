//! Encoder error types.

use thiserror::Error;

/// Audio encoder errors.
#[derive(Error, Debug)]
pub enum VorbisError {
    /// Encoder configuration error.
    #[error("Encoder configuration error: {0}")]
    Config(String),

    /// Unsupported sample rate.
    #[error("Unsupported sample rate: {0}")]
    UnsupportedSampleRate(u32),

    /// Unsupported channel count.
    #[error("Unsupported channel count: {0}")]
    UnsupportedChannels(u8),

    /// Codebook construction failed.
    #[error("Invalid codebook: {0}")]
    InvalidCodebook(String),

    /// Analysis state machine misuse.
    #[error("Analysis state error: {0}")]
    State(String),

    /// PCM input error.
    #[error("PCM input error: {0}")]
    Input(String),
}

/// Encoder result type.
pub type Result<T> = std::result::Result<T, VorbisError>;

impl From<VorbisError> for dubmux_core::Error {
    fn from(err: VorbisError) -> Self {
        dubmux_core::Error::Codec(dubmux_core::error::CodecError::Other(err.to_string()))
    }
}
