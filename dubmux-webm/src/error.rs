//! WebM muxing error types.

use thiserror::Error;

/// Interleaving errors.
#[derive(Error, Debug)]
pub enum WebmError {
    /// Container read/write error.
    #[error("Container error: {0}")]
    Ebml(#[from] dubmux_ebml::EbmlError),

    /// Audio encoder error.
    #[error("Audio encoder error: {0}")]
    Encoder(#[from] dubmux_vorbis::VorbisError),

    /// A source block element too short to carry its timecode.
    #[error("Malformed block element: {0}")]
    MalformedBlock(String),
}

/// WebM result type.
pub type Result<T> = std::result::Result<T, WebmError>;

impl From<WebmError> for dubmux_core::Error {
    fn from(err: WebmError) -> Self {
        match err {
            WebmError::Ebml(e) => e.into(),
            WebmError::Encoder(e) => e.into(),
            other => dubmux_core::Error::Container(dubmux_core::error::ContainerError::Other(
                other.to_string(),
            )),
        }
    }
}
