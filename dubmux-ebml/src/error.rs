//! EBML error types.

use thiserror::Error;

/// EBML codec errors.
#[derive(Error, Debug)]
pub enum EbmlError {
    /// A length does not fit the 1..=8 byte self-delimiting encoding.
    #[error("Length {0} exceeds the 56-bit encodable range")]
    LengthOutOfRange(u64),

    /// A first length byte of 0x00 (width beyond 8 bytes).
    #[error("Invalid length marker byte 0x00")]
    InvalidLengthMarker,

    /// Element ID bytes are malformed.
    #[error("Invalid element ID: {0}")]
    InvalidId(String),

    /// Stream ended inside an element.
    #[error("Truncated element at offset {0}")]
    Truncated(u64),

    /// Writer/reader contract violation.
    #[error("Contract violation: {0}")]
    Contract(String),

    /// Leaf payload could not be interpreted as the requested type.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// EBML result type.
pub type Result<T> = std::result::Result<T, EbmlError>;

impl From<EbmlError> for dubmux_core::Error {
    fn from(err: EbmlError) -> Self {
        match err {
            EbmlError::Io(e) => dubmux_core::Error::Io(e),
            other => dubmux_core::Error::Container(dubmux_core::error::ContainerError::Other(
                other.to_string(),
            )),
        }
    }
}
