//! # Dubmux EBML
//!
//! Streaming EBML (Extensible Binary Meta Language) container codec, as used by
//! Matroska/WebM:
//! - Self-delimiting variable-length integer codecs for element IDs and sizes
//! - A typed element model (leaf vs. container)
//! - A stack-based incremental writer with backpatched container lengths
//! - A depth-first push parser firing callbacks per element
//!
//! Children of a container are a stream of writer calls / reader events, never a
//! materialized tree.

pub mod element;
pub mod error;
pub mod reader;
pub mod vint;
pub mod writer;

pub use element::{ElementId, ElementValue};
pub use error::{EbmlError, Result};
pub use reader::{EbmlHandler, EbmlReader, LeafElement};
pub use writer::EbmlWriter;
