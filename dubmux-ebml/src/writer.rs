//! Incremental EBML writer.
//!
//! Containers are written before their size is known: the writer emits the 8-byte
//! unknown-size sentinel, keeps a stack frame per open container, and backpatches the
//! true content length (as exactly 7 big-endian bytes behind the 0x01 marker) when
//! the container closes. This is why the sink must be seekable.

use crate::element::{ElementId, ElementValue};
use crate::error::{EbmlError, Result};
use crate::vint;
use std::io::{Seek, SeekFrom, Write};

/// The 8-byte "unknown length" sentinel: marker byte 0x01 then seven 0xFF.
const UNKNOWN_LENGTH: [u8; 8] = [0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];

#[derive(Debug)]
struct WriterFrame {
    start: u64,
    id_len: usize,
    content_len: u64,
}

/// Stack-based incremental EBML serializer with backpatched container lengths.
#[derive(Debug)]
pub struct EbmlWriter<W: Write + Seek> {
    out: W,
    stack: Vec<WriterFrame>,
}

impl<W: Write + Seek> EbmlWriter<W> {
    /// Wrap a seekable sink.
    pub fn new(out: W) -> Self {
        EbmlWriter {
            out,
            stack: Vec::new(),
        }
    }

    /// Serialize a leaf: ID bytes, length-encoded payload size, payload.
    pub fn write_leaf(&mut self, id: ElementId, value: &ElementValue) -> Result<()> {
        self.write_raw_leaf(id, &value.to_payload())
    }

    /// Serialize a leaf with an already-encoded payload.
    pub fn write_raw_leaf(&mut self, id: ElementId, payload: &[u8]) -> Result<()> {
        let size = vint::encode_length(payload.len() as u64)?;
        self.out.write_all(id.bytes())?;
        self.out.write_all(&size)?;
        self.out.write_all(payload)?;
        let total = (id.len() + size.len() + payload.len()) as u64;
        if let Some(parent) = self.stack.last_mut() {
            parent.content_len += total;
        }
        Ok(())
    }

    /// Open a container: write its ID and the unknown-size placeholder, and push a
    /// frame so children accumulate into it.
    pub fn open_container(&mut self, id: ElementId) -> Result<()> {
        let start = self.out.stream_position()?;
        self.out.write_all(id.bytes())?;
        self.out.write_all(&UNKNOWN_LENGTH)?;
        self.stack.push(WriterFrame {
            start,
            id_len: id.len(),
            content_len: 0,
        });
        Ok(())
    }

    /// Close the innermost open container, backpatching its true content length
    /// into the 7 bytes behind the placeholder's marker byte.
    pub fn close_container(&mut self) -> Result<()> {
        let frame = self.stack.pop().ok_or_else(|| {
            EbmlError::Contract("close_container with no open container".into())
        })?;
        if frame.content_len > vint::MAX_LENGTH {
            return Err(EbmlError::LengthOutOfRange(frame.content_len));
        }
        let resume = self.out.stream_position()?;
        let length_pos = frame.start + frame.id_len as u64 + 1;
        self.out.seek(SeekFrom::Start(length_pos))?;
        self.out.write_all(&vint::encode_uint(frame.content_len, 7))?;
        self.out.seek(SeekFrom::Start(resume))?;
        if let Some(parent) = self.stack.last_mut() {
            parent.content_len += frame.content_len + frame.id_len as u64 + 8;
        }
        Ok(())
    }

    /// Number of containers currently open.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Flush and return the sink. Errors if containers are still open.
    pub fn finish(mut self) -> Result<W> {
        if !self.stack.is_empty() {
            return Err(EbmlError::Contract(format!(
                "{} container(s) still open",
                self.stack.len()
            )));
        }
        self.out.flush()?;
        Ok(self.out)
    }
}
