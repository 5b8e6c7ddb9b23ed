//! Depth-first push parser.
//!
//! The reader walks a forward-only byte stream element by element, firing handler
//! callbacks for leaves and container open/close. Container nesting is tracked by an
//! explicit stack of end offsets; frames pop (LIFO) as soon as the cumulative byte
//! count reaches them, so a single leaf may close several containers at once.
//!
//! Malformed input (bad length marker, zero-size element, truncation) terminates the
//! parse with a final `stream_end` — fail-fast, no mid-stream recovery. Handler
//! errors propagate to the caller.

use crate::element::ElementId;
use crate::error::Result;
use crate::vint;
use std::io::Read;

/// A parsed leaf element: identity plus raw payload bytes.
#[derive(Debug, Clone)]
pub struct LeafElement {
    /// Element identity.
    pub id: ElementId,
    /// Raw payload bytes.
    pub data: Vec<u8>,
}

impl LeafElement {
    /// Interpret the payload as a big-endian unsigned integer.
    pub fn as_uint(&self) -> Result<u64> {
        vint::decode_uint(&self.data)
    }
}

/// Delegate receiving parse events.
pub trait EbmlHandler {
    /// A leaf element was parsed in full.
    fn leaf(&mut self, leaf: &LeafElement) -> Result<()>;

    /// A container element started; `size` is its declared content length.
    fn container_start(&mut self, id: &ElementId, size: u64) -> Result<()>;

    /// A container element's content has been fully consumed.
    fn container_end(&mut self, id: &ElementId) -> Result<()>;

    /// The stream terminated (end of input or malformed data). Fired once, unless a
    /// handler error aborted the parse first.
    fn stream_end(&mut self) {}
}

#[derive(Debug)]
struct ReaderFrame {
    id: ElementId,
    end: u64,
}

/// Single-pass push parser over a forward-only byte stream.
pub struct EbmlReader<R: Read> {
    input: R,
    bytes_read: u64,
    stack: Vec<ReaderFrame>,
}

impl<R: Read> EbmlReader<R> {
    /// Wrap an input stream.
    pub fn new(input: R) -> Self {
        EbmlReader {
            input,
            bytes_read: 0,
            stack: Vec::new(),
        }
    }

    /// Parse the whole stream, pushing events into `handler`.
    ///
    /// Returns Ok(()) on normal or fail-fast termination; handler errors propagate.
    pub fn run<H: EbmlHandler>(&mut self, handler: &mut H) -> Result<()> {
        loop {
            let id = match self.read_id() {
                Ok(id) => id,
                Err(_) => break,
            };
            let size = match self.read_length() {
                Ok(s) => s,
                Err(_) => break,
            };
            if size == 0 {
                break;
            }

            if id.is_container() {
                self.stack.push(ReaderFrame {
                    id,
                    end: self.bytes_read + size,
                });
                handler.container_start(&id, size)?;
            } else {
                let mut data = vec![0u8; size as usize];
                if self.input.read_exact(&mut data).is_err() {
                    break;
                }
                self.bytes_read += size;
                handler.leaf(&LeafElement { id, data })?;

                while let Some(top) = self.stack.last() {
                    if self.bytes_read >= top.end {
                        let frame = self.stack.pop().expect("stack top just observed");
                        handler.container_end(&frame.id)?;
                    } else {
                        break;
                    }
                }
            }
        }
        handler.stream_end();
        Ok(())
    }

    fn read_id(&mut self) -> Result<ElementId> {
        let raw = vint::read_id_bytes(&mut self.input)?;
        self.bytes_read += raw.len() as u64;
        Ok(ElementId::from_bytes(&raw))
    }

    fn read_length(&mut self) -> Result<u64> {
        let mut first = [0u8; 1];
        self.input.read_exact(&mut first)?;
        let width = vint::length_width(first[0])?;
        let mut value = u64::from(first[0]) - (1u64 << (8 - width));
        let mut rest = vec![0u8; width - 1];
        self.input.read_exact(&mut rest)?;
        for b in rest {
            value = (value << 8) | u64::from(b);
        }
        self.bytes_read += width as u64;
        Ok(value)
    }
}
