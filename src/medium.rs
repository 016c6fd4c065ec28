//! Shape negotiation against an exchange partner.
//!
//! A partner (whatever currently holds the clipboard) serves each format
//! in the shapes it chooses. [`read_via_partner`] lines those up with the
//! shapes the registered converters can consume, bridging the two
//! mismatched combinations: an offered stream is drained into a buffer
//! for a block-only converter, and an offered block is wrapped in a
//! forward-only reader for a stream-only converter.

use std::io::Read;

use tracing::trace;

use crate::convert::{Direction, ShapeCaps, TransferShape};
use crate::formats::{FormatCatalog, FormatId};
use crate::{ClipboardError, ClipboardResult};

/// The reading side of an exchange: what the other party offers and how
/// to pull it.
pub trait ExchangePartner {
    /// Shapes the partner can serve for the format, as reader capabilities
    fn offers(&self, id: FormatId) -> ShapeCaps;

    /// Pull the format as one contiguous block
    fn read_block(&self, id: FormatId) -> ClipboardResult<Vec<u8>>;

    /// Pull the format as a sequential stream
    fn read_stream(&self, id: FormatId) -> ClipboardResult<Box<dyn Read + '_>>;
}

/// Forward-only reader over a contiguous block.
///
/// Deliberately does not implement `Seek`: converters fed through the
/// block-to-stream bridge see the same one-pass contract a real partner
/// stream gives them.
pub struct BlockReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BlockReader<'a> {
    /// Wrap a block in a one-pass reader
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl Read for BlockReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = &self.data[self.pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}

/// Read a typed value from a partner, negotiating shapes.
///
/// Walks the catalog's converter preference list for `id`. Per converter,
/// block-capable converters prefer the block shape and stream-capable
/// ones the stream shape; the bridges cover partners that only offer the
/// other one. Converter errors fall through to the next converter, and
/// the last error surfaces if none succeeds.
pub fn read_via_partner<T: 'static>(
    partner: &dyn ExchangePartner,
    id: FormatId,
    catalog: &FormatCatalog,
) -> ClipboardResult<T> {
    let offered = partner.offers(id);
    if !offered.supports(Direction::Read) {
        return Err(ClipboardError::NotFound(id.raw()));
    }
    let converters = catalog.converters_for::<T>(id, Direction::Read);
    if converters.is_empty() {
        return Err(ClipboardError::NoConverter);
    }

    let mut last_err = None;
    for converter in converters {
        let caps = converter.caps();
        let order = if caps.contains(ShapeCaps::BLOCK_READ) {
            [TransferShape::Block, TransferShape::Stream]
        } else {
            [TransferShape::Stream, TransferShape::Block]
        };
        for shape in order {
            let attempt = match shape {
                TransferShape::Block if caps.contains(ShapeCaps::BLOCK_READ) => {
                    if offered.contains(ShapeCaps::BLOCK_READ) {
                        trace!(id = id.raw(), "reading block directly");
                        partner
                            .read_block(id)
                            .and_then(|block| converter.read_block(&block))
                    } else if offered.contains(ShapeCaps::STREAM_READ) {
                        trace!(id = id.raw(), "draining partner stream into a block");
                        partner.read_stream(id).and_then(|mut stream| {
                            let mut buf = Vec::new();
                            stream.read_to_end(&mut buf)?;
                            converter.read_block(&buf)
                        })
                    } else {
                        continue;
                    }
                }
                TransferShape::Stream if caps.contains(ShapeCaps::STREAM_READ) => {
                    if offered.contains(ShapeCaps::STREAM_READ) {
                        trace!(id = id.raw(), "reading stream directly");
                        partner
                            .read_stream(id)
                            .and_then(|mut stream| converter.read_stream(&mut stream))
                    } else if offered.contains(ShapeCaps::BLOCK_READ) {
                        trace!(id = id.raw(), "wrapping partner block as a stream");
                        partner.read_block(id).and_then(|block| {
                            converter.read_stream(&mut BlockReader::new(&block))
                        })
                    } else {
                        continue;
                    }
                }
                _ => continue,
            };
            match attempt {
                Ok(value) => return Ok(value),
                Err(err) => last_err = Some(err),
            }
        }
    }
    Err(last_err.unwrap_or(ClipboardError::NoConverter))
}
