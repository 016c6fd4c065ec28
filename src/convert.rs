//! Converter capability model.
//!
//! Data crosses the exchange boundary in one of two working shapes: a sized
//! contiguous block, or a sequential forward-only stream. A converter
//! declares which of the four operations (read/write x block/stream) it
//! supports via [`ShapeCaps`], and the medium layer bridges the remaining
//! combinations. A few legacy graphics handle shapes exist on the protocol
//! surface but are never produced by converters.

use std::io::{Read, Write};

use crate::{ClipboardError, ClipboardResult};

/// How data crosses the exchange boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferShape {
    /// One sized contiguous memory block
    Block,
    /// Sequential, forward-only byte stream
    Stream,
    /// Legacy GDI bitmap handle (protocol surface only)
    GdiBitmap,
    /// Legacy metafile picture handle (protocol surface only)
    MetafilePict,
    /// Legacy enhanced metafile handle (protocol surface only)
    EnhMetafile,
}

impl TransferShape {
    /// Returns true for the shapes converters can actually serve
    pub fn is_convertible(&self) -> bool {
        matches!(self, Self::Block | Self::Stream)
    }
}

/// Direction of a conversion relative to the local process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Consuming data offered by a partner
    Read,
    /// Producing data for a partner
    Write,
}

/// Capability flags declared by a converter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShapeCaps(u8);

impl ShapeCaps {
    /// Can read from a contiguous block
    pub const BLOCK_READ: ShapeCaps = ShapeCaps(0b0001);
    /// Can read from a sequential stream
    pub const STREAM_READ: ShapeCaps = ShapeCaps(0b0010);
    /// Can write into a contiguous block
    pub const BLOCK_WRITE: ShapeCaps = ShapeCaps(0b0100);
    /// Can write into a sequential stream
    pub const STREAM_WRITE: ShapeCaps = ShapeCaps(0b1000);

    /// No capabilities
    pub const fn empty() -> Self {
        ShapeCaps(0)
    }

    /// Union of two capability sets
    pub const fn union(self, other: ShapeCaps) -> Self {
        ShapeCaps(self.0 | other.0)
    }

    /// True if every capability in `other` is present
    pub const fn contains(self, other: ShapeCaps) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if at least one capability in `other` is present
    pub const fn intersects(self, other: ShapeCaps) -> bool {
        self.0 & other.0 != 0
    }

    /// True if this set can serve the given direction at all
    pub fn supports(self, direction: Direction) -> bool {
        match direction {
            Direction::Read => self.intersects(Self::BLOCK_READ.union(Self::STREAM_READ)),
            Direction::Write => self.intersects(Self::BLOCK_WRITE.union(Self::STREAM_WRITE)),
        }
    }

    /// The transfer shapes this set can serve for the given direction
    pub fn shapes(self, direction: Direction) -> Vec<TransferShape> {
        let (block, stream) = match direction {
            Direction::Read => (Self::BLOCK_READ, Self::STREAM_READ),
            Direction::Write => (Self::BLOCK_WRITE, Self::STREAM_WRITE),
        };
        let mut out = Vec::with_capacity(2);
        if self.contains(block) {
            out.push(TransferShape::Block);
        }
        if self.contains(stream) {
            out.push(TransferShape::Stream);
        }
        out
    }
}

/// A typed converter between clipboard bytes and a value of type `T`.
///
/// Implementations override only the operations they support and declare
/// them in [`caps`](Self::caps); the default bodies reject with
/// [`ClipboardError::UnsupportedShape`]. The medium layer bridges between
/// shapes where possible, so a block-only converter still works against a
/// partner that offers only a stream, and vice versa.
pub trait DataConverter<T>: Send + Sync {
    /// The operations this converter supports
    fn caps(&self) -> ShapeCaps;

    /// Parse a value from a contiguous block
    fn read_block(&self, _data: &[u8]) -> ClipboardResult<T> {
        Err(ClipboardError::UnsupportedShape)
    }

    /// Parse a value from a sequential stream
    fn read_stream(&self, _stream: &mut dyn Read) -> ClipboardResult<T> {
        Err(ClipboardError::UnsupportedShape)
    }

    /// Serialize a value into a new contiguous block
    fn write_block(&self, _value: &T) -> ClipboardResult<Vec<u8>> {
        Err(ClipboardError::UnsupportedShape)
    }

    /// Serialize a value into a sequential stream
    fn write_stream(&self, _value: &T, _out: &mut dyn Write) -> ClipboardResult<()> {
        Err(ClipboardError::UnsupportedShape)
    }
}

/// Opaque pass-through converter for raw clipboard bytes.
///
/// Registered on every format descriptor so that any format found on the
/// clipboard can be reported and round-tripped even when no typed
/// converter exists for it.
#[derive(Debug, Default)]
pub struct BytesPassthrough;

impl DataConverter<Vec<u8>> for BytesPassthrough {
    fn caps(&self) -> ShapeCaps {
        ShapeCaps::BLOCK_READ
            .union(ShapeCaps::STREAM_READ)
            .union(ShapeCaps::BLOCK_WRITE)
            .union(ShapeCaps::STREAM_WRITE)
    }

    fn read_block(&self, data: &[u8]) -> ClipboardResult<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn read_stream(&self, stream: &mut dyn Read) -> ClipboardResult<Vec<u8>> {
        let mut out = Vec::new();
        stream.read_to_end(&mut out)?;
        Ok(out)
    }

    fn write_block(&self, value: &Vec<u8>) -> ClipboardResult<Vec<u8>> {
        Ok(value.clone())
    }

    fn write_stream(&self, value: &Vec<u8>, out: &mut dyn Write) -> ClipboardResult<()> {
        out.write_all(value)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caps_contains_and_union() {
        let caps = ShapeCaps::BLOCK_READ.union(ShapeCaps::STREAM_WRITE);
        assert!(caps.contains(ShapeCaps::BLOCK_READ));
        assert!(!caps.contains(ShapeCaps::STREAM_READ));
        assert!(caps.intersects(ShapeCaps::STREAM_WRITE));
    }

    #[test]
    fn test_caps_direction_support() {
        let read_only = ShapeCaps::BLOCK_READ;
        assert!(read_only.supports(Direction::Read));
        assert!(!read_only.supports(Direction::Write));
    }

    #[test]
    fn test_caps_shapes_ordering() {
        let caps = ShapeCaps::BLOCK_READ.union(ShapeCaps::STREAM_READ);
        assert_eq!(
            caps.shapes(Direction::Read),
            vec![TransferShape::Block, TransferShape::Stream]
        );
        assert!(caps.shapes(Direction::Write).is_empty());
    }

    #[test]
    fn test_passthrough_roundtrip() {
        let conv = BytesPassthrough;
        let data = vec![1u8, 2, 3];
        let written = conv.write_block(&data).unwrap();
        assert_eq!(conv.read_block(&written).unwrap(), data);
    }

    #[test]
    fn test_passthrough_stream_shapes() {
        let conv = BytesPassthrough;
        let mut out = Vec::new();
        conv.write_stream(&vec![9u8, 8], &mut out).unwrap();
        let mut cursor = std::io::Cursor::new(out);
        assert_eq!(conv.read_stream(&mut cursor).unwrap(), vec![9, 8]);
    }

    #[test]
    fn test_default_methods_reject() {
        struct BlockOnly;
        impl DataConverter<String> for BlockOnly {
            fn caps(&self) -> ShapeCaps {
                ShapeCaps::BLOCK_READ
            }
            fn read_block(&self, _data: &[u8]) -> ClipboardResult<String> {
                Ok(String::new())
            }
        }

        let conv = BlockOnly;
        let mut empty = std::io::empty();
        assert!(matches!(
            conv.read_stream(&mut empty),
            Err(ClipboardError::UnsupportedShape)
        ));
    }

    #[test]
    fn test_legacy_shapes_not_convertible() {
        assert!(TransferShape::Block.is_convertible());
        assert!(TransferShape::Stream.is_convertible());
        assert!(!TransferShape::GdiBitmap.is_convertible());
        assert!(!TransferShape::EnhMetafile.is_convertible());
    }
}
