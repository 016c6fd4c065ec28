//! The outbound data object: what this process offers to the clipboard.
//!
//! Entries are added as typed values with a converter; serialization is
//! deferred until the first protocol request and cached, so `size` and
//! `read` always agree and repeated reads are pure. The protocol surface
//! mirrors the platform's data-object contract in the server role.

use std::sync::Arc;
use std::sync::OnceLock;

use tracing::{debug, warn};

use crate::convert::{DataConverter, Direction, ShapeCaps, TransferShape};
use crate::formats::FormatId;
use crate::{ClipboardError, ClipboardResult};

// =============================================================================
// Entries
// =============================================================================

type Renderer = Box<dyn Fn() -> ClipboardResult<Vec<u8>> + Send + Sync>;

/// One offered format: the id, the shapes it may be served in, and a
/// deferred renderer with a fill-once cache.
struct ExchangeEntry {
    id: FormatId,
    shapes: ShapeCaps,
    render: Renderer,
    cache: OnceLock<Vec<u8>>,
}

impl ExchangeEntry {
    fn rendered(&self) -> ClipboardResult<&[u8]> {
        if let Some(bytes) = self.cache.get() {
            return Ok(bytes.as_slice());
        }
        let bytes = (self.render)()?;
        Ok(self.cache.get_or_init(|| bytes).as_slice())
    }

    fn serves(&self, shape: TransferShape) -> bool {
        match shape {
            TransferShape::Block => self.shapes.contains(ShapeCaps::BLOCK_WRITE),
            TransferShape::Stream => self.shapes.contains(ShapeCaps::STREAM_WRITE),
            _ => false,
        }
    }
}

// =============================================================================
// Protocol surface
// =============================================================================

/// View of the data a request targets; only content is supported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aspect {
    /// The full content representation
    Content,
    /// A thumbnail representation (rejected)
    Thumbnail,
    /// An icon representation (rejected)
    Icon,
    /// A printer-ready representation (rejected)
    DocPrint,
}

/// A protocol request tuple
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeRequest {
    /// Requested format id
    pub format: FormatId,
    /// Requested aspect; anything but [`Aspect::Content`] is rejected
    pub aspect: Aspect,
    /// Requested transfer shape
    pub shape: TransferShape,
}

/// Result taxonomy of the protocol operations, mapped onto the
/// platform's native status codes by [`hresult`](Self::hresult).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolStatus {
    /// Request satisfied
    Ok,
    /// No entry matches the requested format
    NoMatch,
    /// Entry exists but not in the requested shape
    WrongShape,
    /// Request targeted an unsupported aspect
    WrongAspect,
    /// Allocation failed or the destination cannot hold the data
    OutOfMemory,
    /// Operation is not part of this object's contract
    NotImplemented,
}

impl ProtocolStatus {
    /// The platform's native status code for this result
    pub fn hresult(self) -> i32 {
        match self {
            Self::Ok => 0,                           // S_OK
            Self::NoMatch => 0x8004_0064_u32 as i32, // DV_E_FORMATETC
            Self::WrongShape => 0x8004_0069_u32 as i32, // DV_E_TYMED
            Self::WrongAspect => 0x8004_006B_u32 as i32, // DV_E_DVASPECT
            Self::OutOfMemory => 0x8007_000E_u32 as i32, // E_OUTOFMEMORY
            Self::NotImplemented => 0x8000_4001_u32 as i32, // E_NOTIMPL
        }
    }
}

// =============================================================================
// Outbound object
// =============================================================================

/// An ordered set of formats offered to the platform.
///
/// The platform calls back into this object after
/// [`publish`](crate::session::ClipboardSession::publish); all protocol
/// operations are read-only, so a shared reference is enough once the
/// object leaves this process's hands.
#[derive(Default)]
pub struct OutboundDataObject {
    entries: Vec<ExchangeEntry>,
}

impl OutboundDataObject {
    /// An object with no entries
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer `value` under `id`, serialized by `converter` on first
    /// request. Fails when the converter declares no writer capability.
    pub fn add<T: Send + Sync + 'static>(
        &mut self,
        id: FormatId,
        value: T,
        converter: Arc<dyn DataConverter<T>>,
    ) -> ClipboardResult<()> {
        let shapes = converter.caps();
        if !shapes.supports(Direction::Write) {
            return Err(ClipboardError::UnsupportedShape);
        }
        let render: Renderer = Box::new(move || {
            if shapes.contains(ShapeCaps::BLOCK_WRITE) {
                converter.write_block(&value)
            } else {
                let mut out = Vec::new();
                converter.write_stream(&value, &mut out)?;
                Ok(out)
            }
        });
        debug!(id = id.raw(), "offering format");
        self.entries.push(ExchangeEntry {
            id,
            shapes,
            render,
            cache: OnceLock::new(),
        });
        Ok(())
    }

    /// Offer pre-serialized bytes under `id`, served in both shapes
    pub fn add_bytes(&mut self, id: FormatId, bytes: Vec<u8>) {
        let cache = OnceLock::new();
        let _ = cache.set(bytes);
        self.entries.push(ExchangeEntry {
            id,
            shapes: ShapeCaps::BLOCK_WRITE.union(ShapeCaps::STREAM_WRITE),
            render: Box::new(|| Ok(Vec::new())), // cache is pre-filled
            cache,
        });
    }

    /// True when no formats are offered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Offered formats with their shapes, in insertion order
    pub fn enumerate(&self) -> Vec<(FormatId, ShapeCaps)> {
        self.entries.iter().map(|e| (e.id, e.shapes)).collect()
    }

    /// Whether `id` is offered in `shape`; never allocates or renders
    pub fn query_supports(&self, id: FormatId, shape: TransferShape) -> bool {
        self.entries
            .iter()
            .any(|e| e.id == id && e.serves(shape))
    }

    /// Serialized size of the entry for `id`
    pub fn size(&self, id: FormatId) -> ClipboardResult<usize> {
        self.entry(id)?.rendered().map(<[u8]>::len)
    }

    /// Copy the serialized entry into `buf`, validating capacity before
    /// any byte is written. Returns the number of bytes copied.
    pub fn read(&self, id: FormatId, buf: &mut [u8]) -> ClipboardResult<usize> {
        let bytes = self.entry(id)?.rendered()?;
        if buf.len() < bytes.len() {
            return Err(ClipboardError::BufferTooSmall {
                needed: bytes.len(),
                capacity: buf.len(),
            });
        }
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(bytes.len())
    }

    fn entry(&self, id: FormatId) -> ClipboardResult<&ExchangeEntry> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .ok_or(ClipboardError::NotFound(id.raw()))
    }

    // ----- protocol operations (server role) -----

    /// Serve a request as a freshly allocated buffer
    pub fn get_data(&self, request: &ExchangeRequest) -> Result<Vec<u8>, ProtocolStatus> {
        match self.check(request) {
            ProtocolStatus::Ok => {}
            status => return Err(status),
        }
        match self.entry(request.format) {
            Ok(entry) => match entry.rendered() {
                Ok(bytes) => Ok(bytes.to_vec()),
                Err(ClipboardError::OutOfMemory) => Err(ProtocolStatus::OutOfMemory),
                Err(err) => {
                    warn!(id = request.format.raw(), %err, "entry failed to render");
                    Err(ProtocolStatus::NoMatch)
                }
            },
            Err(_) => Err(ProtocolStatus::NoMatch),
        }
    }

    /// Serve a request into a caller-provided buffer. The capacity is
    /// validated up front; on failure nothing is written.
    pub fn get_data_here(
        &self,
        request: &ExchangeRequest,
        buf: &mut [u8],
    ) -> Result<usize, ProtocolStatus> {
        match self.check(request) {
            ProtocolStatus::Ok => {}
            status => return Err(status),
        }
        match self.read(request.format, buf) {
            Ok(n) => Ok(n),
            Err(ClipboardError::BufferTooSmall { .. } | ClipboardError::OutOfMemory) => {
                Err(ProtocolStatus::OutOfMemory)
            }
            Err(_) => Err(ProtocolStatus::NoMatch),
        }
    }

    /// Answer whether a request could be served, without serving it
    pub fn query_get_data(&self, request: &ExchangeRequest) -> ProtocolStatus {
        self.check(request)
    }

    /// Offered formats in insertion order, as the enumerator reports them
    pub fn enum_formats(&self) -> Vec<(FormatId, ShapeCaps)> {
        self.enumerate()
    }

    /// Change notifications are not part of this object's contract
    pub fn advise(&self) -> ProtocolStatus {
        ProtocolStatus::NotImplemented
    }

    /// Change notifications are not part of this object's contract
    pub fn unadvise(&self) -> ProtocolStatus {
        ProtocolStatus::NotImplemented
    }

    fn check(&self, request: &ExchangeRequest) -> ProtocolStatus {
        if request.aspect != Aspect::Content {
            return ProtocolStatus::WrongAspect;
        }
        if !self.entries.iter().any(|e| e.id == request.format) {
            return ProtocolStatus::NoMatch;
        }
        if !self.query_supports(request.format, request.shape) {
            return ProtocolStatus::WrongShape;
        }
        ProtocolStatus::Ok
    }
}
