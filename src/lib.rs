//! # crossclip-core
//!
//! Clipboard exchange core: format negotiation, an OLE-style data-object
//! protocol surface, and a device-independent bitmap codec.
//!
//! The pieces compose in two directions:
//!
//! - **Reading**: [`ClipboardSession`] → [`medium::read_via_partner`] →
//!   a [`FormatCatalog`] converter → (for images) [`DibCodec`].
//! - **Writing**: application → catalog converter →
//!   [`OutboundDataObject`] entries → [`ClipboardSession::publish`] hands
//!   the object to the platform, which later calls back into it.
//!
//! The actual platform clipboard sits behind the
//! [`SystemClipboard`] trait; everything in this crate is synchronous
//! and platform-neutral.
//!
//! ## Quick Start
//!
//! ```rust
//! use crossclip_core::formats::CF_UNICODETEXT;
//! use crossclip_core::{FormatCatalog, OutboundDataObject};
//! use crossclip_core::text::TextUnicode;
//! use std::sync::Arc;
//!
//! let catalog = FormatCatalog::with_builtins();
//! let html = catalog.register("HTML Format");
//! assert_eq!(catalog.register("HTML Format"), html);
//!
//! // Offer a string as Unicode text
//! let mut object = OutboundDataObject::new();
//! object.add(CF_UNICODETEXT, "hello".to_string(), Arc::new(TextUnicode)).unwrap();
//! assert_eq!(object.enumerate().len(), 1);
//! ```

#![warn(missing_docs)]

mod error;

pub mod convert;
pub mod dib;
pub mod formats;
pub mod medium;
pub mod outbound;
pub mod session;
pub mod text;

pub use convert::{DataConverter, Direction, ShapeCaps, TransferShape};
pub use dib::{Bitmap, BitmapHeader, ColorSpace, ColorTransform, Compression, DibCodec, WriteMode};
pub use error::{ClipboardError, ClipboardResult};
pub use formats::{FormatCatalog, FormatDescriptor, FormatId};
pub use medium::{read_via_partner, BlockReader, ExchangePartner};
pub use outbound::{Aspect, ExchangeRequest, OutboundDataObject, ProtocolStatus};
pub use session::{ClipboardSession, LocalClipboardLock, SessionConfig, SystemClipboard};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::convert::{DataConverter, Direction, ShapeCaps, TransferShape};
    pub use crate::{
        Bitmap, ClipboardError, ClipboardResult, ClipboardSession, DibCodec, FormatCatalog,
        FormatId, LocalClipboardLock, OutboundDataObject, SystemClipboard,
    };
}
