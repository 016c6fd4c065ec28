//! Clipboard format identities and the converter catalog.
//!
//! Format ids follow the Windows clipboard numbering: a fixed set of
//! predefined ids below 0xC000 and a registered-name range from 0xC000
//! upward. The [`FormatCatalog`] maps ids to descriptors and holds the
//! converters that can translate each format to and from typed values.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::convert::{BytesPassthrough, DataConverter, Direction, ShapeCaps};
use crate::dib::{ImageDib, ImageDibV5};
use crate::text::{FileDropList, TextAnsi, TextUnicode, TextUtf8};

// =============================================================================
// Format identity
// =============================================================================

/// A clipboard format id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FormatId(pub u32);

impl FormatId {
    /// The raw numeric id
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// True for ids in the registered-name range (0xC000 and above)
    pub const fn is_registered(self) -> bool {
        self.0 >= REGISTERED_BASE
    }
}

impl From<u32> for FormatId {
    fn from(raw: u32) -> Self {
        FormatId(raw)
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// First id handed out for registered format names
const REGISTERED_BASE: u32 = 0xC000;

/// Predefined format: ANSI text (Windows-1252 codepage)
pub const CF_TEXT: FormatId = FormatId(1);

/// Predefined format: GDI bitmap handle (legacy, handle shape only)
pub const CF_BITMAP: FormatId = FormatId(2);

/// Predefined format: TIFF image
pub const CF_TIFF: FormatId = FormatId(6);

/// Predefined format: OEM text (DOS codepage, served as Windows-1252 here)
pub const CF_OEMTEXT: FormatId = FormatId(7);

/// Predefined format: device-independent bitmap
pub const CF_DIB: FormatId = FormatId(8);

/// Predefined format: RIFF audio
pub const CF_RIFF: FormatId = FormatId(11);

/// Predefined format: Wave audio
pub const CF_WAVE: FormatId = FormatId(12);

/// Predefined format: Unicode text (UTF-16LE)
pub const CF_UNICODETEXT: FormatId = FormatId(13);

/// Predefined format: enhanced metafile handle (legacy, handle shape only)
pub const CF_ENHMETAFILE: FormatId = FormatId(14);

/// Predefined format: file drop list (DROPFILES structure)
pub const CF_HDROP: FormatId = FormatId(15);

/// Predefined format: locale identifier accompanying CF_TEXT
pub const CF_LOCALE: FormatId = FormatId(16);

/// Predefined format: device-independent bitmap, V5 header
pub const CF_DIBV5: FormatId = FormatId(17);

/// Registered format name for HTML fragments
pub const NAME_HTML: &str = "HTML Format";

/// Registered format name for rich text
pub const NAME_RTF: &str = "Rich Text Format";

/// A format descriptor: the id plus its display name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FormatDescriptor {
    /// Clipboard format id
    pub id: FormatId,

    /// Format name. Predefined ids get their conventional names;
    /// unknown ids are rendered as `Format<id>`.
    pub name: String,
}

// =============================================================================
// Converter catalog
// =============================================================================

/// One registered converter, with its value type erased.
///
/// `erased` holds an `Arc<dyn DataConverter<T>>` boxed as `Any`; `type_id`
/// is `TypeId::of::<T>()` so lookups can filter before downcasting.
struct ConverterSlot {
    type_id: TypeId,
    caps: ShapeCaps,
    erased: Box<dyn Any + Send + Sync>,
}

#[derive(Default)]
struct CatalogInner {
    names: HashMap<String, FormatId>,
    descriptors: HashMap<FormatId, String>,
    converters: HashMap<FormatId, Vec<ConverterSlot>>,
    next_registered: u32,
}

impl CatalogInner {
    /// Insert the descriptor (and its opaque passthrough) if absent
    fn ensure_descriptor(&mut self, id: FormatId, name: Option<&str>) {
        if self.descriptors.contains_key(&id) {
            return;
        }
        let name = name
            .map(str::to_owned)
            .unwrap_or_else(|| format!("Format{}", id.raw()));
        self.descriptors.insert(id, name);
        let passthrough: Arc<dyn DataConverter<Vec<u8>>> = Arc::new(BytesPassthrough);
        self.converters.entry(id).or_default().push(ConverterSlot {
            type_id: TypeId::of::<Vec<u8>>(),
            caps: passthrough.caps(),
            erased: Box::new(passthrough),
        });
    }
}

/// Registry of format descriptors and their converters.
///
/// All reads take the interior lock shared; the catalog is built once at
/// startup and treated as immutable afterwards, so lookups never contend.
pub struct FormatCatalog {
    inner: RwLock<CatalogInner>,
}

impl FormatCatalog {
    /// An empty catalog with no descriptors
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(CatalogInner {
                next_registered: REGISTERED_BASE,
                ..Default::default()
            }),
        }
    }

    /// A catalog seeded with the built-in formats and converters
    pub fn with_builtins() -> Self {
        let catalog = Self::new();
        {
            let mut inner = catalog.inner.write();
            inner.ensure_descriptor(CF_TEXT, Some("Text"));
            inner.ensure_descriptor(CF_BITMAP, Some("Bitmap"));
            inner.ensure_descriptor(CF_TIFF, Some("Tiff"));
            inner.ensure_descriptor(CF_OEMTEXT, Some("OemText"));
            inner.ensure_descriptor(CF_DIB, Some("Dib"));
            inner.ensure_descriptor(CF_RIFF, Some("Riff"));
            inner.ensure_descriptor(CF_WAVE, Some("Wave"));
            inner.ensure_descriptor(CF_UNICODETEXT, Some("UnicodeText"));
            inner.ensure_descriptor(CF_ENHMETAFILE, Some("EnhancedMetafile"));
            inner.ensure_descriptor(CF_HDROP, Some("FileDrop"));
            inner.ensure_descriptor(CF_LOCALE, Some("Locale"));
            inner.ensure_descriptor(CF_DIBV5, Some("DibV5"));
        }
        let html = catalog.register(NAME_HTML);
        let rtf = catalog.register(NAME_RTF);

        catalog.register_converter(CF_UNICODETEXT, Arc::new(TextUnicode));
        catalog.register_converter(CF_TEXT, Arc::new(TextAnsi));
        catalog.register_converter(CF_OEMTEXT, Arc::new(TextAnsi));
        catalog.register_converter(rtf, Arc::new(TextAnsi));
        catalog.register_converter(html, Arc::new(TextUtf8));
        catalog.register_converter(CF_DIB, Arc::new(ImageDib::new()));
        catalog.register_converter(CF_DIBV5, Arc::new(ImageDibV5::new()));
        catalog.register_converter(CF_HDROP, Arc::new(FileDropList));
        catalog
    }

    /// Register a format by name, allocating an id from the registered
    /// range. Registering the same name again returns the same id.
    pub fn register(&self, name: &str) -> FormatId {
        let mut inner = self.inner.write();
        if let Some(&id) = inner.names.get(name) {
            return id;
        }
        let id = FormatId(inner.next_registered);
        inner.next_registered += 1;
        inner.names.insert(name.to_owned(), id);
        inner.ensure_descriptor(id, Some(name));
        debug!(name, id = id.raw(), "registered clipboard format");
        id
    }

    /// Add a typed converter for the given format id.
    ///
    /// Registration order is preference order for
    /// [`converters_for`](Self::converters_for). Unknown ids get a
    /// descriptor synthesized on the spot.
    pub fn register_converter<T: 'static>(&self, id: FormatId, converter: Arc<dyn DataConverter<T>>) {
        let mut inner = self.inner.write();
        inner.ensure_descriptor(id, None);
        let caps = converter.caps();
        inner.converters.entry(id).or_default().push(ConverterSlot {
            type_id: TypeId::of::<T>(),
            caps,
            erased: Box::new(converter),
        });
        debug!(id = id.raw(), ?caps, "registered converter");
    }

    /// Look up the descriptor for an id, synthesizing one (with the
    /// opaque passthrough attached) for ids never seen before.
    pub fn resolve(&self, id: FormatId) -> FormatDescriptor {
        {
            let inner = self.inner.read();
            if let Some(name) = inner.descriptors.get(&id) {
                return FormatDescriptor {
                    id,
                    name: name.clone(),
                };
            }
        }
        let mut inner = self.inner.write();
        inner.ensure_descriptor(id, None);
        FormatDescriptor {
            id,
            name: inner.descriptors[&id].clone(),
        }
    }

    /// The id a name was registered under, if any
    pub fn id_of(&self, name: &str) -> Option<FormatId> {
        self.inner.read().names.get(name).copied()
    }

    /// True if the id has a descriptor
    pub fn contains(&self, id: FormatId) -> bool {
        self.inner.read().descriptors.contains_key(&id)
    }

    /// Converters for `id` that produce or consume values of type `T` and
    /// can serve `direction`, in registration (preference) order.
    pub fn converters_for<T: 'static>(
        &self,
        id: FormatId,
        direction: Direction,
    ) -> Vec<Arc<dyn DataConverter<T>>> {
        let inner = self.inner.read();
        let Some(slots) = inner.converters.get(&id) else {
            return Vec::new();
        };
        slots
            .iter()
            .filter(|slot| slot.type_id == TypeId::of::<T>() && slot.caps.supports(direction))
            .filter_map(|slot| {
                slot.erased
                    .downcast_ref::<Arc<dyn DataConverter<T>>>()
                    .cloned()
            })
            .collect()
    }
}

impl Default for FormatCatalog {
    fn default() -> Self {
        Self::with_builtins()
    }
}
