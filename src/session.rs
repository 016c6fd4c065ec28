//! Clipboard session lifecycle.
//!
//! A session serializes access to the single systemwide clipboard: a
//! process-local lock orders threads within this process, then a bounded
//! retry loop acquires the systemwide lock through the platform backend.
//! Acquisition failure is routine (another process is mid-transaction)
//! and surfaces as [`ClipboardError::Busy`] only after the retries are
//! exhausted. Release is idempotent and also runs on drop, so the lock
//! is returned on every exit path.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::convert::{Direction, ShapeCaps};
use crate::formats::{FormatCatalog, FormatId};
use crate::medium::{read_via_partner, ExchangePartner};
use crate::outbound::OutboundDataObject;
use crate::{ClipboardError, ClipboardResult};

/// Pause between publishing and flushing, giving clipboard listeners a
/// chance to settle before the object is detached from this process.
const FLUSH_DELAY: Duration = Duration::from_millis(10);

// =============================================================================
// Platform backend
// =============================================================================

/// The platform half of a session: the actual clipboard this process
/// talks to. Read operations take `&self`, mutations `&mut self`.
pub trait SystemClipboard {
    /// One attempt to take the systemwide lock; `Ok(false)` means
    /// another party holds it right now
    fn try_open(&mut self) -> ClipboardResult<bool>;

    /// Return the systemwide lock
    fn close(&mut self);

    /// Name of the process holding the lock, when discoverable
    fn owner_name(&self) -> Option<String>;

    /// Discard all contents and claim ownership
    fn empty(&mut self) -> ClipboardResult<()>;

    /// Read one format's bytes
    fn read_format(&self, id: FormatId) -> ClipboardResult<Vec<u8>>;

    /// Write one format's bytes
    fn write_format(&mut self, id: FormatId, data: &[u8]) -> ClipboardResult<()>;

    /// Format ids currently on the clipboard
    fn formats(&self) -> ClipboardResult<Vec<FormatId>>;

    /// Hand an outbound object to the platform for deferred rendering
    fn publish(&mut self, object: OutboundDataObject) -> ClipboardResult<()>;

    /// Ask the platform to render any deferred content it still holds
    fn flush(&mut self) -> ClipboardResult<()>;
}

// =============================================================================
// Locks and configuration
// =============================================================================

type LocalGuard = parking_lot::lock_api::ArcMutexGuard<parking_lot::RawMutex, ()>;

/// Process-local clipboard lock, shared by every session in the process.
///
/// Serializes local threads ahead of the systemwide lock so they do not
/// race each other's acquire/retry loops. Constructed explicitly and
/// cloned into each session rather than hidden in a global.
#[derive(Clone, Default)]
pub struct LocalClipboardLock {
    inner: Arc<Mutex<()>>,
}

impl LocalClipboardLock {
    /// A fresh lock instance
    pub fn new() -> Self {
        Self::default()
    }

    fn acquire(&self) -> LocalGuard {
        Mutex::lock_arc(&self.inner)
    }
}

/// Retry policy for acquiring the systemwide lock.
///
/// There is no cancellation; a caller that wants a timeout bounds the
/// retry count instead.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Number of acquisition attempts before reporting busy
    pub retry_count: u32,
    /// Delay between attempts
    pub retry_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retry_count: 10,
            retry_delay: Duration::from_millis(100),
        }
    }
}

// =============================================================================
// Session
// =============================================================================

/// An exclusive transaction against the systemwide clipboard.
///
/// State machine: closed until [`open`](Self::open) succeeds, then all
/// content operations are available until [`release`](Self::release) (or
/// drop) returns the lock.
pub struct ClipboardSession<C: SystemClipboard> {
    backend: C,
    local: LocalClipboardLock,
    config: SessionConfig,
    guard: Option<LocalGuard>,
    open: bool,
    cleared: bool,
}

impl<C: SystemClipboard> ClipboardSession<C> {
    /// Session with the default retry policy
    pub fn new(backend: C, local: LocalClipboardLock) -> Self {
        Self::with_config(backend, local, SessionConfig::default())
    }

    /// Session with an explicit retry policy
    pub fn with_config(backend: C, local: LocalClipboardLock, config: SessionConfig) -> Self {
        Self {
            backend,
            local,
            config,
            guard: None,
            open: false,
            cleared: false,
        }
    }

    /// True while the systemwide lock is held
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Acquire the clipboard: the process-local lock first, then the
    /// systemwide lock with the configured retry loop. Reopening an
    /// already-open session is a no-op.
    pub fn open(&mut self) -> ClipboardResult<()> {
        if self.open {
            return Ok(());
        }
        let guard = self.local.acquire();
        for attempt in 1..=self.config.retry_count {
            if self.backend.try_open()? {
                trace!(attempt, "clipboard acquired");
                self.guard = Some(guard);
                self.open = true;
                self.cleared = false;
                return Ok(());
            }
            trace!(attempt, "clipboard held elsewhere, retrying");
            if attempt < self.config.retry_count {
                thread::sleep(self.config.retry_delay);
            }
        }
        let owner = self.backend.owner_name();
        debug!(?owner, "clipboard busy after retries");
        Err(ClipboardError::Busy { owner })
    }

    /// Raw bytes of one format
    pub fn get(&self, id: FormatId) -> ClipboardResult<Vec<u8>> {
        self.ensure_open()?;
        self.backend.read_format(id)
    }

    /// One format converted to a typed value through the catalog
    pub fn get_value<T: 'static>(
        &self,
        id: FormatId,
        catalog: &FormatCatalog,
    ) -> ClipboardResult<T> {
        self.ensure_open()?;
        read_via_partner(&BackendPartner(&self.backend), id, catalog)
    }

    /// Write raw bytes under a format id. The first write of a session
    /// implicitly clears the clipboard, claiming ownership.
    pub fn set(&mut self, id: FormatId, data: &[u8]) -> ClipboardResult<()> {
        self.ensure_open()?;
        if !self.cleared {
            self.backend.empty()?;
            self.cleared = true;
        }
        self.backend.write_format(id, data)
    }

    /// Write a typed value, serialized by the catalog's preferred
    /// converter for the format
    pub fn set_value<T: 'static>(
        &mut self,
        id: FormatId,
        value: &T,
        catalog: &FormatCatalog,
    ) -> ClipboardResult<()> {
        self.ensure_open()?;
        let converters = catalog.converters_for::<T>(id, Direction::Write);
        let converter = converters.first().ok_or(ClipboardError::NoConverter)?;
        let bytes = if converter.caps().contains(ShapeCaps::BLOCK_WRITE) {
            converter.write_block(value)?
        } else {
            let mut out = Vec::new();
            converter.write_stream(value, &mut out)?;
            out
        };
        self.set(id, &bytes)
    }

    /// Format ids currently on the clipboard
    pub fn enumerate(&self) -> ClipboardResult<Vec<FormatId>> {
        self.ensure_open()?;
        self.backend.formats()
    }

    /// Discard all contents and claim ownership explicitly
    pub fn clear(&mut self) -> ClipboardResult<()> {
        self.ensure_open()?;
        self.backend.empty()?;
        self.cleared = true;
        Ok(())
    }

    /// Hand an outbound object to the platform, then flush after a short
    /// settle delay so listeners racing the handoff see rendered data.
    pub fn publish(&mut self, object: OutboundDataObject) -> ClipboardResult<()> {
        self.ensure_open()?;
        self.backend.publish(object)?;
        self.cleared = true;
        thread::sleep(FLUSH_DELAY);
        self.backend.flush()
    }

    /// Return both locks. Safe to call repeatedly; also runs on drop.
    pub fn release(&mut self) {
        if self.open {
            self.backend.close();
            self.open = false;
        }
        drop(self.guard.take());
    }

    fn ensure_open(&self) -> ClipboardResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(ClipboardError::InvalidState(
                "session is not open".to_string(),
            ))
        }
    }
}

impl<C: SystemClipboard> Drop for ClipboardSession<C> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Adapter presenting the backend's block-shaped reads as an exchange
/// partner for the shape-negotiating read path
struct BackendPartner<'a, C: SystemClipboard>(&'a C);

impl<C: SystemClipboard> ExchangePartner for BackendPartner<'_, C> {
    fn offers(&self, id: FormatId) -> ShapeCaps {
        match self.0.formats() {
            Ok(ids) if ids.contains(&id) => ShapeCaps::BLOCK_READ,
            _ => ShapeCaps::empty(),
        }
    }

    fn read_block(&self, id: FormatId) -> ClipboardResult<Vec<u8>> {
        self.0.read_format(id)
    }

    fn read_stream(&self, id: FormatId) -> ClipboardResult<Box<dyn std::io::Read + '_>> {
        Ok(Box::new(std::io::Cursor::new(self.0.read_format(id)?)))
    }
}
