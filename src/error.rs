//! Error types for clipboard exchange operations.

use thiserror::Error;

/// Result type for clipboard exchange operations
pub type ClipboardResult<T> = std::result::Result<T, ClipboardError>;

/// Errors that can occur during clipboard exchange operations
#[derive(Error, Debug)]
pub enum ClipboardError {
    /// The systemwide clipboard lock was unavailable after the retry loop.
    ///
    /// `owner` names the process currently holding the lock, when it could
    /// be identified.
    #[error("clipboard busy{}", .owner.as_deref().map(|o| format!(" (held by {o})")).unwrap_or_default())]
    Busy {
        /// Name of the blocking process, if discoverable
        owner: Option<String>,
    },

    /// No converter is registered for the requested value type
    #[error("no converter registered for the requested type")]
    NoConverter,

    /// Format is present but cannot be converted as requested
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Structural violation found while decoding a bitmap
    #[error("malformed bitmap: {0}")]
    MalformedBitmap(String),

    /// Destination buffer is smaller than the data to be written
    #[error("buffer too small: need {needed} bytes, have {capacity}")]
    BufferTooSmall {
        /// Bytes required to satisfy the request
        needed: usize,
        /// Bytes available in the destination
        capacity: usize,
    },

    /// Format id not present on the clipboard or in the entry set
    #[error("format {0} not found")]
    NotFound(u32),

    /// Requested transfer shape is not supported and cannot be bridged
    #[error("unsupported transfer shape")]
    UnsupportedShape,

    /// Protocol request carried an aspect other than Content
    #[error("wrong aspect: only content is supported")]
    WrongAspect,

    /// Operation is part of the protocol surface but intentionally unimplemented
    #[error("not implemented")]
    NotImplemented,

    /// Exchange partner refused an allocation
    #[error("out of memory")]
    OutOfMemory,

    /// Session is in the wrong state for the operation
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Invalid UTF-8 data
    #[error("invalid UTF-8 data")]
    InvalidUtf8,

    /// Invalid UTF-16 data
    #[error("invalid UTF-16 data")]
    InvalidUtf16,

    /// I/O error while bridging stream-shaped data
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClipboardError {
    /// Returns true if this error is transient and retrying may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }

    /// Returns true if this error indicates a data/format problem rather
    /// than an environment problem
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFormat(_)
                | Self::MalformedBitmap(_)
                | Self::InvalidUtf8
                | Self::InvalidUtf16
                | Self::NoConverter
                | Self::UnsupportedShape
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_display_with_owner() {
        let err = ClipboardError::Busy {
            owner: Some("explorer".to_string()),
        };
        assert_eq!(err.to_string(), "clipboard busy (held by explorer)");
    }

    #[test]
    fn test_busy_display_without_owner() {
        let err = ClipboardError::Busy { owner: None };
        assert_eq!(err.to_string(), "clipboard busy");
    }

    #[test]
    fn test_is_transient() {
        assert!(ClipboardError::Busy { owner: None }.is_transient());
        assert!(!ClipboardError::NoConverter.is_transient());
    }

    #[test]
    fn test_is_format_error() {
        assert!(ClipboardError::MalformedBitmap("x".to_string()).is_format_error());
        assert!(ClipboardError::NoConverter.is_format_error());
        assert!(!ClipboardError::Busy { owner: None }.is_format_error());
    }
}
