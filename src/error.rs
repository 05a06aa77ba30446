//! Error types for Tessera.
//!
//! All fallible operations return [`Result`], whose error type is
//! [`TesseraError`]. The variants separate damaged data ([`TesseraError::Corruption`])
//! from caller mistakes ([`TesseraError::IllegalState`],
//! [`TesseraError::InvalidArgument`], [`TesseraError::Unsupported`]) and from
//! failures of the underlying storage ([`TesseraError::Io`]).
//!
//! # Examples
//!
//! ```
//! use tessera::error::{Result, TesseraError};
//!
//! fn read_selector(selector: u8) -> Result<()> {
//!     match selector {
//!         0 | 1 => Ok(()),
//!         other => Err(TesseraError::corruption(format!("unknown flags selector {other}"))),
//!     }
//! }
//!
//! assert!(read_selector(1).is_ok());
//! assert!(read_selector(7).unwrap_err().is_corruption());
//! ```

use std::io;

use thiserror::Error;

/// The main error type for Tessera operations.
#[derive(Error, Debug)]
pub enum TesseraError {
    /// I/O errors raised by the storage layer, passed through unchanged.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The bytes on disk do not describe a valid structure.
    #[error("Corrupt index: {0}")]
    Corruption(String),

    /// An API was called in the wrong order.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// The operation is not supported by this implementation.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// A caller-supplied value is out of range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for operations that may fail with TesseraError.
pub type Result<T> = std::result::Result<T, TesseraError>;

impl TesseraError {
    /// Create a new corruption error.
    pub fn corruption<S: Into<String>>(msg: S) -> Self {
        TesseraError::Corruption(msg.into())
    }

    /// Create a new illegal state error.
    pub fn illegal_state<S: Into<String>>(msg: S) -> Self {
        TesseraError::IllegalState(msg.into())
    }

    /// Create a new unsupported operation error.
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        TesseraError::Unsupported(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        TesseraError::InvalidArgument(msg.into())
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        TesseraError::Storage(msg.into())
    }

    /// Create a new invalid config error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        TesseraError::InvalidArgument(format!("Invalid configuration: {}", msg.into()))
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        TesseraError::Other(msg.into())
    }

    pub fn is_corruption(&self) -> bool {
        matches!(self, TesseraError::Corruption(_))
    }

    pub fn is_illegal_state(&self) -> bool {
        matches!(self, TesseraError::IllegalState(_))
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, TesseraError::Unsupported(_))
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, TesseraError::InvalidArgument(_))
    }

    /// Converts an unexpected end of stream into a corruption error.
    ///
    /// Structures are self-describing, so running out of bytes while decoding
    /// one means the file was truncated rather than that the storage failed.
    pub(crate) fn from_read(err: io::Error, what: &str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            TesseraError::corruption(format!("truncated {what}"))
        } else {
            TesseraError::Io(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = TesseraError::corruption("bad chunk");
        assert_eq!(error.to_string(), "Corrupt index: bad chunk");
        assert!(error.is_corruption());

        let error = TesseraError::illegal_state("next_doc not called");
        assert_eq!(error.to_string(), "Illegal state: next_doc not called");
        assert!(error.is_illegal_state());

        let error = TesseraError::unsupported("ord");
        assert_eq!(error.to_string(), "Unsupported operation: ord");
        assert!(error.is_unsupported());

        let error = TesseraError::invalid_config("chunk_size must be positive");
        assert!(error.is_invalid_argument());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let error = TesseraError::from(io_error);

        match error {
            TesseraError::Io(_) => {} // Expected
            _ => panic!("Expected IO error variant"),
        }
    }

    #[test]
    fn test_from_read_maps_eof_to_corruption() {
        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        assert!(TesseraError::from_read(eof, "chunk header").is_corruption());

        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(
            TesseraError::from_read(denied, "chunk header"),
            TesseraError::Io(_)
        ));
    }
}
