//! Storage abstraction layer for Tessera.
//!
//! The term-vector codec never touches the file system directly. It reads and
//! writes named byte files through the [`Storage`] trait, so the same segment
//! can live on disk ([`file::FileStorage`]) or in memory
//! ([`memory::MemoryStorage`], used heavily by the tests).
//!
//! Files are write-once. An output publishes its bytes under its name only
//! when it is closed; an output dropped before `close` leaves nothing behind,
//! so a crashed or aborted writer never exposes half a segment.
//!
//! # Example
//!
//! ```
//! use std::io::{Read, Write};
//!
//! use tessera::storage::Storage;
//! use tessera::storage::memory::MemoryStorage;
//!
//! # fn main() -> tessera::error::Result<()> {
//! let storage = MemoryStorage::new();
//!
//! let mut output = storage.create_output("_0.tvx")?;
//! output.write_all(b"test data")?;
//! assert!(!storage.file_exists("_0.tvx"));
//! output.close()?;
//!
//! let mut input = storage.open_input("_0.tvx")?;
//! let mut buffer = Vec::new();
//! input.read_to_end(&mut buffer)?;
//! assert_eq!(buffer, b"test data");
//! # Ok(())
//! # }
//! ```

use std::io::{Read, Seek, Write};

use thiserror::Error;

use crate::error::{Result, TesseraError};

pub mod file;
pub mod memory;
pub mod structured;

/// A flat namespace of immutable byte files.
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Open a published file for reading.
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    /// Start writing a file. It replaces any file of the same name once closed.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    fn file_exists(&self, name: &str) -> bool;

    /// Delete a file. Deleting a missing file is not an error.
    fn delete_file(&self, name: &str) -> Result<()>;

    /// Published files, sorted by name.
    fn list_files(&self) -> Result<Vec<String>>;

    fn file_size(&self, name: &str) -> Result<u64>;

    /// Close the storage. Further operations fail with [`StorageError::Closed`].
    fn close(&mut self) -> Result<()>;
}

/// Random-access reads over one file.
///
/// [`StorageInput::clone_input`] yields an independent cursor over the same
/// bytes, positioned where this one is, which is how term-vector readers are
/// duplicated across threads.
pub trait StorageInput: Read + Seek + Send + std::fmt::Debug {
    /// Total length of the underlying file.
    fn size(&self) -> Result<u64>;

    fn clone_input(&self) -> Result<Box<dyn StorageInput>>;

    fn close(&mut self) -> Result<()>;
}

/// Sequential writes to one file.
pub trait StorageOutput: Write + Send + std::fmt::Debug {
    /// Number of bytes written so far.
    fn position(&self) -> u64;

    /// Flush buffered bytes and publish the file under its name.
    fn close(&mut self) -> Result<()>;
}

impl StorageOutput for Box<dyn StorageOutput> {
    fn position(&self) -> u64 {
        self.as_ref().position()
    }

    fn close(&mut self) -> Result<()> {
        self.as_mut().close()
    }
}

impl StorageInput for Box<dyn StorageInput> {
    fn size(&self) -> Result<u64> {
        self.as_ref().size()
    }

    fn clone_input(&self) -> Result<Box<dyn StorageInput>> {
        self.as_ref().clone_input()
    }

    fn close(&mut self) -> Result<()> {
        self.as_mut().close()
    }
}

/// Failures of a storage backend, as opposed to bad bytes inside a file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Names are flat; they may not contain path separators.
    #[error("Invalid file name: {0:?}")]
    InvalidName(String),

    #[error("I/O error on {name}: {message}")]
    Io { name: String, message: String },

    #[error("Storage is closed")]
    Closed,

    #[error("Output {0} is already closed")]
    OutputClosed(String),
}

impl StorageError {
    pub(crate) fn io(name: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            StorageError::FileNotFound(name.to_string())
        } else {
            StorageError::Io {
                name: name.to_string(),
                message: err.to_string(),
            }
        }
    }
}

impl From<StorageError> for TesseraError {
    fn from(err: StorageError) -> Self {
        TesseraError::storage(err.to_string())
    }
}

/// Reject names that would escape a flat namespace.
pub(crate) fn check_name(name: &str) -> std::result::Result<(), StorageError> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}
