//! In-memory storage, mostly for tests.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;
use crate::storage::{Storage, StorageError, StorageInput, StorageOutput, check_name};

type FileMap = Arc<RwLock<BTreeMap<String, Arc<[u8]>>>>;

/// Files held as shared, frozen byte buffers.
///
/// Opening or cloning an input never copies a file. Tests reach the raw bytes
/// through [`MemoryStorage::read_all`] and [`MemoryStorage::write_all`] to
/// simulate damaged segments.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: FileMap,
    closed: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn files(&self) -> Result<&FileMap> {
        if self.closed {
            return Err(StorageError::Closed.into());
        }
        Ok(&self.files)
    }

    fn get(&self, name: &str) -> Result<Arc<[u8]>> {
        self.files()?
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::FileNotFound(name.to_string()).into())
    }

    /// Copy of a file's bytes.
    pub fn read_all(&self, name: &str) -> Result<Vec<u8>> {
        Ok(self.get(name)?.to_vec())
    }

    /// Replace a file's bytes outright.
    pub fn write_all(&self, name: &str, data: Vec<u8>) -> Result<()> {
        check_name(name)?;
        self.files()?.write().insert(name.to_string(), Arc::from(data));
        Ok(())
    }
}

impl Storage for MemoryStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        Ok(Box::new(MemoryInput {
            cursor: Cursor::new(self.get(name)?),
        }))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        check_name(name)?;
        Ok(Box::new(MemoryOutput {
            name: name.to_string(),
            buffer: Vec::new(),
            files: Some(Arc::clone(self.files()?)),
        }))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.get(name).is_ok()
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.files()?.write().remove(name);
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        Ok(self.files()?.read().keys().cloned().collect())
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        Ok(self.get(name)?.len() as u64)
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[derive(Debug)]
pub struct MemoryInput {
    cursor: Cursor<Arc<[u8]>>,
}

impl Read for MemoryInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Seek for MemoryInput {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl StorageInput for MemoryInput {
    fn size(&self) -> Result<u64> {
        Ok(self.cursor.get_ref().len() as u64)
    }

    fn clone_input(&self) -> Result<Box<dyn StorageInput>> {
        let mut cursor = Cursor::new(Arc::clone(self.cursor.get_ref()));
        cursor.set_position(self.cursor.position());
        Ok(Box::new(MemoryInput { cursor }))
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Buffers bytes locally until [`StorageOutput::close`] publishes them.
#[derive(Debug)]
pub struct MemoryOutput {
    name: String,
    buffer: Vec<u8>,
    // None once published.
    files: Option<FileMap>,
}

impl Write for MemoryOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.files.is_none() {
            return Err(std::io::Error::other(StorageError::OutputClosed(
                self.name.clone(),
            )));
        }
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl StorageOutput for MemoryOutput {
    fn position(&self) -> u64 {
        self.buffer.len() as u64
    }

    fn close(&mut self) -> Result<()> {
        if let Some(files) = self.files.take() {
            let data: Arc<[u8]> = Arc::from(std::mem::take(&mut self.buffer));
            files.write().insert(self.name.clone(), data);
        }
        Ok(())
    }
}
