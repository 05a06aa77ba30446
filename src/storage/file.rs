//! Directory-backed storage.
//!
//! Each output writes to `<name>.pending` and renames it over `<name>` on
//! close. Readers therefore only ever see complete files, and a writer that
//! is dropped mid-way removes its pending file.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::Result;
use crate::storage::{Storage, StorageError, StorageInput, StorageOutput, check_name};

/// Suffix of files that are still being written.
pub const PENDING_SUFFIX: &str = ".pending";

/// Tuning knobs for [`FileStorage`].
#[derive(Debug, Clone)]
pub struct FileStorageConfig {
    /// Capacity of the read and write buffers.
    pub buffer_size: usize,

    /// fsync each file before publishing it.
    pub sync_on_close: bool,
}

impl Default for FileStorageConfig {
    fn default() -> Self {
        FileStorageConfig {
            buffer_size: 64 * 1024,
            sync_on_close: true,
        }
    }
}

/// Storage over the regular files of one directory.
#[derive(Debug)]
pub struct FileStorage {
    directory: PathBuf,
    config: FileStorageConfig,
    closed: bool,
}

impl FileStorage {
    /// Open `directory` with the default configuration, creating it if needed.
    pub fn open<P: AsRef<Path>>(directory: P) -> Result<Self> {
        Self::with_config(directory, FileStorageConfig::default())
    }

    pub fn with_config<P: AsRef<Path>>(directory: P, config: FileStorageConfig) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        let display = directory.display().to_string();
        fs::create_dir_all(&directory).map_err(|e| StorageError::io(&display, e))?;
        if !directory.is_dir() {
            return Err(StorageError::Io {
                name: display,
                message: "not a directory".to_string(),
            }
            .into());
        }

        Ok(FileStorage {
            directory,
            config,
            closed: false,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_of(&self, name: &str) -> Result<PathBuf> {
        if self.closed {
            return Err(StorageError::Closed.into());
        }
        check_name(name)?;
        Ok(self.directory.join(name))
    }
}

impl Storage for FileStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        let path = self.path_of(name)?;
        Ok(Box::new(FileInput::open(
            name,
            path,
            self.config.buffer_size,
        )?))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        let path = self.path_of(name)?;
        let pending = self.path_of(&format!("{name}{PENDING_SUFFIX}"))?;
        let file = File::create(&pending).map_err(|e| StorageError::io(name, e))?;

        Ok(Box::new(FileOutput {
            name: name.to_string(),
            path,
            pending,
            writer: Some(BufWriter::with_capacity(self.config.buffer_size, file)),
            position: 0,
            sync_on_close: self.config.sync_on_close,
        }))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.path_of(name).is_ok_and(|path| path.is_file())
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        let path = self.path_of(name)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(name, e).into()),
        }
    }

    fn list_files(&self) -> Result<Vec<String>> {
        if self.closed {
            return Err(StorageError::Closed.into());
        }

        let display = self.directory.display().to_string();
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.directory).map_err(|e| StorageError::io(&display, e))? {
            let entry = entry.map_err(|e| StorageError::io(&display, e))?;
            let is_file = entry.file_type().is_ok_and(|t| t.is_file());
            if let Some(name) = entry.file_name().to_str()
                && is_file
                && !name.ends_with(PENDING_SUFFIX)
            {
                files.push(name.to_string());
            }
        }

        files.sort();
        Ok(files)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        let path = self.path_of(name)?;
        let metadata = fs::metadata(path).map_err(|e| StorageError::io(name, e))?;
        Ok(metadata.len())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// Buffered reader over one published file.
#[derive(Debug)]
pub struct FileInput {
    name: String,
    path: PathBuf,
    reader: BufReader<File>,
    buffer_size: usize,
    size: u64,
    // Logical offset, so clones can start where this input stands.
    position: u64,
}

impl FileInput {
    fn open(name: &str, path: PathBuf, buffer_size: usize) -> Result<Self> {
        let file = File::open(&path).map_err(|e| StorageError::io(name, e))?;
        let size = file.metadata().map_err(|e| StorageError::io(name, e))?.len();

        Ok(FileInput {
            name: name.to_string(),
            path,
            reader: BufReader::with_capacity(buffer_size, file),
            buffer_size,
            size,
            position: 0,
        })
    }
}

impl Read for FileInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.reader.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for FileInput {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.position = self.reader.seek(pos)?;
        Ok(self.position)
    }
}

impl StorageInput for FileInput {
    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }

    fn clone_input(&self) -> Result<Box<dyn StorageInput>> {
        // A fresh descriptor, so the clone has its own file offset.
        let mut clone = FileInput::open(&self.name, self.path.clone(), self.buffer_size)?;
        clone.seek(SeekFrom::Start(self.position))?;
        Ok(Box::new(clone))
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writer for one file, published on [`StorageOutput::close`].
#[derive(Debug)]
pub struct FileOutput {
    name: String,
    path: PathBuf,
    pending: PathBuf,
    writer: Option<BufWriter<File>>,
    position: u64,
    sync_on_close: bool,
}

impl FileOutput {
    fn writer(&mut self) -> std::io::Result<&mut BufWriter<File>> {
        let name = &self.name;
        self.writer
            .as_mut()
            .ok_or_else(|| std::io::Error::other(StorageError::OutputClosed(name.clone())))
    }
}

impl Write for FileOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.writer()?.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer()?.flush()
    }
}

impl StorageOutput for FileOutput {
    fn position(&self) -> u64 {
        self.position
    }

    fn close(&mut self) -> Result<()> {
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };

        let file = writer
            .into_inner()
            .map_err(|e| StorageError::io(&self.name, e.into_error()))?;
        if self.sync_on_close {
            file.sync_all().map_err(|e| StorageError::io(&self.name, e))?;
        }
        drop(file);

        fs::rename(&self.pending, &self.path).map_err(|e| StorageError::io(&self.name, e))?;
        debug!("published {} ({} bytes)", self.name, self.position);
        Ok(())
    }
}

impl Drop for FileOutput {
    fn drop(&mut self) {
        if self.writer.take().is_some()
            && let Err(e) = fs::remove_file(&self.pending)
        {
            warn!("failed to remove unfinished {}: {e}", self.pending.display());
        }
    }
}
