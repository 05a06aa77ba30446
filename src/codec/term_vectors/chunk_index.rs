//! Document to chunk mapping.
//!
//! The index file body lists every chunk in write order:
//!
//! ```text
//! (varint chunk_docs, varint start_pointer_delta)*  varint 0  varint num_docs  varint max_pointer
//! ```
//!
//! Pointer deltas are relative to the previous chunk's start (the first one to 0).
//! The whole index is small, so readers load it at open time.

use crate::error::{Result, TesseraError};
use crate::index::DocId;
use crate::storage::structured::{StructReader, StructWriter};
use crate::storage::{StorageInput, StorageOutput};

/// Accumulates chunk boundaries while the data file is written.
#[derive(Debug, Default)]
pub struct ChunkIndexWriter {
    chunk_docs: Vec<u32>,
    start_pointers: Vec<u64>,
    total_docs: u64,
}

impl ChunkIndexWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a chunk of `chunk_docs` documents starting at `start_pointer`.
    pub fn write_index(&mut self, chunk_docs: u32, start_pointer: u64) -> Result<()> {
        if chunk_docs == 0 {
            return Err(TesseraError::illegal_state("cannot index an empty chunk"));
        }
        if let Some(&last) = self.start_pointers.last()
            && start_pointer <= last
        {
            return Err(TesseraError::illegal_state(format!(
                "chunk start pointer {start_pointer} does not follow {last}"
            )));
        }
        self.chunk_docs.push(chunk_docs);
        self.start_pointers.push(start_pointer);
        self.total_docs += u64::from(chunk_docs);
        Ok(())
    }

    pub fn num_chunks(&self) -> usize {
        self.chunk_docs.len()
    }

    /// Documents covered by the recorded chunks.
    pub fn total_docs(&self) -> u64 {
        self.total_docs
    }

    /// Write the index body. `num_docs` must match the recorded chunks.
    pub fn finish<W: StorageOutput>(
        &self,
        out: &mut StructWriter<W>,
        num_docs: u32,
        max_pointer: u64,
    ) -> Result<()> {
        if u64::from(num_docs) != self.total_docs {
            return Err(TesseraError::illegal_state(format!(
                "expected {num_docs} docs, but the chunks hold {}",
                self.total_docs
            )));
        }

        let mut previous = 0u64;
        for (&docs, &pointer) in self.chunk_docs.iter().zip(&self.start_pointers) {
            out.write_varint(u64::from(docs))?;
            out.write_varint(pointer - previous)?;
            previous = pointer;
        }
        out.write_varint(0)?;
        out.write_varint(u64::from(num_docs))?;
        out.write_varint(max_pointer)
    }
}

/// Loaded chunk index, shared by clones of a reader.
#[derive(Debug, Clone)]
pub struct ChunkIndexReader {
    doc_bases: Vec<DocId>,
    start_pointers: Vec<u64>,
    num_docs: u32,
    max_pointer: u64,
}

impl ChunkIndexReader {
    /// Read an index body for a segment of `max_doc` documents.
    pub fn read<R: StorageInput>(input: &mut StructReader<R>, max_doc: u32) -> Result<Self> {
        let mut doc_bases = Vec::new();
        let mut start_pointers = Vec::new();
        let mut doc_base = 0u64;
        let mut pointer = 0u64;

        loop {
            let chunk_docs = input.read_varint()?;
            if chunk_docs == 0 {
                break;
            }
            let delta = input.read_varint()?;
            if !start_pointers.is_empty() && delta == 0 {
                return Err(TesseraError::corruption(format!(
                    "chunk {} does not advance the start pointer",
                    start_pointers.len()
                )));
            }
            pointer = pointer.checked_add(delta).ok_or_else(|| {
                TesseraError::corruption("chunk start pointer overflows")
            })?;

            doc_bases.push(doc_base as DocId);
            start_pointers.push(pointer);
            doc_base += chunk_docs;
            if doc_base > u64::from(max_doc) {
                return Err(TesseraError::corruption(format!(
                    "chunk index covers more than {max_doc} documents"
                )));
            }
        }

        let num_docs = input.read_varint_u32()?;
        let max_pointer = input.read_varint()?;

        if u64::from(num_docs) != doc_base || num_docs != max_doc {
            return Err(TesseraError::corruption(format!(
                "chunk index covers {doc_base} docs and records {num_docs}, segment has {max_doc}"
            )));
        }
        if let Some(&last) = start_pointers.last()
            && last >= max_pointer
        {
            return Err(TesseraError::corruption(format!(
                "chunk start pointer {last} is not before max pointer {max_pointer}"
            )));
        }

        Ok(ChunkIndexReader {
            doc_bases,
            start_pointers,
            num_docs,
            max_pointer,
        })
    }

    /// Start of the chunk holding `doc`.
    pub fn start_pointer(&self, doc: DocId) -> Result<u64> {
        if doc >= self.num_docs {
            return Err(TesseraError::invalid_argument(format!(
                "doc {doc} is out of bounds for {} docs",
                self.num_docs
            )));
        }
        let chunk = self.doc_bases.partition_point(|&base| base <= doc);
        // doc_bases[0] == 0 whenever num_docs > 0, so chunk >= 1.
        Ok(self.start_pointers[chunk - 1])
    }

    pub fn num_chunks(&self) -> usize {
        self.start_pointers.len()
    }

    pub fn num_docs(&self) -> u32 {
        self.num_docs
    }

    /// End of the last chunk in the data file.
    pub fn max_pointer(&self) -> u64 {
        self.max_pointer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use crate::storage::memory::MemoryStorage;

    fn write(storage: &MemoryStorage, chunks: &[(u32, u64)], num_docs: u32, max_pointer: u64) {
        let mut index = ChunkIndexWriter::new();
        for &(docs, pointer) in chunks {
            index.write_index(docs, pointer).unwrap();
        }
        let mut out = StructWriter::new(storage.create_output("idx").unwrap());
        index.finish(&mut out, num_docs, max_pointer).unwrap();
        out.close().unwrap();
    }

    fn read(storage: &MemoryStorage, max_doc: u32) -> Result<ChunkIndexReader> {
        let mut input = StructReader::new(storage.open_input("idx").unwrap()).unwrap();
        ChunkIndexReader::read(&mut input, max_doc)
    }

    #[test]
    fn test_start_pointer_lookup() {
        let storage = MemoryStorage::new();
        write(&storage, &[(3, 10), (1, 50), (4, 70)], 8, 100);

        let index = read(&storage, 8).unwrap();
        assert_eq!(index.num_chunks(), 3);
        assert_eq!(index.max_pointer(), 100);
        let pointers: Vec<u64> = (0..8).map(|d| index.start_pointer(d).unwrap()).collect();
        assert_eq!(pointers, vec![10, 10, 10, 50, 70, 70, 70, 70]);
        assert!(index.start_pointer(8).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_empty_index() {
        let storage = MemoryStorage::new();
        write(&storage, &[], 0, 20);

        let index = read(&storage, 0).unwrap();
        assert_eq!(index.num_chunks(), 0);
        assert!(index.start_pointer(0).is_err());
    }

    #[test]
    fn test_doc_count_mismatch_is_corruption() {
        let storage = MemoryStorage::new();
        write(&storage, &[(3, 10)], 3, 100);
        assert!(read(&storage, 4).unwrap_err().is_corruption());
        assert!(read(&storage, 2).unwrap_err().is_corruption());
    }

    #[test]
    fn test_writer_validation() {
        let mut index = ChunkIndexWriter::new();
        assert!(index.write_index(0, 10).unwrap_err().is_illegal_state());
        index.write_index(2, 10).unwrap();
        assert!(index.write_index(2, 10).unwrap_err().is_illegal_state());
        assert_eq!(index.total_docs(), 2);

        let storage = MemoryStorage::new();
        let mut out = StructWriter::new(storage.create_output("idx").unwrap());
        assert!(index.finish(&mut out, 3, 20).unwrap_err().is_illegal_state());
    }
}
