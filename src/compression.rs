//! Block compression for chunk payloads.
//!
//! A compressed blob is a `u8` block shift followed by one entry per
//! `1 << shift` bytes of input: a varint compressed length and the
//! compressed bytes. Blocks are compressed independently, so
//! [`Decompressor::decompress`] can inflate just the blocks overlapping a
//! requested byte range and seek over the rest.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TesseraError};
use crate::storage::structured::{StructReader, StructWriter};
use crate::storage::{StorageInput, StorageOutput};

/// Largest accepted block shift (1 GiB blocks).
const MAX_BLOCK_SHIFT: u8 = 30;

/// How chunk payloads are compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionMode {
    /// zstd level 1 over 16 KiB blocks.
    #[default]
    Fast,
    /// zstd level 9 over 64 KiB blocks.
    HighCompression,
    /// Stored as-is.
    None,
}

impl CompressionMode {
    /// Identifier recorded in data file headers.
    pub fn id(self) -> u8 {
        match self {
            CompressionMode::Fast => 0,
            CompressionMode::HighCompression => 1,
            CompressionMode::None => 2,
        }
    }

    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            0 => Ok(CompressionMode::Fast),
            1 => Ok(CompressionMode::HighCompression),
            2 => Ok(CompressionMode::None),
            other => Err(TesseraError::corruption(format!(
                "unknown compression mode {other}"
            ))),
        }
    }

    fn level(self) -> i32 {
        match self {
            CompressionMode::Fast => 1,
            CompressionMode::HighCompression => 9,
            CompressionMode::None => 0,
        }
    }

    fn block_shift(self) -> u8 {
        match self {
            CompressionMode::Fast => 14,
            CompressionMode::HighCompression => 16,
            CompressionMode::None => 16,
        }
    }

    pub fn new_compressor(self) -> Compressor {
        Compressor {
            mode: self,
            block_shift: self.block_shift(),
        }
    }

    pub fn new_decompressor(self) -> Decompressor {
        Decompressor {
            mode: self,
            compressed: Vec::new(),
        }
    }
}

impl std::fmt::Display for CompressionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompressionMode::Fast => write!(f, "fast"),
            CompressionMode::HighCompression => write!(f, "high_compression"),
            CompressionMode::None => write!(f, "none"),
        }
    }
}

/// Writes compressed blobs.
#[derive(Debug, Clone)]
pub struct Compressor {
    mode: CompressionMode,
    block_shift: u8,
}

impl Compressor {
    /// Override the block size, mostly for tests that need several blocks.
    pub fn with_block_shift(mut self, block_shift: u8) -> Result<Self> {
        if block_shift > MAX_BLOCK_SHIFT {
            return Err(TesseraError::invalid_argument(format!(
                "block shift {block_shift} exceeds {MAX_BLOCK_SHIFT}"
            )));
        }
        self.block_shift = block_shift;
        Ok(self)
    }

    pub fn mode(&self) -> CompressionMode {
        self.mode
    }

    /// Compress `data` and append the blob to `out`.
    pub fn compress<W: StorageOutput>(
        &mut self,
        data: &[u8],
        out: &mut StructWriter<W>,
    ) -> Result<()> {
        out.write_u8(self.block_shift)?;
        for block in data.chunks(1usize << self.block_shift) {
            match self.mode {
                CompressionMode::None => out.write_bytes(block)?,
                mode => {
                    let compressed = zstd::bulk::compress(block, mode.level())?;
                    out.write_bytes(&compressed)?;
                }
            }
        }
        Ok(())
    }
}

/// Reads byte ranges back out of compressed blobs.
#[derive(Debug, Clone)]
pub struct Decompressor {
    mode: CompressionMode,
    compressed: Vec<u8>,
}

impl Decompressor {
    pub fn mode(&self) -> CompressionMode {
        self.mode
    }

    /// Decode `length` bytes starting at `offset` of a blob whose uncompressed
    /// size is `original_length`, replacing the contents of `out`.
    ///
    /// Blocks that end before `offset` are skipped without being inflated and
    /// decoding stops after the block containing the last requested byte.
    pub fn decompress<R: StorageInput>(
        &mut self,
        input: &mut StructReader<R>,
        original_length: usize,
        offset: usize,
        length: usize,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        out.clear();
        let end = offset
            .checked_add(length)
            .filter(|&end| end <= original_length)
            .ok_or_else(|| {
                TesseraError::corruption(format!(
                    "range {offset}+{length} exceeds decompressed length {original_length}"
                ))
            })?;

        let block_shift = input.read_u8()?;
        if block_shift > MAX_BLOCK_SHIFT {
            return Err(TesseraError::corruption(format!(
                "invalid compression block shift {block_shift}"
            )));
        }
        if length == 0 {
            return Ok(());
        }

        let block_size = 1usize << block_shift;
        out.reserve(length);

        let mut block_start = 0usize;
        while block_start < end {
            let block_len = block_size.min(original_length - block_start);
            let block_end = block_start + block_len;
            let compressed_len = input.read_varint()?;
            if compressed_len > input.remaining() {
                return Err(TesseraError::corruption(format!(
                    "compressed block of {compressed_len} bytes runs past the end of the file"
                )));
            }

            if block_end <= offset {
                input.skip_bytes(compressed_len)?;
            } else {
                self.compressed.resize(compressed_len as usize, 0);
                input.read_into(&mut self.compressed)?;
                let from = offset.saturating_sub(block_start);
                let to = end.min(block_end) - block_start;

                match self.mode {
                    CompressionMode::None => {
                        if self.compressed.len() != block_len {
                            return Err(block_mismatch(block_len, self.compressed.len()));
                        }
                        out.extend_from_slice(&self.compressed[from..to]);
                    }
                    _ => {
                        let block = zstd::bulk::decompress(&self.compressed, block_len)
                            .map_err(|e| {
                                TesseraError::corruption(format!("zstd block failed to decode: {e}"))
                            })?;
                        if block.len() != block_len {
                            return Err(block_mismatch(block_len, block.len()));
                        }
                        out.extend_from_slice(&block[from..to]);
                    }
                }
            }

            block_start = block_end;
        }

        Ok(())
    }
}

fn block_mismatch(expected: usize, actual: usize) -> TesseraError {
    TesseraError::corruption(format!(
        "decompressed block holds {actual} bytes, expected {expected}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use crate::storage::memory::MemoryStorage;

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| ((i * 31) % 251) as u8).collect()
    }

    fn compress_to_storage(storage: &MemoryStorage, compressor: &mut Compressor, data: &[u8]) {
        let mut writer = StructWriter::new(storage.create_output("blob").unwrap());
        compressor.compress(data, &mut writer).unwrap();
        writer.write_u8(0x5A).unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn test_mode_ids() {
        for mode in [
            CompressionMode::Fast,
            CompressionMode::HighCompression,
            CompressionMode::None,
        ] {
            assert_eq!(CompressionMode::from_id(mode.id()).unwrap(), mode);
        }
        assert!(CompressionMode::from_id(9).unwrap_err().is_corruption());
    }

    #[test]
    fn test_full_and_partial_ranges() {
        let data = sample(5000);
        for mode in [
            CompressionMode::Fast,
            CompressionMode::HighCompression,
            CompressionMode::None,
        ] {
            let storage = MemoryStorage::new();
            let mut compressor = mode.new_compressor().with_block_shift(10).unwrap();
            compress_to_storage(&storage, &mut compressor, &data);

            let mut decompressor = mode.new_decompressor();
            let mut out = Vec::new();
            for (offset, length) in [(0, 5000), (0, 1), (1023, 2), (2048, 1024), (4999, 1), (3000, 0)] {
                let mut input = StructReader::new(storage.open_input("blob").unwrap()).unwrap();
                decompressor
                    .decompress(&mut input, data.len(), offset, length, &mut out)
                    .unwrap();
                assert_eq!(out, &data[offset..offset + length], "{mode} {offset}+{length}");
            }
        }
    }

    #[test]
    fn test_empty_blob() {
        let storage = MemoryStorage::new();
        let mut compressor = CompressionMode::Fast.new_compressor();
        compress_to_storage(&storage, &mut compressor, &[]);

        let mut input = StructReader::new(storage.open_input("blob").unwrap()).unwrap();
        let mut out = vec![1, 2, 3];
        CompressionMode::Fast
            .new_decompressor()
            .decompress(&mut input, 0, 0, 0, &mut out)
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(input.read_u8().unwrap(), 0x5A);
    }

    #[test]
    fn test_out_of_range_request_is_corruption() {
        let storage = MemoryStorage::new();
        let mut compressor = CompressionMode::None.new_compressor();
        compress_to_storage(&storage, &mut compressor, &sample(10));

        let mut input = StructReader::new(storage.open_input("blob").unwrap()).unwrap();
        let mut out = Vec::new();
        let err = CompressionMode::None
            .new_decompressor()
            .decompress(&mut input, 10, 8, 3, &mut out)
            .unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_wrong_original_length_is_corruption() {
        let storage = MemoryStorage::new();
        let mut compressor = CompressionMode::Fast.new_compressor();
        compress_to_storage(&storage, &mut compressor, &sample(100));

        let mut input = StructReader::new(storage.open_input("blob").unwrap()).unwrap();
        let mut out = Vec::new();
        let err = CompressionMode::Fast
            .new_decompressor()
            .decompress(&mut input, 120, 0, 120, &mut out)
            .unwrap_err();
        assert!(err.is_corruption());
    }
}
