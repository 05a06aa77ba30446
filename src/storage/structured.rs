//! Structured binary I/O over storage inputs and outputs.
//!
//! [`StructWriter`] and [`StructReader`] add little-endian fixed-width
//! integers, LEB128 varints, zig-zag varints and length-prefixed strings on
//! top of [`StorageOutput`] / [`StorageInput`], and keep a running CRC-32 of
//! every byte that passes through them so codec footers can be written and
//! verified without a second pass.

use std::io::SeekFrom;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;

use crate::error::{Result, TesseraError};
use crate::storage::{StorageInput, StorageOutput};
use crate::util::varint::{self, encode_u64_into, zigzag_decode, zigzag_encode};

/// A structured file writer for binary data.
pub struct StructWriter<W: StorageOutput> {
    writer: W,
    hasher: Hasher,
    position: u64,
    scratch: Vec<u8>,
}

impl<W: StorageOutput> StructWriter<W> {
    /// Create a new structured file writer.
    pub fn new(writer: W) -> Self {
        StructWriter {
            writer,
            hasher: Hasher::new(),
            position: 0,
            scratch: Vec::with_capacity(varint::MAX_VARINT_LEN),
        }
    }

    /// Write a u8 value.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.writer.write_u8(value)?;
        self.hasher.update(&[value]);
        self.position += 1;
        Ok(())
    }

    /// Write a u32 value (little-endian).
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.writer.write_u32::<LittleEndian>(value)?;
        self.hasher.update(&value.to_le_bytes());
        self.position += 4;
        Ok(())
    }

    /// Write a u64 value (little-endian).
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.writer.write_u64::<LittleEndian>(value)?;
        self.hasher.update(&value.to_le_bytes());
        self.position += 8;
        Ok(())
    }

    /// Write a variable-length integer.
    pub fn write_varint(&mut self, value: u64) -> Result<()> {
        self.scratch.clear();
        encode_u64_into(value, &mut self.scratch);
        self.writer.write_all(&self.scratch)?;
        self.hasher.update(&self.scratch);
        self.position += self.scratch.len() as u64;
        Ok(())
    }

    /// Write a signed variable-length integer (zig-zag).
    pub fn write_zvarint(&mut self, value: i64) -> Result<()> {
        self.write_varint(zigzag_encode(value))
    }

    /// Write a string with length prefix.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Write raw bytes with length prefix.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.write_varint(value.len() as u64)?;
        self.write_raw(value)
    }

    /// Write raw bytes without length prefix.
    pub fn write_raw(&mut self, value: &[u8]) -> Result<()> {
        self.writer.write_all(value)?;
        self.hasher.update(value);
        self.position += value.len() as u64;
        Ok(())
    }

    /// Get current file position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// CRC-32 of every byte written so far.
    pub fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// Publish the file.
    pub fn close(mut self) -> Result<()> {
        self.writer.close()
    }
}

impl<W: StorageOutput> std::fmt::Debug for StructWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructWriter")
            .field("writer", &self.writer)
            .field("position", &self.position)
            .finish()
    }
}

/// A structured file reader for binary data.
///
/// Checksum tracking is opt-in ([`StructReader::with_checksum`]) because the
/// random-access readers seek freely, which a running checksum cannot follow.
pub struct StructReader<R: StorageInput> {
    reader: R,
    hasher: Option<Hasher>,
    position: u64,
    file_size: u64,
}

impl<R: StorageInput> StructReader<R> {
    /// Create a new structured file reader positioned at the start of the file.
    pub fn new(mut reader: R) -> Result<Self> {
        let file_size = reader.size()?;
        let position = reader.stream_position()?;
        Ok(StructReader {
            reader,
            hasher: None,
            position,
            file_size,
        })
    }

    /// Create a reader that checksums every byte it reads.
    pub fn with_checksum(reader: R) -> Result<Self> {
        let mut reader = Self::new(reader)?;
        if reader.position != 0 {
            reader.seek(0)?;
        }
        reader.hasher = Some(Hasher::new());
        Ok(reader)
    }

    fn fill(&mut self, buf: &mut [u8], what: &str) -> Result<()> {
        self.reader
            .read_exact(buf)
            .map_err(|e| TesseraError::from_read(e, what))?;
        if let Some(hasher) = self.hasher.as_mut() {
            hasher.update(buf);
        }
        self.position += buf.len() as u64;
        Ok(())
    }

    /// Read a u8 value.
    pub fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.fill(&mut buf, "byte")?;
        Ok(buf[0])
    }

    /// Read a u32 value (little-endian).
    pub fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.fill(&mut buf, "u32")?;
        Ok((&buf[..]).read_u32::<LittleEndian>()?)
    }

    /// Read a u64 value (little-endian).
    pub fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.fill(&mut buf, "u64")?;
        Ok((&buf[..]).read_u64::<LittleEndian>()?)
    }

    /// Read a variable-length integer.
    pub fn read_varint(&mut self) -> Result<u64> {
        let mut bytes = [0u8; varint::MAX_VARINT_LEN];
        let mut len = 0;
        loop {
            if len == bytes.len() {
                return Err(TesseraError::corruption("VarInt overflow"));
            }
            let byte = self.read_u8()?;
            bytes[len] = byte;
            len += 1;
            if byte & 0x80 == 0 {
                break;
            }
        }

        let (value, _) = varint::decode_u64(&bytes[..len])?;
        Ok(value)
    }

    /// Read a varint that must fit in a u32.
    pub fn read_varint_u32(&mut self) -> Result<u32> {
        let value = self.read_varint()?;
        u32::try_from(value)
            .map_err(|_| TesseraError::corruption(format!("value {value} does not fit in 32 bits")))
    }

    /// Read a signed variable-length integer (zig-zag).
    pub fn read_zvarint(&mut self) -> Result<i64> {
        Ok(zigzag_decode(self.read_varint()?))
    }

    /// Read a string with length prefix.
    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|e| TesseraError::corruption(format!("Invalid UTF-8: {e}")))
    }

    /// Read bytes with length prefix.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let length = self.read_varint()?;
        if length > self.remaining() {
            return Err(TesseraError::corruption(format!(
                "byte run of {length} exceeds the {} remaining bytes",
                self.remaining()
            )));
        }
        self.read_raw(length as usize)
    }

    /// Read exact number of raw bytes.
    pub fn read_raw(&mut self, length: usize) -> Result<Vec<u8>> {
        let mut bytes = vec![0u8; length];
        self.fill(&mut bytes, "byte run")?;
        Ok(bytes)
    }

    /// Read exactly `buf.len()` bytes into `buf`.
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<()> {
        self.fill(buf, "byte run")
    }

    /// Move to an absolute position.
    ///
    /// Seeking invalidates a running checksum, so it is refused on checksumming readers
    /// unless the target is the current position.
    pub fn seek(&mut self, position: u64) -> Result<()> {
        if position == self.position {
            return Ok(());
        }
        if self.hasher.is_some() {
            return Err(TesseraError::illegal_state(
                "cannot seek a reader that is computing a checksum",
            ));
        }
        self.reader.seek(SeekFrom::Start(position))?;
        self.position = position;
        Ok(())
    }

    /// Skip `count` bytes forward.
    pub fn skip_bytes(&mut self, count: u64) -> Result<()> {
        if count > self.remaining() {
            return Err(TesseraError::corruption(format!(
                "cannot skip {count} bytes, only {} remain",
                self.remaining()
            )));
        }
        if self.hasher.is_some() {
            let mut buf = [0u8; 1024];
            let mut left = count;
            while left > 0 {
                let n = left.min(buf.len() as u64) as usize;
                self.fill(&mut buf[..n], "byte run")?;
                left -= n as u64;
            }
            Ok(())
        } else {
            self.seek(self.position + count)
        }
    }

    /// Get current file position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Get file size.
    pub fn size(&self) -> u64 {
        self.file_size
    }

    /// Bytes left between the current position and the end of the file.
    pub fn remaining(&self) -> u64 {
        self.file_size.saturating_sub(self.position)
    }

    /// Check if we're at end of file.
    pub fn is_eof(&self) -> bool {
        self.position >= self.file_size
    }

    /// CRC-32 of every byte read so far.
    pub fn checksum(&self) -> Result<u32> {
        self.hasher
            .as_ref()
            .map(|h| h.clone().finalize())
            .ok_or_else(|| TesseraError::illegal_state("reader does not track a checksum"))
    }

    /// Open an independent reader over the same file at the same position.
    pub fn try_clone(&self) -> Result<StructReader<Box<dyn StorageInput>>> {
        let input = self.reader.clone_input()?;
        StructReader::new(input)
    }

    /// Close the reader.
    pub fn close(mut self) -> Result<()> {
        self.reader.close()
    }
}

impl<R: StorageInput> std::fmt::Debug for StructReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructReader")
            .field("reader", &self.reader)
            .field("position", &self.position)
            .field("file_size", &self.file_size)
            .field("checksum", &self.hasher.is_some())
            .finish()
    }
}
