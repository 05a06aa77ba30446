//! Block-packed integer sequences.
//!
//! A sequence of signed 64-bit values is cut into blocks of `block_size`
//! values (the last block holds the remainder). Each block is written as
//!
//! ```text
//! token: u8 = (bits_per_value << 1) | (min == 0)
//! [min: zig-zag varint]            only when min != 0
//! packed (value - min), bits_per_value bits each, ceil(n * bits / 8) bytes
//! ```
//!
//! Neither the value count nor the block size is stored; the reader is told
//! both. A block whose values are all equal costs one or two header bytes.

use crate::error::{Result, TesseraError};
use crate::storage::StorageInput;
use crate::storage::structured::StructReader;
use crate::util::packed::{self, PackedReader};
use crate::util::varint::{encode_u64_into, zigzag_encode};

/// Granularity that block sizes must be a multiple of.
pub const MIN_BLOCK_SIZE: usize = 64;
pub const MAX_BLOCK_SIZE: usize = 1 << 27;

fn check_block_size(block_size: usize) -> Result<()> {
    if block_size == 0 || block_size % MIN_BLOCK_SIZE != 0 || block_size > MAX_BLOCK_SIZE {
        return Err(TesseraError::invalid_argument(format!(
            "block size must be a positive multiple of {MIN_BLOCK_SIZE} up to {MAX_BLOCK_SIZE}, got {block_size}"
        )));
    }
    Ok(())
}

/// Encodes a sequence of values into block-packed bytes.
#[derive(Debug)]
pub struct BlockPackedWriter {
    block_size: usize,
    pending: Vec<i64>,
    scratch: Vec<u64>,
    output: Vec<u8>,
    count: u64,
}

impl BlockPackedWriter {
    pub fn new(block_size: usize) -> Result<Self> {
        check_block_size(block_size)?;
        Ok(BlockPackedWriter {
            block_size,
            pending: Vec::with_capacity(block_size),
            scratch: Vec::with_capacity(block_size),
            output: Vec::new(),
            count: 0,
        })
    }

    pub fn add(&mut self, value: i64) -> Result<()> {
        self.pending.push(value);
        self.count += 1;
        if self.pending.len() == self.block_size {
            self.flush_block()?;
        }
        Ok(())
    }

    /// Number of values added so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    fn flush_block(&mut self) -> Result<()> {
        let Some(&first) = self.pending.first() else {
            return Ok(());
        };

        let (min, max) = self
            .pending
            .iter()
            .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let delta = max.wrapping_sub(min) as u64;
        let bits = packed::bits_required(delta);

        let token = ((bits as u8) << 1) | u8::from(min == 0);
        self.output.push(token);
        if min != 0 {
            encode_u64_into(zigzag_encode(min), &mut self.output);
        }

        self.scratch.clear();
        self.scratch
            .extend(self.pending.iter().map(|&v| v.wrapping_sub(min) as u64));
        packed::pack_into(&self.scratch, bits, &mut self.output)?;

        self.pending.clear();
        Ok(())
    }

    /// Flush the last partial block and return the encoded bytes.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        self.flush_block()?;
        Ok(self.output)
    }
}

/// Sequential decoder for a block-packed sequence.
///
/// The iterator does not own the stream: each call receives the reader it
/// decodes from. [`reset`](Self::reset) starts a new sequence at the reader's
/// current position, and the reader only ends up past the sequence once every
/// value has been consumed or skipped, so callers drain with
/// [`skip`](Self::skip) before reading what follows.
#[derive(Debug, Clone)]
pub struct BlockPackedReaderIterator {
    block_size: usize,
    packed_version: u32,
    value_count: u64,
    ord: u64,
    values: Vec<i64>,
    off: usize,
}

impl BlockPackedReaderIterator {
    pub fn new(packed_version: u32, block_size: usize) -> Result<Self> {
        check_block_size(block_size)?;
        packed::check_version(packed_version)?;
        Ok(BlockPackedReaderIterator {
            block_size,
            packed_version,
            value_count: 0,
            ord: 0,
            values: Vec::with_capacity(block_size),
            off: 0,
        })
    }

    /// Start decoding a sequence of `value_count` values.
    pub fn reset(&mut self, value_count: u64) {
        self.value_count = value_count;
        self.ord = 0;
        self.values.clear();
        self.off = 0;
    }

    /// Position of the next value within the sequence.
    pub fn ord(&self) -> u64 {
        self.ord
    }

    /// Values not yet consumed.
    pub fn remaining(&self) -> u64 {
        self.value_count - self.ord
    }

    fn read_header<R: StorageInput>(input: &mut StructReader<R>) -> Result<(u32, i64)> {
        let token = input.read_u8()?;
        let bits = u32::from(token >> 1);
        if bits > 64 {
            return Err(TesseraError::corruption(format!(
                "block-packed token declares {bits} bits per value"
            )));
        }
        let min = if token & 1 == 0 { input.read_zvarint()? } else { 0 };
        Ok((bits, min))
    }

    fn refill<R: StorageInput>(&mut self, input: &mut StructReader<R>) -> Result<()> {
        let n = self.remaining().min(self.block_size as u64) as usize;
        let (bits, min) = Self::read_header(input)?;
        let block = PackedReader::read(input, self.packed_version, n, bits)?;

        self.values.clear();
        self.values
            .extend((0..n).map(|i| min.wrapping_add(block.get(i) as i64)));
        self.off = 0;
        Ok(())
    }

    fn check_available(&self, wanted: u64) -> Result<()> {
        if wanted > self.remaining() {
            return Err(TesseraError::corruption(format!(
                "block-packed sequence of {} values exhausted at ord {} (wanted {wanted} more)",
                self.value_count, self.ord
            )));
        }
        Ok(())
    }

    /// Decode the next value.
    pub fn next<R: StorageInput>(&mut self, input: &mut StructReader<R>) -> Result<i64> {
        self.check_available(1)?;
        if self.off == self.values.len() {
            self.refill(input)?;
        }
        let value = self.values[self.off];
        self.off += 1;
        self.ord += 1;
        Ok(value)
    }

    /// Decode up to `count` values without crossing a block boundary.
    ///
    /// Returns at least one value when `count > 0` and the sequence is not exhausted.
    pub fn next_batch<R: StorageInput>(
        &mut self,
        input: &mut StructReader<R>,
        count: usize,
    ) -> Result<&[i64]> {
        if count == 0 {
            return Ok(&[]);
        }
        self.check_available(1)?;
        if self.off == self.values.len() {
            self.refill(input)?;
        }
        let n = count.min(self.values.len() - self.off);
        let start = self.off;
        self.off += n;
        self.ord += n as u64;
        Ok(&self.values[start..start + n])
    }

    /// Decode exactly `count` values into `out`.
    pub fn read_into<R: StorageInput>(
        &mut self,
        input: &mut StructReader<R>,
        count: usize,
        out: &mut Vec<i64>,
    ) -> Result<()> {
        self.check_available(count as u64)?;
        let mut left = count;
        while left > 0 {
            let batch = self.next_batch(input, left)?;
            left -= batch.len();
            out.extend_from_slice(batch);
        }
        Ok(())
    }

    /// Skip `count` values. Whole blocks are skipped without decoding.
    pub fn skip<R: StorageInput>(&mut self, input: &mut StructReader<R>, count: u64) -> Result<()> {
        self.check_available(count)?;
        let mut left = count;

        let buffered = ((self.values.len() - self.off) as u64).min(left);
        self.off += buffered as usize;
        self.ord += buffered;
        left -= buffered;
        if left == 0 {
            return Ok(());
        }

        // The buffer is empty here, so the stream sits on a block boundary.
        let block_size = self.block_size as u64;
        while left >= block_size {
            let (bits, _) = Self::read_header(input)?;
            input.skip_bytes(packed::byte_count(self.block_size, bits) as u64)?;
            self.ord += block_size;
            left -= block_size;
        }

        if left > 0 {
            self.refill(input)?;
            self.off = left as usize;
            self.ord += left;
        }
        Ok(())
    }

    /// Skip everything left in the sequence, leaving the stream just past it.
    pub fn drain<R: StorageInput>(&mut self, input: &mut StructReader<R>) -> Result<()> {
        self.skip(input, self.remaining())
    }
}
