//! Header-less packed integer arrays.
//!
//! Values are stored with a fixed number of bits each, least significant
//! bit first, in a byte stream of exactly `ceil(count * bits / 8)` bytes.
//! The bit width and value count are not recorded: callers supply both when
//! reading, which is how the term-vector chunk metadata is laid out.

use crate::error::{Result, TesseraError};
use crate::storage::StorageInput;
use crate::storage::structured::StructReader;

/// Packed-ints format version written into data file headers.
pub const PACKED_VERSION_START: u32 = 0;
pub const PACKED_VERSION_CURRENT: u32 = 1;

/// Fail unless `version` is a packed-ints version this crate can read.
pub fn check_version(version: u32) -> Result<()> {
    if !(PACKED_VERSION_START..=PACKED_VERSION_CURRENT).contains(&version) {
        return Err(TesseraError::corruption(format!(
            "unsupported packed ints version {version}, expected {PACKED_VERSION_START}..={PACKED_VERSION_CURRENT}"
        )));
    }
    Ok(())
}

/// Number of bits needed to store `max_value`; zero needs zero bits.
#[inline]
pub fn bits_required(max_value: u64) -> u32 {
    64 - max_value.leading_zeros()
}

/// Bytes occupied by `count` values of `bits` bits each.
#[inline]
pub fn byte_count(count: usize, bits: u32) -> usize {
    (count as u128 * bits as u128).div_ceil(8) as usize
}

#[inline]
fn mask(bits: u32) -> u64 {
    if bits == 64 { u64::MAX } else { (1u64 << bits) - 1 }
}

/// Append `values` packed with `bits` bits each to `output`.
///
/// Every value must fit in `bits` bits.
pub fn pack_into(values: &[u64], bits: u32, output: &mut Vec<u8>) -> Result<()> {
    if bits > 64 {
        return Err(TesseraError::invalid_argument(format!(
            "bits per value must be at most 64, got {bits}"
        )));
    }
    if bits == 0 {
        if let Some(v) = values.iter().find(|&&v| v != 0) {
            return Err(TesseraError::invalid_argument(format!(
                "value {v} does not fit in 0 bits"
            )));
        }
        return Ok(());
    }

    let start = output.len();
    output.resize(start + byte_count(values.len(), bits), 0);

    let mut bit_pos = 0usize;
    for &value in values {
        if value & !mask(bits) != 0 {
            return Err(TesseraError::invalid_argument(format!(
                "value {value} does not fit in {bits} bits"
            )));
        }

        let mut remaining_bits = bits as usize;
        let mut val = value;
        let mut byte_idx = start + bit_pos / 8;
        let mut bit_offset = bit_pos % 8;

        while remaining_bits > 0 {
            let bits_in_byte = (8 - bit_offset).min(remaining_bits);
            let byte_mask = ((1u16 << bits_in_byte) - 1) as u8;
            output[byte_idx] |= ((val as u8) & byte_mask) << bit_offset;
            val >>= bits_in_byte;
            remaining_bits -= bits_in_byte;
            byte_idx += 1;
            bit_offset = 0;
        }

        bit_pos += bits as usize;
    }

    Ok(())
}

/// Read the value at `index` from a packed byte run.
fn unpack_at(data: &[u8], bits: u32, index: usize) -> u64 {
    if bits == 0 {
        return 0;
    }

    let bit_pos = index * bits as usize;
    let mut byte_idx = bit_pos / 8;
    let mut bit_offset = bit_pos % 8;
    let mut remaining_bits = bits as usize;
    let mut shift = 0u32;
    let mut value = 0u64;

    while remaining_bits > 0 {
        let bits_in_byte = (8 - bit_offset).min(remaining_bits);
        let byte_mask = ((1u16 << bits_in_byte) - 1) as u8;
        let byte_val = (data[byte_idx] >> bit_offset) & byte_mask;
        value |= (byte_val as u64) << shift;
        shift += bits_in_byte as u32;
        remaining_bits -= bits_in_byte;
        byte_idx += 1;
        bit_offset = 0;
    }

    value
}

/// Accumulates values and writes them as one header-less packed run.
#[derive(Debug, Clone)]
pub struct PackedWriter {
    bits: u32,
    values: Vec<u64>,
}

impl PackedWriter {
    pub fn new(bits: u32) -> Self {
        PackedWriter {
            bits,
            values: Vec::new(),
        }
    }

    pub fn add(&mut self, value: u64) {
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Append the packed bytes to `output`.
    pub fn finish(self, output: &mut Vec<u8>) -> Result<()> {
        pack_into(&self.values, self.bits, output)
    }
}

/// Random-access view over a packed run read from a stream.
#[derive(Debug, Clone, Default)]
pub struct PackedReader {
    data: Vec<u8>,
    bits: u32,
    count: usize,
}

impl PackedReader {
    /// Read `count` values of `bits` bits each from the current stream position.
    ///
    /// The packed-ints `version` comes from the file header.
    pub fn read<R: StorageInput>(
        input: &mut StructReader<R>,
        version: u32,
        count: usize,
        bits: u32,
    ) -> Result<Self> {
        check_version(version)?;
        if bits > 64 {
            return Err(TesseraError::corruption(format!(
                "bits per value must be at most 64, got {bits}"
            )));
        }

        let len = byte_count(count, bits);
        if len as u64 > input.remaining() {
            return Err(TesseraError::corruption(format!(
                "packed array of {count} x {bits} bits runs past the end of the file"
            )));
        }

        let data = input.read_raw(len)?;
        Ok(PackedReader { data, bits, count })
    }

    /// Wrap an in-memory packed run.
    pub fn from_bytes(data: Vec<u8>, count: usize, bits: u32) -> Result<Self> {
        if bits > 64 || data.len() < byte_count(count, bits) {
            return Err(TesseraError::corruption(format!(
                "{} bytes cannot hold {count} values of {bits} bits",
                data.len()
            )));
        }
        Ok(PackedReader { data, bits, count })
    }

    /// Value at `index`. Panics if `index >= len()`.
    pub fn get(&self, index: usize) -> u64 {
        assert!(index < self.count, "index {index} out of bounds ({})", self.count);
        unpack_at(&self.data, self.bits, index)
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn bits_per_value(&self) -> u32 {
        self.bits
    }

    /// All values, in order.
    pub fn to_vec(&self) -> Vec<u64> {
        (0..self.count)
            .map(|i| unpack_at(&self.data, self.bits, i))
            .collect()
    }
}
