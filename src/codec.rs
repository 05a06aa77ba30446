//! File headers, footers and format versions shared by codec files.
//!
//! Every codec file starts with a header identifying the codec, its format
//! version, the owning segment and an optional per-file suffix:
//!
//! ```text
//! u32 CODEC_MAGIC | varint-prefixed codec name | u32 version | 16-byte segment id | u8 suffix len | suffix
//! ```
//!
//! Files written with [`FormatVersion::Checksum`] or later end with a footer
//! holding a CRC-32 of everything before the checksum value:
//!
//! ```text
//! u32 FOOTER_MAGIC | u32 algorithm id (0) | u64 checksum
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Result, TesseraError};
use crate::storage::structured::{StructReader, StructWriter};
use crate::storage::{StorageInput, StorageOutput};

pub mod term_vectors;

pub const CODEC_MAGIC: u32 = 0x3fd7_6c17;
pub const FOOTER_MAGIC: u32 = !CODEC_MAGIC;
pub const ID_LENGTH: usize = 16;
pub const FOOTER_LENGTH: u64 = 16;
const CHECKSUM_ALGORITHM: u32 = 0;

/// On-disk format versions, oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatVersion {
    /// No footer; files are only checked for length.
    Start = 0,
    /// Adds a checksum footer to every file.
    Checksum = 1,
    /// Records chunk statistics at the end of the data file.
    ChunkStats = 2,
}

impl FormatVersion {
    pub const CURRENT: FormatVersion = FormatVersion::ChunkStats;

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn from_u32(version: u32) -> Result<Self> {
        match version {
            0 => Ok(FormatVersion::Start),
            1 => Ok(FormatVersion::Checksum),
            2 => Ok(FormatVersion::ChunkStats),
            other => Err(TesseraError::corruption(format!(
                "unsupported format version {other}"
            ))),
        }
    }

    pub fn has_footer(self) -> bool {
        self >= FormatVersion::Checksum
    }

    pub fn has_chunk_stats(self) -> bool {
        self >= FormatVersion::ChunkStats
    }

    /// How files of this version are verified.
    pub fn integrity_check(self) -> IntegrityCheck {
        if self.has_footer() {
            IntegrityCheck::Checksum
        } else {
            IntegrityCheck::LengthOnly
        }
    }
}

impl Default for FormatVersion {
    fn default() -> Self {
        FormatVersion::CURRENT
    }
}

impl std::fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormatVersion::Start => write!(f, "start"),
            FormatVersion::Checksum => write!(f, "checksum"),
            FormatVersion::ChunkStats => write!(f, "chunk_stats"),
        }
    }
}

/// Verification strategy for a file, fixed when it is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityCheck {
    /// The file must end exactly where its structure ends.
    LengthOnly,
    /// The footer checksum must match the file contents.
    Checksum,
}

/// Length of the header [`write_header`] produces.
pub fn header_length(codec: &str, suffix: &str) -> u64 {
    let name_len = codec.len() as u64;
    let name_prefix = crate::util::varint::encode_u64(name_len).len() as u64;
    4 + name_prefix + name_len + 4 + ID_LENGTH as u64 + 1 + suffix.len() as u64
}

pub fn write_header<W: StorageOutput>(
    out: &mut StructWriter<W>,
    codec: &str,
    version: FormatVersion,
    segment_id: &[u8; ID_LENGTH],
    suffix: &str,
) -> Result<()> {
    let suffix_len = u8::try_from(suffix.len()).map_err(|_| {
        TesseraError::invalid_argument(format!("segment suffix too long: {}", suffix.len()))
    })?;

    out.write_u32(CODEC_MAGIC)?;
    out.write_string(codec)?;
    out.write_u32(version.as_u32())?;
    out.write_raw(segment_id)?;
    out.write_u8(suffix_len)?;
    out.write_raw(suffix.as_bytes())
}

/// Read and validate a header, returning the version it declares.
pub fn check_header<R: StorageInput>(
    input: &mut StructReader<R>,
    codec: &str,
    min_version: FormatVersion,
    max_version: FormatVersion,
    segment_id: &[u8; ID_LENGTH],
    suffix: &str,
) -> Result<FormatVersion> {
    let magic = input.read_u32()?;
    if magic != CODEC_MAGIC {
        return Err(TesseraError::corruption(format!(
            "codec header mismatch: expected {CODEC_MAGIC:#x}, found {magic:#x}"
        )));
    }

    let actual_codec = input.read_string()?;
    if actual_codec != codec {
        return Err(TesseraError::corruption(format!(
            "codec mismatch: expected {codec:?}, found {actual_codec:?}"
        )));
    }

    let raw_version = input.read_u32()?;
    if raw_version < min_version.as_u32() || raw_version > max_version.as_u32() {
        return Err(TesseraError::corruption(format!(
            "format version {raw_version} outside supported range {}..={}",
            min_version.as_u32(),
            max_version.as_u32()
        )));
    }
    let version = FormatVersion::from_u32(raw_version)?;

    let mut actual_id = [0u8; ID_LENGTH];
    input.read_into(&mut actual_id)?;
    if &actual_id != segment_id {
        return Err(TesseraError::corruption("segment id mismatch in file header"));
    }

    let suffix_len = input.read_u8()? as usize;
    let actual_suffix = input.read_raw(suffix_len)?;
    if actual_suffix != suffix.as_bytes() {
        return Err(TesseraError::corruption(format!(
            "segment suffix mismatch: expected {suffix:?}, found {:?}",
            String::from_utf8_lossy(&actual_suffix)
        )));
    }

    Ok(version)
}

/// Write the checksum footer. Must be the last thing written.
pub fn write_footer<W: StorageOutput>(out: &mut StructWriter<W>) -> Result<()> {
    out.write_u32(FOOTER_MAGIC)?;
    out.write_u32(CHECKSUM_ALGORITHM)?;
    let checksum = out.checksum();
    out.write_u64(u64::from(checksum))
}

fn validate_footer_prefix<R: StorageInput>(input: &mut StructReader<R>) -> Result<()> {
    let magic = input.read_u32()?;
    if magic != FOOTER_MAGIC {
        return Err(TesseraError::corruption(format!(
            "codec footer mismatch: expected {FOOTER_MAGIC:#x}, found {magic:#x}"
        )));
    }

    let algorithm = input.read_u32()?;
    if algorithm != CHECKSUM_ALGORITHM {
        return Err(TesseraError::corruption(format!(
            "unknown checksum algorithm {algorithm}"
        )));
    }
    Ok(())
}

fn read_checksum_value<R: StorageInput>(input: &mut StructReader<R>) -> Result<u64> {
    let value = input.read_u64()?;
    if value >> 32 != 0 {
        return Err(TesseraError::corruption(format!(
            "illegal checksum value {value:#x}"
        )));
    }
    Ok(value)
}

/// Fail unless the reader sits exactly at the end of the file.
pub fn check_eof<R: StorageInput>(input: &StructReader<R>) -> Result<()> {
    if input.position() != input.size() {
        return Err(TesseraError::corruption(format!(
            "expected end of file at {}, but the file is {} bytes",
            input.position(),
            input.size()
        )));
    }
    Ok(())
}

/// Validate the footer of a checksumming reader positioned at the footer.
///
/// Every byte before the footer must already have been read through `input`.
pub fn check_footer<R: StorageInput>(input: &mut StructReader<R>) -> Result<u64> {
    if input.remaining() != FOOTER_LENGTH {
        return Err(TesseraError::corruption(format!(
            "expected a {FOOTER_LENGTH}-byte footer, found {} trailing bytes",
            input.remaining()
        )));
    }

    validate_footer_prefix(input)?;
    let actual = u64::from(input.checksum()?);
    let expected = read_checksum_value(input)?;
    if actual != expected {
        return Err(TesseraError::corruption(format!(
            "checksum failed: expected {expected:#010x}, actual {actual:#010x}"
        )));
    }
    check_eof(input)?;
    Ok(actual)
}

/// Read the stored checksum without verifying it, validating the footer shape.
pub fn retrieve_checksum<R: StorageInput>(input: &mut StructReader<R>) -> Result<u64> {
    if input.size() < FOOTER_LENGTH {
        return Err(TesseraError::corruption(format!(
            "file is too short ({} bytes) to hold a footer",
            input.size()
        )));
    }
    input.seek(input.size() - FOOTER_LENGTH)?;
    validate_footer_prefix(input)?;
    read_checksum_value(input)
}

/// Re-read a whole file and verify its footer checksum.
pub fn checksum_entire_file(input: Box<dyn StorageInput>) -> Result<u64> {
    let mut reader = StructReader::with_checksum(input)?;
    if reader.size() < FOOTER_LENGTH {
        return Err(TesseraError::corruption(format!(
            "file is too short ({} bytes) to hold a footer",
            reader.size()
        )));
    }
    reader.skip_bytes(reader.size() - FOOTER_LENGTH)?;
    check_footer(&mut reader)
}
