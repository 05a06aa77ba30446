//! Chunked, compressed term-vector storage.
//!
//! Term vectors record, per document, every indexed field together with its
//! terms and, optionally, their positions, character offsets and payloads.
//! Documents are buffered and written in chunks: the per-term metadata of a
//! chunk is bit-packed column by column, while term bytes and payloads of all
//! its documents share one compressed blob. Reading a document decodes only
//! the metadata needed to isolate that document and inflates only the part of
//! the blob that holds its bytes.
//!
//! A segment's term vectors live in two files:
//!
//! - `<segment>.tvd` holds the chunks
//! - `<segment>.tvx` maps every chunk to its first document and start offset
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use tessera::codec::term_vectors::{TermVectorDocument, TermVectorsFormat};
//! use tessera::index::{FieldInfos, SegmentInfo};
//! use tessera::storage::memory::MemoryStorage;
//!
//! # fn main() -> tessera::error::Result<()> {
//! let storage = Arc::new(MemoryStorage::new());
//! let segment = SegmentInfo::new("_0", 1);
//! let format = TermVectorsFormat::default();
//!
//! let mut field_infos = FieldInfos::new();
//! let doc = TermVectorDocument::from_tokens([("body", "hello", 0, 0, 5), ("body", "world", 1, 6, 11)]);
//! doc.register_fields(&mut field_infos)?;
//!
//! let mut writer = format.writer(storage.clone(), &segment, "")?;
//! writer.add_document(&doc, &field_infos)?;
//! writer.finish(1)?;
//! writer.close()?;
//!
//! let mut reader = format.reader(storage, &segment, "", Arc::new(field_infos))?;
//! let fields = reader.get(0)?.expect("document has vectors");
//! assert_eq!(fields.to_document()?, doc);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use crate::error::Result;
use crate::index::{FieldInfos, SegmentInfo};
use crate::storage::Storage;

pub mod chunk_index;
pub mod config;
pub mod document;
pub mod fields;
pub mod reader;
pub mod writer;

pub use config::TermVectorsConfig;
pub use document::{TermPosting, TermVectorDocument, TermVectorField, TermVectorTerm};
pub use fields::{TermVectorFields, TermVectorPostings, TermVectorTerms, TermVectorTermsEnum};
pub use reader::TermVectorsReader;
pub use writer::TermVectorsWriter;

/// Extension of the chunk data file.
pub const VECTORS_EXTENSION: &str = "tvd";

/// Extension of the chunk index file.
pub const VECTORS_INDEX_EXTENSION: &str = "tvx";

/// The field records positions.
pub const POSITIONS: u8 = 0x01;
/// The field records start and end offsets.
pub const OFFSETS: u8 = 0x02;
/// The field records payloads.
pub const PAYLOADS: u8 = 0x04;
/// Bits needed to store a flags value.
pub const FLAGS_BITS: u32 = 3;

/// Codec name written into data file headers.
pub(crate) fn data_codec_name(format_name: &str) -> String {
    format!("{format_name}Data")
}

/// Codec name written into index file headers.
pub(crate) fn index_codec_name(format_name: &str) -> String {
    format!("{format_name}Index")
}

/// Entry point that creates readers and writers for one configuration.
#[derive(Debug, Clone, Default)]
pub struct TermVectorsFormat {
    config: TermVectorsConfig,
}

impl TermVectorsFormat {
    pub fn new(config: TermVectorsConfig) -> Result<Self> {
        config.validate()?;
        Ok(TermVectorsFormat { config })
    }

    pub fn config(&self) -> &TermVectorsConfig {
        &self.config
    }

    /// Create the files of `segment` and return a writer over them.
    pub fn writer(
        &self,
        storage: Arc<dyn Storage>,
        segment: &SegmentInfo,
        suffix: &str,
    ) -> Result<TermVectorsWriter> {
        TermVectorsWriter::create(storage, segment, suffix, self.config.clone())
    }

    /// Open the files of `segment` for reading.
    pub fn reader(
        &self,
        storage: Arc<dyn Storage>,
        segment: &SegmentInfo,
        suffix: &str,
        field_infos: Arc<FieldInfos>,
    ) -> Result<TermVectorsReader> {
        TermVectorsReader::open(storage, segment, suffix, field_infos, &self.config.format_name)
    }
}
