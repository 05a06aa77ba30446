//! Configuration for term-vector files.

use serde::{Deserialize, Serialize};

use crate::codec::FormatVersion;
use crate::compression::CompressionMode;
use crate::error::{Result, TesseraError};
use crate::util::block_packed::MIN_BLOCK_SIZE;

/// Upper bound on documents per chunk.
pub const MAX_DOCS_PER_CHUNK_LIMIT: usize = 1024;

/// Settings of the term-vector writer.
///
/// Only `format_name` has to agree between writer and reader; everything else
/// is recorded in the files themselves.
///
/// # Example
///
/// ```
/// use tessera::codec::term_vectors::TermVectorsConfig;
/// use tessera::compression::CompressionMode;
///
/// let config = TermVectorsConfig {
///     chunk_size: 1 << 16,
///     compression: CompressionMode::HighCompression,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TermVectorsConfig {
    /// Buffered term and payload bytes that trigger a chunk flush.
    ///
    /// Larger chunks compress better but make every document lookup inflate
    /// more data.
    pub chunk_size: usize,

    /// Maximum number of documents in one chunk.
    pub max_docs_per_chunk: usize,

    /// Values per block of the block-packed metadata columns.
    ///
    /// Must be a multiple of 64.
    pub block_size: usize,

    /// Compression applied to term and payload bytes.
    pub compression: CompressionMode,

    /// Format version to write.
    pub format_version: FormatVersion,

    /// Prefix of the codec names stamped into file headers.
    pub format_name: String,
}

impl Default for TermVectorsConfig {
    fn default() -> Self {
        TermVectorsConfig {
            chunk_size: 4096,
            max_docs_per_chunk: 128,
            block_size: MIN_BLOCK_SIZE,
            compression: CompressionMode::default(),
            format_version: FormatVersion::CURRENT,
            format_name: "TesseraTermVectors".to_string(),
        }
    }
}

impl TermVectorsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(TesseraError::invalid_config("chunk_size must be positive"));
        }
        if self.max_docs_per_chunk == 0 || self.max_docs_per_chunk > MAX_DOCS_PER_CHUNK_LIMIT {
            return Err(TesseraError::invalid_config(format!(
                "max_docs_per_chunk must be in 1..={MAX_DOCS_PER_CHUNK_LIMIT}, got {}",
                self.max_docs_per_chunk
            )));
        }
        if self.block_size == 0 || self.block_size % MIN_BLOCK_SIZE != 0 {
            return Err(TesseraError::invalid_config(format!(
                "block_size must be a positive multiple of {MIN_BLOCK_SIZE}, got {}",
                self.block_size
            )));
        }
        if self.format_name.is_empty() {
            return Err(TesseraError::invalid_config("format_name must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TermVectorsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.max_docs_per_chunk, 128);
        assert_eq!(config.format_version, FormatVersion::ChunkStats);
    }

    #[test]
    fn test_invalid_configs() {
        let bad = [
            TermVectorsConfig {
                chunk_size: 0,
                ..Default::default()
            },
            TermVectorsConfig {
                max_docs_per_chunk: 0,
                ..Default::default()
            },
            TermVectorsConfig {
                max_docs_per_chunk: 4096,
                ..Default::default()
            },
            TermVectorsConfig {
                block_size: 100,
                ..Default::default()
            },
            TermVectorsConfig {
                format_name: String::new(),
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(config.validate().unwrap_err().is_invalid_argument());
        }
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: TermVectorsConfig =
            serde_json::from_str(r#"{"chunk_size": 128, "compression": "none"}"#).unwrap();
        assert_eq!(config.chunk_size, 128);
        assert_eq!(config.compression, CompressionMode::None);
        assert_eq!(config.block_size, 64);
        assert_eq!(config.format_version, FormatVersion::CURRENT);
    }
}
