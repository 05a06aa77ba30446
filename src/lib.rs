//! # Tessera
//!
//! Compressed, chunked term-vector storage for Rust search indexes.
//!
//! ## Features
//!
//! - Per-document term vectors with positions, offsets and payloads
//! - Chunked layout with bit-packed metadata and a shared compressed blob
//! - Random access to any document through a small chunk index
//! - Checksummed files with versioned headers and footers
//! - Pluggable storage backends

pub mod cli;
pub mod codec;
pub mod compression;
pub mod error;
pub mod index;
pub mod storage;
pub mod util;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
