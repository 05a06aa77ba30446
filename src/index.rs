//! Index-level abstractions shared by codecs.
//!
//! - [`terms`]: per-field term dictionaries and their enumerators
//! - [`postings`]: per-term document/position enumerators and live-docs bits
//! - [`field_infos`]: field name to field number mapping
//! - [`segment`]: segment identity and file naming

pub mod field_infos;
pub mod postings;
pub mod segment;
pub mod terms;

pub use field_infos::{FieldInfo, FieldInfos};
pub use postings::{Bits, DocId, NO_MORE_DOCS, PostingsEnum};
pub use segment::{SegmentInfo, segment_file_name};
pub use terms::{Fields, SeekStatus, Terms, TermsEnum};
