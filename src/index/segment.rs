//! Segment identity and file naming.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::ID_LENGTH;

/// The parts of a segment's metadata that codecs depend on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentInfo {
    /// Segment name, used as the file name prefix.
    pub name: String,

    /// Random identifier stamped into every file header of the segment.
    pub id: [u8; ID_LENGTH],

    /// Number of documents in the segment.
    pub max_doc: u32,
}

impl SegmentInfo {
    /// Create a segment with a fresh random id.
    pub fn new<S: Into<String>>(name: S, max_doc: u32) -> Self {
        SegmentInfo {
            name: name.into(),
            id: *Uuid::new_v4().as_bytes(),
            max_doc,
        }
    }

    /// The id rendered as a UUID string.
    pub fn id_string(&self) -> String {
        Uuid::from_bytes(self.id).to_string()
    }
}

/// `<segment>.<ext>`, or `<segment>_<suffix>.<ext>` when `suffix` is non-empty.
pub fn segment_file_name(segment: &str, suffix: &str, extension: &str) -> String {
    if suffix.is_empty() {
        format!("{segment}.{extension}")
    } else {
        format!("{segment}_{suffix}.{extension}")
    }
}
