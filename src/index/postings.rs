//! Postings enumeration and live-docs bits.

use bit_vec::BitVec;

use crate::error::Result;

/// Document identifier within a segment.
pub type DocId = u32;

/// Returned by [`PostingsEnum::next_doc`] once the enumerator is exhausted.
pub const NO_MORE_DOCS: DocId = DocId::MAX;

/// Random-access bit set, used to mark live (non-deleted) documents.
pub trait Bits: Send + Sync {
    fn get(&self, index: usize) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Bits for BitVec {
    fn get(&self, index: usize) -> bool {
        BitVec::get(self, index).unwrap_or(false)
    }

    fn len(&self) -> usize {
        BitVec::len(self)
    }
}

/// Enumerates the documents of one term and, per document, its positions,
/// offsets and payloads.
pub trait PostingsEnum: Send {
    /// Current document, or `None` before the first [`next_doc`](Self::next_doc).
    fn doc_id(&self) -> Option<DocId>;

    /// Advance to the next document, returning [`NO_MORE_DOCS`] at the end.
    fn next_doc(&mut self) -> Result<DocId>;

    /// Advance to the first document at or beyond `target`.
    fn advance(&mut self, target: DocId) -> Result<DocId> {
        let mut doc = match self.doc_id() {
            Some(doc) => doc,
            None => self.next_doc()?,
        };
        while doc < target {
            doc = self.next_doc()?;
        }
        Ok(doc)
    }

    /// Term frequency in the current document.
    fn freq(&self) -> Result<u32>;

    /// Next position, or -1 when positions are not indexed.
    fn next_position(&mut self) -> Result<i32>;

    /// Start offset of the current position, or -1 when offsets are not indexed.
    fn start_offset(&self) -> Result<i32>;

    /// End offset of the current position, or -1 when offsets are not indexed.
    fn end_offset(&self) -> Result<i32>;

    /// Payload of the current position, if any.
    fn payload(&self) -> Result<Option<&[u8]>>;

    /// Estimated number of documents.
    fn cost(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitvec_bits() {
        let mut live = BitVec::from_elem(4, true);
        live.set(2, false);

        let bits: &dyn Bits = &live;
        assert!(bits.get(0));
        assert!(!bits.get(2));
        assert!(!bits.get(10));
        assert_eq!(bits.len(), 4);
        assert!(!bits.is_empty());
    }
}
