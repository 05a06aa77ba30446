//! Term dictionary enumeration API.
//!
//! These traits mirror the usual inverted-index shape: a [`Fields`] holds one
//! [`Terms`] per field, a [`Terms`] hands out [`TermsEnum`]s that walk terms in
//! byte order, and a [`TermsEnum`] positioned on a term hands out a
//! [`PostingsEnum`] for it.

use crate::error::Result;
use crate::index::postings::{Bits, PostingsEnum};

/// Outcome of [`TermsEnum::seek_ceil`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekStatus {
    /// Positioned on the target term.
    Found,
    /// Positioned on the smallest term greater than the target.
    NotFound,
    /// Every term is smaller than the target.
    End,
}

/// Iterator over terms in a field's term dictionary, in byte order.
///
/// # Example
///
/// ```ignore
/// let terms = fields.terms("body")?.expect("field has vectors");
/// let mut terms_enum = terms.iterator()?;
///
/// while let Some(term) = terms_enum.next()? {
///     println!("{}", String::from_utf8_lossy(term));
/// }
/// ```
pub trait TermsEnum: Send {
    /// Advance to the next term. Returns `None` when there are no more terms.
    fn next(&mut self) -> Result<Option<&[u8]>>;

    /// The current term, or `None` before the first call to `next` or after the end.
    fn term(&self) -> Option<&[u8]>;

    /// Position on the first term greater than or equal to `target`.
    fn seek_ceil(&mut self, target: &[u8]) -> Result<SeekStatus>;

    /// Position on `target` if it exists.
    fn seek_exact(&mut self, target: &[u8]) -> Result<bool> {
        Ok(self.seek_ceil(target)? == SeekStatus::Found)
    }

    /// Position on the term with the given ordinal.
    fn seek_exact_ord(&mut self, ord: u64) -> Result<()>;

    /// Ordinal of the current term.
    fn ord(&self) -> Result<u64>;

    /// Number of documents containing the current term.
    fn doc_freq(&self) -> Result<u32>;

    /// Total occurrences of the current term.
    fn total_term_freq(&self) -> Result<u64>;

    /// Postings of the current term, restricted to documents set in `live_docs`.
    fn postings(&self, live_docs: Option<&dyn Bits>) -> Result<Box<dyn PostingsEnum>>;
}

/// Access to the term dictionary for a specific field.
pub trait Terms: Send + Sync {
    /// Get an iterator over all terms in this field.
    fn iterator(&self) -> Result<Box<dyn TermsEnum>>;

    /// Number of unique terms, if known.
    fn size(&self) -> Option<u64>;

    /// Sum of document frequencies across all terms, if known.
    fn sum_doc_freq(&self) -> Option<u64>;

    /// Sum of total term frequencies across all terms, if known.
    fn sum_total_term_freq(&self) -> Option<u64>;

    /// Number of documents with at least one term, if known.
    fn doc_count(&self) -> Option<u32>;

    fn has_freqs(&self) -> bool {
        true
    }

    fn has_positions(&self) -> bool {
        false
    }

    fn has_offsets(&self) -> bool {
        false
    }

    fn has_payloads(&self) -> bool {
        false
    }
}

/// A set of fields, each with its own terms.
pub trait Fields: Send + Sync {
    /// Field names, in storage order.
    fn field_names(&self) -> Vec<&str>;

    /// Terms of `field`, or `None` if the field is absent.
    fn terms(&self, field: &str) -> Result<Option<Box<dyn Terms>>>;

    /// Number of fields.
    fn size(&self) -> usize;
}
