//! Views over one decoded document.
//!
//! Everything here works on arrays decoded by
//! [`TermVectorsReader::get`](super::TermVectorsReader::get) and performs no
//! further I/O. Views share the decoded document through an [`Arc`], so terms
//! enumerators and postings can outlive the [`TermVectorFields`] they came from.

use std::sync::Arc;

use crate::codec::term_vectors::document::{
    TermPosting, TermVectorDocument, TermVectorField, TermVectorTerm,
};
use crate::codec::term_vectors::{OFFSETS, PAYLOADS, POSITIONS};
use crate::error::{Result, TesseraError};
use crate::index::{Bits, DocId, Fields, NO_MORE_DOCS, PostingsEnum, SeekStatus, Terms, TermsEnum};

/// Decoded arrays of one field of one document.
#[derive(Debug, Clone)]
pub(crate) struct FieldData {
    pub field_num: u32,
    pub name: String,
    pub flags: u8,
    pub prefix_lengths: Vec<u32>,
    pub suffix_lengths: Vec<u32>,
    pub term_freqs: Vec<u32>,
    /// `position_index[t]..position_index[t + 1]` are the postings of term `t`.
    pub position_index: Vec<usize>,
    pub positions: Option<Vec<i32>>,
    pub start_offsets: Option<Vec<i32>>,
    pub lengths: Option<Vec<i32>>,
    /// Payload boundaries per posting, relative to the document's payload bytes.
    pub payload_index: Option<Vec<usize>>,
    /// Start of this field's term suffixes in the document bytes.
    pub suffix_start: usize,
}

impl FieldData {
    fn num_terms(&self) -> usize {
        self.term_freqs.len()
    }
}

/// Decoded document: its bytes and per-field arrays.
#[derive(Debug)]
pub(crate) struct DocumentData {
    /// Term suffixes (`doc_len` bytes) followed by payloads.
    pub bytes: Vec<u8>,
    pub doc_len: usize,
    pub fields: Vec<FieldData>,
}

impl DocumentData {
    fn payloads(&self) -> &[u8] {
        &self.bytes[self.doc_len..]
    }
}

/// Term vectors of one document.
#[derive(Debug, Clone)]
pub struct TermVectorFields {
    doc: Arc<DocumentData>,
}

impl TermVectorFields {
    pub(crate) fn new(doc: DocumentData) -> Self {
        TermVectorFields { doc: Arc::new(doc) }
    }

    fn field_index(&self, name: &str) -> Option<usize> {
        self.doc.fields.iter().position(|f| f.name == name)
    }

    /// Terms of `field`, or `None` if the field is absent or has no terms.
    pub fn field_terms(&self, field: &str) -> Option<TermVectorTerms> {
        let index = self.field_index(field)?;
        if self.doc.fields[index].num_terms() == 0 {
            return None;
        }
        Some(TermVectorTerms {
            doc: Arc::clone(&self.doc),
            field: index,
        })
    }

    /// Field number of every field, in storage order.
    pub fn field_numbers(&self) -> Vec<u32> {
        self.doc.fields.iter().map(|f| f.field_num).collect()
    }

    pub fn len(&self) -> usize {
        self.doc.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc.fields.is_empty()
    }

    /// Copy the term vectors into an owned document.
    pub fn to_document(&self) -> Result<TermVectorDocument> {
        let mut document = TermVectorDocument::new();
        for (index, field) in self.doc.fields.iter().enumerate() {
            let mut out = TermVectorField::new(
                field.name.clone(),
                field.flags & POSITIONS != 0,
                field.flags & OFFSETS != 0,
                field.flags & PAYLOADS != 0,
            );

            if field.num_terms() > 0 {
                let terms = TermVectorTerms {
                    doc: Arc::clone(&self.doc),
                    field: index,
                };
                let mut terms_enum = terms.terms_enum();
                while let Some(term) = terms_enum.next()? {
                    let term = term.to_vec();
                    let mut postings = terms_enum.postings_enum(None)?;
                    postings.next_doc()?;
                    let freq = postings.freq()?;
                    let mut list = Vec::with_capacity(freq as usize);
                    for _ in 0..freq {
                        let position = postings.next_position()?;
                        let mut posting = TermPosting::new(
                            position,
                            postings.start_offset()?,
                            postings.end_offset()?,
                        );
                        posting.payload = postings.payload()?.map(<[u8]>::to_vec);
                        list.push(posting);
                    }
                    out.terms.push(TermVectorTerm {
                        term,
                        postings: list,
                    });
                }
            }
            document.add_field(out);
        }
        Ok(document)
    }
}

impl Fields for TermVectorFields {
    fn field_names(&self) -> Vec<&str> {
        self.doc.fields.iter().map(|f| f.name.as_str()).collect()
    }

    fn terms(&self, field: &str) -> Result<Option<Box<dyn Terms>>> {
        Ok(self
            .field_terms(field)
            .map(|terms| Box::new(terms) as Box<dyn Terms>))
    }

    fn size(&self) -> usize {
        self.len()
    }
}

/// Terms of one field of one document.
#[derive(Debug, Clone)]
pub struct TermVectorTerms {
    doc: Arc<DocumentData>,
    field: usize,
}

impl TermVectorTerms {
    fn data(&self) -> &FieldData {
        &self.doc.fields[self.field]
    }

    /// Concrete enumerator, positioned before the first term.
    pub fn terms_enum(&self) -> TermVectorTermsEnum {
        TermVectorTermsEnum {
            doc: Arc::clone(&self.doc),
            field: self.field,
            ord: None,
            suffix_offset: self.data().suffix_start,
            term: Vec::new(),
        }
    }
}

impl Terms for TermVectorTerms {
    fn iterator(&self) -> Result<Box<dyn TermsEnum>> {
        Ok(Box::new(self.terms_enum()))
    }

    fn size(&self) -> Option<u64> {
        Some(self.data().num_terms() as u64)
    }

    fn sum_doc_freq(&self) -> Option<u64> {
        // Every term occurs in exactly this one document.
        Some(self.data().num_terms() as u64)
    }

    fn sum_total_term_freq(&self) -> Option<u64> {
        Some(self.data().term_freqs.iter().map(|&f| u64::from(f)).sum())
    }

    fn doc_count(&self) -> Option<u32> {
        Some(1)
    }

    fn has_positions(&self) -> bool {
        self.data().flags & POSITIONS != 0
    }

    fn has_offsets(&self) -> bool {
        self.data().flags & OFFSETS != 0
    }

    fn has_payloads(&self) -> bool {
        self.data().flags & PAYLOADS != 0
    }
}

/// Walks the front-coded terms of one field in order.
///
/// Each term is its predecessor's first `prefix_length` bytes followed by
/// its own suffix bytes, so seeking is a linear scan.
#[derive(Debug, Clone)]
pub struct TermVectorTermsEnum {
    doc: Arc<DocumentData>,
    field: usize,
    /// Current term ordinal; `None` before the first term. Equal to the term
    /// count once exhausted.
    ord: Option<usize>,
    /// Start of the next term's suffix in the document bytes.
    suffix_offset: usize,
    term: Vec<u8>,
}

impl TermVectorTermsEnum {
    fn data(&self) -> &FieldData {
        &self.doc.fields[self.field]
    }

    fn current(&self) -> Option<usize> {
        self.ord.filter(|&ord| ord < self.data().num_terms())
    }

    fn reset(&mut self) {
        self.ord = None;
        self.suffix_offset = self.data().suffix_start;
        self.term.clear();
    }

    fn advance(&mut self) -> Result<bool> {
        let num_terms = self.data().num_terms();
        let next = self.ord.map_or(0, |ord| ord + 1);
        if next >= num_terms {
            self.ord = Some(num_terms);
            self.term.clear();
            return Ok(false);
        }

        let field = &self.doc.fields[self.field];
        let prefix = field.prefix_lengths[next] as usize;
        let suffix = field.suffix_lengths[next] as usize;
        let end = self.suffix_offset + suffix;
        if prefix > self.term.len() || end > self.doc.doc_len {
            return Err(TesseraError::corruption(format!(
                "term {next} of field {:?} does not fit the decoded bytes",
                field.name
            )));
        }

        self.term.truncate(prefix);
        self.term
            .extend_from_slice(&self.doc.bytes[self.suffix_offset..end]);
        self.suffix_offset = end;
        self.ord = Some(next);
        Ok(true)
    }

    /// Concrete postings of the current term.
    pub fn postings_enum(&self, live_docs: Option<&dyn Bits>) -> Result<TermVectorPostings> {
        let ord = self
            .current()
            .ok_or_else(|| TesseraError::illegal_state("terms enum is not positioned on a term"))?;
        let live = live_docs.is_none_or(|bits| bits.get(0));
        let field = self.data();
        Ok(TermVectorPostings {
            doc: Arc::clone(&self.doc),
            field: self.field,
            live,
            state: PostingsState::NotStarted,
            freq: field.term_freqs[ord],
            base: field.position_index[ord],
            i: -1,
        })
    }
}

impl TermsEnum for TermVectorTermsEnum {
    fn next(&mut self) -> Result<Option<&[u8]>> {
        if self.advance()? {
            Ok(Some(&self.term))
        } else {
            Ok(None)
        }
    }

    fn term(&self) -> Option<&[u8]> {
        self.current().map(|_| self.term.as_slice())
    }

    fn seek_ceil(&mut self, target: &[u8]) -> Result<SeekStatus> {
        let exhausted = self.ord.is_some() && self.current().is_none();
        if exhausted || self.current().is_some_and(|_| target < self.term.as_slice()) {
            self.reset();
        }
        if self.current().is_some() && target == self.term.as_slice() {
            return Ok(SeekStatus::Found);
        }

        while self.advance()? {
            match self.term.as_slice().cmp(target) {
                std::cmp::Ordering::Equal => return Ok(SeekStatus::Found),
                std::cmp::Ordering::Greater => return Ok(SeekStatus::NotFound),
                std::cmp::Ordering::Less => {}
            }
        }
        Ok(SeekStatus::End)
    }

    fn seek_exact_ord(&mut self, _ord: u64) -> Result<()> {
        Err(TesseraError::unsupported(
            "term vectors do not support seeking by ordinal",
        ))
    }

    fn ord(&self) -> Result<u64> {
        Err(TesseraError::unsupported("term vectors do not track term ordinals"))
    }

    fn doc_freq(&self) -> Result<u32> {
        self.current()
            .map(|_| 1)
            .ok_or_else(|| TesseraError::illegal_state("terms enum is not positioned on a term"))
    }

    fn total_term_freq(&self) -> Result<u64> {
        self.current()
            .map(|ord| u64::from(self.data().term_freqs[ord]))
            .ok_or_else(|| TesseraError::illegal_state("terms enum is not positioned on a term"))
    }

    fn postings(&self, live_docs: Option<&dyn Bits>) -> Result<Box<dyn PostingsEnum>> {
        Ok(Box::new(self.postings_enum(live_docs)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PostingsState {
    NotStarted,
    Started,
    Exhausted,
}

/// Postings of one term in its single document, which is reported as doc 0.
#[derive(Debug, Clone)]
pub struct TermVectorPostings {
    doc: Arc<DocumentData>,
    field: usize,
    /// Whether doc 0 passed the live-docs filter when the enum was created.
    live: bool,
    state: PostingsState,
    freq: u32,
    /// First posting of the term in the field's posting arrays.
    base: usize,
    /// Current posting within the term; -1 before the first `next_position`.
    i: i64,
}

impl TermVectorPostings {
    fn data(&self) -> &FieldData {
        &self.doc.fields[self.field]
    }

    fn check_doc(&self) -> Result<()> {
        match self.state {
            PostingsState::Started => Ok(()),
            PostingsState::NotStarted => {
                Err(TesseraError::illegal_state("postings enum not started"))
            }
            PostingsState::Exhausted => Err(TesseraError::illegal_state("postings enum exhausted")),
        }
    }

    fn check_position(&self) -> Result<usize> {
        self.check_doc()?;
        if self.i < 0 {
            return Err(TesseraError::illegal_state("position enum not started"));
        }
        Ok(self.base + self.i as usize)
    }
}

impl PostingsEnum for TermVectorPostings {
    fn doc_id(&self) -> Option<DocId> {
        match self.state {
            PostingsState::NotStarted => None,
            PostingsState::Started => Some(0),
            PostingsState::Exhausted => Some(NO_MORE_DOCS),
        }
    }

    fn next_doc(&mut self) -> Result<DocId> {
        if self.state == PostingsState::NotStarted && self.live {
            self.state = PostingsState::Started;
            Ok(0)
        } else {
            self.state = PostingsState::Exhausted;
            Ok(NO_MORE_DOCS)
        }
    }

    fn freq(&self) -> Result<u32> {
        self.check_doc()?;
        Ok(self.freq)
    }

    fn next_position(&mut self) -> Result<i32> {
        self.check_doc()?;
        if self.i + 1 >= i64::from(self.freq) {
            return Err(TesseraError::illegal_state("read past last position"));
        }
        self.i += 1;
        let k = self.base + self.i as usize;
        Ok(self.data().positions.as_ref().map_or(-1, |p| p[k]))
    }

    fn start_offset(&self) -> Result<i32> {
        let k = self.check_position()?;
        Ok(self.data().start_offsets.as_ref().map_or(-1, |s| s[k]))
    }

    fn end_offset(&self) -> Result<i32> {
        let k = self.check_position()?;
        let field = self.data();
        match (&field.start_offsets, &field.lengths) {
            (Some(starts), Some(lengths)) => Ok(starts[k] + lengths[k]),
            _ => Ok(-1),
        }
    }

    fn payload(&self) -> Result<Option<&[u8]>> {
        let k = self.check_position()?;
        let Some(index) = self.data().payload_index.as_ref() else {
            return Ok(None);
        };
        let (start, end) = (index[k], index[k + 1]);
        if start == end {
            return Ok(None);
        }
        Ok(Some(&self.doc.payloads()[start..end]))
    }

    fn cost(&self) -> u64 {
        1
    }
}
