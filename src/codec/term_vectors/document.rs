//! Owned term vectors of one document.
//!
//! [`TermVectorDocument`] is what
//! [`TermVectorsWriter::add_document`](super::TermVectorsWriter::add_document)
//! consumes and what [`TermVectorFields::to_document`](super::TermVectorFields::to_document)
//! produces, so a document can be compared before and after a round trip.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Result;
use crate::index::FieldInfos;

/// One occurrence of a term. Unrecorded values are -1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermPosting {
    pub position: i32,
    pub start_offset: i32,
    pub end_offset: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Vec<u8>>,
}

impl TermPosting {
    pub fn new(position: i32, start_offset: i32, end_offset: i32) -> Self {
        TermPosting {
            position,
            start_offset,
            end_offset,
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = Some(payload.into());
        self
    }
}

/// A term and all its occurrences within one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermVectorTerm {
    #[serde(serialize_with = "serialize_term", deserialize_with = "deserialize_term")]
    pub term: Vec<u8>,
    pub postings: Vec<TermPosting>,
}

impl TermVectorTerm {
    /// Occurrences of the term, which is its frequency.
    pub fn freq(&self) -> u32 {
        self.postings.len() as u32
    }
}

/// The term vector of one field: its terms in byte order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermVectorField {
    pub name: String,
    #[serde(default)]
    pub has_positions: bool,
    #[serde(default)]
    pub has_offsets: bool,
    #[serde(default)]
    pub has_payloads: bool,
    pub terms: Vec<TermVectorTerm>,
}

impl TermVectorField {
    pub fn new<S: Into<String>>(
        name: S,
        has_positions: bool,
        has_offsets: bool,
        has_payloads: bool,
    ) -> Self {
        TermVectorField {
            name: name.into(),
            has_positions,
            has_offsets,
            has_payloads,
            terms: Vec::new(),
        }
    }

    /// Append an occurrence of `term`, keeping terms sorted.
    pub fn add_posting(&mut self, term: &[u8], posting: TermPosting) {
        match self
            .terms
            .binary_search_by(|t| t.term.as_slice().cmp(term))
        {
            Ok(i) => self.terms[i].postings.push(posting),
            Err(i) => self.terms.insert(
                i,
                TermVectorTerm {
                    term: term.to_vec(),
                    postings: vec![posting],
                },
            ),
        }
    }

    pub fn term(&self, term: &[u8]) -> Option<&TermVectorTerm> {
        self.terms
            .binary_search_by(|t| t.term.as_slice().cmp(term))
            .ok()
            .map(|i| &self.terms[i])
    }

    /// Sum of term frequencies.
    pub fn total_term_freq(&self) -> u64 {
        self.terms.iter().map(|t| u64::from(t.freq())).sum()
    }
}

/// All term vectors of one document, fields in the order they were added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermVectorDocument {
    pub fields: Vec<TermVectorField>,
}

impl TermVectorDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a document from analyzed tokens `(field, term, position, start, end)`.
    ///
    /// Fields record positions and offsets, appear in first-seen order, and
    /// postings keep token order.
    pub fn from_tokens<I, F, T>(tokens: I) -> Self
    where
        I: IntoIterator<Item = (F, T, i32, i32, i32)>,
        F: AsRef<str>,
        T: AsRef<[u8]>,
    {
        let mut doc = TermVectorDocument::new();
        for (field, term, position, start, end) in tokens {
            doc.field_mut_or_insert(field.as_ref(), true, true, false)
                .add_posting(term.as_ref(), TermPosting::new(position, start, end));
        }
        doc
    }

    /// The field called `name`, created with the given flags if missing.
    pub fn field_mut_or_insert(
        &mut self,
        name: &str,
        has_positions: bool,
        has_offsets: bool,
        has_payloads: bool,
    ) -> &mut TermVectorField {
        let index = match self.fields.iter().position(|f| f.name == name) {
            Some(index) => index,
            None => {
                self.fields.push(TermVectorField::new(
                    name,
                    has_positions,
                    has_offsets,
                    has_payloads,
                ));
                self.fields.len() - 1
            }
        };
        &mut self.fields[index]
    }

    pub fn add_field(&mut self, field: TermVectorField) {
        self.fields.push(field);
    }

    pub fn field(&self, name: &str) -> Option<&TermVectorField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Assign numbers to any field names not yet in `field_infos`.
    pub fn register_fields(&self, field_infos: &mut FieldInfos) -> Result<()> {
        for field in &self.fields {
            field_infos.add_or_get(&field.name)?;
        }
        Ok(())
    }
}

/// UTF-8 terms serialize as strings, anything else as a byte array.
fn serialize_term<S: Serializer>(term: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    match std::str::from_utf8(term) {
        Ok(text) => serializer.serialize_str(text),
        Err(_) => term.serialize(serializer),
    }
}

fn deserialize_term<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TermRepr {
        Text(String),
        Bytes(Vec<u8>),
    }

    Ok(match TermRepr::deserialize(deserializer)? {
        TermRepr::Text(text) => text.into_bytes(),
        TermRepr::Bytes(bytes) => bytes,
    })
}
