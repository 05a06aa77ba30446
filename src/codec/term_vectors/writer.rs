//! Buffers documents and writes them out chunk by chunk.
//!
//! Documents are fed through a streaming protocol:
//!
//! ```text
//! start_document
//!   start_field
//!     start_term  add_position*
//!     ...
//!   finish_field
//!   ...
//! finish_document
//! ...
//! finish
//! close
//! ```
//!
//! Per-term metadata is buffered column by column until the pending documents
//! hold `chunk_size` bytes of term suffixes and payloads, or
//! `max_docs_per_chunk` documents. The chunk is then written in the layout
//! [`TermVectorsReader`](super::TermVectorsReader) decodes:
//!
//! ```text
//! varint doc_base, varint chunk_docs
//! field counts            varint if chunk_docs == 1, block-packed otherwise
//! field numbers           token byte (+ varint escape), packed distinct numbers
//! field number offsets    packed, one per (doc, field)
//! flags                   u8 selector, packed per distinct field (0) or per (doc, field) (1)
//! term counts             varint bits, packed
//! prefix lengths          block-packed
//! suffix lengths          block-packed
//! freq - 1                block-packed
//! position deltas         block-packed
//! chars per term          u32 float bits per distinct field   } fields with offsets
//! start offset deltas     block-packed                        }
//! lengths - term length   block-packed                        }
//! payload lengths         block-packed
//! compressed blob         per doc: term suffixes then payloads
//! ```

use std::sync::Arc;

use log::{debug, warn};

use crate::codec::term_vectors::chunk_index::ChunkIndexWriter;
use crate::codec::term_vectors::config::TermVectorsConfig;
use crate::codec::term_vectors::document::TermVectorDocument;
use crate::codec::term_vectors::{
    FLAGS_BITS, OFFSETS, PAYLOADS, POSITIONS, VECTORS_EXTENSION, VECTORS_INDEX_EXTENSION,
    data_codec_name, index_codec_name,
};
use crate::codec::{write_footer, write_header};
use crate::compression::Compressor;
use crate::error::{Result, TesseraError};
use crate::index::{FieldInfo, FieldInfos, SegmentInfo, segment_file_name};
use crate::storage::structured::StructWriter;
use crate::storage::{Storage, StorageOutput};
use crate::util::block_packed::BlockPackedWriter;
use crate::util::packed::{PACKED_VERSION_CURRENT, PackedWriter, bits_required};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Idle,
    Document,
    Field,
    Finished,
}

/// Buffered term vector of one field.
#[derive(Debug)]
struct PendingField {
    field_num: u32,
    flags: u8,
    freqs: Vec<u32>,
    prefix_lengths: Vec<u32>,
    suffix_lengths: Vec<u32>,
    positions: Vec<i32>,
    start_offsets: Vec<i32>,
    lengths: Vec<i32>,
    payload_lengths: Vec<u32>,
}

impl PendingField {
    fn new(field_num: u32, flags: u8, num_terms: usize) -> Self {
        PendingField {
            field_num,
            flags,
            freqs: Vec::with_capacity(num_terms),
            prefix_lengths: Vec::with_capacity(num_terms),
            suffix_lengths: Vec::with_capacity(num_terms),
            positions: Vec::new(),
            start_offsets: Vec::new(),
            lengths: Vec::new(),
            payload_lengths: Vec::new(),
        }
    }

    fn has(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    fn num_terms(&self) -> usize {
        self.freqs.len()
    }
}

#[derive(Debug)]
struct PendingDoc {
    num_fields: usize,
    fields: Vec<PendingField>,
}

/// Writes the term vectors of one segment.
///
/// Not reentrant; a segment has exactly one writer.
#[derive(Debug)]
pub struct TermVectorsWriter {
    storage: Arc<dyn Storage>,
    data_name: String,
    index_name: String,
    data: StructWriter<Box<dyn StorageOutput>>,
    index_out: StructWriter<Box<dyn StorageOutput>>,
    index: ChunkIndexWriter,
    config: TermVectorsConfig,
    compressor: Compressor,

    num_docs: u32,
    num_chunks: u64,
    num_dirty_chunks: u64,

    pending_docs: Vec<PendingDoc>,
    /// Term suffixes and payloads of the pending documents.
    term_suffixes: Vec<u8>,
    /// Payloads of the current document, appended to `term_suffixes` when it finishes.
    payload_bytes: Vec<u8>,
    last_term: Vec<u8>,
    has_last_term: bool,
    terms_left: usize,
    postings_left: u32,
    state: WriterState,
}

impl TermVectorsWriter {
    /// Create the data and index files of `segment`.
    ///
    /// Files created before a failure are deleted again.
    pub fn create(
        storage: Arc<dyn Storage>,
        segment: &SegmentInfo,
        suffix: &str,
        config: TermVectorsConfig,
    ) -> Result<Self> {
        config.validate()?;
        let data_name = segment_file_name(&segment.name, suffix, VECTORS_EXTENSION);
        let index_name = segment_file_name(&segment.name, suffix, VECTORS_INDEX_EXTENSION);

        let mut created = Vec::with_capacity(2);
        let opened = Self::open_outputs(
            &storage,
            segment,
            suffix,
            &config,
            &data_name,
            &index_name,
            &mut created,
        );
        let (data, index_out) = match opened {
            Ok(outputs) => outputs,
            Err(e) => {
                for name in &created {
                    if let Err(delete_err) = storage.delete_file(name) {
                        warn!("failed to delete {name} after a failed create: {delete_err}");
                    }
                }
                return Err(e);
            }
        };

        let compressor = config.compression.new_compressor();
        Ok(TermVectorsWriter {
            storage,
            data_name,
            index_name,
            data,
            index_out,
            index: ChunkIndexWriter::new(),
            config,
            compressor,
            num_docs: 0,
            num_chunks: 0,
            num_dirty_chunks: 0,
            pending_docs: Vec::new(),
            term_suffixes: Vec::new(),
            payload_bytes: Vec::new(),
            last_term: Vec::new(),
            has_last_term: false,
            terms_left: 0,
            postings_left: 0,
            state: WriterState::Idle,
        })
    }

    #[allow(clippy::type_complexity)]
    fn open_outputs(
        storage: &Arc<dyn Storage>,
        segment: &SegmentInfo,
        suffix: &str,
        config: &TermVectorsConfig,
        data_name: &str,
        index_name: &str,
        created: &mut Vec<String>,
    ) -> Result<(
        StructWriter<Box<dyn StorageOutput>>,
        StructWriter<Box<dyn StorageOutput>>,
    )> {
        let mut index_out = StructWriter::new(storage.create_output(index_name)?);
        created.push(index_name.to_string());
        let mut data = StructWriter::new(storage.create_output(data_name)?);
        created.push(data_name.to_string());

        write_header(
            &mut index_out,
            &index_codec_name(&config.format_name),
            config.format_version,
            &segment.id,
            suffix,
        )?;
        write_header(
            &mut data,
            &data_codec_name(&config.format_name),
            config.format_version,
            &segment.id,
            suffix,
        )?;

        data.write_varint(u64::from(PACKED_VERSION_CURRENT))?;
        data.write_varint(config.chunk_size as u64)?;
        data.write_varint(config.block_size as u64)?;
        data.write_u8(config.compression.id())?;
        Ok((data, index_out))
    }

    /// Replace the compressor, e.g. to force small compression blocks.
    pub fn with_compressor(mut self, compressor: Compressor) -> Result<Self> {
        if compressor.mode() != self.config.compression {
            return Err(TesseraError::invalid_argument(format!(
                "compressor mode {} does not match configured mode {}",
                compressor.mode(),
                self.config.compression
            )));
        }
        self.compressor = compressor;
        Ok(self)
    }

    fn check_state(&self, expected: WriterState, operation: &str) -> Result<()> {
        if self.state != expected {
            return Err(TesseraError::illegal_state(format!(
                "{operation} called in state {:?}, expected {expected:?}",
                self.state
            )));
        }
        Ok(())
    }

    /// Begin a document with `num_fields` fields.
    pub fn start_document(&mut self, num_fields: usize) -> Result<()> {
        self.check_state(WriterState::Idle, "start_document")?;
        if self.num_docs == u32::MAX {
            return Err(TesseraError::invalid_argument("too many documents"));
        }
        self.pending_docs.push(PendingDoc {
            num_fields,
            fields: Vec::with_capacity(num_fields),
        });
        self.state = WriterState::Document;
        Ok(())
    }

    /// Begin the term vector of `field`, which has `num_terms` terms.
    pub fn start_field(
        &mut self,
        field: &FieldInfo,
        num_terms: usize,
        positions: bool,
        offsets: bool,
        payloads: bool,
    ) -> Result<()> {
        self.check_state(WriterState::Document, "start_field")?;
        let doc = self
            .pending_docs
            .last_mut()
            .ok_or_else(|| TesseraError::illegal_state("no pending document"))?;
        if doc.fields.len() == doc.num_fields {
            return Err(TesseraError::illegal_state(format!(
                "document declared {} fields",
                doc.num_fields
            )));
        }
        if doc.fields.iter().any(|f| f.field_num == field.number) {
            return Err(TesseraError::invalid_argument(format!(
                "field {:?} added twice to the same document",
                field.name
            )));
        }

        let mut flags = 0u8;
        if positions {
            flags |= POSITIONS;
        }
        if offsets {
            flags |= OFFSETS;
        }
        if payloads {
            flags |= PAYLOADS;
        }
        doc.fields
            .push(PendingField::new(field.number, flags, num_terms));

        self.last_term.clear();
        self.has_last_term = false;
        self.terms_left = num_terms;
        self.postings_left = 0;
        self.state = WriterState::Field;
        Ok(())
    }

    /// Begin `term`, which occurs `freq` times. Terms must come in byte order.
    ///
    /// Fields with positions, offsets or payloads expect `freq` calls to
    /// [`add_position`](Self::add_position) next.
    pub fn start_term(&mut self, term: &[u8], freq: u32) -> Result<()> {
        self.check_state(WriterState::Field, "start_term")?;
        if self.postings_left > 0 {
            return Err(TesseraError::illegal_state(format!(
                "previous term still expects {} positions",
                self.postings_left
            )));
        }
        if self.terms_left == 0 {
            return Err(TesseraError::illegal_state("field received more terms than declared"));
        }
        if freq == 0 {
            return Err(TesseraError::invalid_argument("term frequency must be at least 1"));
        }
        if self.has_last_term && term <= self.last_term.as_slice() {
            return Err(TesseraError::invalid_argument(format!(
                "terms out of order: {:?} after {:?}",
                String::from_utf8_lossy(term),
                String::from_utf8_lossy(&self.last_term)
            )));
        }

        let field = self
            .pending_docs
            .last_mut()
            .and_then(|doc| doc.fields.last_mut())
            .ok_or_else(|| TesseraError::illegal_state("no pending field"))?;

        let prefix = common_prefix_len(&self.last_term, term);
        field.freqs.push(freq);
        field.prefix_lengths.push(prefix as u32);
        field.suffix_lengths.push((term.len() - prefix) as u32);
        self.term_suffixes.extend_from_slice(&term[prefix..]);

        self.last_term.clear();
        self.last_term.extend_from_slice(term);
        self.has_last_term = true;
        self.terms_left -= 1;
        if field.flags != 0 {
            self.postings_left = freq;
        }
        Ok(())
    }

    /// Record one occurrence of the current term.
    ///
    /// Values the field does not record are ignored; a payload on a field
    /// without payloads is rejected.
    pub fn add_position(
        &mut self,
        position: i32,
        start_offset: i32,
        end_offset: i32,
        payload: Option<&[u8]>,
    ) -> Result<()> {
        self.check_state(WriterState::Field, "add_position")?;
        if self.postings_left == 0 {
            return Err(TesseraError::illegal_state(
                "add_position called more often than the term frequency",
            ));
        }

        let field = self
            .pending_docs
            .last_mut()
            .and_then(|doc| doc.fields.last_mut())
            .ok_or_else(|| TesseraError::illegal_state("no pending field"))?;

        let length = if field.has(OFFSETS) {
            end_offset
                .checked_sub(start_offset)
                .filter(|&length| length >= 0)
                .ok_or_else(|| {
                    TesseraError::invalid_argument(format!(
                        "offsets {start_offset}..{end_offset} do not form a valid range"
                    ))
                })?
        } else {
            0
        };
        if !field.has(PAYLOADS) && payload.is_some_and(|p| !p.is_empty()) {
            return Err(TesseraError::invalid_argument(
                "payload given for a field that does not record payloads",
            ));
        }

        if field.has(POSITIONS) {
            field.positions.push(position);
        }
        if field.has(OFFSETS) {
            field.start_offsets.push(start_offset);
            field.lengths.push(length);
        }
        if field.has(PAYLOADS) {
            let payload = payload.unwrap_or_default();
            field.payload_lengths.push(payload.len() as u32);
            self.payload_bytes.extend_from_slice(payload);
        }

        self.postings_left -= 1;
        Ok(())
    }

    pub fn finish_field(&mut self) -> Result<()> {
        self.check_state(WriterState::Field, "finish_field")?;
        if self.terms_left > 0 || self.postings_left > 0 {
            return Err(TesseraError::illegal_state(format!(
                "field finished with {} terms and {} positions missing",
                self.terms_left, self.postings_left
            )));
        }
        self.state = WriterState::Document;
        Ok(())
    }

    /// Complete the current document, flushing a chunk when one is full.
    pub fn finish_document(&mut self) -> Result<()> {
        self.check_state(WriterState::Document, "finish_document")?;
        if let Some(doc) = self.pending_docs.last()
            && doc.fields.len() != doc.num_fields
        {
            return Err(TesseraError::illegal_state(format!(
                "document declared {} fields but received {}",
                doc.num_fields,
                doc.fields.len()
            )));
        }

        self.term_suffixes.extend_from_slice(&self.payload_bytes);
        self.payload_bytes.clear();
        self.num_docs += 1;
        self.state = WriterState::Idle;

        if self.trigger_flush() {
            self.flush()?;
        }
        Ok(())
    }

    /// Write all term vectors of `doc`. Every field must be in `field_infos`.
    pub fn add_document(&mut self, doc: &TermVectorDocument, field_infos: &FieldInfos) -> Result<()> {
        self.start_document(doc.num_fields())?;
        for field in &doc.fields {
            let info = field_infos.by_name(&field.name).ok_or_else(|| {
                TesseraError::invalid_argument(format!("unknown field {:?}", field.name))
            })?;
            self.start_field(
                info,
                field.terms.len(),
                field.has_positions,
                field.has_offsets,
                field.has_payloads,
            )?;
            let records_postings = field.has_positions || field.has_offsets || field.has_payloads;
            for term in &field.terms {
                self.start_term(&term.term, term.freq())?;
                if records_postings {
                    for posting in &term.postings {
                        self.add_position(
                            posting.position,
                            posting.start_offset,
                            posting.end_offset,
                            posting.payload.as_deref(),
                        )?;
                    }
                }
            }
            self.finish_field()?;
        }
        self.finish_document()
    }

    fn trigger_flush(&self) -> bool {
        self.term_suffixes.len() >= self.config.chunk_size
            || self.pending_docs.len() >= self.config.max_docs_per_chunk
    }

    fn flush(&mut self) -> Result<()> {
        let chunk_docs = self.pending_docs.len() as u32;
        let doc_base = self.num_docs - chunk_docs;
        let start_pointer = self.data.position();
        self.index.write_index(chunk_docs, start_pointer)?;

        let out = &mut self.data;
        let docs = &self.pending_docs;
        let block_size = self.config.block_size;

        out.write_varint(u64::from(doc_base))?;
        out.write_varint(u64::from(chunk_docs))?;

        let total_fields = flush_num_fields(out, docs, block_size)?;
        if total_fields > 0 {
            let field_nums = flush_field_nums(out, docs)?;
            flush_field_num_offsets(out, docs, &field_nums)?;
            flush_flags(out, docs, &field_nums)?;
            flush_num_terms(out, docs)?;
            flush_term_lengths(out, docs, block_size)?;
            flush_term_freqs(out, docs, block_size)?;
            flush_positions(out, docs, block_size)?;
            flush_offsets(out, docs, &field_nums, block_size)?;
            flush_payload_lengths(out, docs, block_size)?;
            self.compressor.compress(&self.term_suffixes, out)?;
        }

        debug!(
            "flushed term vector chunk {}: docs {}..{}, {} fields, {} bytes raw, {} bytes on disk",
            self.num_chunks,
            doc_base,
            doc_base + chunk_docs,
            total_fields,
            self.term_suffixes.len(),
            self.data.position() - start_pointer
        );

        self.pending_docs.clear();
        self.term_suffixes.clear();
        self.num_chunks += 1;
        Ok(())
    }

    /// Flush buffered documents and write the index, chunk statistics and footers.
    ///
    /// `num_docs` must equal the number of documents added.
    pub fn finish(&mut self, num_docs: u32) -> Result<()> {
        self.check_state(WriterState::Idle, "finish")?;
        if !self.pending_docs.is_empty() {
            self.flush()?;
            self.num_dirty_chunks += 1;
            debug!(
                "forced a final incomplete term vector chunk ({} dirty of {})",
                self.num_dirty_chunks, self.num_chunks
            );
        }
        if num_docs != self.num_docs {
            return Err(TesseraError::illegal_state(format!(
                "wrote {} docs, finish called with num_docs={num_docs}",
                self.num_docs
            )));
        }

        let max_pointer = self.data.position();
        self.index.finish(&mut self.index_out, num_docs, max_pointer)?;

        let version = self.config.format_version;
        if version.has_chunk_stats() {
            self.data.write_varint(self.num_chunks)?;
            self.data.write_varint(self.num_dirty_chunks)?;
        }
        if version.has_footer() {
            write_footer(&mut self.index_out)?;
            write_footer(&mut self.data)?;
        }

        self.state = WriterState::Finished;
        Ok(())
    }

    /// Flush and close both files.
    pub fn close(self) -> Result<()> {
        if self.state != WriterState::Finished {
            warn!(
                "closing term vectors writer for {} before finish; the files are incomplete",
                self.data_name
            );
        }
        let data_result = self.data.close();
        let index_result = self.index_out.close();
        data_result.and(index_result)
    }

    /// Discard everything written. Unclosed outputs vanish on drop; files
    /// published earlier under the same names are deleted as well.
    pub fn abort(self) -> Result<()> {
        let TermVectorsWriter {
            storage,
            data_name,
            index_name,
            data,
            index_out,
            ..
        } = self;
        drop(data);
        drop(index_out);
        storage.delete_file(&data_name)?;
        storage.delete_file(&index_name)
    }

    /// Documents started and finished so far.
    pub fn num_docs(&self) -> u32 {
        self.num_docs
    }

    pub fn num_chunks(&self) -> u64 {
        self.num_chunks
    }

    /// Chunks flushed by [`finish`](Self::finish) before they were full.
    pub fn num_dirty_chunks(&self) -> u64 {
        self.num_dirty_chunks
    }

    /// Documents buffered for the next chunk.
    pub fn num_pending_docs(&self) -> usize {
        self.pending_docs.len()
    }
}

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

fn fields_of(docs: &[PendingDoc]) -> impl Iterator<Item = &PendingField> {
    docs.iter().flat_map(|doc| doc.fields.iter())
}

fn write_packed<W, I>(out: &mut StructWriter<W>, bits: u32, values: I) -> Result<()>
where
    W: StorageOutput,
    I: IntoIterator<Item = u64>,
{
    let mut writer = PackedWriter::new(bits);
    for value in values {
        writer.add(value);
    }
    let mut buf = Vec::new();
    writer.finish(&mut buf)?;
    out.write_raw(&buf)
}

fn write_block_packed<W, I>(out: &mut StructWriter<W>, block_size: usize, values: I) -> Result<()>
where
    W: StorageOutput,
    I: IntoIterator<Item = i64>,
{
    let mut writer = BlockPackedWriter::new(block_size)?;
    for value in values {
        writer.add(value)?;
    }
    out.write_raw(&writer.finish()?)
}

fn flush_num_fields<W: StorageOutput>(
    out: &mut StructWriter<W>,
    docs: &[PendingDoc],
    block_size: usize,
) -> Result<usize> {
    if let [doc] = docs {
        out.write_varint(doc.fields.len() as u64)?;
        return Ok(doc.fields.len());
    }
    write_block_packed(out, block_size, docs.iter().map(|doc| doc.fields.len() as i64))?;
    Ok(docs.iter().map(|doc| doc.fields.len()).sum())
}

/// Write the sorted distinct field numbers of the chunk and return them.
fn flush_field_nums<W: StorageOutput>(
    out: &mut StructWriter<W>,
    docs: &[PendingDoc],
) -> Result<Vec<u32>> {
    let mut field_nums: Vec<u32> = fields_of(docs).map(|f| f.field_num).collect();
    field_nums.sort_unstable();
    field_nums.dedup();

    let num_distinct = field_nums.len();
    let max = field_nums.last().copied().unwrap_or(0);
    let bits = bits_required(u64::from(max));
    let token = ((num_distinct - 1).min(0x07) << 5) as u8 | bits as u8;
    out.write_u8(token)?;
    if num_distinct - 1 >= 0x07 {
        out.write_varint((num_distinct - 1 - 0x07) as u64)?;
    }
    write_packed(out, bits, field_nums.iter().map(|&n| u64::from(n)))?;
    Ok(field_nums)
}

fn field_num_index(field_nums: &[u32], field_num: u32) -> Result<usize> {
    field_nums.binary_search(&field_num).map_err(|_| {
        TesseraError::illegal_state(format!("field {field_num} missing from the chunk dictionary"))
    })
}

fn flush_field_num_offsets<W: StorageOutput>(
    out: &mut StructWriter<W>,
    docs: &[PendingDoc],
    field_nums: &[u32],
) -> Result<()> {
    let bits = bits_required((field_nums.len() - 1) as u64);
    let indices = fields_of(docs)
        .map(|f| field_num_index(field_nums, f.field_num).map(|i| i as u64))
        .collect::<Result<Vec<_>>>()?;
    write_packed(out, bits, indices)
}

fn flush_flags<W: StorageOutput>(
    out: &mut StructWriter<W>,
    docs: &[PendingDoc],
    field_nums: &[u32],
) -> Result<()> {
    let mut field_flags: Vec<Option<u8>> = vec![None; field_nums.len()];
    let mut non_changing = true;
    for field in fields_of(docs) {
        let slot = &mut field_flags[field_num_index(field_nums, field.field_num)?];
        match *slot {
            None => *slot = Some(field.flags),
            Some(flags) if flags != field.flags => {
                non_changing = false;
                break;
            }
            Some(_) => {}
        }
    }

    if non_changing {
        out.write_u8(0)?;
        write_packed(
            out,
            FLAGS_BITS,
            field_flags.iter().map(|f| u64::from(f.unwrap_or_default())),
        )
    } else {
        out.write_u8(1)?;
        write_packed(out, FLAGS_BITS, fields_of(docs).map(|f| u64::from(f.flags)))
    }
}

fn flush_num_terms<W: StorageOutput>(out: &mut StructWriter<W>, docs: &[PendingDoc]) -> Result<()> {
    let max = fields_of(docs).map(|f| f.num_terms()).max().unwrap_or(0);
    let bits = bits_required(max as u64);
    out.write_varint(u64::from(bits))?;
    write_packed(out, bits, fields_of(docs).map(|f| f.num_terms() as u64))
}

fn flush_term_lengths<W: StorageOutput>(
    out: &mut StructWriter<W>,
    docs: &[PendingDoc],
    block_size: usize,
) -> Result<()> {
    write_block_packed(
        out,
        block_size,
        fields_of(docs).flat_map(|f| f.prefix_lengths.iter().map(|&l| i64::from(l))),
    )?;
    write_block_packed(
        out,
        block_size,
        fields_of(docs).flat_map(|f| f.suffix_lengths.iter().map(|&l| i64::from(l))),
    )
}

fn flush_term_freqs<W: StorageOutput>(
    out: &mut StructWriter<W>,
    docs: &[PendingDoc],
    block_size: usize,
) -> Result<()> {
    write_block_packed(
        out,
        block_size,
        fields_of(docs).flat_map(|f| f.freqs.iter().map(|&freq| i64::from(freq) - 1)),
    )
}

fn flush_positions<W: StorageOutput>(
    out: &mut StructWriter<W>,
    docs: &[PendingDoc],
    block_size: usize,
) -> Result<()> {
    let mut writer = BlockPackedWriter::new(block_size)?;
    for field in fields_of(docs).filter(|f| f.has(POSITIONS)) {
        let mut pos = 0;
        for &freq in &field.freqs {
            let mut previous = 0i64;
            for &position in &field.positions[pos..pos + freq as usize] {
                writer.add(i64::from(position) - previous)?;
                previous = i64::from(position);
            }
            pos += freq as usize;
        }
    }
    out.write_raw(&writer.finish()?)
}

/// Average characters per position step of each distinct field.
///
/// Computed from the last posting of every term of fields that record both
/// positions and offsets; 0 when either sum is not positive.
fn chars_per_term(docs: &[PendingDoc], field_nums: &[u32]) -> Result<Vec<f32>> {
    let mut sum_pos = vec![0i64; field_nums.len()];
    let mut sum_offsets = vec![0i64; field_nums.len()];
    for field in fields_of(docs).filter(|f| f.has(POSITIONS) && f.has(OFFSETS)) {
        let slot = field_num_index(field_nums, field.field_num)?;
        let mut pos = 0usize;
        for &freq in &field.freqs {
            let last = pos + freq as usize - 1;
            sum_pos[slot] += i64::from(field.positions[last]);
            sum_offsets[slot] += i64::from(field.start_offsets[last]);
            pos += freq as usize;
        }
    }

    Ok(sum_pos
        .iter()
        .zip(&sum_offsets)
        .map(|(&p, &o)| {
            if p <= 0 || o <= 0 {
                0.0
            } else {
                (o as f64 / p as f64) as f32
            }
        })
        .collect())
}

fn flush_offsets<W: StorageOutput>(
    out: &mut StructWriter<W>,
    docs: &[PendingDoc],
    field_nums: &[u32],
    block_size: usize,
) -> Result<()> {
    // Readers only look for this section when some offset posting exists.
    if !fields_of(docs).any(|f| f.has(OFFSETS) && f.num_terms() > 0) {
        return Ok(());
    }

    let chars_per_term = chars_per_term(docs, field_nums)?;
    for cpt in &chars_per_term {
        out.write_u32(cpt.to_bits())?;
    }

    let mut writer = BlockPackedWriter::new(block_size)?;
    for field in fields_of(docs).filter(|f| f.has(OFFSETS)) {
        let cpt = chars_per_term[field_num_index(field_nums, field.field_num)?];
        let has_positions = field.has(POSITIONS);
        let mut pos = 0usize;
        for &freq in &field.freqs {
            let mut previous_pos = 0i32;
            let mut previous_off = 0i32;
            for _ in 0..freq {
                let position = if has_positions { field.positions[pos] } else { 0 };
                let start_offset = field.start_offsets[pos];
                let bias = (cpt * position.wrapping_sub(previous_pos) as f32) as i32;
                writer.add(i64::from(start_offset) - i64::from(previous_off) - i64::from(bias))?;
                previous_pos = position;
                previous_off = start_offset;
                pos += 1;
            }
        }
    }
    out.write_raw(&writer.finish()?)?;

    let mut writer = BlockPackedWriter::new(block_size)?;
    for field in fields_of(docs).filter(|f| f.has(OFFSETS)) {
        let mut pos = 0usize;
        for (i, &freq) in field.freqs.iter().enumerate() {
            let term_length = i64::from(field.prefix_lengths[i] + field.suffix_lengths[i]);
            for _ in 0..freq {
                writer.add(i64::from(field.lengths[pos]) - term_length)?;
                pos += 1;
            }
        }
    }
    out.write_raw(&writer.finish()?)
}

fn flush_payload_lengths<W: StorageOutput>(
    out: &mut StructWriter<W>,
    docs: &[PendingDoc],
    block_size: usize,
) -> Result<()> {
    write_block_packed(
        out,
        block_size,
        fields_of(docs)
            .filter(|f| f.has(PAYLOADS))
            .flat_map(|f| f.payload_lengths.iter().map(|&l| i64::from(l))),
    )
}
