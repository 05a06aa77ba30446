//! Random-access decoding of term vectors.
//!
//! [`TermVectorsReader::get`] seeks to the chunk holding a document and
//! decodes the chunk metadata column by column. Every block-packed column
//! covers the whole chunk, so each one is walked in three phases: values of
//! the fields before the document are skipped (or summed when they size the
//! document's byte range), the document's own values are kept, and the rest
//! is drained so the stream ends up at the next column. Only the part of the
//! compressed blob that holds the document's term suffixes and payloads is
//! inflated.

use std::sync::Arc;

use log::{debug, trace};

use crate::codec::term_vectors::chunk_index::ChunkIndexReader;
use crate::codec::term_vectors::fields::{DocumentData, FieldData, TermVectorFields};
use crate::codec::term_vectors::{
    FLAGS_BITS, OFFSETS, PAYLOADS, POSITIONS, VECTORS_EXTENSION, VECTORS_INDEX_EXTENSION,
    data_codec_name, index_codec_name,
};
use crate::codec::{
    FormatVersion, IntegrityCheck, check_eof, check_footer, check_header, checksum_entire_file,
    retrieve_checksum,
};
use crate::compression::{CompressionMode, Decompressor};
use crate::error::{Result, TesseraError};
use crate::index::{DocId, FieldInfos, SegmentInfo, segment_file_name};
use crate::storage::structured::StructReader;
use crate::storage::{Storage, StorageInput};
use crate::util::block_packed::BlockPackedReaderIterator;
use crate::util::packed::{self, PackedReader, bits_required};

/// Flags of every field occurrence of a chunk, as stored.
#[derive(Debug)]
enum FlagsEncoding {
    /// One value per distinct field number, looked up through the field number offsets.
    PerField(PackedReader),
    /// One value per (document, field) occurrence.
    PerOccurrence(PackedReader),
}

impl FlagsEncoding {
    fn read<R: StorageInput>(
        input: &mut StructReader<R>,
        packed_version: u32,
        distinct_fields: usize,
        total_fields: usize,
    ) -> Result<Self> {
        match input.read_u8()? {
            0 => Ok(FlagsEncoding::PerField(PackedReader::read(
                input,
                packed_version,
                distinct_fields,
                FLAGS_BITS,
            )?)),
            1 => Ok(FlagsEncoding::PerOccurrence(PackedReader::read(
                input,
                packed_version,
                total_fields,
                FLAGS_BITS,
            )?)),
            other => Err(TesseraError::corruption(format!(
                "unknown term vector flags selector {other}"
            ))),
        }
    }

    /// Flags of every occurrence, whichever way they were stored.
    fn into_canonical(self, field_num_offs: &[usize]) -> Vec<u8> {
        match self {
            FlagsEncoding::PerField(per_field) => field_num_offs
                .iter()
                .map(|&off| per_field.get(off) as u8)
                .collect(),
            FlagsEncoding::PerOccurrence(per_occurrence) => (0..field_num_offs.len())
                .map(|i| per_occurrence.get(i) as u8)
                .collect(),
        }
    }
}

/// Chunk-wide metadata shared by the posting columns.
struct ChunkFields {
    skip: usize,
    num_fields: usize,
    flags: Vec<u8>,
    num_terms: Vec<usize>,
    /// Frequencies of every term of the chunk.
    term_freqs: Vec<u32>,
    /// Index of the first term of the document in `term_freqs`.
    term_skip: usize,
    /// Per document field, cumulative frequencies of its terms.
    position_index: Vec<Vec<usize>>,
}

impl ChunkFields {
    /// Number of `flag` postings in the fields before the document.
    fn postings_to_skip(&self, flag: u8) -> u64 {
        let mut to_skip = 0u64;
        let mut term_index = 0usize;
        for i in 0..self.skip {
            let count = self.num_terms[i];
            if self.flags[i] & flag != 0 {
                to_skip += self.term_freqs[term_index..term_index + count]
                    .iter()
                    .map(|&f| u64::from(f))
                    .sum::<u64>();
            }
            term_index += count;
        }
        to_skip
    }

    fn has(&self, field: usize, flag: u8) -> bool {
        self.flags[self.skip + field] & flag != 0
    }

    fn total_freq(&self, field: usize) -> usize {
        self.position_index[field].last().copied().unwrap_or(0)
    }
}

/// Reads term vectors of one segment.
///
/// A reader holds a stream cursor and scratch state, so it serves one
/// thread at a time; [`try_clone`](Self::try_clone) makes independent readers.
#[derive(Debug)]
pub struct TermVectorsReader {
    storage: Arc<dyn Storage>,
    data_name: String,
    field_infos: Arc<FieldInfos>,
    index: Arc<ChunkIndexReader>,
    data: StructReader<Box<dyn StorageInput>>,
    version: FormatVersion,
    integrity: IntegrityCheck,
    packed_ints_version: u32,
    chunk_size: u64,
    block_size: usize,
    compression: CompressionMode,
    decompressor: Decompressor,
    block_iter: BlockPackedReaderIterator,
    num_chunks: u64,
    num_dirty_chunks: Option<u64>,
    scratch: Vec<i64>,
}

struct DataHeader {
    version: FormatVersion,
    packed_ints_version: u32,
    chunk_size: u64,
    block_size: usize,
    compression: CompressionMode,
    num_dirty_chunks: Option<u64>,
}

impl TermVectorsReader {
    /// Open the term-vector files of `segment`.
    ///
    /// Inputs opened before a failure are closed again.
    pub fn open(
        storage: Arc<dyn Storage>,
        segment: &SegmentInfo,
        suffix: &str,
        field_infos: Arc<FieldInfos>,
        format_name: &str,
    ) -> Result<Self> {
        let index_name = segment_file_name(&segment.name, suffix, VECTORS_INDEX_EXTENSION);
        let data_name = segment_file_name(&segment.name, suffix, VECTORS_EXTENSION);

        let (index_version, index) =
            Self::read_index(storage.as_ref(), &index_name, segment, suffix, format_name)?;

        let mut data = StructReader::new(storage.open_input(&data_name)?)?;
        let header = match Self::read_data_header(&mut data, &index, segment, suffix, format_name) {
            Ok(header) => header,
            Err(e) => {
                if let Err(close_err) = data.close() {
                    debug!("failed to close {data_name}: {close_err}");
                }
                return Err(e);
            }
        };
        if header.version != index_version {
            let _ = data.close();
            return Err(TesseraError::corruption(format!(
                "version mismatch: {index_name} has {index_version}, {data_name} has {}",
                header.version
            )));
        }

        let block_iter = BlockPackedReaderIterator::new(header.packed_ints_version, header.block_size)?;
        debug!(
            "opened term vectors {data_name}: version {}, {} docs, {} chunks ({} dirty), {} compression",
            header.version,
            index.num_docs(),
            index.num_chunks(),
            header
                .num_dirty_chunks
                .map_or_else(|| "unknown".to_string(), |n| n.to_string()),
            header.compression
        );

        Ok(TermVectorsReader {
            storage,
            data_name,
            field_infos,
            num_chunks: index.num_chunks() as u64,
            index: Arc::new(index),
            data,
            version: header.version,
            integrity: header.version.integrity_check(),
            packed_ints_version: header.packed_ints_version,
            chunk_size: header.chunk_size,
            block_size: header.block_size,
            compression: header.compression,
            decompressor: header.compression.new_decompressor(),
            block_iter,
            num_dirty_chunks: header.num_dirty_chunks,
            scratch: Vec::new(),
        })
    }

    /// Load and verify the whole index file.
    fn read_index(
        storage: &dyn Storage,
        index_name: &str,
        segment: &SegmentInfo,
        suffix: &str,
        format_name: &str,
    ) -> Result<(FormatVersion, ChunkIndexReader)> {
        let mut input = StructReader::with_checksum(storage.open_input(index_name)?)?;
        let result = (|| -> Result<(FormatVersion, ChunkIndexReader)> {
            let version = check_header(
                &mut input,
                &index_codec_name(format_name),
                FormatVersion::Start,
                FormatVersion::CURRENT,
                &segment.id,
                suffix,
            )?;
            let index = ChunkIndexReader::read(&mut input, segment.max_doc)?;
            if version.has_footer() {
                check_footer(&mut input)?;
            } else {
                check_eof(&input)?;
            }
            Ok((version, index))
        })();

        let closed = input.close();
        let loaded = result?;
        closed?;
        Ok(loaded)
    }

    fn read_data_header(
        data: &mut StructReader<Box<dyn StorageInput>>,
        index: &ChunkIndexReader,
        segment: &SegmentInfo,
        suffix: &str,
        format_name: &str,
    ) -> Result<DataHeader> {
        let version = check_header(
            data,
            &data_codec_name(format_name),
            FormatVersion::Start,
            FormatVersion::CURRENT,
            &segment.id,
            suffix,
        )?;

        let packed_ints_version = data.read_varint_u32()?;
        packed::check_version(packed_ints_version)?;
        let chunk_size = data.read_varint()?;
        let block_size = usize::try_from(data.read_varint()?)
            .map_err(|_| TesseraError::corruption("block size does not fit in memory"))?;
        BlockPackedReaderIterator::new(packed_ints_version, block_size)
            .map_err(|e| TesseraError::corruption(format!("invalid block size {block_size}: {e}")))?;
        let compression = CompressionMode::from_id(data.read_u8()?)?;

        let max_pointer = index.max_pointer();
        if max_pointer < data.position() || max_pointer > data.size() {
            return Err(TesseraError::corruption(format!(
                "max pointer {max_pointer} outside the chunk area {}..{}",
                data.position(),
                data.size()
            )));
        }

        let header_end = data.position();
        let mut num_dirty_chunks = None;
        if version.has_chunk_stats() {
            data.seek(max_pointer)?;
            let num_chunks = data.read_varint()?;
            let dirty = data.read_varint()?;
            if dirty > num_chunks {
                return Err(TesseraError::corruption(format!(
                    "{dirty} dirty chunks out of {num_chunks}"
                )));
            }
            if num_chunks != index.num_chunks() as u64 {
                return Err(TesseraError::corruption(format!(
                    "data file records {num_chunks} chunks, index has {}",
                    index.num_chunks()
                )));
            }
            num_dirty_chunks = Some(dirty);
        }
        if version.has_footer() {
            retrieve_checksum(data)?;
        }
        data.seek(header_end)?;

        Ok(DataHeader {
            version,
            packed_ints_version,
            chunk_size,
            block_size,
            compression,
            num_dirty_chunks,
        })
    }

    /// Independent reader over the same files with fresh scratch state.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(TermVectorsReader {
            storage: Arc::clone(&self.storage),
            data_name: self.data_name.clone(),
            field_infos: Arc::clone(&self.field_infos),
            index: Arc::clone(&self.index),
            data: self.data.try_clone()?,
            version: self.version,
            integrity: self.integrity,
            packed_ints_version: self.packed_ints_version,
            chunk_size: self.chunk_size,
            block_size: self.block_size,
            compression: self.compression,
            decompressor: self.compression.new_decompressor(),
            block_iter: BlockPackedReaderIterator::new(self.packed_ints_version, self.block_size)?,
            num_chunks: self.num_chunks,
            num_dirty_chunks: self.num_dirty_chunks,
            scratch: Vec::new(),
        })
    }

    /// Verify the data file: its checksum, or only its length for formats
    /// without footers.
    pub fn check_integrity(&self) -> Result<()> {
        match self.integrity {
            IntegrityCheck::Checksum => {
                checksum_entire_file(self.storage.open_input(&self.data_name)?)?;
            }
            IntegrityCheck::LengthOnly => {
                let size = self.storage.file_size(&self.data_name)?;
                if size != self.index.max_pointer() {
                    return Err(TesseraError::corruption(format!(
                        "{} is {size} bytes, expected {}",
                        self.data_name,
                        self.index.max_pointer()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn num_docs(&self) -> u32 {
        self.index.num_docs()
    }

    pub fn num_chunks(&self) -> u64 {
        self.num_chunks
    }

    /// Incomplete chunks forced out at the end of writing, if the format records them.
    pub fn num_dirty_chunks(&self) -> Option<u64> {
        self.num_dirty_chunks
    }

    pub fn version(&self) -> FormatVersion {
        self.version
    }

    pub fn compression(&self) -> CompressionMode {
        self.compression
    }

    /// Chunk size the files were written with.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn packed_ints_version(&self) -> u32 {
        self.packed_ints_version
    }

    pub fn field_infos(&self) -> &Arc<FieldInfos> {
        &self.field_infos
    }

    pub fn close(self) -> Result<()> {
        self.data.close()
    }

    /// Term vectors of `doc`, or `None` if it has none.
    pub fn get(&mut self, doc: DocId) -> Result<Option<TermVectorFields>> {
        let num_docs = self.index.num_docs();
        if doc >= num_docs {
            return Err(TesseraError::invalid_argument(format!(
                "doc {doc} is out of bounds for {num_docs} docs"
            )));
        }

        let start_pointer = self.index.start_pointer(doc)?;
        self.data.seek(start_pointer)?;

        let doc_base = self.data.read_varint_u32()?;
        let chunk_docs = self.data.read_varint_u32()?;
        let chunk_end = u64::from(doc_base) + u64::from(chunk_docs);
        if doc < doc_base || u64::from(doc) >= chunk_end || chunk_end > u64::from(num_docs) {
            return Err(TesseraError::corruption(format!(
                "doc_base={doc_base}, chunk_docs={chunk_docs}, doc={doc}, num_docs={num_docs}"
            )));
        }

        // Field counts.
        let (skip, num_fields, total_fields) = if chunk_docs == 1 {
            let n = to_usize(self.data.read_varint()?, "field count")?;
            (0, n, n)
        } else {
            self.block_iter.reset(u64::from(chunk_docs));
            let mut sum = 0usize;
            for _ in doc_base..doc {
                sum = checked_add(sum, self.next_count("field count")?)?;
            }
            let num_fields = self.next_count("field count")?;
            let mut total = checked_add(sum, num_fields)?;
            for _ in (doc + 1)..(doc_base + chunk_docs) {
                total = checked_add(total, self.next_count("field count")?)?;
            }
            (sum, num_fields, total)
        };

        if num_fields == 0 {
            trace!("doc {doc} has no term vectors");
            return Ok(None);
        }

        // Field numbers, field number offsets and flags.
        let token = self.data.read_u8()?;
        let bits_per_field_num = u32::from(token & 0x1F);
        let mut distinct_fields = usize::from(token >> 5);
        if distinct_fields == 0x07 {
            distinct_fields = checked_add(distinct_fields, to_usize(self.data.read_varint()?, "field count")?)?;
        }
        distinct_fields += 1;
        if distinct_fields > total_fields {
            return Err(TesseraError::corruption(format!(
                "{distinct_fields} distinct fields in a chunk of {total_fields} fields"
            )));
        }
        let field_nums = PackedReader::read(
            &mut self.data,
            self.packed_ints_version,
            distinct_fields,
            bits_per_field_num,
        )?;

        let offs_bits = bits_required((distinct_fields - 1) as u64);
        let offs = PackedReader::read(&mut self.data, self.packed_ints_version, total_fields, offs_bits)?;
        let field_num_offs = (0..total_fields)
            .map(|i| {
                let off = offs.get(i) as usize;
                if off >= distinct_fields {
                    return Err(TesseraError::corruption(format!(
                        "field number offset {off} out of {distinct_fields}"
                    )));
                }
                Ok(off)
            })
            .collect::<Result<Vec<usize>>>()?;

        let flags = FlagsEncoding::read(
            &mut self.data,
            self.packed_ints_version,
            distinct_fields,
            total_fields,
        )?
        .into_canonical(&field_num_offs);

        // Term counts.
        let bits_per_num_terms = self.data.read_varint_u32()?;
        if bits_per_num_terms > 32 {
            return Err(TesseraError::corruption(format!(
                "{bits_per_num_terms} bits per term count"
            )));
        }
        let num_terms_packed = PackedReader::read(
            &mut self.data,
            self.packed_ints_version,
            total_fields,
            bits_per_num_terms,
        )?;
        let num_terms: Vec<usize> = num_terms_packed.to_vec().into_iter().map(|n| n as usize).collect();
        let total_terms = num_terms.iter().try_fold(0usize, |acc, &n| checked_add(acc, n))?;
        let term_skip = checked_sum(&num_terms[..skip])?;
        let doc_num_terms: Vec<usize> = num_terms[skip..skip + num_fields].to_vec();

        // Prefix lengths.
        self.block_iter.reset(total_terms as u64);
        self.block_iter.skip(&mut self.data, term_skip as u64)?;
        let mut prefix_lengths = Vec::with_capacity(num_fields);
        for &count in &doc_num_terms {
            prefix_lengths.push(self.read_u32s(count, "prefix length")?);
        }
        self.block_iter.drain(&mut self.data)?;

        // Suffix lengths, summed into the document's byte range.
        self.block_iter.reset(total_terms as u64);
        let doc_off = self.sum_next(term_skip, "suffix length")?;
        let mut suffix_lengths = Vec::with_capacity(num_fields);
        let mut field_lengths = Vec::with_capacity(num_fields);
        for &count in &doc_num_terms {
            let lengths = self.read_u32s(count, "suffix length")?;
            field_lengths.push(lengths.iter().map(|&l| l as usize).sum::<usize>());
            suffix_lengths.push(lengths);
        }
        let doc_len = checked_sum(&field_lengths)?;
        let rest = self.block_iter.remaining() as usize;
        let total_len = checked_add(checked_add(doc_off, doc_len)?, self.sum_next(rest, "suffix length")?)?;

        // Term frequencies.
        self.block_iter.reset(total_terms as u64);
        let term_freqs = self
            .read_counts(total_terms, "term frequency")?
            .into_iter()
            .map(|f| {
                u32::try_from(f + 1).map_err(|_| TesseraError::corruption(format!("term frequency {f} too large")))
            })
            .collect::<Result<Vec<u32>>>()?;

        // Posting totals per flag and the document's position index.
        let mut total_positions = 0u64;
        let mut total_offsets = 0u64;
        let mut total_payloads = 0u64;
        let mut term_index = 0usize;
        for i in 0..total_fields {
            let f = flags[i];
            for &freq in &term_freqs[term_index..term_index + num_terms[i]] {
                let freq = u64::from(freq);
                if f & POSITIONS != 0 {
                    total_positions += freq;
                }
                if f & OFFSETS != 0 {
                    total_offsets += freq;
                }
                if f & PAYLOADS != 0 {
                    total_payloads += freq;
                }
            }
            term_index += num_terms[i];
        }

        let mut position_index = Vec::with_capacity(num_fields);
        let mut term_index = term_skip;
        for &count in &doc_num_terms {
            let mut index = Vec::with_capacity(count + 1);
            index.push(0usize);
            for &freq in &term_freqs[term_index..term_index + count] {
                let last = index[index.len() - 1];
                index.push(checked_add(last, freq as usize)?);
            }
            position_index.push(index);
            term_index += count;
        }

        let chunk = ChunkFields {
            skip,
            num_fields,
            flags,
            num_terms,
            term_freqs,
            term_skip,
            position_index,
        };

        // Positions, still delta-coded per term.
        let mut positions = if total_positions > 0 {
            self.read_postings(&chunk, POSITIONS, total_positions)?
        } else {
            vec![None; num_fields]
        };

        // Offsets.
        let (start_offsets, lengths) = if total_offsets > 0 {
            let mut chars_per_term = Vec::with_capacity(distinct_fields);
            for _ in 0..distinct_fields {
                chars_per_term.push(f32::from_bits(self.data.read_u32()?));
            }
            let mut start_offsets = self.read_postings(&chunk, OFFSETS, total_offsets)?;
            let mut lengths = self.read_postings(&chunk, OFFSETS, total_offsets)?;

            for i in 0..num_fields {
                let (Some(starts), Some(lens)) = (start_offsets[i].as_mut(), lengths[i].as_mut())
                else {
                    continue;
                };
                if let Some(deltas) = positions[i].as_ref() {
                    let cpt = chars_per_term[field_num_offs[skip + i]];
                    for (start, &delta) in starts.iter_mut().zip(deltas) {
                        *start = start.wrapping_add((cpt * delta as f32) as i32);
                    }
                }
                let index = &chunk.position_index[i];
                for j in 0..doc_num_terms[i] {
                    let term_length = prefix_lengths[i][j].wrapping_add(suffix_lengths[i][j]) as i32;
                    let (from, to) = (index[j], index[j + 1]);
                    lens[from] = lens[from].wrapping_add(term_length);
                    for k in (from + 1)..to {
                        starts[k] = starts[k].wrapping_add(starts[k - 1]);
                        lens[k] = lens[k].wrapping_add(term_length);
                    }
                }
            }
            (start_offsets, lengths)
        } else {
            (vec![None; num_fields], vec![None; num_fields])
        };

        // Positions are delta-decoded only once offsets no longer need the deltas.
        for (i, field_positions) in positions.iter_mut().enumerate() {
            let Some(field_positions) = field_positions.as_mut() else {
                continue;
            };
            let index = &chunk.position_index[i];
            for j in 0..doc_num_terms[i] {
                for k in (index[j] + 1)..index[j + 1] {
                    field_positions[k] = field_positions[k].wrapping_add(field_positions[k - 1]);
                }
            }
        }

        // Payload lengths.
        let mut payload_index: Vec<Option<Vec<usize>>> = vec![None; num_fields];
        let mut payload_off = 0usize;
        let mut payload_len = 0usize;
        let mut total_payload_len = 0usize;
        if total_payloads > 0 {
            self.block_iter.reset(total_payloads);
            let to_skip = chunk.postings_to_skip(PAYLOADS) as usize;
            payload_off = self.sum_next(to_skip, "payload length")?;

            for (i, slot) in payload_index.iter_mut().enumerate() {
                if !chunk.has(i, PAYLOADS) {
                    continue;
                }
                let total_freq = chunk.total_freq(i);
                let mut index = Vec::with_capacity(total_freq + 1);
                index.push(payload_len);
                for length in self.read_counts(total_freq, "payload length")? {
                    payload_len = checked_add(payload_len, length)?;
                    index.push(payload_len);
                }
                *slot = Some(index);
            }

            let rest = self.block_iter.remaining() as usize;
            total_payload_len = checked_add(
                checked_add(payload_off, payload_len)?,
                self.sum_next(rest, "payload length")?,
            )?;
        }

        // One decompression for the document's suffixes and payloads.
        let mut bytes = Vec::new();
        self.decompressor.decompress(
            &mut self.data,
            checked_add(total_len, total_payload_len)?,
            checked_add(doc_off, payload_off)?,
            checked_add(doc_len, payload_len)?,
            &mut bytes,
        )?;
        debug_assert_eq!(field_lengths.iter().sum::<usize>(), doc_len);
        if bytes.len() != doc_len + payload_len {
            return Err(TesseraError::corruption(format!(
                "decompressed {} bytes, expected {}",
                bytes.len(),
                doc_len + payload_len
            )));
        }

        let mut fields = Vec::with_capacity(num_fields);
        let mut suffix_start = 0usize;
        let mut prefix_lengths = prefix_lengths.into_iter();
        let mut suffix_lengths = suffix_lengths.into_iter();
        let mut positions = positions.into_iter();
        let mut start_offsets = start_offsets.into_iter();
        let mut lengths = lengths.into_iter();
        let mut payload_index = payload_index.into_iter();
        let mut position_index = chunk.position_index.into_iter();
        let mut term_index = chunk.term_skip;

        for i in 0..num_fields {
            let field_num = field_nums.get(field_num_offs[skip + i]) as u32;
            let name = self
                .field_infos
                .field_info(field_num)
                .map(|info| info.name.clone())
                .ok_or_else(|| {
                    TesseraError::corruption(format!("unknown field number {field_num}"))
                })?;
            let count = doc_num_terms[i];
            let term_freqs = chunk.term_freqs[term_index..term_index + count].to_vec();
            term_index += count;

            fields.push(FieldData {
                field_num,
                name,
                flags: chunk.flags[skip + i],
                prefix_lengths: prefix_lengths.next().unwrap_or_default(),
                suffix_lengths: suffix_lengths.next().unwrap_or_default(),
                term_freqs,
                position_index: position_index.next().unwrap_or_default(),
                positions: positions.next().flatten(),
                start_offsets: start_offsets.next().flatten(),
                lengths: lengths.next().flatten(),
                payload_index: payload_index.next().flatten(),
                suffix_start,
            });
            suffix_start += field_lengths[i];
        }

        trace!(
            "decoded doc {doc}: {num_fields} fields, {doc_len} term bytes, {payload_len} payload bytes"
        );
        Ok(Some(TermVectorFields::new(DocumentData {
            bytes,
            doc_len,
            fields,
        })))
    }

    /// Next block value as a non-negative count.
    fn next_count(&mut self, what: &str) -> Result<usize> {
        let value = self.block_iter.next(&mut self.data)?;
        to_usize_signed(value, what)
    }

    /// Read `count` non-negative values.
    fn read_counts(&mut self, count: usize, what: &str) -> Result<Vec<usize>> {
        self.scratch.clear();
        self.block_iter
            .read_into(&mut self.data, count, &mut self.scratch)?;
        self.scratch
            .iter()
            .map(|&v| to_usize_signed(v, what))
            .collect()
    }

    fn read_u32s(&mut self, count: usize, what: &str) -> Result<Vec<u32>> {
        self.read_counts(count, what)?
            .into_iter()
            .map(|v| {
                u32::try_from(v).map_err(|_| TesseraError::corruption(format!("{what} {v} too large")))
            })
            .collect()
    }

    /// Sum of the next `count` non-negative values.
    fn sum_next(&mut self, count: usize, what: &str) -> Result<usize> {
        let mut sum = 0usize;
        let mut left = count;
        while left > 0 {
            let batch = self.block_iter.next_batch(&mut self.data, left)?;
            left -= batch.len();
            for &v in batch {
                sum = checked_add(sum, to_usize_signed(v, what)?)?;
            }
        }
        Ok(sum)
    }

    /// Decode one posting column (`flag` postings, `total` values in the chunk)
    /// for the document's fields, leaving the stream after the column.
    fn read_postings(
        &mut self,
        chunk: &ChunkFields,
        flag: u8,
        total: u64,
    ) -> Result<Vec<Option<Vec<i32>>>> {
        self.block_iter.reset(total);
        self.block_iter
            .skip(&mut self.data, chunk.postings_to_skip(flag))?;

        let mut postings = Vec::with_capacity(chunk.num_fields);
        for i in 0..chunk.num_fields {
            if !chunk.has(i, flag) {
                postings.push(None);
                continue;
            }
            self.scratch.clear();
            self.block_iter
                .read_into(&mut self.data, chunk.total_freq(i), &mut self.scratch)?;
            let values = self
                .scratch
                .iter()
                .map(|&v| {
                    i32::try_from(v).map_err(|_| {
                        TesseraError::corruption(format!("posting value {v} does not fit in 32 bits"))
                    })
                })
                .collect::<Result<Vec<i32>>>()?;
            postings.push(Some(values));
        }

        self.block_iter.drain(&mut self.data)?;
        Ok(postings)
    }
}

fn to_usize(value: u64, what: &str) -> Result<usize> {
    usize::try_from(value).map_err(|_| TesseraError::corruption(format!("{what} {value} too large")))
}

fn to_usize_signed(value: i64, what: &str) -> Result<usize> {
    usize::try_from(value).map_err(|_| TesseraError::corruption(format!("invalid {what} {value}")))
}

fn checked_add(a: usize, b: usize) -> Result<usize> {
    a.checked_add(b)
        .ok_or_else(|| TesseraError::corruption("chunk sizes overflow"))
}

fn checked_sum(values: &[usize]) -> Result<usize> {
    values.iter().try_fold(0usize, |acc, &v| checked_add(acc, v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::term_vectors::{
        TermPosting, TermVectorDocument, TermVectorField, TermVectorsConfig, TermVectorsFormat,
    };
    use crate::index::{PostingsEnum, TermsEnum};
    use crate::storage::memory::MemoryStorage;
    use crate::storage::structured::StructWriter;

    fn write_docs(
        storage: &Arc<MemoryStorage>,
        config: TermVectorsConfig,
        docs: &[TermVectorDocument],
    ) -> (SegmentInfo, Arc<FieldInfos>) {
        let segment = SegmentInfo::new("_1", docs.len() as u32);
        let mut field_infos = FieldInfos::new();
        for doc in docs {
            doc.register_fields(&mut field_infos).unwrap();
        }
        let format = TermVectorsFormat::new(config).unwrap();
        let mut writer = format.writer(storage.clone(), &segment, "").unwrap();
        for doc in docs {
            writer.add_document(doc, &field_infos).unwrap();
        }
        writer.finish(docs.len() as u32).unwrap();
        writer.close().unwrap();
        (segment, Arc::new(field_infos))
    }

    fn open(
        storage: &Arc<MemoryStorage>,
        segment: &SegmentInfo,
        field_infos: &Arc<FieldInfos>,
        config: &TermVectorsConfig,
    ) -> Result<TermVectorsReader> {
        TermVectorsReader::open(
            storage.clone(),
            segment,
            "",
            Arc::clone(field_infos),
            &config.format_name,
        )
    }

    fn sample_docs() -> Vec<TermVectorDocument> {
        let mut f = TermVectorField::new("f", true, true, false);
        f.add_posting(b"ab", TermPosting::new(0, 0, 2));
        f.add_posting(b"abc", TermPosting::new(1, 3, 6));
        f.add_posting(b"abc", TermPosting::new(2, 7, 10));
        let first = TermVectorDocument { fields: vec![f] };
        vec![first, TermVectorDocument::new()]
    }

    #[test]
    fn test_get_decodes_terms_and_postings() {
        let storage = Arc::new(MemoryStorage::new());
        let config = TermVectorsConfig::default();
        let docs = sample_docs();
        let (segment, field_infos) = write_docs(&storage, config.clone(), &docs);

        let mut reader = open(&storage, &segment, &field_infos, &config).unwrap();
        assert_eq!(reader.num_docs(), 2);
        assert_eq!(reader.num_chunks(), 1);
        assert_eq!(reader.num_dirty_chunks(), Some(1));

        let fields = reader.get(0).unwrap().unwrap();
        let terms = fields.field_terms("f").unwrap();
        let mut terms_enum = terms.terms_enum();
        assert_eq!(terms_enum.next().unwrap(), Some(b"ab".as_slice()));
        assert_eq!(terms_enum.next().unwrap(), Some(b"abc".as_slice()));
        let mut postings = terms_enum.postings_enum(None).unwrap();
        assert_eq!(postings.next_doc().unwrap(), 0);
        assert_eq!(postings.freq().unwrap(), 2);
        assert_eq!(postings.next_position().unwrap(), 1);
        assert_eq!(postings.start_offset().unwrap(), 3);
        assert_eq!(postings.end_offset().unwrap(), 6);
        assert_eq!(postings.next_position().unwrap(), 2);
        assert_eq!(postings.start_offset().unwrap(), 7);
        assert_eq!(postings.end_offset().unwrap(), 10);
        assert_eq!(terms_enum.next().unwrap(), None);

        assert_eq!(fields.to_document().unwrap(), docs[0]);
        assert!(reader.get(1).unwrap().is_none());
        assert!(reader.get(2).unwrap_err().is_invalid_argument());
        reader.check_integrity().unwrap();
        reader.close().unwrap();
    }

    #[test]
    fn test_clone_reads_independently() {
        let storage = Arc::new(MemoryStorage::new());
        let config = TermVectorsConfig::default();
        let docs = sample_docs();
        let (segment, field_infos) = write_docs(&storage, config.clone(), &docs);

        let mut reader = open(&storage, &segment, &field_infos, &config).unwrap();
        let mut clone = reader.try_clone().unwrap();
        assert!(reader.get(1).unwrap().is_none());
        let a = clone.get(0).unwrap().unwrap().to_document().unwrap();
        let b = reader.get(0).unwrap().unwrap().to_document().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unknown_flags_selector_is_corruption() {
        let storage = MemoryStorage::new();
        let mut out = StructWriter::new(storage.create_output("flags").unwrap());
        out.write_u8(2).unwrap();
        out.close().unwrap();

        let mut input = StructReader::new(storage.open_input("flags").unwrap()).unwrap();
        let err = FlagsEncoding::read(&mut input, packed::PACKED_VERSION_CURRENT, 1, 1).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_flags_are_canonicalized() {
        let mut bytes = Vec::new();
        packed::pack_into(&[3, 1], FLAGS_BITS, &mut bytes).unwrap();
        let per_field = PackedReader::from_bytes(bytes, 2, FLAGS_BITS).unwrap();
        let flags = FlagsEncoding::PerField(per_field).into_canonical(&[1, 0, 1]);
        assert_eq!(flags, vec![1, 3, 1]);
    }

    #[test]
    fn test_wrong_format_name_is_rejected() {
        let storage = Arc::new(MemoryStorage::new());
        let config = TermVectorsConfig::default();
        let (segment, field_infos) = write_docs(&storage, config, &sample_docs());

        let other = TermVectorsConfig {
            format_name: "Other".to_string(),
            ..Default::default()
        };
        assert!(open(&storage, &segment, &field_infos, &other).is_err());
    }

    #[test]
    fn test_start_version_checks_length() {
        let storage = Arc::new(MemoryStorage::new());
        let config = TermVectorsConfig {
            format_version: FormatVersion::Start,
            ..Default::default()
        };
        let (segment, field_infos) = write_docs(&storage, config.clone(), &sample_docs());

        let reader = open(&storage, &segment, &field_infos, &config).unwrap();
        assert_eq!(reader.num_dirty_chunks(), None);
        reader.check_integrity().unwrap();
        reader.close().unwrap();

        let mut bytes = storage.read_all("_1.tvd").unwrap();
        bytes.push(0);
        storage.write_all("_1.tvd", bytes).unwrap();
        let reader = open(&storage, &segment, &field_infos, &config).unwrap();
        assert!(reader.check_integrity().unwrap_err().is_corruption());
    }

    #[test]
    fn test_missing_field_info_is_corruption() {
        let storage = Arc::new(MemoryStorage::new());
        let config = TermVectorsConfig::default();
        let (segment, _) = write_docs(&storage, config.clone(), &sample_docs());

        let mut reader = open(&storage, &segment, &Arc::new(FieldInfos::new()), &config).unwrap();
        assert!(reader.get(0).unwrap_err().is_corruption());
    }
}
