use std::sync::Arc;

use bit_vec::BitVec;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use tessera::codec::term_vectors::{
    TermPosting, TermVectorDocument, TermVectorField, TermVectorsConfig, TermVectorsFormat,
    TermVectorsReader,
};
use tessera::codec::{FormatVersion, header_length};
use tessera::compression::CompressionMode;
use tessera::index::{
    FieldInfo, FieldInfos, Fields, NO_MORE_DOCS, PostingsEnum, SeekStatus, SegmentInfo, Terms,
    TermsEnum,
};
use tessera::storage::Storage;
use tessera::storage::file::FileStorage;
use tessera::storage::memory::MemoryStorage;

const FIELD_NAMES: [&str; 5] = ["body", "title", "tags", "author", "notes"];

fn field_infos_for(docs: &[TermVectorDocument]) -> FieldInfos {
    let mut field_infos = FieldInfos::new();
    for name in FIELD_NAMES {
        field_infos.add_or_get(name).unwrap();
    }
    for doc in docs {
        doc.register_fields(&mut field_infos).unwrap();
    }
    field_infos
}

fn write_segment(
    storage: Arc<dyn Storage>,
    config: TermVectorsConfig,
    block_shift: Option<u8>,
    docs: &[TermVectorDocument],
) -> (SegmentInfo, Arc<FieldInfos>) {
    write_segment_with(storage, config, block_shift, docs, field_infos_for(docs))
}

fn write_segment_with(
    storage: Arc<dyn Storage>,
    config: TermVectorsConfig,
    block_shift: Option<u8>,
    docs: &[TermVectorDocument],
    field_infos: FieldInfos,
) -> (SegmentInfo, Arc<FieldInfos>) {
    let segment = SegmentInfo::new("_0", docs.len() as u32);
    let compression = config.compression;
    let format = TermVectorsFormat::new(config).unwrap();

    let mut writer = format.writer(storage, &segment, "").unwrap();
    if let Some(shift) = block_shift {
        let compressor = compression.new_compressor().with_block_shift(shift).unwrap();
        writer = writer.with_compressor(compressor).unwrap();
    }
    for doc in docs {
        writer.add_document(doc, &field_infos).unwrap();
    }
    writer.finish(docs.len() as u32).unwrap();
    writer.close().unwrap();
    (segment, Arc::new(field_infos))
}

fn open_reader(
    storage: Arc<dyn Storage>,
    config: &TermVectorsConfig,
    segment: &SegmentInfo,
    field_infos: &Arc<FieldInfos>,
) -> TermVectorsReader {
    TermVectorsFormat::new(config.clone())
        .unwrap()
        .reader(storage, segment, "", Arc::clone(field_infos))
        .unwrap()
}

fn read_document(reader: &mut TermVectorsReader, doc: u32) -> Option<TermVectorDocument> {
    reader
        .get(doc)
        .unwrap()
        .map(|fields| fields.to_document().unwrap())
}

fn random_term(rng: &mut StdRng) -> Vec<u8> {
    let len = rng.random_range(1..7);
    (0..len).map(|_| b"abcde"[rng.random_range(0..5)]).collect()
}

fn random_field(rng: &mut StdRng, name: &str) -> TermVectorField {
    let has_positions = rng.random_bool(0.7);
    let has_offsets = rng.random_bool(0.6);
    let has_payloads = rng.random_bool(0.3);
    let mut field = TermVectorField::new(name, has_positions, has_offsets, has_payloads);

    let num_terms = rng.random_range(0..12);
    let mut offset = 0i32;
    let mut position = 0i32;
    for _ in 0..num_terms {
        let term = random_term(rng);
        if field.term(&term).is_some() {
            continue;
        }
        let freq = rng.random_range(1..5);
        for _ in 0..freq {
            position += rng.random_range(0..4);
            offset += rng.random_range(0..9);
            let end = offset + term.len() as i32 + rng.random_range(0..3);
            let mut posting = TermPosting::new(
                if has_positions { position } else { -1 },
                if has_offsets { offset } else { -1 },
                if has_offsets { end } else { -1 },
            );
            if has_payloads && rng.random_bool(0.7) {
                let payload: Vec<u8> = (0..rng.random_range(1..6)).map(|_| rng.random()).collect();
                posting.payload = Some(payload);
            }
            field.add_posting(&term, posting);
        }
    }
    field
}

fn random_documents(seed: u64, count: usize) -> Vec<TermVectorDocument> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let mut doc = TermVectorDocument::new();
            if rng.random_bool(0.1) {
                return doc;
            }
            for name in FIELD_NAMES {
                if rng.random_bool(0.5) {
                    doc.add_field(random_field(&mut rng, name));
                }
            }
            doc
        })
        .collect()
}

/// What a reader returns for `doc`: documents without fields have no vectors.
fn expected(doc: &TermVectorDocument) -> Option<TermVectorDocument> {
    if doc.is_empty() { None } else { Some(doc.clone()) }
}

#[test]
fn test_random_documents_round_trip() {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let config = TermVectorsConfig {
        chunk_size: 256,
        max_docs_per_chunk: 16,
        ..Default::default()
    };
    let docs = random_documents(42, 300);
    let (segment, field_infos) = write_segment(storage.clone(), config.clone(), Some(6), &docs);

    let mut reader = open_reader(storage, &config, &segment, &field_infos);
    assert_eq!(reader.num_docs(), 300);
    assert!(reader.num_chunks() > 300 / 16);

    for (i, doc) in docs.iter().enumerate() {
        assert_eq!(read_document(&mut reader, i as u32), expected(doc), "doc {i}");
    }
    // Random access must not depend on the previous read.
    for i in (0..docs.len()).rev().step_by(7) {
        assert_eq!(read_document(&mut reader, i as u32), expected(&docs[i]), "doc {i}");
    }
    reader.check_integrity().unwrap();
}

#[test]
fn test_compression_modes_round_trip() {
    let docs = random_documents(7, 40);
    for compression in [
        CompressionMode::Fast,
        CompressionMode::HighCompression,
        CompressionMode::None,
    ] {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let config = TermVectorsConfig {
            compression,
            ..Default::default()
        };
        let (segment, field_infos) = write_segment(storage.clone(), config.clone(), None, &docs);
        let mut reader = open_reader(storage, &config, &segment, &field_infos);
        assert_eq!(reader.compression(), compression);
        for (i, doc) in docs.iter().enumerate() {
            assert_eq!(read_document(&mut reader, i as u32), expected(doc));
        }
    }
}

#[test]
fn test_shared_prefix_terms() {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let config = TermVectorsConfig::default();

    let mut field = TermVectorField::new("body", true, true, false);
    field.add_posting(b"ab", TermPosting::new(0, 0, 2));
    field.add_posting(b"abc", TermPosting::new(1, 3, 6));
    field.add_posting(b"abc", TermPosting::new(2, 7, 10));
    let docs = vec![
        TermVectorDocument {
            fields: vec![field],
        },
        TermVectorDocument::new(),
    ];
    let (segment, field_infos) = write_segment(storage.clone(), config.clone(), None, &docs);
    let mut reader = open_reader(storage, &config, &segment, &field_infos);

    let fields = reader.get(0).unwrap().unwrap();
    assert_eq!(fields.size(), 1);
    assert_eq!(fields.field_names(), vec!["body"]);
    assert!(fields.terms("title").unwrap().is_none());

    let terms = fields.terms("body").unwrap().unwrap();
    assert_eq!(terms.size(), Some(2));
    assert_eq!(terms.sum_total_term_freq(), Some(3));
    assert_eq!(terms.doc_count(), Some(1));
    assert!(terms.has_positions());
    assert!(terms.has_offsets());
    assert!(!terms.has_payloads());

    let mut terms_enum = terms.iterator().unwrap();
    assert_eq!(terms_enum.seek_ceil(b"abb").unwrap(), SeekStatus::NotFound);
    assert_eq!(terms_enum.term(), Some(b"abc".as_slice()));
    assert_eq!(terms_enum.total_term_freq().unwrap(), 2);
    assert_eq!(terms_enum.seek_ceil(b"a").unwrap(), SeekStatus::NotFound);
    assert_eq!(terms_enum.term(), Some(b"ab".as_slice()));
    assert_eq!(terms_enum.seek_ceil(b"b").unwrap(), SeekStatus::End);
    assert!(terms_enum.seek_exact(b"abc").unwrap());
    assert!(!terms_enum.seek_exact(b"abd").unwrap());

    assert!(reader.get(1).unwrap().is_none());
}

#[test]
fn test_offsets_without_positions() {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let config = TermVectorsConfig::default();

    let mut field = TermVectorField::new("body", false, true, false);
    field.add_posting(b"hello", TermPosting::new(-1, 0, 5));
    field.add_posting(b"hello", TermPosting::new(-1, 12, 17));
    field.add_posting(b"world", TermPosting::new(-1, 6, 11));
    let docs = vec![TermVectorDocument {
        fields: vec![field],
    }];
    let (segment, field_infos) = write_segment(storage.clone(), config.clone(), None, &docs);
    let mut reader = open_reader(storage, &config, &segment, &field_infos);

    let fields = reader.get(0).unwrap().unwrap();
    let mut terms_enum = fields.field_terms("body").unwrap().terms_enum();
    assert!(terms_enum.seek_exact(b"hello").unwrap());
    let mut postings = terms_enum.postings_enum(None).unwrap();
    assert_eq!(postings.next_doc().unwrap(), 0);
    assert_eq!(postings.next_position().unwrap(), -1);
    assert_eq!((postings.start_offset().unwrap(), postings.end_offset().unwrap()), (0, 5));
    assert_eq!(postings.next_position().unwrap(), -1);
    assert_eq!((postings.start_offset().unwrap(), postings.end_offset().unwrap()), (12, 17));
    assert_eq!(postings.payload().unwrap(), None);

    assert_eq!(fields.to_document().unwrap(), docs[0]);
}

#[test]
fn test_field_flags_uniform_and_varying() {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());

    let field = |has_positions: bool, has_offsets: bool| {
        let mut field = TermVectorField::new("body", has_positions, has_offsets, false);
        field.add_posting(
            b"term",
            TermPosting::new(
                if has_positions { 3 } else { -1 },
                if has_offsets { 10 } else { -1 },
                if has_offsets { 14 } else { -1 },
            ),
        );
        field
    };
    let doc = |fields: Vec<TermVectorField>| TermVectorDocument { fields };

    // Same flags for every occurrence of "body" in the first chunk, different
    // flags across documents of the second.
    let docs = vec![
        doc(vec![field(true, true)]),
        doc(vec![field(true, true)]),
        doc(vec![field(true, false)]),
        doc(vec![field(false, true)]),
        doc(vec![field(false, false)]),
    ];
    // Force a chunk boundary after the first two documents.
    let config = TermVectorsConfig {
        max_docs_per_chunk: 2,
        ..Default::default()
    };
    let (segment, field_infos) = write_segment(storage.clone(), config.clone(), None, &docs);
    let mut reader = open_reader(storage, &config, &segment, &field_infos);
    assert_eq!(reader.num_chunks(), 3);
    for (i, doc) in docs.iter().enumerate() {
        assert_eq!(read_document(&mut reader, i as u32).as_ref(), Some(doc), "doc {i}");
    }
}

#[test]
fn test_many_distinct_fields_per_chunk() {
    // Half of the fields get small numbers and half sit past `padding`, so the
    // packed field numbers of a chunk need more than 8 bits.
    let names: Vec<String> = (0..12).map(|i| format!("f{i:02}")).collect();
    let field_infos_with = |padding: u32| {
        let infos = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let number = if i < 6 { i as u32 } else { padding + i as u32 };
                FieldInfo::new(name.as_str(), number)
            })
            .collect();
        FieldInfos::from_infos(infos).unwrap()
    };

    let mut rng = StdRng::seed_from_u64(12);
    let docs: Vec<TermVectorDocument> = (0..70)
        .map(|_| TermVectorDocument {
            fields: names.iter().map(|name| random_field(&mut rng, name)).collect(),
        })
        .collect();

    let cases = [
        // One chunk: flags of a field differ across documents.
        (1 << 20, 128, 0, Some(1)),
        (1024, 8, 1000, None),
        // One document per chunk: every field has a single set of flags.
        (4096, 1, 70000, Some(70)),
    ];
    for (chunk_size, max_docs_per_chunk, padding, num_chunks) in cases {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let config = TermVectorsConfig {
            chunk_size,
            max_docs_per_chunk,
            ..Default::default()
        };
        let (segment, field_infos) = write_segment_with(
            storage.clone(),
            config.clone(),
            None,
            &docs,
            field_infos_with(padding),
        );

        let mut reader = open_reader(storage, &config, &segment, &field_infos);
        if let Some(num_chunks) = num_chunks {
            assert_eq!(reader.num_chunks(), num_chunks, "padding {padding}");
        }
        for (i, doc) in docs.iter().enumerate() {
            assert_eq!(
                read_document(&mut reader, i as u32),
                expected(doc),
                "padding {padding}, doc {i}"
            );
        }
        reader.check_integrity().unwrap();
    }
}

#[test]
fn test_payloads() {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let config = TermVectorsConfig::default();

    let mut body = TermVectorField::new("body", true, false, true);
    body.add_posting(b"a", TermPosting::new(0, -1, -1).with_payload(b"xy".to_vec()));
    body.add_posting(b"a", TermPosting::new(4, -1, -1));
    body.add_posting(b"b", TermPosting::new(1, -1, -1).with_payload(b"z".to_vec()));
    let mut title = TermVectorField::new("title", true, false, true);
    title.add_posting(b"c", TermPosting::new(0, -1, -1).with_payload(Vec::new()));
    let docs = vec![
        TermVectorDocument::from_tokens([("body", "filler", 0, 0, 6)]),
        TermVectorDocument {
            fields: vec![body, title],
        },
    ];
    let (segment, field_infos) = write_segment(storage.clone(), config.clone(), None, &docs);
    let mut reader = open_reader(storage, &config, &segment, &field_infos);

    let fields = reader.get(1).unwrap().unwrap();
    let mut terms_enum = fields.field_terms("body").unwrap().terms_enum();
    terms_enum.next().unwrap();
    let mut postings = terms_enum.postings_enum(None).unwrap();
    postings.next_doc().unwrap();
    assert_eq!(postings.next_position().unwrap(), 0);
    assert_eq!(postings.payload().unwrap(), Some(b"xy".as_slice()));
    assert_eq!(postings.next_position().unwrap(), 4);
    assert_eq!(postings.payload().unwrap(), None);
    terms_enum.next().unwrap();
    let mut postings = terms_enum.postings_enum(None).unwrap();
    postings.next_doc().unwrap();
    postings.next_position().unwrap();
    assert_eq!(postings.payload().unwrap(), Some(b"z".as_slice()));

    // An empty payload reads back as no payload.
    let mut terms_enum = fields.field_terms("title").unwrap().terms_enum();
    terms_enum.next().unwrap();
    let mut postings = terms_enum.postings_enum(None).unwrap();
    postings.next_doc().unwrap();
    postings.next_position().unwrap();
    assert_eq!(postings.payload().unwrap(), None);

    assert_eq!(read_document(&mut reader, 0), Some(docs[0].clone()));
}

#[test]
fn test_postings_protocol() {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let config = TermVectorsConfig::default();
    let docs = vec![TermVectorDocument::from_tokens([
        ("body", "cat", 0, 0, 3),
        ("body", "cat", 2, 8, 11),
    ])];
    let (segment, field_infos) = write_segment(storage.clone(), config.clone(), None, &docs);
    let mut reader = open_reader(storage, &config, &segment, &field_infos);

    let fields = reader.get(0).unwrap().unwrap();
    let terms = fields.field_terms("body").unwrap();
    let mut terms_enum = terms.terms_enum();
    assert!(terms_enum.postings_enum(None).unwrap_err().is_illegal_state());
    terms_enum.next().unwrap();
    assert_eq!(terms_enum.doc_freq().unwrap(), 1);
    assert!(terms_enum.ord().unwrap_err().is_unsupported());
    assert!(terms_enum.seek_exact_ord(0).unwrap_err().is_unsupported());

    let mut postings = terms_enum.postings(None).unwrap();
    assert_eq!(postings.doc_id(), None);
    assert!(postings.freq().unwrap_err().is_illegal_state());
    assert!(postings.next_position().unwrap_err().is_illegal_state());
    assert_eq!(postings.next_doc().unwrap(), 0);
    assert_eq!(postings.freq().unwrap(), 2);
    assert!(postings.start_offset().unwrap_err().is_illegal_state());
    assert_eq!(postings.next_position().unwrap(), 0);
    assert_eq!(postings.next_position().unwrap(), 2);
    assert_eq!(postings.end_offset().unwrap(), 11);
    assert!(postings.next_position().unwrap_err().is_illegal_state());
    assert_eq!(postings.next_doc().unwrap(), NO_MORE_DOCS);
    assert_eq!(postings.doc_id(), Some(NO_MORE_DOCS));
    assert!(postings.freq().unwrap_err().is_illegal_state());

    let deleted = BitVec::from_elem(1, false);
    let mut postings = terms_enum.postings_enum(Some(&deleted)).unwrap();
    assert_eq!(postings.next_doc().unwrap(), NO_MORE_DOCS);

    let live = BitVec::from_elem(1, true);
    let mut postings = terms_enum.postings_enum(Some(&live)).unwrap();
    assert_eq!(postings.advance(0).unwrap(), 0);
}

#[test]
fn test_format_versions() {
    let docs = random_documents(11, 50);
    for version in [
        FormatVersion::Start,
        FormatVersion::Checksum,
        FormatVersion::ChunkStats,
    ] {
        let storage = Arc::new(MemoryStorage::new());
        let config = TermVectorsConfig {
            format_version: version,
            max_docs_per_chunk: 8,
            ..Default::default()
        };
        let (segment, field_infos) = write_segment(storage.clone(), config.clone(), None, &docs);

        let mut reader = open_reader(storage.clone(), &config, &segment, &field_infos);
        assert_eq!(reader.version(), version);
        assert_eq!(reader.num_dirty_chunks().is_some(), version.has_chunk_stats());
        reader.check_integrity().unwrap();
        for (i, doc) in docs.iter().enumerate() {
            assert_eq!(read_document(&mut reader, i as u32), expected(doc));
        }
        reader.close().unwrap();

        if version.has_footer() {
            // Flip a byte inside the chunks; only the checksum notices.
            let mut bytes = storage.read_all("_0.tvd").unwrap();
            let middle = bytes.len() / 2;
            bytes[middle] ^= 0x40;
            storage.write_all("_0.tvd", bytes).unwrap();
            let reader = open_reader(storage.clone(), &config, &segment, &field_infos);
            assert!(reader.check_integrity().unwrap_err().is_corruption());
        }
    }
}

#[test]
fn test_mismatched_versions_are_corruption() {
    let docs = random_documents(3, 5);
    let checksum = TermVectorsConfig {
        format_version: FormatVersion::Checksum,
        ..Default::default()
    };
    let current = TermVectorsConfig::default();

    let old: Arc<MemoryStorage> = Arc::new(MemoryStorage::new());
    let new: Arc<MemoryStorage> = Arc::new(MemoryStorage::new());
    let segment = SegmentInfo::new("_0", docs.len() as u32);
    let field_infos = Arc::new(field_infos_for(&docs));
    for (storage, config) in [(&old, &checksum), (&new, &current)] {
        let format = TermVectorsFormat::new(config.clone()).unwrap();
        let mut writer = format.writer(storage.clone(), &segment, "").unwrap();
        for doc in &docs {
            writer.add_document(doc, &field_infos).unwrap();
        }
        writer.finish(docs.len() as u32).unwrap();
        writer.close().unwrap();
    }

    // Index written with one version, data with another.
    new.write_all("_0.tvx", old.read_all("_0.tvx").unwrap()).unwrap();
    let err = TermVectorsFormat::default()
        .reader(new, &segment, "", field_infos)
        .unwrap_err();
    assert!(err.is_corruption());
}

#[test]
fn test_corrupt_chunk_header() {
    let storage = Arc::new(MemoryStorage::new());
    let config = TermVectorsConfig::default();
    let docs = vec![TermVectorDocument::from_tokens([("body", "x", 0, 0, 1)])];
    let (segment, field_infos) = write_segment(storage.clone(), config.clone(), None, &docs);

    // The first chunk follows the data header: packed ints version, chunk
    // size (two varint bytes), block size and the compression id.
    let chunk_start = header_length(&format!("{}Data", config.format_name), "") as usize + 5;
    let mut bytes = storage.read_all("_0.tvd").unwrap();
    assert_eq!(bytes[chunk_start], 0, "doc_base of the first chunk");
    bytes[chunk_start] = 5;
    storage.write_all("_0.tvd", bytes).unwrap();

    let mut reader = open_reader(storage, &config, &segment, &field_infos);
    assert!(reader.get(0).unwrap_err().is_corruption());
}

#[test]
fn test_chunk_past_last_document_is_corruption() {
    let storage = Arc::new(MemoryStorage::new());
    let config = TermVectorsConfig::default();
    let docs = vec![
        TermVectorDocument::from_tokens([("body", "x", 0, 0, 1)]),
        TermVectorDocument::from_tokens([("body", "y", 0, 0, 1)]),
        TermVectorDocument::from_tokens([("body", "z", 0, 0, 1)]),
    ];
    let (segment, field_infos) = write_segment(storage.clone(), config.clone(), None, &docs);

    // chunk_docs follows the one-byte doc_base of the first chunk.
    let chunk_docs = header_length(&format!("{}Data", config.format_name), "") as usize + 6;
    let mut bytes = storage.read_all("_0.tvd").unwrap();
    assert_eq!(bytes[chunk_docs], 3);
    bytes[chunk_docs] = 4;
    storage.write_all("_0.tvd", bytes).unwrap();

    let mut reader = open_reader(storage, &config, &segment, &field_infos);
    assert_eq!(reader.num_docs(), 3);
    assert!(reader.get(0).unwrap_err().is_corruption());
}

#[test]
fn test_truncated_index_is_corruption() {
    let storage = Arc::new(MemoryStorage::new());
    let config = TermVectorsConfig::default();
    let docs = random_documents(5, 10);
    let (segment, field_infos) = write_segment(storage.clone(), config.clone(), None, &docs);

    let mut bytes = storage.read_all("_0.tvx").unwrap();
    bytes.truncate(bytes.len() - 3);
    storage.write_all("_0.tvx", bytes).unwrap();

    let err = TermVectorsFormat::new(config)
        .unwrap()
        .reader(storage, &segment, "", field_infos)
        .unwrap_err();
    assert!(err.is_corruption());
}

#[test]
fn test_cloned_readers_are_independent() {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let config = TermVectorsConfig {
        max_docs_per_chunk: 4,
        ..Default::default()
    };
    let docs = random_documents(99, 40);
    let (segment, field_infos) = write_segment(storage.clone(), config.clone(), None, &docs);

    let reader = open_reader(storage, &config, &segment, &field_infos);
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let mut clone = reader.try_clone().unwrap();
            let docs = docs.clone();
            std::thread::spawn(move || {
                for i in (t..docs.len()).step_by(4) {
                    assert_eq!(read_document(&mut clone, i as u32), expected(&docs[i]));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_file_storage_round_trip() {
    let dir = TempDir::new().unwrap();
    let storage: Arc<dyn Storage> = Arc::new(FileStorage::open(dir.path()).unwrap());
    let config = TermVectorsConfig {
        chunk_size: 128,
        ..Default::default()
    };
    let docs = random_documents(2024, 60);
    let (segment, field_infos) = write_segment(storage.clone(), config.clone(), None, &docs);
    assert!(dir.path().join("_0.tvd").exists());
    assert!(dir.path().join("_0.tvx").exists());

    let mut reader = open_reader(storage, &config, &segment, &field_infos);
    reader.check_integrity().unwrap();
    for (i, doc) in docs.iter().enumerate() {
        assert_eq!(read_document(&mut reader, i as u32), expected(doc));
    }
}
