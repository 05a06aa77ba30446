//! Command implementations for the Tessera CLI.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::cli::args::*;
use crate::cli::output::*;
use crate::codec::term_vectors::{
    TermVectorDocument, TermVectorsConfig, TermVectorsFormat, VECTORS_EXTENSION,
    VECTORS_INDEX_EXTENSION,
};
use crate::error::{Result, TesseraError};
use crate::index::{FieldInfos, SegmentInfo, segment_file_name};
use crate::storage::file::FileStorage;
use crate::storage::Storage;

/// Extension of the segment metadata the CLI keeps next to the codec files.
pub const SEGMENT_METADATA_EXTENSION: &str = "tvm.json";

/// What a reader needs to know about a segment besides its codec files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentMetadata {
    pub segment: SegmentInfo,
    pub field_infos: FieldInfos,
    pub config: TermVectorsConfig,
}

impl SegmentMetadata {
    fn file_name(segment: &str) -> String {
        segment_file_name(segment, "", SEGMENT_METADATA_EXTENSION)
    }

    /// Store the metadata as `<segment>.tvm.json`.
    pub fn save(&self, storage: &dyn Storage) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        let mut out = storage.create_output(&Self::file_name(&self.segment.name))?;
        out.write_all(&json)?;
        out.close()
    }

    pub fn load(storage: &dyn Storage, segment: &str) -> Result<Self> {
        let name = Self::file_name(segment);
        if !storage.file_exists(&name) {
            return Err(TesseraError::invalid_argument(format!(
                "no segment metadata {name}; was the segment written with `tessera write`?"
            )));
        }
        let mut input = storage.open_input(&name)?;
        let mut json = Vec::new();
        input.read_to_end(&mut json)?;
        input.close()?;
        Ok(serde_json::from_slice(&json)?)
    }
}

/// Execute a CLI command.
pub fn execute_command(args: TesseraArgs) -> Result<()> {
    let location = args.command.location();
    debug!(
        "running {} on segment {} in {}",
        args.command.name(),
        location.segment,
        location.dir.display()
    );
    let storage: Arc<dyn Storage> = Arc::new(FileStorage::open(&location.dir)?);

    match &args.command {
        Command::Write(write_args) => write_segment(storage, write_args, &args),
        Command::Dump(dump_args) => dump_document(storage, dump_args, &args),
        Command::Check(check_args) => check_segment(storage, check_args, &args),
    }
}

fn file_size(storage: &dyn Storage, segment: &str, extension: &str) -> Result<u64> {
    storage.file_size(&segment_file_name(segment, "", extension))
}

/// Read one JSON document per non-empty line.
fn load_documents(path: &Path) -> Result<Vec<TermVectorDocument>> {
    let reader = BufReader::new(File::open(path)?);
    let mut docs = Vec::new();
    for (line_number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let doc = serde_json::from_str(&line).map_err(|e| {
            TesseraError::invalid_argument(format!(
                "{}:{}: {e}",
                path.display(),
                line_number + 1
            ))
        })?;
        docs.push(doc);
    }
    Ok(docs)
}

fn load_config(path: Option<&Path>) -> Result<TermVectorsConfig> {
    let config = match path {
        Some(path) => serde_json::from_reader(BufReader::new(File::open(path)?))?,
        None => TermVectorsConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// Write a segment from a JSON lines file.
fn write_segment(storage: Arc<dyn Storage>, args: &WriteArgs, cli_args: &TesseraArgs) -> Result<()> {
    let segment_name = &args.location.segment;
    if cli_args.verbosity() > 1 {
        println!("Loading documents from: {}", args.input.display());
    }

    let config = load_config(args.config.as_deref())?;
    let docs = load_documents(&args.input)?;
    let num_docs = u32::try_from(docs.len())
        .map_err(|_| TesseraError::invalid_argument("too many documents for one segment"))?;

    let mut field_infos = FieldInfos::new();
    for doc in &docs {
        doc.register_fields(&mut field_infos)?;
    }

    let segment = SegmentInfo::new(segment_name.clone(), num_docs);
    let start_time = Instant::now();

    let format = TermVectorsFormat::new(config.clone())?;
    let mut writer = format.writer(Arc::clone(&storage), &segment, "")?;
    for doc in &docs {
        if let Err(e) = writer.add_document(doc, &field_infos) {
            writer.abort()?;
            return Err(e);
        }
    }
    writer.finish(num_docs)?;
    let (chunks, dirty_chunks) = (writer.num_chunks(), writer.num_dirty_chunks());
    writer.close()?;

    let metadata = SegmentMetadata {
        segment,
        field_infos,
        config,
    };
    metadata.save(storage.as_ref())?;
    info!("wrote segment {segment_name} with {num_docs} documents in {chunks} chunks");

    let result = WriteResult {
        segment: segment_name.clone(),
        documents: num_docs,
        fields: metadata.field_infos.len(),
        chunks,
        dirty_chunks,
        data_bytes: file_size(storage.as_ref(), segment_name, VECTORS_EXTENSION)?,
        index_bytes: file_size(storage.as_ref(), segment_name, VECTORS_INDEX_EXTENSION)?,
        duration_ms: start_time.elapsed().as_millis() as u64,
    };
    output_result("Segment written", &result, cli_args)
}

/// Print the term vectors of one document.
fn dump_document(storage: Arc<dyn Storage>, args: &DumpArgs, cli_args: &TesseraArgs) -> Result<()> {
    let segment_name = &args.location.segment;
    let metadata = SegmentMetadata::load(storage.as_ref(), segment_name)?;
    let format = TermVectorsFormat::new(metadata.config)?;
    let mut reader = format.reader(
        storage,
        &metadata.segment,
        "",
        Arc::new(metadata.field_infos),
    )?;

    let document = match reader.get(args.doc)? {
        Some(fields) => Some(fields.to_document()?),
        None => None,
    };
    reader.close()?;

    output_result(
        &format!("Document {} of segment {segment_name}", args.doc),
        &DumpResult {
            doc: args.doc,
            document,
        },
        cli_args,
    )
}

/// Verify checksums and decode every document of a segment.
fn check_segment(storage: Arc<dyn Storage>, args: &CheckArgs, cli_args: &TesseraArgs) -> Result<()> {
    let segment_name = &args.location.segment;
    if cli_args.verbosity() > 0 {
        println!("Checking segment {segment_name} in {}", args.location.dir.display());
    }

    let metadata = SegmentMetadata::load(storage.as_ref(), segment_name)?;
    let format = TermVectorsFormat::new(metadata.config)?;
    let mut reader = format.reader(
        Arc::clone(&storage),
        &metadata.segment,
        "",
        Arc::new(metadata.field_infos),
    )?;
    reader.check_integrity()?;

    let mut with_vectors = 0u32;
    for doc in 0..reader.num_docs() {
        if let Some(fields) = reader.get(doc)? {
            fields.to_document()?;
            with_vectors += 1;
        }
    }
    debug!("decoded {} documents of {segment_name}", reader.num_docs());

    let result = CheckResult {
        segment: segment_name.clone(),
        version: reader.version(),
        documents: reader.num_docs(),
        documents_with_vectors: with_vectors,
        chunks: reader.num_chunks(),
        dirty_chunks: reader.num_dirty_chunks(),
        data_bytes: file_size(storage.as_ref(), segment_name, VECTORS_EXTENSION)?,
    };
    reader.close()?;
    output_result("Segment is healthy", &result, cli_args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_metadata_roundtrip() {
        let storage = MemoryStorage::new();
        let mut field_infos = FieldInfos::new();
        field_infos.add_or_get("body").unwrap();
        let metadata = SegmentMetadata {
            segment: SegmentInfo::new("_3", 7),
            field_infos,
            config: TermVectorsConfig::default(),
        };
        metadata.save(&storage).unwrap();
        assert!(storage.file_exists("_3.tvm.json"));

        let loaded = SegmentMetadata::load(&storage, "_3").unwrap();
        assert_eq!(loaded.segment, metadata.segment);
        assert_eq!(loaded.field_infos.by_name("body").unwrap().number, 0);
        assert!(SegmentMetadata::load(&storage, "_4").unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_load_documents_reports_line() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"fields": []}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, "not json").unwrap();

        let err = load_documents(file.path()).unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(err.to_string().contains(":3:"));
    }

    #[test]
    fn test_write_then_check_and_dump() {
        let dir = TempDir::new().unwrap();
        let mut input = NamedTempFile::new().unwrap();
        writeln!(
            input,
            r#"{{"fields": [{{"name": "body", "has_positions": true, "has_offsets": true, "terms": [{{"term": "cat", "postings": [{{"position": 0, "start_offset": 0, "end_offset": 3}}]}}]}}]}}"#
        )
        .unwrap();
        writeln!(input, r#"{{"fields": []}}"#).unwrap();

        let cli = |command: Command| TesseraArgs {
            verbose: 0,
            quiet: true,
            output_format: OutputFormat::Json,
            pretty: false,
            command,
        };

        let location = SegmentLocation {
            dir: dir.path().to_path_buf(),
            segment: "_0".to_string(),
        };
        execute_command(cli(Command::Write(WriteArgs {
            location: location.clone(),
            input: input.path().to_path_buf(),
            config: None,
        })))
        .unwrap();
        assert!(dir.path().join("_0.tvd").exists());
        assert!(dir.path().join("_0.tvm.json").exists());

        execute_command(cli(Command::Check(CheckArgs {
            location: location.clone(),
        })))
        .unwrap();
        execute_command(cli(Command::Dump(DumpArgs {
            location: location.clone(),
            doc: 1,
        })))
        .unwrap();
        let out_of_range = execute_command(cli(Command::Dump(DumpArgs {
            location,
            doc: 2,
        })));
        assert!(out_of_range.unwrap_err().is_invalid_argument());
    }
}
