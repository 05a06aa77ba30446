//! Output formatting for CLI commands.

use serde::{Deserialize, Serialize};

use crate::cli::args::{OutputFormat, TesseraArgs};
use crate::codec::FormatVersion;
use crate::codec::term_vectors::TermVectorDocument;
use crate::error::Result;

/// Result of writing a segment.
#[derive(Debug, Serialize, Deserialize)]
pub struct WriteResult {
    pub segment: String,
    pub documents: u32,
    pub fields: usize,
    pub chunks: u64,
    pub dirty_chunks: u64,
    pub data_bytes: u64,
    pub index_bytes: u64,
    pub duration_ms: u64,
}

/// Term vectors of one document.
#[derive(Debug, Serialize, Deserialize)]
pub struct DumpResult {
    pub doc: u32,
    pub document: Option<TermVectorDocument>,
}

/// Result of checking a segment.
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckResult {
    pub segment: String,
    pub version: FormatVersion,
    pub documents: u32,
    pub documents_with_vectors: u32,
    pub chunks: u64,
    pub dirty_chunks: Option<u64>,
    pub data_bytes: u64,
}

/// Output a result in the specified format.
pub fn output_result<T: Serialize>(message: &str, result: &T, args: &TesseraArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => output_human(message, result, args),
        OutputFormat::Json => output_json(result, args),
    }
}

/// Output in human-readable format.
fn output_human<T: Serialize>(message: &str, result: &T, args: &TesseraArgs) -> Result<()> {
    if args.verbosity() > 0 {
        println!("{message}");
        println!();
    }

    let value = serde_json::to_value(result)?;
    match value.get("document") {
        Some(document) => output_document_human(document),
        None => output_generic_human(&value),
    }
    Ok(())
}

/// Print a document one term per line with its postings.
fn output_document_human(document: &serde_json::Value) {
    let Some(fields) = document.get("fields").and_then(|f| f.as_array()) else {
        println!("(no term vectors)");
        return;
    };

    for field in fields {
        let name = field.get("name").and_then(|n| n.as_str()).unwrap_or("?");
        let flags: Vec<&str> = [
            ("has_positions", "positions"),
            ("has_offsets", "offsets"),
            ("has_payloads", "payloads"),
        ]
        .iter()
        .filter(|(key, _)| field.get(*key).and_then(|v| v.as_bool()).unwrap_or(false))
        .map(|&(_, label)| label)
        .collect();
        println!("Field: {name} [{}]", flags.join(", "));

        let terms = field.get("terms").and_then(|t| t.as_array());
        for term in terms.into_iter().flatten() {
            let text = term.get("term").map(format_value).unwrap_or_default();
            let postings = term.get("postings").and_then(|p| p.as_array());
            let rendered: Vec<String> = postings
                .into_iter()
                .flatten()
                .map(format_posting)
                .collect();
            println!("  {text} ({}): {}", rendered.len(), rendered.join(" "));
        }
    }
}

fn format_posting(posting: &serde_json::Value) -> String {
    let get = |key: &str| posting.get(key).and_then(|v| v.as_i64()).unwrap_or(-1);
    let mut out = format!("{}@{}-{}", get("position"), get("start_offset"), get("end_offset"));
    if let Some(payload) = posting.get("payload") {
        out.push_str(&format!("#{}", format_value(payload)));
    }
    out
}

fn output_generic_human(value: &serde_json::Value) {
    match value {
        serde_json::Value::Object(obj) => {
            for (key, val) in obj {
                let formatted_val = if key.ends_with("_bytes") {
                    val.as_u64().map(format_bytes).unwrap_or_else(|| format_value(val))
                } else {
                    format_value(val)
                };
                println!("{key}: {formatted_val}");
            }
        }
        _ => println!("{}", format_value(value)),
    }
}

/// Output in JSON format.
fn output_json<T: Serialize>(result: &T, args: &TesseraArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };

    println!("{json}");
    Ok(())
}

fn format_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Array(arr) => {
            let formatted_values = arr.iter().map(format_value).collect::<Vec<_>>().join(", ");
            format!("[{formatted_values}]")
        }
        serde_json::Value::Object(_) => "[object]".to_string(),
        serde_json::Value::Null => "null".to_string(),
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{bytes} {}", UNITS[0])
    } else {
        format!("{size:.1} {}", UNITS[unit_index])
    }
}
