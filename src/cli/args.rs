//! Command line argument parsing for the Tessera CLI using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

/// Tessera: compressed term-vector storage
#[derive(Parser, Debug, Clone)]
#[command(name = "tessera")]
#[command(about = "Write, dump and verify compressed term-vector segments")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct TesseraArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human")]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl TesseraArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1, // Default to normal
                n => n,
            }
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Write a segment from JSON lines of analyzed documents
    Write(WriteArgs),

    /// Print the term vectors of one document
    Dump(DumpArgs),

    /// Verify a segment's files and decode every document
    Check(CheckArgs),
}

impl Command {
    /// Subcommand name as typed on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Write(_) => "write",
            Command::Dump(_) => "dump",
            Command::Check(_) => "check",
        }
    }

    pub fn location(&self) -> &SegmentLocation {
        match self {
            Command::Write(args) => &args.location,
            Command::Dump(args) => &args.location,
            Command::Check(args) => &args.location,
        }
    }
}

/// Where a segment lives. Shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct SegmentLocation {
    /// Directory holding the segment files
    #[arg(long, value_name = "DIR", env = "TESSERA_DIR")]
    pub dir: PathBuf,

    /// Segment name, used as the file name prefix
    #[arg(long, value_name = "SEGMENT", default_value = "_0")]
    pub segment: String,
}

/// Arguments for writing a segment
#[derive(Parser, Debug, Clone)]
pub struct WriteArgs {
    #[command(flatten)]
    pub location: SegmentLocation,

    /// Input file with one JSON document per line
    #[arg(short, long, value_name = "INPUT_FILE")]
    pub input: PathBuf,

    /// Term vectors configuration file (JSON)
    #[arg(short, long, value_name = "CONFIG_FILE")]
    pub config: Option<PathBuf>,
}

/// Arguments for dumping a document
#[derive(Parser, Debug, Clone)]
pub struct DumpArgs {
    #[command(flatten)]
    pub location: SegmentLocation,

    /// Document number within the segment
    #[arg(long, value_name = "DOC")]
    pub doc: u32,
}

/// Arguments for checking a segment
#[derive(Parser, Debug, Clone)]
pub struct CheckArgs {
    #[command(flatten)]
    pub location: SegmentLocation,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_write() {
        let args = TesseraArgs::parse_from([
            "tessera", "-vv", "write", "--dir", "/tmp/tv", "--input", "docs.jsonl",
        ]);
        assert_eq!(args.verbosity(), 2);
        match args.command {
            Command::Write(write) => {
                assert_eq!(write.location.segment, "_0");
                assert_eq!(write.location.dir, PathBuf::from("/tmp/tv"));
                assert_eq!(write.input, PathBuf::from("docs.jsonl"));
                assert!(write.config.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_quiet_overrides_verbose() {
        let args = TesseraArgs::parse_from([
            "tessera", "-q", "-vvv", "-f", "json", "dump", "--dir", "d", "--doc", "3",
        ]);
        assert_eq!(args.verbosity(), 0);
        assert_eq!(args.output_format, OutputFormat::Json);
        assert_eq!(args.command.name(), "dump");
        assert_eq!(args.command.location().dir, PathBuf::from("d"));
    }
}
