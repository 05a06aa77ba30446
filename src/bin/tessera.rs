//! Tessera CLI binary.

use std::io::Write;

use anyhow::Context;
use clap::Parser;
use env_logger::Builder;
use log::LevelFilter;

use tessera::cli::args::*;
use tessera::cli::commands::*;

/// Overrides the level picked from `-v`/`-q`, e.g. `TESSERA_LOG=tessera::codec=trace`.
const LOG_ENV: &str = "TESSERA_LOG";

fn main() -> anyhow::Result<()> {
    let args = TesseraArgs::parse();

    let log_level = match args.verbosity() {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };

    Builder::new()
        .filter_level(log_level)
        .parse_env(LOG_ENV)
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .init();

    let name = args.command.name();
    execute_command(args).with_context(|| format!("tessera {name} failed"))
}
