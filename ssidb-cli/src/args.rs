//! Command-line argument definitions using clap.
//!
//! `ssidb <FILE>` runs a workload script; `-i` reads from stdin instead
//! (the positional argument is still required by clap but ignored in
//! that mode, matching the original tool's `plac`-based contract).

use std::path::PathBuf;

use clap::Parser;

/// Deterministic simulator for a replicated key-value store under
/// Serializable Snapshot Isolation and Available Copies.
#[derive(Parser, Debug)]
#[command(name = "ssidb")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the workload script. Ignored when `--stdin` is given, but
    /// still required positionally.
    pub file: PathBuf,

    /// Write all log output to this file instead of stdout (truncated
    /// first).
    #[arg(short = 'o', long = "out-file")]
    pub out_file: Option<PathBuf>,

    /// Read the workload from stdin instead of `FILE`.
    #[arg(short = 'i', long = "stdin")]
    pub stdin: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
