//! Driver for the replicated-store simulator: reads a workload script,
//! either from a file or from stdin, and feeds it one line at a time to
//! an `ssidb_core::Engine`.

mod parser;

use std::fs::File;
use std::io::{self, BufRead, BufReader};

use ssidb_base::{err, Result};
use ssidb_core::Engine;

pub use parser::parse_line;

/// Where workload lines come from.
pub enum Source {
    File(String),
    Stdin,
}

/// Reads every line from `source`, parses it into commands, and
/// dispatches each to `engine` in order. Returns on the first
/// `Engine::dispatch` error (an out-of-range site index); parse
/// failures are logged and skipped rather than propagated.
pub fn run(source: Source, engine: &mut Engine) -> Result<()> {
    let lines: Box<dyn Iterator<Item = io::Result<String>>> = match source {
        Source::File(path) => {
            let file = File::open(&path).map_err(|e| err(format!("cannot open {path}: {e}")))?;
            Box::new(BufReader::new(file).lines())
        }
        Source::Stdin => Box::new(BufReader::new(io::stdin()).lines()),
    };

    for line in lines {
        let line = line.map_err(|e| err(format!("read error: {e}")))?;
        if line.trim().is_empty() {
            continue;
        }
        for cmd in parser::parse_line(&line) {
            engine.dispatch(cmd)?;
        }
    }
    Ok(())
}
