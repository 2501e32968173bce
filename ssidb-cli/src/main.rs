//! Entry point for the `ssidb` binary: parses CLI args, wires up
//! logging, and hands the workload off to `ssidb_cli::run`.

mod args;

use std::fs::File;
use std::io::{self, Stdout, Write};
use std::process;
use std::sync::{Arc, Mutex};

use args::Cli;
use ssidb_cli::Source;
use ssidb_core::Engine;

/// Picks stdout or a truncated log file as the destination for every
/// `tracing::info!`/`warn!` line the engine emits, mirroring the
/// original tool's `logging.basicConfig(filename=out_file, ...)`. The
/// file handle is shared behind `Arc<Mutex<_>>` rather than
/// `try_clone`d per writer, since `MakeWriter::make_writer` has no way
/// to propagate an `io::Error` and a clone failure would otherwise have
/// to panic mid-run.
enum LogDestination {
    Stdout,
    File(Arc<Mutex<File>>),
}

impl LogDestination {
    fn open(path: Option<&std::path::Path>) -> io::Result<Self> {
        match path {
            Some(path) => Ok(LogDestination::File(Arc::new(Mutex::new(File::create(path)?)))),
            None => Ok(LogDestination::Stdout),
        }
    }
}

enum LogWriter {
    Stdout(Stdout),
    File(Arc<Mutex<File>>),
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            LogWriter::Stdout(w) => w.write(buf),
            LogWriter::File(f) => f.lock().unwrap_or_else(|p| p.into_inner()).write(buf),
        }
    }
    fn flush(&mut self) -> io::Result<()> {
        match self {
            LogWriter::Stdout(w) => w.flush(),
            LogWriter::File(f) => f.lock().unwrap_or_else(|p| p.into_inner()).flush(),
        }
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogDestination {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        match self {
            LogDestination::Stdout => LogWriter::Stdout(io::stdout()),
            LogDestination::File(f) => LogWriter::File(Arc::clone(f)),
        }
    }
}

fn main() {
    let cli = Cli::parse_args();

    let destination = match LogDestination::open(cli.out_file.as_deref()) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("cannot open out-file: {e}");
            process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .with_writer(destination)
        .init();

    let source = if cli.stdin {
        Source::Stdin
    } else {
        Source::File(cli.file.to_string_lossy().into_owned())
    };

    let mut engine = Engine::new();
    if let Err(e) = ssidb_cli::run(source, &mut engine) {
        eprintln!("{e:?}");
        process::exit(1);
    }
}
