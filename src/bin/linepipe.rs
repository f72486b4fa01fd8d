//! Run a linepipe program over standard input.
//!
//! Usage:
//!   linepipe 'gunzip? | groupml /^\S/ | noempty' < app.log.gz
//!   linepipe --prof report.txt 'unixyear' < syslog
//!
//! Errors go to stderr with a non-zero exit status.

use clap::Parser;
use crossbeam::channel::{bounded, Receiver};
use env_logger::Env;
use linepipe::config::{DEFAULT_CAPACITY, DEFAULT_MAX_WINDOW};
use linepipe::{compile, pipe, PipeConfig, PipeReader, Result};
use std::fs;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;

#[derive(Parser, Debug)]
#[command(name = "linepipe", version, about = "Stream standard input through a chain of line transforms")]
struct Args {
    /// Stages to apply, separated by `|`
    #[arg(default_value = "")]
    program: String,

    /// Write per-stage metrics to this file once the run completes
    #[arg(long, value_name = "PATH")]
    prof: Option<PathBuf>,

    /// Bytes buffered between two stages
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    capacity: usize,

    /// Longest line a stage can look at, must be below capacity
    #[arg(long, default_value_t = DEFAULT_MAX_WINDOW)]
    max_window: usize,
}

/// Copy stdin into a pipe from a thread nobody joins, so a failed run can
/// exit while stdin is still open and idle.
fn spawn_stdin_feeder(config: &PipeConfig) -> (PipeReader, Receiver<io::Result<u64>>) {
    let (input, mut feed) = pipe(config);
    let (done, result) = bounded(1);
    thread::spawn(move || {
        let copied = io::copy(&mut io::stdin(), &mut feed);
        let _ = done.send(copied);
        drop(feed);
    });
    (input, result)
}

fn run(args: &Args) -> Result<()> {
    let config = PipeConfig::new(args.capacity, args.max_window);
    let pipeline = compile(&args.program)?.with_config(config)?;

    let (input, fed) = spawn_stdin_feeder(&config);
    let output = BufWriter::new(io::stdout().lock());
    let report = pipeline.run_from(input, output)?;
    if let Ok(Err(e)) = fed.try_recv() {
        if e.kind() != io::ErrorKind::BrokenPipe {
            return Err(e.into());
        }
    }

    if let Some(path) = &args.prof {
        fs::write(path, report.to_string())?;
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        // downstream reader such as `head` went away
        Err(e) if e.is_broken_pipe() => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("linepipe: {}", e);
            ExitCode::FAILURE
        }
    }
}
