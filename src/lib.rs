//! Concurrent line-oriented stream processing for logs.
//!
//! A one-line program such as `gunzip? | groupml /^\S/ | noempty` is compiled
//! into a chain of stages. Each stage runs on its own thread and talks to the
//! next through a fixed-size ring buffer, so arbitrarily large inputs stream
//! through in bounded memory.
//!
//! # Features
//!
//! - Zero-copy single-producer/single-consumer pipes with windowed reads
//! - Backpressure: a fast producer blocks until its consumer catches up
//! - Built-in stages: `gunzip`, `bunzip2` (and sniffing `?` variants),
//!   `groupml`, `ignore`, `only`, `noempty`, `dragend`, `unixyear`
//! - Per-stage byte counts and timings for every run
//!
//! # Example
//!
//! ```
//! use linepipe::compile;
//!
//! let pipeline = compile(r#"noempty | ignore "DEBUG ""#)?;
//! let mut out = Vec::new();
//! pipeline.run(&b"DEBUG boot\n\nready\n"[..], &mut out)?;
//! assert_eq!(out, b"boot\nready\n");
//! # Ok::<(), linepipe::PipelineError>(())
//! ```

pub mod buffer;
pub mod compiler;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod stage;
pub mod stages;

// Re-exports for convenience
pub use buffer::{pipe, Lines, PipeReader, PipeWriter};
pub use compiler::compile;
pub use config::{PipeConfig, RunContext};
pub use error::{PipelineError, Result};
pub use metrics::{PipeMetrics, RunReport, StageSnapshot};
pub use pipeline::Pipeline;
pub use stage::{lookup, stage_names, Stage, StageDescriptor, StageRunner, REGISTRY};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
