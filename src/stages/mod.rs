//! Built-in stages.
//!
//! All line-oriented stages read `\n`-terminated lines through
//! [`PipeReader::scan_lines`](crate::buffer::PipeReader::scan_lines) and terminate every
//! line they emit with `\n`.

mod codec;
mod filter;
mod group;
mod unixyear;

pub use codec::{Bunzip2, Gunzip};
pub use filter::{DragEnd, Ignore, NoEmpty, Only};
pub use group::GroupMultiline;
pub use unixyear::UnixYear;

use crate::error::{PipelineError, Result};
use regex::bytes::Regex;

fn is_space(b: u8) -> bool {
    matches!(b, b'\t' | b'\n' | 0x0b | 0x0c | b'\r' | b' ')
}

fn trim_left(line: &[u8]) -> &[u8] {
    let start = line.iter().position(|&b| !is_space(b)).unwrap_or(line.len());
    &line[start..]
}

fn trim_right(line: &[u8]) -> &[u8] {
    let end = line.iter().rposition(|&b| !is_space(b)).map_or(0, |i| i + 1);
    &line[..end]
}

fn require<'a>(pattern: &'a Option<Regex>, stage: &str) -> Result<&'a Regex> {
    pattern
        .as_ref()
        .ok_or_else(|| PipelineError::ConfigError(format!("stage {} requires a pattern", stage)))
}
