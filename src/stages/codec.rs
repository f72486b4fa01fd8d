use crate::buffer::PipeReader;
use crate::error::Result;
use crate::stage::Stage;
use bzip2::read::MultiBzDecoder;
use flate2::read::MultiGzDecoder;
use std::io::{self, Write};

const GZIP_MAGIC: &[u8] = b"\x1f\x8b";
const BZIP2_MAGIC: &[u8] = b"BZh";

/// Decompress a gzip stream, all members concatenated.
///
/// The sniffing variant only decompresses when the stream starts with the
/// gzip magic, and passes anything else through untouched.
#[derive(Debug, Default)]
pub struct Gunzip {
    sniff: bool,
}

impl Gunzip {
    pub fn new() -> Self {
        Self { sniff: false }
    }

    pub fn sniffing() -> Self {
        Self { sniff: true }
    }
}

impl Stage for Gunzip {
    fn name(&self) -> &str {
        if self.sniff {
            "gunzip?"
        } else {
            "gunzip"
        }
    }

    fn process(&mut self, input: &mut PipeReader, output: &mut dyn Write) -> Result<()> {
        if self.sniff && !starts_with(input, GZIP_MAGIC) {
            io::copy(input, output)?;
            return Ok(());
        }
        io::copy(&mut MultiGzDecoder::new(input), output)?;
        Ok(())
    }
}

/// Decompress a bzip2 stream, all streams concatenated.
///
/// The sniffing variant only decompresses when the stream starts with the
/// bzip2 magic, and passes anything else through untouched.
#[derive(Debug, Default)]
pub struct Bunzip2 {
    sniff: bool,
}

impl Bunzip2 {
    pub fn new() -> Self {
        Self { sniff: false }
    }

    pub fn sniffing() -> Self {
        Self { sniff: true }
    }
}

impl Stage for Bunzip2 {
    fn name(&self) -> &str {
        if self.sniff {
            "bunzip2?"
        } else {
            "bunzip2"
        }
    }

    fn process(&mut self, input: &mut PipeReader, output: &mut dyn Write) -> Result<()> {
        if self.sniff && !starts_with(input, BZIP2_MAGIC) {
            io::copy(input, output)?;
            return Ok(());
        }
        io::copy(&mut MultiBzDecoder::new(input), output)?;
        Ok(())
    }
}

/// Peek at the head of the stream. Nothing is released, so the bytes are
/// still there for whoever reads next.
fn starts_with(input: &mut PipeReader, magic: &[u8]) -> bool {
    if input.window().len() < magic.len() {
        input.next(magic.len() - input.window().len());
    }
    input.window().starts_with(magic)
}
