use super::{require, trim_left};
use crate::buffer::PipeReader;
use crate::error::Result;
use crate::stage::Stage;
use regex::bytes::Regex;
use std::io::Write;

/// Cut the first match of the pattern out of every line.
/// Lines without a match go through unchanged.
#[derive(Debug, Default)]
pub struct Ignore {
    pattern: Option<Regex>,
}

/// Keep only lines matching the pattern, with the match cut out
#[derive(Debug, Default)]
pub struct Only {
    pattern: Option<Regex>,
}

/// Drop lines that are empty or all whitespace
#[derive(Debug, Default)]
pub struct NoEmpty;

/// Carry the last match of the pattern onto lines that lack one.
///
/// Handy when a marker such as a hostname only shows up on some lines of a
/// log and should be present on all of them.
#[derive(Debug, Default)]
pub struct DragEnd {
    pattern: Option<Regex>,
}

impl Stage for Ignore {
    fn name(&self) -> &str {
        "ignore"
    }

    fn init(&mut self, pattern: Regex) {
        self.pattern = Some(pattern);
    }

    fn requires_pattern(&self) -> bool {
        true
    }

    fn process(&mut self, input: &mut PipeReader, output: &mut dyn Write) -> Result<()> {
        let re = require(&self.pattern, self.name())?;
        let mut lines = input.scan_lines();
        while let Some(line) = lines.next_line()? {
            match re.find(line) {
                Some(m) => {
                    output.write_all(&line[..m.start()])?;
                    output.write_all(&line[m.end()..])?;
                }
                None => output.write_all(line)?,
            }
            output.write_all(b"\n")?;
        }
        Ok(())
    }
}

impl Stage for Only {
    fn name(&self) -> &str {
        "only"
    }

    fn init(&mut self, pattern: Regex) {
        self.pattern = Some(pattern);
    }

    fn requires_pattern(&self) -> bool {
        true
    }

    fn process(&mut self, input: &mut PipeReader, output: &mut dyn Write) -> Result<()> {
        let re = require(&self.pattern, self.name())?;
        let mut lines = input.scan_lines();
        while let Some(line) = lines.next_line()? {
            let Some(m) = re.find(line) else {
                continue;
            };
            output.write_all(&line[..m.start()])?;
            output.write_all(&line[m.end()..])?;
            output.write_all(b"\n")?;
        }
        Ok(())
    }
}

impl Stage for NoEmpty {
    fn name(&self) -> &str {
        "noempty"
    }

    fn process(&mut self, input: &mut PipeReader, output: &mut dyn Write) -> Result<()> {
        let mut lines = input.scan_lines();
        while let Some(line) = lines.next_line()? {
            if trim_left(line).is_empty() {
                continue;
            }
            output.write_all(line)?;
            output.write_all(b"\n")?;
        }
        Ok(())
    }
}

impl Stage for DragEnd {
    fn name(&self) -> &str {
        "dragend"
    }

    fn init(&mut self, pattern: Regex) {
        self.pattern = Some(pattern);
    }

    fn requires_pattern(&self) -> bool {
        true
    }

    fn process(&mut self, input: &mut PipeReader, output: &mut dyn Write) -> Result<()> {
        let re = require(&self.pattern, self.name())?;
        let mut last = Vec::new();
        let mut lines = input.scan_lines();
        while let Some(line) = lines.next_line()? {
            output.write_all(line)?;
            match re.find(line) {
                Some(m) => {
                    last.clear();
                    last.extend_from_slice(m.as_bytes());
                }
                None => output.write_all(&last)?,
            }
            output.write_all(b"\n")?;
        }
        Ok(())
    }
}
