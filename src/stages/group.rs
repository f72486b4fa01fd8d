use super::{require, trim_left, trim_right};
use crate::buffer::PipeReader;
use crate::error::Result;
use crate::stage::Stage;
use regex::bytes::Regex;
use std::io::Write;

/// Re-assemble records spread over several lines.
///
/// A line matching the pattern opens a record. Following lines that neither
/// match nor are blank are folded into it, separated by a single space. A
/// blank line or the next match closes the record.
#[derive(Debug, Default)]
pub struct GroupMultiline {
    pattern: Option<Regex>,
    in_record: bool,
}

impl Stage for GroupMultiline {
    fn name(&self) -> &str {
        "groupml"
    }

    fn init(&mut self, pattern: Regex) {
        self.pattern = Some(pattern);
    }

    fn requires_pattern(&self) -> bool {
        true
    }

    fn process(&mut self, input: &mut PipeReader, output: &mut dyn Write) -> Result<()> {
        let re = require(&self.pattern, "groupml")?;
        let mut lines = input.scan_lines();
        while let Some(line) = lines.next_line()? {
            if re.is_match(line) {
                if self.in_record {
                    output.write_all(b"\n")?;
                }
                self.in_record = true;
                output.write_all(trim_right(line))?;
            } else if self.in_record {
                let rest = trim_left(line);
                if rest.is_empty() {
                    self.in_record = false;
                    output.write_all(b"\n")?;
                    output.write_all(line)?;
                    output.write_all(b"\n")?;
                } else {
                    output.write_all(b" ")?;
                    output.write_all(rest)?;
                }
            } else {
                output.write_all(line)?;
                output.write_all(b"\n")?;
            }
        }

        if self.in_record {
            self.in_record = false;
            output.write_all(b"\n")?;
        }
        Ok(())
    }
}
