use crate::buffer::PipeReader;
use crate::config::RunContext;
use crate::error::Result;
use crate::stage::Stage;
use chrono::{Datelike, NaiveDate};
use std::io::Write;

const MONTHS: [&[u8]; 12] = [
    b"Jan", b"Feb", b"Mar", b"Apr", b"May", b"Jun", b"Jul", b"Aug", b"Sep", b"Oct", b"Nov", b"Dec",
];

/// Put a year in front of syslog-style dates, which carry none.
///
/// The year is the current one, except that a `Dec` date seen in January is
/// taken to be from last year: logs rotated across new year's eve.
#[derive(Debug, Default)]
pub struct UnixYear {
    today: Option<NaiveDate>,
}

impl UnixYear {
    fn year_for(today: NaiveDate, month: &[u8]) -> i32 {
        if month == b"Dec" && today.month() == 1 {
            today.year() - 1
        } else {
            today.year()
        }
    }
}

impl Stage for UnixYear {
    fn name(&self) -> &str {
        "unixyear"
    }

    fn on_start(&mut self, ctx: &RunContext) -> Result<()> {
        self.today = Some(ctx.today);
        Ok(())
    }

    fn process(&mut self, input: &mut PipeReader, output: &mut dyn Write) -> Result<()> {
        let today = self.today.unwrap_or_else(|| RunContext::now().today);
        let mut lines = input.scan_lines();
        while let Some(line) = lines.next_line()? {
            match find_month(line) {
                Some(at) => {
                    let year = Self::year_for(today, &line[at..at + 3]);
                    output.write_all(&line[..at])?;
                    write!(output, "{} ", year)?;
                    output.write_all(&line[at..])?;
                }
                None => output.write_all(line)?,
            }
            output.write_all(b"\n")?;
        }
        Ok(())
    }
}

/// Offset of the leftmost month abbreviation in the line
fn find_month(line: &[u8]) -> Option<usize> {
    line.windows(3).position(|w| MONTHS.contains(&w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::test_support::run_stage_with;

    fn on(y: i32, m: u32, d: u32) -> RunContext {
        RunContext::on(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn test_current_year_inserted() {
        let out = run_stage_with(
            &mut UnixYear::default(),
            b"<13>Mar  3 10:00:01 host sshd: ok\nno date here\n",
            &on(2024, 6, 15),
        )
        .unwrap();
        assert_eq!(out, b"<13>2024 Mar  3 10:00:01 host sshd: ok\nno date here\n");
    }

    #[test]
    fn test_december_in_january_is_last_year() {
        let input = b"Dec 31 23:59:59 host app: bye\nJan  1 00:00:01 host app: hi\n";
        let out = run_stage_with(&mut UnixYear::default(), input, &on(2025, 1, 2)).unwrap();
        assert_eq!(
            out,
            &b"2024 Dec 31 23:59:59 host app: bye\n2025 Jan  1 00:00:01 host app: hi\n"[..]
        );
    }

    #[test]
    fn test_december_outside_january_is_this_year() {
        let input = b"Dec 31 23:59:59 host app: bye\n";
        let out = run_stage_with(&mut UnixYear::default(), input, &on(2025, 2, 1)).unwrap();
        assert_eq!(out, b"2025 Dec 31 23:59:59 host app: bye\n");
    }

    #[test]
    fn test_leftmost_month_wins() {
        assert_eq!(find_month(b"xx Oct then Jan"), Some(3));
        assert_eq!(find_month(b"nothing"), None);
        assert_eq!(find_month(b"Ja"), None);
    }
}
