//! Compiler for the pipeline language.
//!
//! ```text
//! expr  = stage { arg } { "|" stage { arg } } .
//! arg   = "/" pattern "/" | "\"" literal "\"" .
//! ```
//!
//! `#` starts a comment running to the end of the line. Whitespace outside
//! arguments only separates tokens. A quoted literal matches its text
//! exactly; a slash-delimited pattern is a regular expression.

use crate::error::{PipelineError, Result};
use crate::pipeline::Pipeline;
use crate::stage::{lookup, Stage};
use log::debug;
use regex::bytes::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Stage,
    Literal,
    Pattern,
    Pipe,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Token<'a> {
    kind: TokenKind,
    /// Token text, without delimiters for arguments
    text: &'a str,
    /// Byte offset of the first character of the token
    offset: usize,
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn next_token(&mut self) -> Result<Token<'a>> {
        let bytes = self.src.as_bytes();
        while let Some(&c) = bytes.get(self.pos) {
            let offset = self.pos;
            match c {
                b' ' | b'\n' | b'\r' | b'\t' => self.pos += 1,
                b'#' => {
                    self.pos = self.src[offset..]
                        .find('\n')
                        .map_or(self.src.len(), |i| offset + i);
                }
                b'|' => {
                    self.pos += 1;
                    return Ok(self.token(TokenKind::Pipe, offset, self.pos));
                }
                b'"' | b'/' => {
                    let body = offset + 1;
                    let close = self.src[body..]
                        .find(c as char)
                        .ok_or(PipelineError::UnterminatedArgument { offset })?;
                    self.pos = body + close + 1;
                    let kind = if c == b'"' {
                        TokenKind::Literal
                    } else {
                        TokenKind::Pattern
                    };
                    return Ok(Token {
                        kind,
                        text: &self.src[body..body + close],
                        offset,
                    });
                }
                c if is_name_byte(c) => {
                    let len = bytes[offset..]
                        .iter()
                        .position(|&b| !is_name_byte(b))
                        .unwrap_or(bytes.len() - offset);
                    self.pos = offset + len;
                    return Ok(self.token(TokenKind::Stage, offset, self.pos));
                }
                _ => return Err(PipelineError::UnknownToken { offset }),
            }
        }
        Ok(self.token(TokenKind::End, self.pos, self.pos))
    }

    fn token(&self, kind: TokenKind, start: usize, end: usize) -> Token<'a> {
        Token {
            kind,
            text: &self.src[start..end],
            offset: start,
        }
    }
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'?' | b'-')
}

/// Stage currently receiving arguments
struct OpenStage {
    offset: usize,
    configured: bool,
}

/// Compile a program into a pipeline of freshly initialized stages.
///
/// Compilation stops at the first error; no partial pipeline is returned.
/// An empty program yields an empty pipeline, which copies its input.
pub fn compile(program: &str) -> Result<Pipeline> {
    let mut lexer = Lexer::new(program);
    let mut stages: Vec<Box<dyn Stage>> = Vec::new();
    let mut open: Option<OpenStage> = None;

    loop {
        let token = lexer.next_token()?;
        match token.kind {
            TokenKind::Stage => {
                close_stage(&stages, open.take())?;
                let stage = lookup(token.text).ok_or_else(|| PipelineError::UnknownStage {
                    name: token.text.to_string(),
                    offset: token.offset,
                })?;
                stages.push(stage);
                open = Some(OpenStage {
                    offset: token.offset,
                    configured: false,
                });
            }
            TokenKind::Literal | TokenKind::Pattern => {
                let (Some(current), Some(stage)) = (open.as_mut(), stages.last_mut()) else {
                    return Err(PipelineError::DanglingArgument {
                        offset: token.offset,
                    });
                };
                stage.init(compile_argument(&token)?);
                current.configured = true;
            }
            TokenKind::Pipe => close_stage(&stages, open.take())?,
            TokenKind::End => {
                close_stage(&stages, open.take())?;
                break;
            }
        }
    }

    debug!(
        "compiled pipeline: {:?}",
        stages.iter().map(|s| s.name()).collect::<Vec<_>>()
    );
    Ok(Pipeline::new(stages))
}

fn compile_argument(token: &Token<'_>) -> Result<Regex> {
    let source = match token.kind {
        TokenKind::Literal => regex::escape(token.text),
        _ => token.text.to_string(),
    };
    Regex::new(&source).map_err(|e| PipelineError::InvalidPattern {
        pattern: token.text.to_string(),
        offset: token.offset,
        source: e,
    })
}

/// Check the stage that just stopped receiving arguments
fn close_stage(stages: &[Box<dyn Stage>], open: Option<OpenStage>) -> Result<()> {
    let (Some(open), Some(stage)) = (open, stages.last()) else {
        return Ok(());
    };
    if !open.configured && stage.requires_pattern() {
        return Err(PipelineError::MissingPattern {
            stage: stage.name().to_string(),
            offset: open.offset,
        });
    }
    Ok(())
}
