use std::io;
use thiserror::Error;

/// Result type for pipeline compilation and execution
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while compiling or running a pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Stage name not present in the registry
    #[error("unknown stage {name} at {offset}")]
    UnknownStage { name: String, offset: usize },

    /// Argument could not be compiled into a regular expression
    #[error("at {offset}: invalid pattern {pattern}: {source}")]
    InvalidPattern {
        pattern: String,
        offset: usize,
        #[source]
        source: regex::Error,
    },

    /// Character that cannot start any token
    #[error("unknown token at {offset}")]
    UnknownToken { offset: usize },

    /// Quoted literal or pattern missing its closing delimiter
    #[error("unterminated argument at {offset}")]
    UnterminatedArgument { offset: usize },

    /// Argument with no stage to configure
    #[error("at {offset}: argument does not follow a stage")]
    DanglingArgument { offset: usize },

    /// Stage that needs a pattern was given none
    #[error("at {offset}: stage {stage} requires a pattern")]
    MissingPattern { stage: String, offset: usize },

    /// A single line did not fit the reader's look-ahead
    #[error("line exceeds maximum window of {limit} bytes")]
    LineTooLong { limit: usize },

    /// Stage execution error
    #[error("stage {stage} failed: {source}")]
    StageError {
        stage: String,
        #[source]
        source: Box<PipelineError>,
    },

    /// Underlying read or write failure
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Worker thread panicked
    #[error("Thread join error: {0}")]
    ThreadError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl PipelineError {
    /// Wrap an error raised while a stage was running
    pub fn in_stage(stage: impl Into<String>, err: PipelineError) -> Self {
        PipelineError::StageError {
            stage: stage.into(),
            source: Box::new(err),
        }
    }

    /// True when the error only reflects a consumer that went away.
    ///
    /// An upstream stage sees this once a downstream stage fails and drops
    /// its input, so it never explains a failure by itself.
    pub fn is_broken_pipe(&self) -> bool {
        match self {
            PipelineError::Io(e) => e.kind() == io::ErrorKind::BrokenPipe,
            PipelineError::StageError { source, .. } => source.is_broken_pipe(),
            _ => false,
        }
    }
}
