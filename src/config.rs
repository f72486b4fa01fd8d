use crate::error::{PipelineError, Result};
use chrono::{Local, NaiveDate};

/// Default physical size of each stage-to-stage ring
pub const DEFAULT_CAPACITY: usize = 80_000;
/// Default cap on a reader's window
pub const DEFAULT_MAX_WINDOW: usize = 40_000;
/// Default amount a line scanner asks for when it needs more bytes
pub const DEFAULT_READ_CHUNK: usize = 1024;

/// Sizing of the pipes that connect stages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeConfig {
    /// Bytes held by one ring
    pub capacity: usize,
    /// Largest window a reader can look at before releasing
    pub max_window: usize,
    /// Growth step used by line scanners
    pub read_chunk: usize,
}

impl PipeConfig {
    /// Create a config with the given capacity and look-ahead
    pub fn new(capacity: usize, max_window: usize) -> Self {
        Self {
            capacity,
            max_window,
            read_chunk: DEFAULT_READ_CHUNK.min(max_window),
        }
    }

    /// Set the line scanner growth step
    pub fn with_read_chunk(mut self, read_chunk: usize) -> Self {
        self.read_chunk = read_chunk;
        self
    }

    /// Check that the sizes can work together.
    ///
    /// The look-ahead must stay below the capacity, otherwise a reader could
    /// wait for a window the writer is never able to fill.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 || self.max_window == 0 || self.read_chunk == 0 {
            return Err(PipelineError::ConfigError(
                "pipe sizes must be non-zero".into(),
            ));
        }
        if self.max_window >= self.capacity {
            return Err(PipelineError::ConfigError(format!(
                "max window {} must be below capacity {}",
                self.max_window, self.capacity
            )));
        }
        if self.read_chunk > self.max_window {
            return Err(PipelineError::ConfigError(format!(
                "read chunk {} exceeds max window {}",
                self.read_chunk, self.max_window
            )));
        }
        Ok(())
    }
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            max_window: DEFAULT_MAX_WINDOW,
            read_chunk: DEFAULT_READ_CHUNK,
        }
    }
}

/// Values fixed once per run and handed to every stage before it starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunContext {
    /// Date used by stages that fill in missing timestamp fields
    pub today: NaiveDate,
}

impl RunContext {
    /// Context for a run starting now, in local time
    pub fn now() -> Self {
        Self {
            today: Local::now().date_naive(),
        }
    }

    /// Context pinned to a given date
    pub fn on(today: NaiveDate) -> Self {
        Self { today }
    }
}
