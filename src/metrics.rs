use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Counters for one pipe, shared by its reader and writer
#[derive(Debug, Clone, Default)]
pub struct PipeMetrics {
    /// Bytes accepted by the writer
    bytes_written: Arc<AtomicU64>,
    /// Bytes released by the reader
    bytes_released: Arc<AtomicU64>,
    /// Number of writes that had to wait for the reader (backpressure)
    write_blocks: Arc<AtomicU64>,
    /// Number of times unread bytes were slid back to offset zero
    compactions: Arc<AtomicU64>,
}

impl PipeMetrics {
    /// Create a new set of counters
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_written(&self, n: usize) {
        self.bytes_written.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn record_released(&self, n: usize) {
        self.bytes_released.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Record a block event (backpressure triggered)
    pub fn record_block(&self) {
        self.write_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_compaction(&self) {
        self.compactions.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the total number of bytes written
    pub fn total_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Get the total number of bytes released by the reader
    pub fn total_released(&self) -> u64 {
        self.bytes_released.load(Ordering::Relaxed)
    }

    /// Get the total number of block events
    pub fn total_blocks(&self) -> u64 {
        self.write_blocks.load(Ordering::Relaxed)
    }

    pub fn total_compactions(&self) -> u64 {
        self.compactions.load(Ordering::Relaxed)
    }
}

/// What one stage did during a run
#[derive(Debug, Clone, PartialEq)]
pub struct StageSnapshot {
    pub name: String,
    pub bytes_in: u64,
    pub bytes_out: u64,
    /// Writes to the next stage that waited for room
    pub blocked_writes: u64,
    pub compactions: u64,
    pub elapsed: Duration,
}

impl StageSnapshot {
    /// Build a snapshot from the stage's input and output pipes
    pub fn from_pipes(
        name: impl Into<String>,
        input: &PipeMetrics,
        output: &PipeMetrics,
        elapsed: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            bytes_in: input.total_released(),
            bytes_out: output.total_written(),
            blocked_writes: output.total_blocks(),
            compactions: output.total_compactions(),
            elapsed,
        }
    }

    /// Input consumed per second
    pub fn throughput_bps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.bytes_in as f64 / secs
        }
    }

    /// Format metrics as a human-readable string
    pub fn format(&self) -> String {
        format!(
            "{}: In: {} B, Out: {} B, Blocks: {}, Compactions: {}, \
             Throughput: {:.2} B/s, Elapsed: {:.3}s",
            self.name,
            self.bytes_in,
            self.bytes_out,
            self.blocked_writes,
            self.compactions,
            self.throughput_bps(),
            self.elapsed.as_secs_f64()
        )
    }
}

/// Per-stage summary of a finished run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub stages: Vec<StageSnapshot>,
    pub elapsed: Duration,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pipeline Metrics Summary:")?;
        for (i, stage) in self.stages.iter().enumerate() {
            writeln!(f, "  Stage {}: {}", i, stage.format())?;
        }
        writeln!(f, "  Total: {:.3}s", self.elapsed.as_secs_f64())
    }
}
