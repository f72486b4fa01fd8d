use crate::buffer::{pipe, PipeReader};
use crate::compiler;
use crate::config::{PipeConfig, RunContext};
use crate::error::{PipelineError, Result};
use crate::metrics::{PipeMetrics, RunReport, StageSnapshot};
use crate::stage::{Stage, StageRunner};
use chrono::NaiveDate;
use crossbeam::thread::{self, ScopedJoinHandle};
use log::debug;
use std::fmt;
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

/// An ordered chain of stages, in data-flow order.
///
/// Stages keep per-run state, so running a pipeline consumes it; compile the
/// program again for another run.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    config: PipeConfig,
    today: Option<NaiveDate>,
}

impl Pipeline {
    /// Create a pipeline from already configured stages
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self {
            stages,
            config: PipeConfig::default(),
            today: None,
        }
    }

    /// Compile a program, see [`compiler::compile`]
    pub fn compile(program: &str) -> Result<Self> {
        compiler::compile(program)
    }

    /// Append a stage at the end of the chain
    pub fn push(&mut self, stage: Box<dyn Stage>) {
        self.stages.push(stage);
    }

    /// Size the pipes between stages
    pub fn with_config(mut self, config: PipeConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Pin the date stages see instead of reading the clock at run start
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Stream `input` through every stage into `output`.
    ///
    /// A feeder thread copies `input` into the first pipe and each stage runs
    /// on its own thread; the calling thread drains the last pipe into
    /// `output` and returns once everything has finished, the feeder
    /// included. An empty pipeline copies `input` unchanged.
    pub fn run<R, W>(self, mut input: R, mut output: W) -> Result<RunReport>
    where
        R: Read + Send,
        W: Write,
    {
        if self.stages.is_empty() {
            let started = Instant::now();
            io::copy(&mut input, &mut output)?;
            output.flush()?;
            return Ok(RunReport {
                stages: Vec::new(),
                elapsed: started.elapsed(),
            });
        }

        let (first, mut feed) = pipe(&self.config);
        let outcome = thread::scope(|s| {
            let feeder = s.spawn(move |_| -> Result<()> {
                io::copy(&mut input, &mut feed)?;
                Ok(())
            });
            let report = self.run_from(first, output);
            (report, join(feeder, "feeder"))
        });
        let (report, fed) = outcome
            .map_err(|_| PipelineError::ThreadError("pipeline scope panicked".into()))?;

        let report = report?;
        if let Err(e) = fed {
            if !e.is_broken_pipe() {
                return Err(e);
            }
        }
        Ok(report)
    }

    /// Stream an already connected pipe through every stage into `output`.
    ///
    /// The caller keeps the writing end. Nothing waits on that writer, so a
    /// producer stuck on a blocking read does not hold the run open once the
    /// stages are done; it sees a broken pipe on its next write instead.
    pub fn run_from<W: Write>(self, input: PipeReader, mut output: W) -> Result<RunReport> {
        let started = Instant::now();
        let ctx = self.today.map_or_else(RunContext::now, RunContext::on);
        let Pipeline {
            mut stages, config, ..
        } = self;

        if stages.is_empty() {
            let mut input = input;
            io::copy(&mut input, &mut output)?;
            output.flush()?;
            return Ok(RunReport {
                stages: Vec::new(),
                elapsed: started.elapsed(),
            });
        }

        let mut metrics: Vec<PipeMetrics> = vec![input.metrics().clone()];
        let mut runners = Vec::with_capacity(stages.len());
        let mut upstream = input;
        for _ in 0..stages.len() {
            let (downstream, writer) = pipe(&config);
            metrics.push(downstream.metrics().clone());
            runners.push(StageRunner::new(upstream, writer));
            upstream = downstream;
        }
        let mut drain = upstream;
        let names: Vec<String> = stages.iter().map(|s| s.name().to_string()).collect();

        let outcome = thread::scope(|s| {
            let ctx = &ctx;
            let workers: Vec<_> = runners
                .into_iter()
                .zip(stages.iter_mut())
                .map(|(runner, stage)| s.spawn(move |_| runner.run(stage.as_mut(), ctx)))
                .collect();

            let drained = io::copy(&mut drain, &mut output).and_then(|_| output.flush());
            drop(drain);

            let results: Vec<_> = workers
                .into_iter()
                .zip(&names)
                .map(|(worker, name)| join(worker, name))
                .collect();
            (drained, results)
        });
        let (drained, results) = outcome
            .map_err(|_| PipelineError::ThreadError("pipeline scope panicked".into()))?;

        let mut failure = None;
        let mut timings = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(elapsed) => timings.push(elapsed),
                Err(e) => {
                    timings.push(Duration::ZERO);
                    if failure.is_none() && !e.is_broken_pipe() {
                        failure = Some(e);
                    }
                }
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }
        drained?;

        let report = RunReport {
            stages: names
                .iter()
                .zip(timings)
                .enumerate()
                .map(|(i, (name, elapsed))| {
                    StageSnapshot::from_pipes(name.as_str(), &metrics[i], &metrics[i + 1], elapsed)
                })
                .collect(),
            elapsed: started.elapsed(),
        };
        debug!("{}", report);
        Ok(report)
    }
}

fn join<T>(handle: ScopedJoinHandle<'_, Result<T>>, what: &str) -> Result<T> {
    handle
        .join()
        .map_err(|_| PipelineError::ThreadError(format!("{} panicked", what)))?
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .field("config", &self.config)
            .field("today", &self.today)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::NoEmpty;

    struct Panicking;

    impl Stage for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        fn process(&mut self, _input: &mut PipeReader, _output: &mut dyn Write) -> Result<()> {
            panic!("stage blew up");
        }
    }

    #[test]
    fn test_empty_pipeline_copies_input() {
        let mut out = Vec::new();
        let report = Pipeline::new(Vec::new()).run(&b"as is\n\n"[..], &mut out).unwrap();
        assert_eq!(out, b"as is\n\n");
        assert!(report.stages.is_empty());
    }

    #[test]
    fn test_run_reports_each_stage() {
        let mut pipeline = Pipeline::new(Vec::new());
        pipeline.push(Box::new(NoEmpty));
        pipeline.push(Box::new(NoEmpty));

        let mut out = Vec::new();
        let report = pipeline.run(&b"a\n\nb\n"[..], &mut out).unwrap();
        assert_eq!(out, b"a\nb\n");
        assert_eq!(report.stages.len(), 2);
        assert_eq!(report.stages[0].bytes_in, 5);
        assert_eq!(report.stages[0].bytes_out, 4);
        assert_eq!(report.stages[1].bytes_in, 4);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = Pipeline::new(Vec::new())
            .with_config(PipeConfig::new(16, 32))
            .unwrap_err();
        assert!(matches!(err, PipelineError::ConfigError(_)));
    }

    struct Rejecting;

    impl Stage for Rejecting {
        fn name(&self) -> &str {
            "rejecting"
        }

        fn process(&mut self, _input: &mut PipeReader, _output: &mut dyn Write) -> Result<()> {
            Err(PipelineError::ConfigError("rejected".into()))
        }
    }

    #[test]
    fn test_run_from_returns_while_writer_is_idle() {
        let config = PipeConfig::default();
        let (input, mut feed) = pipe(&config);
        feed.write_all(b"pending\n").unwrap();

        let mut pipeline = Pipeline::new(Vec::new());
        pipeline.push(Box::new(Rejecting));
        let err = pipeline.run_from(input, io::sink()).unwrap_err();
        assert!(matches!(err, PipelineError::StageError { ref stage, .. } if stage == "rejecting"));

        let broken = feed.write(b"more").unwrap_err();
        assert_eq!(broken.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_run_from_empty_pipeline_copies_pipe() {
        let (input, mut feed) = pipe(&PipeConfig::default());
        feed.write_all(b"a\n\nb").unwrap();
        feed.close();

        let mut out = Vec::new();
        Pipeline::new(Vec::new()).run_from(input, &mut out).unwrap();
        assert_eq!(out, b"a\n\nb");
    }

    #[test]
    fn test_panicking_stage_does_not_hang() {
        let mut pipeline = Pipeline::new(Vec::new());
        pipeline.push(Box::new(NoEmpty));
        pipeline.push(Box::new(Panicking));
        pipeline.push(Box::new(NoEmpty));

        let input = "x\n".repeat(250_000);
        let err = pipeline.run(input.as_bytes(), io::sink()).unwrap_err();
        assert!(matches!(err, PipelineError::ThreadError(_)));
    }
}
