use crate::buffer::{PipeReader, PipeWriter};
use crate::config::RunContext;
use crate::error::{PipelineError, Result};
use crate::stages::{Bunzip2, DragEnd, GroupMultiline, Gunzip, Ignore, NoEmpty, Only, UnixYear};
use log::{debug, error};
use regex::bytes::Regex;
use std::io::{BufWriter, Write};
use std::time::{Duration, Instant};

/// One transform in a pipeline
pub trait Stage: Send + 'static {
    /// Registry name of this stage
    fn name(&self) -> &str;

    /// Configure the stage with a compiled pattern.
    ///
    /// Called once per argument, before `process`; a later pattern replaces an
    /// earlier one. Stages that take no argument ignore it.
    fn init(&mut self, _pattern: Regex) {}

    /// Whether the stage is unusable without a pattern
    fn requires_pattern(&self) -> bool {
        false
    }

    /// Called before the stage starts processing
    fn on_start(&mut self, _ctx: &RunContext) -> Result<()> {
        Ok(())
    }

    /// Consume `input` to end-of-stream, writing the transformed bytes
    fn process(&mut self, input: &mut PipeReader, output: &mut dyn Write) -> Result<()>;
}

/// Registry entry: a stage name and how to build a fresh instance
pub struct StageDescriptor {
    pub name: &'static str,
    pub build: fn() -> Box<dyn Stage>,
}

/// Every stage the compiler knows about, by name
pub static REGISTRY: &[StageDescriptor] = &[
    StageDescriptor {
        name: "bunzip2",
        build: || Box::new(Bunzip2::new()),
    },
    StageDescriptor {
        name: "bunzip2?",
        build: || Box::new(Bunzip2::sniffing()),
    },
    StageDescriptor {
        name: "dragend",
        build: || Box::new(DragEnd::default()),
    },
    StageDescriptor {
        name: "groupml",
        build: || Box::new(GroupMultiline::default()),
    },
    StageDescriptor {
        name: "gunzip",
        build: || Box::new(Gunzip::new()),
    },
    StageDescriptor {
        name: "gunzip?",
        build: || Box::new(Gunzip::sniffing()),
    },
    StageDescriptor {
        name: "ignore",
        build: || Box::new(Ignore::default()),
    },
    StageDescriptor {
        name: "noempty",
        build: || Box::new(NoEmpty),
    },
    StageDescriptor {
        name: "only",
        build: || Box::new(Only::default()),
    },
    StageDescriptor {
        name: "unixyear",
        build: || Box::new(UnixYear::default()),
    },
];

/// Build a fresh stage by registry name
pub fn lookup(name: &str) -> Option<Box<dyn Stage>> {
    REGISTRY
        .iter()
        .find(|d| d.name == name)
        .map(|d| (d.build)())
}

/// Names accepted by [`lookup`]
pub fn stage_names() -> impl Iterator<Item = &'static str> {
    REGISTRY.iter().map(|d| d.name)
}

/// Runs a stage between its input pipe and output pipe
pub struct StageRunner {
    input: PipeReader,
    output: PipeWriter,
}

impl StageRunner {
    /// Create a new stage runner
    pub fn new(input: PipeReader, output: PipeWriter) -> Self {
        Self { input, output }
    }

    /// Run the stage to completion.
    ///
    /// The output pipe is closed whatever the outcome, and the input pipe is
    /// dropped so a still-running producer stops instead of blocking.
    pub fn run(self, stage: &mut dyn Stage, ctx: &RunContext) -> Result<Duration> {
        let StageRunner { mut input, output } = self;
        let start = Instant::now();
        debug!("stage {} starting", stage.name());

        let mut out = BufWriter::new(output);
        let result = stage
            .on_start(ctx)
            .and_then(|_| stage.process(&mut input, &mut out))
            .and_then(|_| out.flush().map_err(PipelineError::from));
        drop(input);
        drop(out);

        let elapsed = start.elapsed();
        match result {
            Ok(()) => {
                debug!("stage {} finished in {:?}", stage.name(), elapsed);
                Ok(elapsed)
            }
            Err(e) => {
                if e.is_broken_pipe() {
                    debug!("stage {} stopped: downstream closed", stage.name());
                } else {
                    error!("stage {} error: {}", stage.name(), e);
                }
                Err(PipelineError::in_stage(stage.name(), e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::pipe;
    use crate::config::PipeConfig;
    use std::io::Read;
    use std::thread;

    struct FailingStage;

    impl Stage for FailingStage {
        fn name(&self) -> &str {
            "failing"
        }

        fn process(&mut self, _input: &mut PipeReader, output: &mut dyn Write) -> Result<()> {
            output.write_all(b"partial")?;
            Err(PipelineError::LineTooLong { limit: 1 })
        }
    }

    #[test]
    fn test_registry_names_match_stages() {
        for descriptor in REGISTRY {
            let stage = (descriptor.build)();
            assert_eq!(stage.name(), descriptor.name);
        }
        assert_eq!(stage_names().count(), 10);
    }

    #[test]
    fn test_lookup_unknown_stage() {
        assert!(lookup("gzip").is_none());
        assert!(lookup("Gunzip").is_none());
        assert!(lookup("gunzip?").is_some());
    }

    #[test]
    fn test_pattern_requirements() {
        let needs: Vec<_> = REGISTRY
            .iter()
            .filter(|d| (d.build)().requires_pattern())
            .map(|d| d.name)
            .collect();
        assert_eq!(needs, vec!["dragend", "groupml", "ignore", "only"]);
    }

    #[test]
    fn test_runner_closes_output_on_error() {
        let config = PipeConfig::default();
        let (input, feed) = pipe(&config);
        let (mut drain, output) = pipe(&config);
        drop(feed);

        let handle = thread::spawn(move || {
            let mut stage = FailingStage;
            StageRunner::new(input, output).run(&mut stage, &RunContext::now())
        });

        let mut seen = Vec::new();
        drain.read_to_end(&mut seen).unwrap();
        let err = handle.join().unwrap().unwrap_err();

        assert_eq!(seen, b"partial");
        assert!(matches!(err, PipelineError::StageError { ref stage, .. } if stage == "failing"));
    }
}
