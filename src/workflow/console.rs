use crate::phase::Phase;
use crate::pipeline::{Artifact, ArtifactSource, PipelineObserver};
use std::io::{self, Write};

/// Reports pipeline progress on stderr; stdout is left for results.
pub(crate) struct ConsoleObserver {
    stream: bool,
}

impl ConsoleObserver {
    pub(crate) fn new(stream: bool) -> Self {
        Self { stream }
    }
}

impl PipelineObserver for ConsoleObserver {
    fn phase_started(&mut self, phase: Phase, cached: bool) {
        if self.stream {
            let status = if cached { " (cached)" } else { "" };
            eprintln!(
                "== [{}/{}] {}{status} ==",
                phase.ordinal(),
                Phase::ALL.len(),
                phase.title()
            );
        }
    }

    fn fragment(&mut self, _phase: Phase, text: &str) {
        if self.stream {
            let mut stderr = io::stderr().lock();
            stderr.write_all(text.as_bytes()).ok();
            stderr.flush().ok();
        }
    }

    fn phase_finished(&mut self, artifact: &Artifact) {
        if self.stream && artifact.source == ArtifactSource::Computed {
            eprintln!();
        }
    }

    fn warning(&mut self, message: &str) {
        eprintln!("warning: {message}");
    }
}
