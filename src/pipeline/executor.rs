//! Drives the six phases in order against one session's store.
use super::state::{Computed, Lookup, PipelineState};
use super::{Artifact, ArtifactSource, PipelineConfig, RunActions};
use crate::extract::extract_between;
use crate::lm::{collect_fragments, ModelInvoker, ModelRequest, RequestOptions};
use crate::phase::{Phase, PhaseKey, SYLLABIFICATION_TAG};
use crate::prompts::{BuiltPrompt, PromptBuilder};
use anyhow::{Context, Result};
use serde::Serialize;
use std::time::Instant;

/// Receives progress as the pipeline runs; fragments never touch cache state.
pub trait PipelineObserver {
    fn phase_started(&mut self, _phase: Phase, _cached: bool) {}
    fn fragment(&mut self, _phase: Phase, _text: &str) {}
    fn phase_finished(&mut self, _artifact: &Artifact) {}
    fn warning(&mut self, _message: &str) {}
}

/// Observer that ignores everything.
pub struct NullObserver;

impl PipelineObserver for NullObserver {}

/// Artifacts produced by one run, in phase order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub target_lang: String,
    pub artifacts: Vec<Artifact>,
    /// Model calls issued during this run.
    pub invocations: usize,
}

impl RunReport {
    pub fn artifact(&self, phase: Phase) -> Option<&Artifact> {
        self.artifacts.iter().find(|artifact| artifact.phase == phase)
    }

    pub fn final_translation(&self) -> Option<&str> {
        self.artifact(Phase::FinalTranslation)
            .map(|artifact| artifact.text.as_str())
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    /// No source text; nothing was invoked.
    NotStarted,
    Completed(RunReport),
    /// A model call failed; later phases did not run.
    Halted {
        report: RunReport,
        phase: Phase,
        error: anyhow::Error,
    },
}

impl RunOutcome {
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            RunOutcome::NotStarted => None,
            RunOutcome::Completed(report) => Some(report),
            RunOutcome::Halted { report, .. } => Some(report),
        }
    }
}

/// Artifacts gathered so far within one run.
#[derive(Default)]
struct Upstream {
    analysis: String,
    literal_translation: String,
    clarified_translation: String,
    syllabification: Option<String>,
    backtranslation: String,
    review: String,
}

pub struct PipelineExecutor<'a> {
    invoker: &'a dyn ModelInvoker,
    options: RequestOptions,
}

impl<'a> PipelineExecutor<'a> {
    /// Options are validated here, once, before any call is issued.
    pub fn new(invoker: &'a dyn ModelInvoker, options: RequestOptions) -> Result<Self> {
        options.validate().context("validate request options")?;
        Ok(Self { invoker, options })
    }

    /// Run every phase for `config.target_lang`, reusing cached results where
    /// the freshly built prompt matches the recorded one.
    pub fn run(
        &self,
        state: &mut PipelineState,
        config: &PipelineConfig,
        source_text: &str,
        actions: &RunActions,
        observer: &mut dyn PipelineObserver,
    ) -> RunOutcome {
        if source_text.trim().is_empty() {
            tracing::info!("no source text; pipeline not started");
            return RunOutcome::NotStarted;
        }

        let builder = PromptBuilder::new(config, source_text);
        let mut report = RunReport {
            target_lang: config.target_lang.clone(),
            ..RunReport::default()
        };
        let mut upstream = Upstream::default();

        for phase in Phase::ALL {
            let built = build_prompt(&builder, phase, &upstream);
            let key = PhaseKey::new(phase, &config.target_lang);

            if let Some(edit) = actions.edits.get(&phase) {
                if let Err(err) = state.override_result(&key, edit.as_str()) {
                    tracing::warn!(%key, "skipping edit: {err}");
                    observer.warning(&format!("edit for {phase} skipped: {err}"));
                }
            }

            let force = actions.redo.contains(&phase);
            let cached = state.lookup(&key, &built.prompt, force).is_hit();
            observer.phase_started(phase, cached);

            let outcome = state.get_or_compute(&key, &built.prompt, force, |prompt| {
                self.compute(phase, config.is_song, prompt, built.system.clone(), &mut *observer)
            });
            let (entry, lookup) = match outcome {
                Ok(found) => found,
                Err(error) => {
                    tracing::warn!(%key, "phase failed: {error:#}");
                    return RunOutcome::Halted {
                        report,
                        phase,
                        error,
                    };
                }
            };
            if !lookup.is_hit() {
                report.invocations += 1;
            }

            let text = entry.last_result.clone();
            match phase {
                Phase::Analysis => upstream.analysis = text.clone(),
                Phase::LiteralTranslation => upstream.literal_translation = text.clone(),
                Phase::Clarity => {
                    upstream.clarified_translation = text.clone();
                    upstream.syllabification = entry.extras.get(SYLLABIFICATION_TAG).cloned();
                }
                Phase::Backtranslation => upstream.backtranslation = text.clone(),
                Phase::Review => upstream.review = text.clone(),
                Phase::FinalTranslation => {}
            }

            let artifact = Artifact {
                phase,
                text,
                source: match lookup {
                    Lookup::Hit => ArtifactSource::Cached,
                    Lookup::Miss(_) => ArtifactSource::Computed,
                },
            };
            observer.phase_finished(&artifact);
            report.artifacts.push(artifact);
        }

        RunOutcome::Completed(report)
    }

    /// Invoke the model for one phase and extract its tagged sections.
    fn compute(
        &self,
        phase: Phase,
        is_song: bool,
        prompt: &str,
        system: Option<String>,
        observer: &mut dyn PipelineObserver,
    ) -> Result<Computed> {
        let start = Instant::now();
        let request = ModelRequest::prompt(prompt, self.options.clone().with_system(system))?;
        let fragments = self
            .invoker
            .invoke(&request)
            .with_context(|| format!("invoke model for {phase}"))?;
        let raw = collect_fragments(fragments, |fragment| observer.fragment(phase, fragment))
            .with_context(|| format!("stream model response for {phase}"))?;
        tracing::debug!(
            %phase,
            elapsed_ms = start.elapsed().as_millis() as u64,
            response_bytes = raw.len(),
            "phase computed"
        );

        let mut computed = Computed::new(extract_between(&raw, phase.tag()));
        for tag in phase.secondary_tags(is_song) {
            computed
                .extras
                .insert(tag.to_string(), extract_between(&raw, tag));
        }
        Ok(computed)
    }
}

fn build_prompt(builder: &PromptBuilder<'_>, phase: Phase, upstream: &Upstream) -> BuiltPrompt {
    match phase {
        Phase::Analysis => builder.analysis(),
        Phase::LiteralTranslation => builder.literal_translation(),
        Phase::Clarity => builder.clarity(&upstream.analysis, &upstream.literal_translation),
        Phase::Backtranslation => builder.backtranslation(&upstream.clarified_translation),
        Phase::Review => builder.review(
            &upstream.clarified_translation,
            &upstream.backtranslation,
            upstream.syllabification.as_deref(),
        ),
        Phase::FinalTranslation => builder.final_translation(
            &upstream.analysis,
            &upstream.clarified_translation,
            &upstream.review,
        ),
    }
}

/// Copy the final translation into the clarity slot for `target_lang`.
///
/// Clarity keeps its recorded prompt, so the next run reuses the seeded text
/// as the clarified translation and recomputes every phase after it.
pub fn seed_feedback(state: &mut PipelineState, target_lang: &str) -> Result<()> {
    let from = PhaseKey::new(Phase::FinalTranslation, target_lang);
    let to = PhaseKey::new(Phase::Clarity, target_lang);
    state
        .reseed(&from, &to)
        .with_context(|| format!("seed feedback for {target_lang}"))
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
