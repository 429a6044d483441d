//! One-shot `tflow translate`: every target language through one shared store,
//! optionally followed by feedback-seeded improvement rounds.
use super::console::ConsoleObserver;
use super::context::RunContext;
use crate::cli::TranslateArgs;
use crate::phase::Phase;
use crate::pipeline::{
    seed_feedback, PipelineConfig, PipelineExecutor, PipelineObserver, PipelineState, RunActions,
    RunOutcome, RunReport,
};
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::io::{self, IsTerminal};

/// Reports for one target language, first run then each improve round.
#[derive(Debug, Serialize)]
pub(crate) struct TargetSummary {
    pub(crate) target_lang: String,
    pub(crate) rounds: Vec<RunReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) failed_phase: Option<Phase>,
}

impl TargetSummary {
    fn final_translation(&self) -> Option<&str> {
        self.rounds.last().and_then(RunReport::final_translation)
    }
}

#[derive(Debug, Serialize)]
struct TranslateSummary<'a> {
    source_lang: &'a str,
    is_song: bool,
    invocations: usize,
    targets: &'a [TargetSummary],
}

/// Outcome of translating into every target.
pub(crate) struct TranslateRun {
    pub(crate) targets: Vec<TargetSummary>,
    /// First provider failure; later targets are not attempted.
    pub(crate) error: Option<anyhow::Error>,
}

impl TranslateRun {
    pub(crate) fn invocations(&self) -> usize {
        self.targets
            .iter()
            .flat_map(|target| &target.rounds)
            .map(|report| report.invocations)
            .sum()
    }
}

/// Run each config against `state`, seeding feedback before every improve
/// round.
pub(crate) fn translate_all(
    executor: &PipelineExecutor<'_>,
    state: &mut PipelineState,
    configs: &[PipelineConfig],
    source_text: &str,
    improve_rounds: usize,
    observer: &mut dyn PipelineObserver,
) -> Result<TranslateRun> {
    let mut run = TranslateRun {
        targets: Vec::new(),
        error: None,
    };
    let actions = RunActions::default();

    for config in configs {
        let mut summary = TargetSummary {
            target_lang: config.target_lang.clone(),
            rounds: Vec::new(),
            failed_phase: None,
        };
        for round in 0..=improve_rounds {
            if round > 0 {
                seed_feedback(state, &config.target_lang)?;
                tracing::info!(target_lang = %config.target_lang, round, "improve round");
            }
            match executor.run(state, config, source_text, &actions, observer) {
                RunOutcome::NotStarted => {
                    return Err(anyhow!("no source text to translate"));
                }
                RunOutcome::Completed(report) => summary.rounds.push(report),
                RunOutcome::Halted {
                    report,
                    phase,
                    error,
                } => {
                    summary.rounds.push(report);
                    summary.failed_phase = Some(phase);
                    run.error = Some(error.context(format!(
                        "{} failed for {}",
                        phase.title(),
                        config.target_lang
                    )));
                    break;
                }
            }
        }
        run.targets.push(summary);
        if run.error.is_some() {
            break;
        }
    }
    Ok(run)
}

pub fn run_translate(args: &TranslateArgs) -> Result<()> {
    let mut stdin = io::stdin();
    let fallback: Option<&mut dyn io::Read> = if args.source.text.is_none()
        && args.source.source_file.is_none()
        && !stdin.is_terminal()
    {
        Some(&mut stdin)
    } else {
        None
    };
    let source_text = args.source.read(fallback)?;
    if source_text.trim().is_empty() {
        return Err(anyhow!(
            "no source text (pass --text, --source-file, or pipe it on stdin)"
        ));
    }

    let targets = args.pipeline.targets();
    if targets.is_empty() {
        return Err(anyhow!("at least one --target-lang is required"));
    }
    let configs = targets
        .iter()
        .map(|target| args.pipeline.pipeline_config(target))
        .collect::<Result<Vec<_>>>()?;

    let context = RunContext::load(&args.provider)?;
    let executor = context.executor()?;
    let mut state = PipelineState::new();
    let mut observer = ConsoleObserver::new(args.stream);
    let run = translate_all(
        &executor,
        &mut state,
        &configs,
        &source_text,
        args.improve_rounds,
        &mut observer,
    )?;
    tracing::info!(
        targets = run.targets.len(),
        invocations = run.invocations(),
        "translate complete"
    );

    if args.json {
        let summary = TranslateSummary {
            source_lang: &args.pipeline.source_lang,
            is_song: args.pipeline.song,
            invocations: run.invocations(),
            targets: &run.targets,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        let headed = run.targets.len() > 1;
        for target in &run.targets {
            let Some(text) = target.final_translation() else {
                continue;
            };
            if headed {
                println!("== {} ==", target.target_lang);
            }
            println!("{text}");
            if headed {
                println!();
            }
        }
    }

    match run.error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
