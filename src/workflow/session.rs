//! Interactive `tflow session`: one store kept alive across commands so redo,
//! edit and improve only pay for the phases they invalidate.
use super::console::ConsoleObserver;
use super::context::RunContext;
use crate::cli::SessionArgs;
use crate::phase::{Phase, PhaseKey, SYLLABIFICATION_TAG};
use crate::pipeline::{
    seed_feedback, ArtifactSource, PipelineConfig, PipelineExecutor, PipelineObserver,
    PipelineState, RunActions, RunOutcome,
};
use anyhow::{anyhow, Context, Result};
use shell_words::split as shell_split;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::Command;

const HELP: &str = "\
Commands:
  run                   Run all phases, reusing cached results
  redo <phase>          Recompute <phase> on the next run
  edit <phase> [file]   Replace a result (from file, or in $EDITOR)
  improve               Feed the final translation back as clarity and run
  show <phase>          Print a phase result for the current language
  lang <target>         Switch target language
  source <file>         Load new source text
  status                Show cached phases and queued redos
  help                  Show this help
  quit                  Leave the session
Phases: analysis, literal, clarity, back, review, final (or 1-6)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SessionCommand {
    Run,
    Redo(Phase),
    Edit { phase: Phase, file: Option<PathBuf> },
    Improve,
    Show(Phase),
    Lang(String),
    Source(PathBuf),
    Status,
    Help,
    Quit,
}

/// Parse one input line; blank lines yield `None`.
pub(crate) fn parse_command(line: &str) -> Result<Option<SessionCommand>> {
    let words = shell_split(line).context("parse session command")?;
    let Some((head, rest)) = words.split_first() else {
        return Ok(None);
    };
    let command = match (head.as_str(), rest) {
        ("run", []) => SessionCommand::Run,
        ("redo", [phase]) => SessionCommand::Redo(phase.parse()?),
        ("edit", [phase]) => SessionCommand::Edit {
            phase: phase.parse()?,
            file: None,
        },
        ("edit", [phase, file]) => SessionCommand::Edit {
            phase: phase.parse()?,
            file: Some(PathBuf::from(file)),
        },
        ("improve", []) => SessionCommand::Improve,
        ("show", [phase]) => SessionCommand::Show(phase.parse()?),
        ("lang", target) if !target.is_empty() => SessionCommand::Lang(target.join(" ")),
        ("source", [path]) => SessionCommand::Source(PathBuf::from(path)),
        ("status", []) => SessionCommand::Status,
        ("help" | "?", []) => SessionCommand::Help,
        ("quit" | "exit", []) => SessionCommand::Quit,
        (name, _) => {
            return match HELP.lines().find(|l| l.split_whitespace().next() == Some(name)) {
                Some(usage) => Err(anyhow!("usage: {}", usage.trim())),
                None => Err(anyhow!("unrecognized command {name:?} (try `help`)")),
            };
        }
    };
    Ok(Some(command))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Quit,
}

pub(crate) struct Session<'a> {
    executor: PipelineExecutor<'a>,
    state: PipelineState,
    config: PipelineConfig,
    source_text: String,
    pending: RunActions,
}

impl<'a> Session<'a> {
    pub(crate) fn new(
        executor: PipelineExecutor<'a>,
        config: PipelineConfig,
        source_text: String,
    ) -> Self {
        Self {
            executor,
            state: PipelineState::new(),
            config,
            source_text,
            pending: RunActions::default(),
        }
    }

    fn key(&self, phase: Phase) -> PhaseKey {
        PhaseKey::new(phase, &self.config.target_lang)
    }

    pub(crate) fn execute(
        &mut self,
        command: SessionCommand,
        out: &mut dyn Write,
        observer: &mut dyn PipelineObserver,
    ) -> Result<Flow> {
        match command {
            SessionCommand::Run => self.run(out, observer)?,
            SessionCommand::Redo(phase) => {
                self.pending.redo.insert(phase);
                writeln!(out, "{} will be recomputed on the next run", phase.title())?;
            }
            SessionCommand::Edit { phase, file } => {
                let key = self.key(phase);
                let current = self
                    .state
                    .entry(&key)
                    .map(|entry| entry.last_result.clone())
                    .ok_or_else(|| anyhow!("{key} has not been computed yet; run first"))?;
                let text = match file {
                    Some(path) => fs::read_to_string(&path)
                        .with_context(|| format!("read edit {}", path.display()))?,
                    None => edit_in_editor(&current)?,
                };
                let text = text.trim().to_string();
                if text.is_empty() {
                    return Err(anyhow!("edit for {key} discarded: empty text"));
                }
                self.state.override_result(&key, text)?;
                self.pending.redo.remove(&phase);
                writeln!(
                    out,
                    "{} edited; later phases rerun on the next run",
                    phase.title()
                )?;
            }
            SessionCommand::Improve => {
                seed_feedback(&mut self.state, &self.config.target_lang)?;
                // A queued clarity redo would overwrite the seed.
                self.pending.redo.remove(&Phase::Clarity);
                writeln!(out, "seeded clarity with the final translation")?;
                self.run(out, observer)?;
            }
            SessionCommand::Show(phase) => {
                let key = self.key(phase);
                match self.state.entry(&key) {
                    Some(entry) => {
                        writeln!(
                            out,
                            "== {} [{}] ==",
                            entry.key.phase.title(),
                            entry.key.target_lang
                        )?;
                        writeln!(out, "{}", entry.last_result)?;
                        if let Some(syllables) = entry.extras.get(SYLLABIFICATION_TAG) {
                            writeln!(out, "-- syllabification --\n{syllables}")?;
                        }
                    }
                    None => writeln!(out, "{key}: not computed yet")?,
                }
            }
            SessionCommand::Lang(target) => {
                self.config = self.config.for_target(target.trim());
                self.pending = RunActions::default();
                writeln!(out, "target language: {}", self.config.target_lang)?;
            }
            SessionCommand::Source(path) => {
                self.source_text = fs::read_to_string(&path)
                    .with_context(|| format!("read source text {}", path.display()))?;
                self.pending = RunActions::default();
                writeln!(
                    out,
                    "loaded {} bytes of source text",
                    self.source_text.len()
                )?;
            }
            SessionCommand::Status => self.status(out)?,
            SessionCommand::Help => writeln!(out, "{HELP}")?,
            SessionCommand::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    fn run(&mut self, out: &mut dyn Write, observer: &mut dyn PipelineObserver) -> Result<()> {
        let actions = std::mem::take(&mut self.pending);
        tracing::debug!(
            target_lang = %self.config.target_lang,
            queued = !actions.is_empty(),
            cached_entries = self.state.len(),
            "session run"
        );
        match self.executor.run(
            &mut self.state,
            &self.config,
            &self.source_text,
            &actions,
            observer,
        ) {
            RunOutcome::NotStarted => {
                self.pending = actions;
                writeln!(out, "no source text; load one with `source <file>`")?;
            }
            RunOutcome::Completed(report) => {
                let cached = report
                    .artifacts
                    .iter()
                    .filter(|a| a.source == ArtifactSource::Cached)
                    .count();
                writeln!(
                    out,
                    "{}: {} computed, {cached} cached",
                    report.target_lang, report.invocations
                )?;
                if let Some(text) = report.final_translation() {
                    writeln!(out, "{text}")?;
                }
            }
            RunOutcome::Halted { phase, error, .. } => {
                // Keep redos for phases the run never reached.
                self.pending.redo = actions.redo.into_iter().filter(|p| *p >= phase).collect();
                writeln!(out, "{} failed: {error:#}", phase.title())?;
            }
        }
        Ok(())
    }

    fn status(&self, out: &mut dyn Write) -> Result<()> {
        writeln!(
            out,
            "{} -> {}{}, {} bytes of source",
            self.config.source_lang,
            self.config.target_lang,
            if self.config.is_song { " (song)" } else { "" },
            self.source_text.len()
        )?;
        if !self.state.is_empty() {
            writeln!(out, "{} cached entries across languages", self.state.len())?;
        }
        for phase in Phase::ALL {
            let cached = if self.state.entry(&self.key(phase)).is_some() {
                "cached"
            } else {
                "-"
            };
            let queued = if self.pending.redo.contains(&phase) {
                "redo"
            } else {
                ""
            };
            writeln!(
                out,
                "  {}. {:<20} {cached:<7} {queued}",
                phase.ordinal(),
                phase.title()
            )?;
        }
        Ok(())
    }
}

/// Feed commands from `input` until `quit` or end of input.
///
/// Command failures are reported and the session continues.
pub(crate) fn run_repl(
    session: &mut Session<'_>,
    input: &mut dyn BufRead,
    out: &mut dyn Write,
    observer: &mut dyn PipelineObserver,
) -> Result<()> {
    let mut line = String::new();
    loop {
        write!(out, "tflow> ")?;
        out.flush()?;
        line.clear();
        if input.read_line(&mut line).context("read session input")? == 0 {
            writeln!(out)?;
            return Ok(());
        }
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                writeln!(out, "error: {err:#}")?;
                continue;
            }
        };
        tracing::debug!(?command, "session command");
        match session.execute(command, out, observer) {
            Ok(Flow::Quit) => return Ok(()),
            Ok(Flow::Continue) => {}
            Err(err) => writeln!(out, "error: {err:#}")?,
        }
    }
}

pub fn run_session(args: &SessionArgs) -> Result<()> {
    let source_text = args.source.read(None)?;
    let targets = args.pipeline.targets();
    let target = targets
        .first()
        .ok_or_else(|| anyhow!("at least one --target-lang is required"))?;
    if targets.len() > 1 {
        eprintln!("note: session starts with {target}; use `lang <target>` to switch");
    }
    let config = args.pipeline.pipeline_config(target)?;

    let context = RunContext::load(&args.provider)?;
    let mut session = Session::new(context.executor()?, config, source_text);
    let mut observer = ConsoleObserver::new(args.stream);
    let stdin = io::stdin();
    let stdout = io::stdout();
    run_repl(
        &mut session,
        &mut stdin.lock(),
        &mut stdout.lock(),
        &mut observer,
    )
}

fn resolve_editor() -> Vec<String> {
    for var in ["VISUAL", "EDITOR"] {
        if let Ok(value) = std::env::var(var) {
            if let Ok(parts) = shell_split(&value) {
                if !parts.is_empty() {
                    return parts;
                }
            }
        }
    }
    vec!["vi".to_string()]
}

/// Open `initial` in the user's editor and return the saved text.
fn edit_in_editor(initial: &str) -> Result<String> {
    let mut buffer = tempfile::Builder::new()
        .prefix("tflow-edit-")
        .suffix(".txt")
        .tempfile()
        .context("create edit buffer")?;
    buffer
        .write_all(initial.as_bytes())
        .context("write edit buffer")?;
    buffer.flush().context("flush edit buffer")?;

    let editor = resolve_editor();
    let (program, args) = editor
        .split_first()
        .ok_or_else(|| anyhow!("missing editor command"))?;
    let status = Command::new(program)
        .args(args)
        .arg(buffer.path())
        .status()
        .with_context(|| format!("run editor {program}"))?;
    if !status.success() {
        return Err(anyhow!("editor {program} exited with {status}"));
    }
    fs::read_to_string(buffer.path()).context("read edit buffer")
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
