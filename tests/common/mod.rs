//! Shared test infrastructure for integration tests.
//!
//! `FakeLm` writes a small `sh` script that answers each phase by matching
//! the closing instruction of its prompt, and appends one line per call to a
//! log so tests can count model invocations.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

const FAKE_LM: &str = r#"#!/bin/sh
input=$(cat)
echo call >> "$FAKE_LM_LOG"
n=$(wc -l < "$FAKE_LM_LOG" | tr -d ' ')
case "$input" in
  *"inside <final_translation> tags"*) tag=final_translation ;;
  *"Place your review inside <review> tags"*) tag=review ;;
  *"inside <backtranslation> tags"*) tag=backtranslation ;;
  *"inside <clear_translation>"*) tag=clear_translation ;;
  *"inside <literal_translation> tags"*) tag=literal_translation ;;
  *"inside <analysis> tags"*) tag=analysis ;;
  *) printf 'untagged reply %s\n' "$n"; exit 0 ;;
esac
printf 'Notes first.\n<%s>\n%s output %s\n</%s>\n' "$tag" "$tag" "$n" "$tag"
"#;

/// Fake LM command plus an isolated config directory.
pub struct FakeLm {
    dir: TempDir,
    script: PathBuf,
    log: PathBuf,
}

impl FakeLm {
    pub fn install() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let script = dir.path().join("fake_lm.sh");
        fs::write(&script, FAKE_LM).expect("write fake LM script");
        let log = dir.path().join("calls.log");
        Self { dir, script, log }
    }

    pub fn lm_arg(&self) -> String {
        format!("sh {}", self.script.display())
    }

    /// Model calls made so far.
    pub fn calls(&self) -> usize {
        fs::read_to_string(&self.log)
            .map(|log| log.lines().count())
            .unwrap_or(0)
    }

    /// Write `contents` under the temp dir and return its path.
    pub fn file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).expect("write fixture file");
        path
    }

    /// `tflow <subcommand> <args> --lm <fake>` with a hermetic environment.
    pub fn tflow(&self, subcommand: &str, args: &[&str]) -> Command {
        let mut command = self.bare(subcommand);
        command.args(args).arg("--lm").arg(self.lm_arg());
        command
    }

    /// `tflow <subcommand>` without the fake LM flag.
    pub fn bare(&self, subcommand: &str) -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_tflow"));
        command
            .arg(subcommand)
            .env("FAKE_LM_LOG", &self.log)
            .env("XDG_CONFIG_HOME", self.dir.path())
            .env_remove("TFLOW_LM_COMMAND")
            .env_remove("TFLOW_LOG")
            .stdin(Stdio::null());
        command
    }
}

/// Run with `stdin` piped in and collect the output.
pub fn run_with_stdin(mut command: Command, stdin: &str) -> Output {
    use std::io::Write;

    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = command.spawn().expect("spawn tflow");
    child
        .stdin
        .take()
        .expect("stdin piped")
        .write_all(stdin.as_bytes())
        .expect("write stdin");
    child.wait_with_output().expect("wait for tflow")
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[allow(dead_code)]
pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
