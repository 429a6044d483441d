//! Local LM command invoker.
//!
//! Invokes a user-configured command with the rendered request on stdin and
//! streams stdout back line by line. Any tool that reads a prompt and writes
//! text works (e.g. `llm`, `ollama run <model>`, `claude -p`).
use super::{Fragments, ModelInput, ModelInvoker, ModelRequest};
use anyhow::{anyhow, Context, Result};
use std::io::{self, BufRead, BufReader, ErrorKind, Read, Write};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct CommandInvoker {
    argv: Vec<String>,
}

impl CommandInvoker {
    /// Parse `command` with shell-words and check the program resolves.
    pub fn new(command: &str) -> Result<Self> {
        let argv =
            shell_words::split(command).with_context(|| format!("parse LM command: {command}"))?;
        Self::from_argv(argv)
    }

    pub fn from_argv(argv: Vec<String>) -> Result<Self> {
        let Some(program) = argv.first() else {
            return Err(anyhow!("LM command is empty"));
        };
        which::which(program).with_context(|| format!("locate LM command: {program}"))?;
        Ok(Self { argv })
    }
}

/// Flatten a request into the stdin text the command receives.
///
/// A bare prompt without system text is passed through untouched.
pub fn render_stdin(request: &ModelRequest) -> String {
    let mut text = String::new();
    if let Some(system) = &request.options.system {
        text.push_str("system: ");
        text.push_str(system);
        text.push_str("\n\n");
    }
    match &request.input {
        ModelInput::Prompt(prompt) => text.push_str(prompt),
        ModelInput::Messages(messages) => {
            let turns = messages
                .iter()
                .map(|message| format!("{}: {}", message.role, message.content))
                .collect::<Vec<_>>()
                .join("\n\n");
            text.push_str(&turns);
        }
    }
    text
}

impl ModelInvoker for CommandInvoker {
    fn invoke(&self, request: &ModelRequest) -> Result<Fragments<'_>> {
        let program = &self.argv[0];
        let stdin_text = render_stdin(request);
        let mut child = Command::new(program)
            .args(&self.argv[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawn LM command: {program}"))?;

        let stderr = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut buf = String::new();
                let _ = pipe.read_to_string(&mut buf);
                buf
            })
        });

        let prompt_bytes = stdin_text.len();
        // Commands may write stdout before draining stdin.
        let stdin = child.stdin.take().map(|mut pipe| {
            std::thread::spawn(move || match pipe.write_all(stdin_text.as_bytes()) {
                // The command may exit without reading its input; its exit
                // status decides the outcome.
                Err(err) if err.kind() == ErrorKind::BrokenPipe => Ok(()),
                other => other,
            })
        });

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("LM command stdout unavailable"))?;

        Ok(Box::new(CommandFragments {
            child,
            stdout: BufReader::new(stdout),
            stdin,
            stderr,
            program: program.clone(),
            prompt_bytes,
            response_bytes: 0,
            started: Instant::now(),
            finished: false,
        }))
    }
}

struct CommandFragments {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stdin: Option<JoinHandle<io::Result<()>>>,
    stderr: Option<JoinHandle<String>>,
    program: String,
    prompt_bytes: usize,
    response_bytes: usize,
    started: Instant,
    finished: bool,
}

impl CommandFragments {
    fn finish(&mut self) -> Result<()> {
        let status = self
            .child
            .wait()
            .with_context(|| format!("wait for LM command: {}", self.program))?;
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        tracing::info!(
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            prompt_bytes = self.prompt_bytes,
            response_bytes = self.response_bytes,
            "lm invoke complete"
        );
        if !status.success() {
            return Err(anyhow!(
                "LM command failed with status {status}: {}",
                stderr.trim()
            ));
        }
        match self.stdin.take().map(JoinHandle::join) {
            Some(Ok(Err(err))) => Err(err).context("write prompt to LM stdin"),
            Some(Err(_)) => Err(anyhow!("LM stdin writer panicked")),
            _ => Ok(()),
        }
    }
}

impl Iterator for CommandFragments {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let mut line = String::new();
        match self.stdout.read_line(&mut line) {
            Ok(0) => {
                self.finished = true;
                self.finish().err().map(Err)
            }
            Ok(read) => {
                self.response_bytes += read;
                Some(Ok(line))
            }
            Err(err) => {
                self.finished = true;
                let _ = self.child.kill();
                let _ = self.child.wait();
                Some(Err(anyhow::Error::new(err).context("read LM stdout")))
            }
        }
    }
}

impl Drop for CommandFragments {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
