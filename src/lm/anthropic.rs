//! Anthropic Messages API invoker with server-sent event streaming.
use super::{Fragments, ModelInvoker, ModelRequest};
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::io::BufRead;
use std::io::BufReader;
use std::time::Instant;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicInvoker {
    agent: ureq::Agent,
    base_url: String,
    model: String,
    api_key: String,
}

impl AnthropicInvoker {
    /// Resolve the API key from `api_key_env` and prepare an HTTP agent.
    pub fn new(base_url: &str, model: &str, api_key_env: &str) -> Result<Self> {
        let api_key = std::env::var(api_key_env)
            .with_context(|| format!("read API key from ${api_key_env}"))?;
        if api_key.trim().is_empty() {
            return Err(anyhow!("API key in ${api_key_env} is empty"));
        }
        if model.trim().is_empty() {
            return Err(anyhow!("anthropic provider requires a model name"));
        }
        Ok(Self {
            agent: ureq::Agent::new_with_defaults(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        })
    }
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<WireMessage>,
    stream: bool,
}

fn request_body<'a>(model: &'a str, request: &'a ModelRequest) -> MessagesRequest<'a> {
    MessagesRequest {
        model,
        max_tokens: request.options.max_tokens,
        temperature: request.options.temperature,
        system: request.options.system.as_deref(),
        messages: request
            .input
            .to_messages()
            .into_iter()
            .map(|message| WireMessage {
                role: message.role.as_str(),
                content: message.content,
            })
            .collect(),
        stream: true,
    }
}

impl ModelInvoker for AnthropicInvoker {
    fn invoke(&self, request: &ModelRequest) -> Result<Fragments<'_>> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = request_body(&self.model, request);
        let response = self
            .agent
            .post(&url)
            .header("x-api-key", self.api_key.as_str())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .send_json(&body)
            .with_context(|| format!("POST {url}"))?;
        let reader = BufReader::new(response.into_body().into_reader());
        Ok(Box::new(SseFragments::new(reader, request.input.byte_len())))
    }
}

/// Events we care about in the Messages streaming protocol.
#[derive(Debug, PartialEq)]
enum StreamEvent {
    Text(String),
    Stop,
    Error(String),
    Ignored,
}

fn parse_event_data(data: &str) -> Result<StreamEvent> {
    let value: Value = serde_json::from_str(data).context("parse stream event JSON")?;
    let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();
    let event = match kind {
        "content_block_delta" => {
            let delta = value.get("delta");
            let is_text = delta
                .and_then(|d| d.get("type"))
                .and_then(Value::as_str)
                .is_some_and(|t| t == "text_delta");
            match delta.and_then(|d| d.get("text")).and_then(Value::as_str) {
                Some(text) if is_text => StreamEvent::Text(text.to_string()),
                _ => StreamEvent::Ignored,
            }
        }
        "message_stop" => StreamEvent::Stop,
        "error" => {
            let message = value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown stream error");
            StreamEvent::Error(message.to_string())
        }
        _ => StreamEvent::Ignored,
    };
    Ok(event)
}

struct SseFragments<R> {
    reader: R,
    prompt_bytes: usize,
    response_bytes: usize,
    started: Instant,
    finished: bool,
}

impl<R: BufRead> SseFragments<R> {
    fn new(reader: R, prompt_bytes: usize) -> Self {
        Self {
            reader,
            prompt_bytes,
            response_bytes: 0,
            started: Instant::now(),
            finished: false,
        }
    }

    fn complete(&mut self) {
        self.finished = true;
        tracing::info!(
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            prompt_bytes = self.prompt_bytes,
            response_bytes = self.response_bytes,
            "lm invoke complete"
        );
    }
}

impl<R: BufRead> Iterator for SseFragments<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            let mut line = String::new();
            match self.reader.read_line(&mut line) {
                Ok(0) => {
                    self.complete();
                    return None;
                }
                Ok(_) => {}
                Err(err) => {
                    self.finished = true;
                    return Some(Err(anyhow::Error::new(err).context("read stream body")));
                }
            }
            let Some(data) = line.trim_end().strip_prefix("data:") else {
                continue;
            };
            match parse_event_data(data.trim()) {
                Ok(StreamEvent::Text(text)) => {
                    self.response_bytes += text.len();
                    return Some(Ok(text));
                }
                Ok(StreamEvent::Stop) => {
                    self.complete();
                    return None;
                }
                Ok(StreamEvent::Error(message)) => {
                    self.finished = true;
                    return Some(Err(anyhow!("model stream error: {message}")));
                }
                Ok(StreamEvent::Ignored) => {}
                Err(err) => {
                    self.finished = true;
                    return Some(Err(err));
                }
            }
        }
        None
    }
}
