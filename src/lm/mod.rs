//! Model invocation boundary.
//!
//! The pipeline only sees [`ModelInvoker`]: a request goes in, a lazy finite
//! sequence of text fragments comes out. Concrete invokers either shell out to
//! a user-configured command or stream from the Anthropic Messages API.
pub mod anthropic;
pub mod command;
#[cfg(test)]
pub mod scripted;

use crate::config::{Provider, ToolConfig};
use anyhow::{anyhow, Context, Result};
use std::fmt;

pub const DEFAULT_MAX_TOKENS: u32 = 5000;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Lazily produced response text; concatenation is the full response.
pub type Fragments<'a> = Box<dyn Iterator<Item = Result<String>> + 'a>;

/// A generative model reachable from the pipeline.
pub trait ModelInvoker {
    /// Start a request and return its fragment stream.
    fn invoke(&self, request: &ModelRequest) -> Result<Fragments<'_>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Either a bare prompt or an ordered conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelInput {
    Prompt(String),
    Messages(Vec<Message>),
}

impl ModelInput {
    /// View the input as a conversation; a bare prompt is a single user turn.
    pub fn to_messages(&self) -> Vec<Message> {
        match self {
            ModelInput::Prompt(prompt) => vec![Message::user(prompt.as_str())],
            ModelInput::Messages(messages) => messages.clone(),
        }
    }

    pub fn byte_len(&self) -> usize {
        match self {
            ModelInput::Prompt(prompt) => prompt.len(),
            ModelInput::Messages(messages) => messages.iter().map(|m| m.content.len()).sum(),
        }
    }
}

/// Sampling and framing options forwarded to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    pub system: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            system: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl RequestOptions {
    pub fn with_system(mut self, system: Option<String>) -> Self {
        self.system = system;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(anyhow!("max_tokens must be positive"));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(anyhow!(
                "temperature must be within 0.0..=1.0 (got {})",
                self.temperature
            ));
        }
        Ok(())
    }
}

/// A validated request; construction is the only validation point.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub input: ModelInput,
    pub options: RequestOptions,
}

impl ModelRequest {
    pub fn new(input: ModelInput, options: RequestOptions) -> Result<Self> {
        options.validate().context("validate model request options")?;
        if let ModelInput::Messages(messages) = &input {
            if messages.is_empty() {
                return Err(anyhow!("model request has no messages"));
            }
        }
        Ok(Self { input, options })
    }

    pub fn prompt(prompt: impl Into<String>, options: RequestOptions) -> Result<Self> {
        Self::new(ModelInput::Prompt(prompt.into()), options)
    }
}

/// Drain a fragment stream, handing each piece to `on_fragment` as it arrives.
pub fn collect_fragments(
    fragments: Fragments<'_>,
    mut on_fragment: impl FnMut(&str),
) -> Result<String> {
    let mut text = String::new();
    for fragment in fragments {
        let fragment = fragment?;
        on_fragment(&fragment);
        text.push_str(&fragment);
    }
    Ok(text)
}

/// Build the invoker selected by the resolved tool config.
pub fn build_invoker(config: &ToolConfig) -> Result<Box<dyn ModelInvoker>> {
    match config.provider {
        Provider::Command => {
            let command = config
                .lm_command
                .as_deref()
                .ok_or_else(|| anyhow!("provider \"command\" requires lm_command"))?;
            Ok(Box::new(command::CommandInvoker::new(command)?))
        }
        Provider::Anthropic => Ok(Box::new(anthropic::AnthropicInvoker::new(
            &config.base_url,
            &config.model,
            &config.api_key_env,
        )?)),
    }
}
