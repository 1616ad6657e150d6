//! Model invoker used by advisors for their own reasoning calls.
//!
//! A [`Prompt`] is a template with `{name}` placeholders plus named
//! parameters. [`ModelInvoker::structured`] appends the JSON shape the answer
//! must follow and parses the first JSON object out of the reply, so models
//! that wrap their output in code fences or prose still work.

use deliberate_core::error::ProviderError;
use deliberate_core::message::Message;
use deliberate_core::provider::{Provider, ProviderRequest};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Failure of one advisor reasoning call. Never escapes an advisor.
#[derive(Debug, Error)]
pub enum AdviceError {
    #[error("model call failed: {0}")]
    Model(#[from] ProviderError),

    #[error("malformed structured output: {0}")]
    MalformedOutput(String),
}

/// A value a model can be asked to produce as JSON.
pub trait OutputShape: DeserializeOwned {
    /// JSON skeleton shown to the model.
    fn shape() -> &'static str;
}

/// Template + named parameters + optional system instructions.
#[derive(Debug, Clone, Default)]
pub struct Prompt {
    system: Option<String>,
    template: String,
    params: Vec<(String, String)>,
}

impl Prompt {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            system: None,
            template: template.into(),
            params: Vec::new(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// Substitute every `{name}` placeholder of the template in one pass.
    ///
    /// Parameter values are copied verbatim, so braces inside a value are
    /// never treated as placeholders. Unknown placeholders are left as is.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let value = after.find('}').and_then(|close| {
                let name = &after[..close];
                self.params
                    .iter()
                    .find(|(key, _)| key == name)
                    .map(|(_, value)| (value, close))
            });
            match value {
                Some((value, close)) => {
                    out.push_str(value);
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }

    fn messages(&self, suffix: Option<&str>) -> Vec<Message> {
        let mut body = self.render();
        if let Some(suffix) = suffix {
            body.push_str("\n\n");
            body.push_str(suffix);
        }
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system {
            messages.push(Message::system(system.clone()));
        }
        messages.push(Message::user(body));
        messages
    }
}

/// Issues single-shot, tool-less model calls on behalf of advisors.
#[derive(Clone)]
pub struct ModelInvoker {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl ModelInvoker {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.2,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Free-text answer.
    pub async fn text(&self, prompt: &Prompt) -> Result<String, AdviceError> {
        self.send(prompt.messages(None)).await
    }

    /// Answer parsed into `T`.
    pub async fn structured<T: OutputShape>(&self, prompt: &Prompt) -> Result<T, AdviceError> {
        let instruction = format!(
            "Respond with a single JSON object of exactly this shape and nothing else:\n{}",
            T::shape()
        );
        let reply = self.send(prompt.messages(Some(&instruction))).await?;
        parse_structured(&reply)
    }

    async fn send(&self, messages: Vec<Message>) -> Result<String, AdviceError> {
        let mut request = ProviderRequest::new(self.model.clone(), messages);
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;
        let response = self.provider.complete(request).await?;
        debug!(
            model = %response.model,
            chars = response.message.content.len(),
            "Advisor model call completed"
        );
        Ok(response.message.content)
    }
}

/// Parse the first JSON object embedded in `reply`.
pub fn parse_structured<T: DeserializeOwned>(reply: &str) -> Result<T, AdviceError> {
    let json = extract_json(reply)
        .ok_or_else(|| AdviceError::MalformedOutput(format!("no JSON object in reply: {}", preview(reply))))?;
    serde_json::from_str(json).map_err(|e| AdviceError::MalformedOutput(e.to_string()))
}

/// The first balanced `{ ... }` in `text`, skipping braces inside strings.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(80).collect();
    if text.chars().count() > 80 {
        out.push_str("...");
    }
    out
}
