
use std::io::{BufRead, BufReader};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ChatMessage, ChatModel, TokenStream};
use crate::config::GeneratorConfig;

pub const DEFAULT_GENERATOR_URL: &str = "https://api.fireworks.ai/inference/v1";
pub const DEFAULT_GENERATOR_MODEL: &str = "accounts/fireworks/models/llama-v3-8b-instruct";
pub const DEFAULT_API_KEY_ENV: &str = "FIREWORKS_API_KEY";

const DEFAULT_TIMEOUT_SECONDS: u64 = 120;

/// Client for an OpenAI-compatible `/chat/completions` endpoint
///
/// Requests are not retried: a failed generation surfaces immediately.
#[derive(Debug, Clone)]
pub struct ChatClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

impl ChatClient {
    #[inline]
    pub fn new(base_url: &str, model: &str, api_key: Option<String>) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            agent,
        }
    }

    /// Build from configuration, reading the API key from the configured variable
    #[inline]
    pub fn from_config(config: &GeneratorConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());

        if api_key.is_none() {
            warn!(
                "{} is not set, generation requests will be sent without credentials",
                config.api_key_env
            );
        }

        Self::new(&config.base_url, &config.model, api_key)
            .with_timeout(Duration::from_secs(config.timeout_secs))
    }

    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    fn send(&self, messages: &[ChatMessage], stream: bool) -> Result<ureq::http::Response<ureq::Body>> {
        let url = format!("{}/chat/completions", self.base_url);
        let request_json = serde_json::to_string(&CompletionRequest {
            model: &self.model,
            messages,
            stream,
        })
        .context("Failed to serialize completion request")?;

        debug!(
            "Requesting completion from {} ({} messages, stream: {})",
            self.model,
            messages.len(),
            stream
        );

        let mut request = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        request
            .send(&request_json)
            .with_context(|| format!("Completion request to {} failed", url))
    }
}

impl ChatModel for ChatClient {
    #[inline]
    fn model_id(&self) -> &str {
        &self.model
    }

    #[inline]
    fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let mut response = self.send(messages, false)?;
        let response_text = response
            .body_mut()
            .read_to_string()
            .context("Failed to read completion response")?;

        let completion: CompletionResponse = serde_json::from_str(&response_text)
            .context("Failed to parse completion response")?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow::anyhow!("No response content from model '{}'", self.model))
    }

    #[inline]
    fn generate_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream> {
        let response = self.send(messages, true)?;
        let reader = BufReader::new(response.into_body().into_reader());
        Ok(Box::new(SseTokens::new(reader)))
    }
}

/// Content fragments of an OpenAI-style server-sent event stream
///
/// Ends at `data: [DONE]`, at end of input, or after the first error.
pub struct SseTokens<R> {
    lines: std::io::Lines<R>,
    finished: bool,
}

impl<R: BufRead> SseTokens<R> {
    #[inline]
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            finished: false,
        }
    }
}

impl<R: BufRead> Iterator for SseTokens<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(anyhow::anyhow!("Stream error: {}", e)));
                }
            };

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data == "[DONE]" {
                self.finished = true;
                return None;
            }

            let chunk: StreamChunk = match serde_json::from_str(data) {
                Ok(chunk) => chunk,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(anyhow::anyhow!("Failed to parse stream event: {}", e)));
                }
            };

            if let Some(content) = chunk
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content)
                .filter(|content| !content.is_empty())
            {
                return Some(Ok(content));
            }
        }
    }
}
