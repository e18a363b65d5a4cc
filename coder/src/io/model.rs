//! Model invocation over an OpenAI-compatible chat completions API.

use std::io::{BufRead, BufReader};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace, warn};

use crate::core::types::ChatMessage;
use crate::io::config::ModelConfig;

/// Produces one completion for a conversation.
pub trait Model {
    /// Return the full assistant text. Streaming responses are collected
    /// completely before returning.
    fn generate(&self, model: &str, messages: &[ChatMessage], stream: bool) -> Result<String>;
}

/// Blocking client for `{base_url}/chat/completions` (OpenAI, Ollama, vLLM...).
#[derive(Debug)]
pub struct OpenAiClient {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn from_config(cfg: &ModelConfig) -> Result<Self> {
        Self::new(
            &cfg.base_url,
            &cfg.resolve_api_key(),
            Duration::from_secs(cfg.request_timeout_secs),
        )
    }
}

impl Model for OpenAiClient {
    #[instrument(skip_all, fields(model = %model, messages = messages.len(), stream))]
    fn generate(&self, model: &str, messages: &[ChatMessage], stream: bool) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(url = %url, "sending completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&ChatRequest {
                model,
                messages,
                stream,
            })
            .send()
            .with_context(|| format!("post {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "model api returned error");
            return Err(anyhow!("model api returned {status}: {body}"));
        }

        let text = if stream {
            collect_sse_content(BufReader::new(response)).context("read completion stream")?
        } else {
            let body: ChatResponse = response.json().context("parse completion response")?;
            body.choices
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("no choices in completion response"))?
                .message
                .content
                .unwrap_or_default()
        };
        debug!(chars = text.len(), "completion received");
        Ok(text)
    }
}

/// Concatenate `choices[0].delta.content` across an SSE body until `[DONE]`.
///
/// Comment lines, non-`data:` fields and unparseable chunks are skipped.
pub fn collect_sse_content<R: BufRead>(reader: R) -> Result<String> {
    let mut out = String::new();
    for line in reader.lines() {
        let line = line.context("read stream line")?;
        let line = line.trim_end_matches('\r');
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data == "[DONE]" {
            break;
        }
        match serde_json::from_str::<StreamResponse>(data) {
            Ok(chunk) => {
                if let Some(content) = chunk
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.delta.content)
                {
                    out.push_str(&content);
                }
            }
            Err(err) => trace!(data = %data, err = %err, "ignoring unparseable stream chunk"),
        }
    }
    Ok(out)
}
