//! Anthropic-backed implementations of the model collaborators.
//!
//! Uses the Messages API: a streaming call for generation and a small
//! non-streaming call (Haiku-class model) for architecture proposals.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;

use boardgen_core::session::ArchitectureBlock;

use crate::cancel::CancelToken;
use crate::collaborators::{ArchitectureModel, GenerationModel, ModelEvent, ModelStream};
use crate::error::{AgentError, Result};

/// Environment variable holding the API key.
pub const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const GENERATION_MODEL: &str = "claude-sonnet-4-20250514";
const ARCHITECTURE_MODEL: &str = "claude-3-5-haiku-20241022";
const MAX_TOKENS: u32 = 8192;

// USD per million tokens for the generation model
const INPUT_COST_PER_MTOK: f64 = 3.0;
const OUTPUT_COST_PER_MTOK: f64 = 15.0;

/// Streaming client for the generation and architecture models.
pub struct AnthropicModel {
    api_key: String,
    client: reqwest::Client,
    model: String,
}

impl AnthropicModel {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            model: GENERATION_MODEL.to_string(),
        }
    }

    /// Build from the environment; `None` when the key is absent.
    pub fn from_env() -> Option<Self> {
        std::env::var(API_KEY_VAR).ok().map(Self::new)
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    async fn post_messages(
        &self,
        model: &str,
        system: &str,
        prompt: &str,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&serde_json::json!({
                "model": model,
                "max_tokens": MAX_TOKENS,
                "stream": stream,
                "system": system,
                "messages": [{"role": "user", "content": prompt}],
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Model(format!("api error {}: {}", status, body)));
        }
        Ok(response)
    }
}

/// Cost of one call from token usage.
fn cost_usd(input_tokens: u64, output_tokens: u64) -> f64 {
    input_tokens as f64 * INPUT_COST_PER_MTOK / 1_000_000.0
        + output_tokens as f64 * OUTPUT_COST_PER_MTOK / 1_000_000.0
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    delta: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<serde_json::Value>,
    #[serde(default)]
    usage: Option<serde_json::Value>,
}

/// Interpret one `data:` payload from the event stream.
fn interpret_chunk(
    payload: &str,
    input_tokens: &mut u64,
    output_tokens: &mut u64,
) -> Option<ModelEvent> {
    let chunk: StreamChunk = serde_json::from_str(payload).ok()?;
    match chunk.kind.as_str() {
        "content_block_delta" => {
            let delta = chunk.delta.as_ref()?;
            if let Some(text) = delta.get("text").and_then(|t| t.as_str()) {
                return Some(ModelEvent::TextDelta(text.to_string()));
            }
            delta
                .get("thinking")
                .and_then(|t| t.as_str())
                .map(|thinking| ModelEvent::ThinkingDelta(thinking.to_string()))
        }
        "message_start" => {
            if let Some(tokens) = chunk
                .message
                .as_ref()
                .and_then(|m| m.get("usage"))
                .and_then(|u| u.get("input_tokens"))
                .and_then(|v| v.as_u64())
            {
                *input_tokens = tokens;
            }
            None
        }
        "message_delta" => {
            if let Some(tokens) = chunk
                .usage
                .as_ref()
                .and_then(|u| u.get("output_tokens"))
                .and_then(|v| v.as_u64())
            {
                *output_tokens = tokens;
            }
            None
        }
        "message_stop" => Some(ModelEvent::Completed {
            cost_usd: Some(cost_usd(*input_tokens, *output_tokens)),
        }),
        _ => None,
    }
}

#[async_trait]
impl GenerationModel for AnthropicModel {
    async fn stream(&self, prompt: &str, cancel: &CancelToken) -> Result<ModelStream> {
        let response = self
            .post_messages(&self.model, crate::prompts::SYSTEM_PROMPT, prompt, true)
            .await?;

        let (tx, rx) = tokio::sync::mpsc::channel::<Result<ModelEvent>>(64);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();
            let mut input_tokens = 0u64;
            let mut output_tokens = 0u64;

            loop {
                let chunk = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        let reason = cancel.reason().unwrap_or_else(|| "cancelled".into());
                        let _ = tx.send(Err(AgentError::Aborted(reason))).await;
                        return;
                    }
                    chunk = bytes.next() => chunk,
                };
                let Some(chunk) = chunk else { return };
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        let _ = tx.send(Err(AgentError::Http(err))).await;
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);
                    let Some(payload) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if let Some(event) =
                        interpret_chunk(payload, &mut input_tokens, &mut output_tokens)
                    {
                        if tx.send(Ok(event)).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

const ARCHITECTURE_SYSTEM: &str = "\
You decompose an electronics request into top-level blocks. Answer with a \
JSON array only: [{\"id\": \"blk-1\", \"label\": \"...\"}, ...]. Three to \
six blocks, no prose.";

/// Strip a possible code fence around a JSON payload.
fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(inner) = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
    {
        inner.trim_end_matches("```").trim()
    } else {
        trimmed
    }
}

#[derive(Debug, Deserialize)]
struct ProposedBlock {
    id: String,
    label: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl ArchitectureModel for AnthropicModel {
    async fn propose(&self, prompt: &str, cancel: &CancelToken) -> Result<Vec<ArchitectureBlock>> {
        if cancel.is_cancelled() {
            return Err(AgentError::Aborted(
                cancel.reason().unwrap_or_else(|| "cancelled".into()),
            ));
        }
        let response = self
            .post_messages(ARCHITECTURE_MODEL, ARCHITECTURE_SYSTEM, prompt, false)
            .await?;
        let body: MessagesResponse = response.json().await?;
        let text = body
            .content
            .first()
            .and_then(|c| c.text.as_deref())
            .ok_or_else(|| AgentError::Model("empty architecture response".into()))?;

        let proposed: Vec<ProposedBlock> = serde_json::from_str(extract_json(text))?;
        Ok(proposed
            .into_iter()
            .map(|block| ArchitectureBlock {
                id: block.id,
                label: block.label,
                status: "proposed".to_string(),
            })
            .collect())
    }
}
