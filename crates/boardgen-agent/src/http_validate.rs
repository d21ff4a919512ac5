//! HTTP adapter for the external compile+validate pipeline.

use async_trait::async_trait;
use serde::Deserialize;

use boardgen_core::{DiagnosticSource, RawFinding};

use crate::cancel::CancelToken;
use crate::collaborators::{CompileValidate, ValidationOutcome};
use crate::error::{AgentError, Result};

/// Environment variable naming the validator endpoint.
pub const VALIDATOR_URL_VAR: &str = "BOARDGEN_VALIDATOR_URL";

/// Compile+validate over HTTP: POST the source, get findings back.
pub struct HttpCompileValidate {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    compile_ok: bool,
    #[serde(default)]
    diagnostics: Vec<WireFinding>,
    #[serde(default)]
    schematic: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireFinding {
    category: String,
    message: String,
    severity: u8,
    #[serde(default)]
    source: Option<String>,
}

impl HttpCompileValidate {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    /// Build from the environment; `None` when no endpoint is configured.
    pub fn from_env() -> Option<Self> {
        std::env::var(VALIDATOR_URL_VAR).ok().map(Self::new)
    }
}

fn wire_source(source: Option<&str>) -> DiagnosticSource {
    match source {
        Some("kicad") => DiagnosticSource::Kicad,
        _ => DiagnosticSource::Tscircuit,
    }
}

#[async_trait]
impl CompileValidate for HttpCompileValidate {
    async fn compile_validate(&self, code: &str, cancel: &CancelToken) -> Result<ValidationOutcome> {
        let request = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "code": code }))
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(AgentError::Aborted(
                    cancel.reason().unwrap_or_else(|| "cancelled".into()),
                ));
            }
            response = request => response?,
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Validation(format!(
                "validator error {}: {}",
                status, body
            )));
        }

        let wire: WireResponse = response.json().await?;
        Ok(ValidationOutcome {
            compile_ok: wire.compile_ok,
            findings: wire
                .diagnostics
                .into_iter()
                .map(|f| {
                    RawFinding::new(
                        f.category,
                        f.message,
                        f.severity,
                        wire_source(f.source.as_deref()),
                    )
                })
                .collect(),
            schematic: wire.schematic,
        })
    }
}

/// Fallback used when no validator endpoint is configured: every attempt
/// fails compilation with one explanatory finding, so runs end blocked
/// instead of silently passing.
#[derive(Debug, Default)]
pub struct OfflineCompileValidate;

#[async_trait]
impl CompileValidate for OfflineCompileValidate {
    async fn compile_validate(
        &self,
        _code: &str,
        _cancel: &CancelToken,
    ) -> Result<ValidationOutcome> {
        Ok(ValidationOutcome {
            compile_ok: false,
            findings: vec![RawFinding::new(
                "compile_environment_missing",
                format!("{} is not configured; cannot validate", VALIDATOR_URL_VAR),
                9,
                DiagnosticSource::Tscircuit,
            )],
            schematic: None,
        })
    }
}

/// Environment variable naming the guardrails endpoint.
pub const GUARDRAILS_URL_VAR: &str = "BOARDGEN_GUARDRAILS_URL";

/// Advisory guardrails fetched from the persistent store, with a small
/// retry budget. Any failure degrades to empty advice.
pub struct HttpAdaptiveGuardrails {
    client: reqwest::Client,
    url: String,
    max_attempts: u32,
}

impl HttpAdaptiveGuardrails {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            max_attempts: 2,
        }
    }

    pub fn from_env() -> Option<Self> {
        std::env::var(GUARDRAILS_URL_VAR).ok().map(Self::new)
    }
}

#[async_trait]
impl crate::collaborators::AdaptiveGuardrails for HttpAdaptiveGuardrails {
    async fn fetch(&self) -> String {
        let mut backoff = std::time::Duration::from_millis(200);
        for attempt in 1..=self.max_attempts {
            match self.client.get(&self.url).send().await {
                Ok(response) if response.status().is_success() => {
                    return response.text().await.unwrap_or_default();
                }
                Ok(response) => {
                    tracing::debug!(status = %response.status(), attempt, "guardrails fetch rejected");
                }
                Err(err) => {
                    tracing::debug!(%err, attempt, "guardrails fetch failed");
                }
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }
        String::new()
    }
}
