//! Language model collaborator.

use std::{future::Future, time::Duration};

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result, payload_sample};

pub const DEFAULT_MODEL_URL: &str = "http://127.0.0.1:11434";
pub const DEFAULT_MODEL_NAME: &str = "llama3.2";
pub const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 120;

/// Produces an answer from a system prompt and a user prompt.
pub trait LanguageModel: Send + Sync {
    /// Fails with [`Error::ModelNotReady`] when the model cannot be used.
    fn generate(
        &self,
        system: &str,
        user: &str,
    ) -> impl Future<Output = Result<String>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    /// Base URL of the Ollama server.
    pub url: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_MODEL_URL.to_string(),
            model: DEFAULT_MODEL_NAME.to_string(),
            timeout: Duration::from_secs(DEFAULT_MODEL_TIMEOUT_SECS),
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://"))
        {
            return Err(Error::Config(format!(
                "model url must start with http:// or https://, got '{}'",
                self.url
            )));
        }
        if self.model.trim().is_empty() {
            return Err(Error::Config("model name must not be empty".into()));
        }
        if self.timeout.is_zero() {
            return Err(Error::Config("model timeout must be positive".into()));
        }
        Ok(())
    }
}

/// A model served by Ollama.
pub struct OllamaModel {
    http: Client,
    base: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

/// Whether an installed model tag refers to `wanted`. A name without a
/// tag means `:latest`.
fn tag_matches(installed: &str, wanted: &str) -> bool {
    let normalize = |name: &str| {
        if name.contains(':') {
            name.to_string()
        } else {
            format!("{name}:latest")
        }
    };
    normalize(installed) == normalize(wanted)
}

impl OllamaModel {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        config.validate()?;
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("building HTTP client: {e}")))?;
        Ok(Self {
            http,
            base: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Check that the server is up and has the model installed.
    pub async fn ensure_ready(&self) -> Result<()> {
        let url = format!("{}/api/tags", self.base);
        let response = self.http.get(&url).send().await.map_err(|e| {
            Error::ModelNotReady(format!("cannot reach {}: {e}", self.base))
        })?;
        if !response.status().is_success() {
            return Err(Error::ModelNotReady(format!(
                "{url} returned HTTP {}",
                response.status().as_u16()
            )));
        }
        let body = response.text().await.map_err(|e| {
            Error::ModelNotReady(format!("reading model list: {e}"))
        })?;
        let tags: TagsResponse = serde_json::from_str(&body).map_err(|e| {
            Error::MalformedResponse {
                context: format!("model list: {e}"),
                snippet: payload_sample(&body),
            }
        })?;

        if tags.models.iter().any(|m| tag_matches(&m.name, &self.model)) {
            Ok(())
        } else {
            Err(Error::ModelNotReady(format!(
                "model '{}' is not installed (try `ollama pull {}`)",
                self.model, self.model
            )))
        }
    }
}

impl LanguageModel for OllamaModel {
    async fn generate(&self, system: &str, user: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base);
        let body = GenerateRequest {
            model: &self.model,
            system,
            prompt: user,
            stream: false,
        };
        debug!(model = %self.model, prompt_chars = user.len(), "generating");

        let response =
            self.http.post(&url).json(&body).send().await.map_err(|e| {
                Error::ModelNotReady(format!("cannot reach {}: {e}", self.base))
            })?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            let snippet = payload_sample(&text);
            warn!(status = status.as_u16(), %snippet, "generation failed");
            return Err(if status == StatusCode::NOT_FOUND {
                Error::ModelNotReady(format!(
                    "model '{}' not found: {snippet}",
                    self.model
                ))
            } else {
                Error::ModelNotReady(format!(
                    "HTTP {}: {snippet}",
                    status.as_u16()
                ))
            });
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&text).map_err(|e| {
                let snippet = payload_sample(&text);
                warn!(error = %e, %snippet, "malformed model response");
                Error::MalformedResponse {
                    context: format!("generate: {e}"),
                    snippet,
                }
            })?;
        Ok(parsed.response.trim().to_string())
    }
}
