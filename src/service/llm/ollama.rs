//! Ollama chat backend.
//!
//! Talks to the native Ollama HTTP API (`/api/chat` and `/api/pull`) rather than
//! its OpenAI-compatible surface, since pulling a model is only available natively.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::base::{
    config::Config,
    types::{Analysis, Res, Void},
};

use super::{GenericLlmClient, LlmClient, call_with_retries};

// Extra methods on `LlmClient` applied by the ollama implementation.

impl LlmClient {
    pub fn ollama(config: &Config) -> Res<Self> {
        let client = OllamaLlmClient::new(config)?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Wire types.

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaPullRequest<'a> {
    model: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaPullResponse {
    status: String,
}

// Specific implementations.

/// Ollama LLM client implementation.
#[derive(Clone)]
pub struct OllamaLlmClient {
    client: Client,
    base_url: String,
    model: String,
    config: Config,
}

impl OllamaLlmClient {
    /// Create a new Ollama LLM client.
    #[instrument(name = "OllamaLlmClient::new", skip_all)]
    pub fn new(config: &Config) -> Res<Self> {
        let model = config
            .ollama_model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("`OLLAMA_MODEL` must be set to use the Ollama backend."))?;

        Ok(Self {
            client: Client::builder().build()?,
            base_url: config.ollama_host.trim_end_matches('/').to_string(),
            model,
            config: config.clone(),
        })
    }

    /// Send a single chat request.
    async fn chat(&self, post_text: &str) -> Res<String> {
        let request = OllamaChatRequest {
            model: &self.model,
            messages: vec![
                OllamaMessage {
                    role: "system",
                    content: &self.config.market_analysis_directive,
                },
                OllamaMessage { role: "user", content: post_text },
            ],
            stream: false,
            options: self.config.llm_temperature.map(|temperature| OllamaOptions { temperature }),
        };

        let response = self.client.post(format!("{}/api/chat", self.base_url)).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Ollama API error {status}: {text}"));
        }

        let response: OllamaChatResponse = response.json().await?;

        Ok(response.message.content)
    }
}

#[async_trait]
impl GenericLlmClient for OllamaLlmClient {
    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(name = "OllamaLlmClient::prepare", skip_all)]
    async fn prepare(&self) -> Void {
        if !self.config.ollama_pull_on_start {
            return Ok(());
        }

        info!("Pulling Ollama model `{}` ...", self.model);

        let request = OllamaPullRequest { model: &self.model, stream: false };

        // No timeout: the first pull downloads the whole model.
        let response = self.client.post(format!("{}/api/pull", self.base_url)).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Failed to pull Ollama model `{}` ({status}): {text}", self.model));
        }

        let response: OllamaPullResponse = response.json().await?;

        info!("Ollama model `{}` pull finished with status `{}`.", self.model, response.status);

        Ok(())
    }

    #[instrument(name = "OllamaLlmClient::get_market_analysis", skip_all)]
    async fn get_market_analysis(&self, post_text: &str) -> Res<Analysis> {
        let content = call_with_retries("Ollama", self.config.llm_timeout, self.config.llm_max_retries, || self.chat(post_text)).await?;

        Ok(Analysis::from_response(&content))
    }
}

// Tests.
