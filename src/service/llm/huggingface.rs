//! Hugging Face inference backend.
//!
//! The Hugging Face router speaks the OpenAI chat completions protocol, so this is a
//! thin wrapper around async-openai pointed at a different API base.

use std::sync::Arc;

use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs},
};
use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::base::{
    config::Config,
    types::{Analysis, Res, Void},
};

use super::{GenericLlmClient, LlmClient, call_with_retries};

// Extra methods on `LlmClient` applied by the huggingface implementation.

impl LlmClient {
    pub fn huggingface(config: &Config) -> Res<Self> {
        let client = HuggingFaceLlmClient::new(config)?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Specific implementations.

/// Hugging Face LLM client implementation.
#[derive(Clone)]
pub struct HuggingFaceLlmClient {
    client: Client<OpenAIConfig>,
    model: String,
    config: Config,
}

impl HuggingFaceLlmClient {
    /// Create a new Hugging Face LLM client.
    #[instrument(name = "HuggingFaceLlmClient::new", skip_all)]
    pub fn new(config: &Config) -> Res<Self> {
        let model = config
            .hf_model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("`HF_MODEL` must be set to use the Hugging Face backend."))?;
        let api_key = config
            .hf_api_token
            .clone()
            .ok_or_else(|| anyhow::anyhow!("`HF_API_TOKEN` must be set to use the Hugging Face backend."))?;

        let cfg = OpenAIConfig::new().with_api_base(config.hf_api_base.trim_end_matches('/')).with_api_key(api_key);

        Ok(Self {
            client: Client::with_config(cfg),
            model,
            config: config.clone(),
        })
    }

    /// Send a single chat completion request.
    async fn chat(&self, post_text: &str) -> Res<String> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(self.config.market_analysis_directive.clone())
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default().content(post_text).build()?.into(),
        ];

        let mut request = CreateChatCompletionRequestArgs::default();
        request.model(&self.model).messages(messages);

        if let Some(temperature) = self.config.llm_temperature {
            request.temperature(temperature);
        }

        let response = self.client.chat().create(request.build()?).await?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| anyhow::anyhow!("Hugging Face response contained no message content."))?;

        debug!("Hugging Face returned {} characters.", content.len());

        Ok(content)
    }
}

#[async_trait]
impl GenericLlmClient for HuggingFaceLlmClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn prepare(&self) -> Void {
        // Hosted models are always ready.
        Ok(())
    }

    #[instrument(name = "HuggingFaceLlmClient::get_market_analysis", skip_all)]
    async fn get_market_analysis(&self, post_text: &str) -> Res<Analysis> {
        let content = call_with_retries("Hugging Face", self.config.llm_timeout, self.config.llm_max_retries, || self.chat(post_text)).await?;

        Ok(Analysis::from_response(&content))
    }
}

// Tests.
