pub mod huggingface;
pub mod ollama;

use std::{ops::Deref, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::base::{
    config::{Config, LlmBackend},
    types::{Analysis, Res, Void},
};

// Traits.

/// Generic LLM client trait that clients must implement.
///
/// This trait defines the core functionality for interacting with large language models.
/// Implementing this trait allows different LLM providers to be used with the stock-watcher.
#[async_trait]
pub trait GenericLlmClient: Send + Sync + 'static {
    /// The model this client talks to.
    fn model(&self) -> &str;

    /// Make sure the model is ready to serve requests.
    ///
    /// For local backends this may download the model, which can take a while.
    async fn prepare(&self) -> Void;

    /// Ask the model whether a post could move the market.
    ///
    /// The post is given as plain text; the verdict is read from the start of the answer.
    async fn get_market_analysis(&self, post_text: &str) -> Res<Analysis>;
}

// Structs.

/// LLM client for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct LlmClient {
    inner: Arc<dyn GenericLlmClient>,
}

impl Deref for LlmClient {
    type Target = dyn GenericLlmClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl LlmClient {
    pub fn new(inner: Arc<dyn GenericLlmClient>) -> Self {
        Self { inner }
    }

    /// Create the client for whichever backend the configuration selects.
    pub fn from_config(config: &Config) -> Res<Self> {
        match config.llm_backend()? {
            LlmBackend::Ollama => Self::ollama(config),
            LlmBackend::HuggingFace => Self::huggingface(config),
        }
    }
}

// Helpers.

/// Run a model call with a per-attempt timeout and exponential backoff between retries.
pub(crate) async fn call_with_retries<T, F, Fut>(name: &str, attempt_timeout: Duration, max_retries: u32, mut call: F) -> Res<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Res<T>>,
{
    const RETRY_DELAY_MS: u64 = 1000;

    let mut retries = 0;

    loop {
        let result = timeout(attempt_timeout, call()).await;

        let failure = match result {
            Ok(Ok(response)) => {
                debug!("{name} call succeeded after {} attempts", retries + 1);
                return Ok(response);
            }
            Ok(Err(err)) => {
                if retries >= max_retries {
                    return Err(anyhow::anyhow!("{name} call failed after {retries} retries: {err}"));
                }

                format!("failed: {err}")
            }
            Err(_) => {
                if retries >= max_retries {
                    return Err(anyhow::anyhow!("{name} call timed out after {} attempts", retries + 1));
                }

                "timed out".to_string()
            }
        };

        retries += 1;
        warn!("{name} call {failure}, retrying {retries}/{max_retries}");

        let delay = Duration::from_millis(RETRY_DELAY_MS.saturating_mul(2_u64.saturating_pow(retries - 1)));
        tokio::time::sleep(delay).await;
    }
}

// Tests.
