//! Load configuration via `config` crate with env-override support.

use std::{
    ops::Deref,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use serde::Deserialize;
use serde_with::{DurationSeconds, serde_as};

use crate::base::prompts;

use super::types::Res;

/// Default TruthSocial account handle to watch.
fn default_truthsocial_handle() -> String {
    "realDonaldTrump".to_string()
}

/// Default TruthSocial base URL.
fn default_truthsocial_base_url() -> String {
    "https://truthsocial.com".to_string()
}

/// Default OAuth client ID (the public TruthSocial web client).
fn default_truthsocial_client_id() -> String {
    "9X1Fdd-pxNsAgEDNi_SfhJWi8T-vLuV2WVzKIbkTCw4".to_string()
}

/// Default OAuth client secret (the public TruthSocial web client).
fn default_truthsocial_client_secret() -> String {
    "ozF8jzI4968oTKFkEnsBC-UbLPCdrSv0MkXGQu2o_-M".to_string()
}

/// Default user agent; the API rejects obviously non-browser clients.
fn default_truthsocial_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string()
}

/// Default number of status pages to walk per check.
fn default_truthsocial_max_pages() -> u32 {
    10
}

/// Default ntfy server.
fn default_ntfy_server() -> String {
    "https://ntfy.sh".to_string()
}

/// Default ntfy priority ("high").
fn default_ntfy_priority() -> u8 {
    4
}

/// Default Ollama host.
fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}

/// Default Hugging Face OpenAI-compatible router.
fn default_hf_api_base() -> String {
    "https://router.huggingface.co/v1".to_string()
}

/// Default timeout for a single model call.
fn default_llm_timeout() -> Duration {
    Duration::from_secs(120)
}

/// Default retries for a model call.
fn default_llm_max_retries() -> u32 {
    3
}

/// Default system directive for the market analysis agent.
fn default_market_analysis_directive() -> String {
    prompts::MARKET_ANALYSIS_DIRECTIVE.to_string()
}

/// Default polling interval.
fn default_check_interval() -> Duration {
    Duration::from_secs(300)
}

/// Upper bound on the first-run lookback.
pub const MAX_INITIAL_LOOKBACK: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Default lookback when no post has been processed yet.
fn default_initial_lookback() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

/// Default location of the last processed post state.
fn default_state_path() -> PathBuf {
    PathBuf::from("last_post.json")
}

fn default_true() -> bool {
    true
}

/// Language model backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    /// A local (or remote) Ollama server.
    Ollama,
    /// The Hugging Face inference router.
    #[serde(alias = "hf")]
    HuggingFace,
}

/// Configuration for the stock-watcher application.
#[derive(Debug, Clone)]
pub struct Config {
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct ConfigInner {
    /// TruthSocial login username (`TRUTHSOCIAL_USERNAME`).
    #[serde(default)]
    pub truthsocial_username: String,
    /// TruthSocial login password (`TRUTHSOCIAL_PASSWORD`).
    #[serde(default)]
    pub truthsocial_password: String,
    /// Pre-issued TruthSocial bearer token; skips the password login (`TRUTHSOCIAL_TOKEN`).
    #[serde(default)]
    pub truthsocial_token: Option<String>,
    /// Handle of the account to watch (`TRUTHSOCIAL_HANDLE`).
    #[serde(default = "default_truthsocial_handle")]
    pub truthsocial_handle: String,
    /// TruthSocial base URL (`TRUTHSOCIAL_BASE_URL`).
    #[serde(default = "default_truthsocial_base_url")]
    pub truthsocial_base_url: String,
    /// OAuth client ID (`TRUTHSOCIAL_CLIENT_ID`).
    #[serde(default = "default_truthsocial_client_id")]
    pub truthsocial_client_id: String,
    /// OAuth client secret (`TRUTHSOCIAL_CLIENT_SECRET`).
    #[serde(default = "default_truthsocial_client_secret")]
    pub truthsocial_client_secret: String,
    /// User agent sent to TruthSocial (`TRUTHSOCIAL_USER_AGENT`).
    #[serde(default = "default_truthsocial_user_agent")]
    pub truthsocial_user_agent: String,
    /// Whether replies count as posts (`TRUTHSOCIAL_INCLUDE_REPLIES`).
    #[serde(default)]
    pub truthsocial_include_replies: bool,
    /// Maximum status pages walked per check (`TRUTHSOCIAL_MAX_PAGES`).
    #[serde(default = "default_truthsocial_max_pages")]
    pub truthsocial_max_pages: u32,
    /// ntfy topic to publish to (`NTFY_TOPIC`).
    #[serde(default)]
    pub ntfy_topic: String,
    /// ntfy server URL (`NTFY_SERVER`).
    #[serde(default = "default_ntfy_server")]
    pub ntfy_server: String,
    /// ntfy access token for protected topics (`NTFY_TOKEN`).
    #[serde(default)]
    pub ntfy_token: Option<String>,
    /// ntfy priority, 1 to 5 (`NTFY_PRIORITY`).
    #[serde(default = "default_ntfy_priority")]
    pub ntfy_priority: u8,
    /// Explicit model backend (`LLM_BACKEND`); inferred from the model variables when unset.
    #[serde(default)]
    pub llm_backend: Option<LlmBackend>,
    /// Ollama model name (`OLLAMA_MODEL`).
    #[serde(default)]
    pub ollama_model: Option<String>,
    /// Ollama server URL (`OLLAMA_HOST`).
    #[serde(default = "default_ollama_host")]
    pub ollama_host: String,
    /// Pull the Ollama model before the first check (`OLLAMA_PULL_ON_START`).
    #[serde(default = "default_true")]
    pub ollama_pull_on_start: bool,
    /// Hugging Face model id (`HF_MODEL`).
    #[serde(default)]
    pub hf_model: Option<String>,
    /// Hugging Face API token (`HF_API_TOKEN`).
    #[serde(default)]
    pub hf_api_token: Option<String>,
    /// Hugging Face OpenAI-compatible API base (`HF_API_BASE`).
    #[serde(default = "default_hf_api_base")]
    pub hf_api_base: String,
    /// Sampling temperature (`LLM_TEMPERATURE`).
    /// Value between 0 and 2; the backend default is used when unset.
    #[serde(default)]
    pub llm_temperature: Option<f32>,
    /// Timeout for a single model call, in seconds (`LLM_TIMEOUT`).
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_llm_timeout")]
    pub llm_timeout: Duration,
    /// Retries for a failed or timed out model call (`LLM_MAX_RETRIES`).
    #[serde(default = "default_llm_max_retries")]
    pub llm_max_retries: u32,
    /// Optional custom system directive to override the default (`MARKET_ANALYSIS_DIRECTIVE`).
    #[serde(default = "default_market_analysis_directive")]
    pub market_analysis_directive: String,
    /// Polling interval, in seconds (`CHECK_INTERVAL`).
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_check_interval")]
    pub check_interval: Duration,
    /// How far back to look when nothing has been processed yet, in seconds (`INITIAL_LOOKBACK`).
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_initial_lookback")]
    pub initial_lookback: Duration,
    /// Where the last processed post id is stored (`STATE_PATH`).
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
}

impl Default for ConfigInner {
    fn default() -> Self {
        Self {
            truthsocial_username: String::new(),
            truthsocial_password: String::new(),
            truthsocial_token: None,
            truthsocial_handle: default_truthsocial_handle(),
            truthsocial_base_url: default_truthsocial_base_url(),
            truthsocial_client_id: default_truthsocial_client_id(),
            truthsocial_client_secret: default_truthsocial_client_secret(),
            truthsocial_user_agent: default_truthsocial_user_agent(),
            truthsocial_include_replies: false,
            truthsocial_max_pages: default_truthsocial_max_pages(),
            ntfy_topic: String::new(),
            ntfy_server: default_ntfy_server(),
            ntfy_token: None,
            ntfy_priority: default_ntfy_priority(),
            llm_backend: None,
            ollama_model: None,
            ollama_host: default_ollama_host(),
            ollama_pull_on_start: true,
            hf_model: None,
            hf_api_token: None,
            hf_api_base: default_hf_api_base(),
            llm_temperature: None,
            llm_timeout: default_llm_timeout(),
            llm_max_retries: default_llm_max_retries(),
            market_analysis_directive: default_market_analysis_directive(),
            check_interval: default_check_interval(),
            initial_lookback: default_initial_lookback(),
            state_path: default_state_path(),
        }
    }
}

impl ConfigInner {
    /// Resolve the model backend, inferring it from the configured models when not explicit.
    pub fn llm_backend(&self) -> Res<LlmBackend> {
        match self.llm_backend {
            Some(backend) => Ok(backend),
            None if self.ollama_model.is_some() => Ok(LlmBackend::Ollama),
            None if self.hf_model.is_some() => Ok(LlmBackend::HuggingFace),
            None => Err(anyhow::anyhow!("No LLM backend configured: set `OLLAMA_MODEL` or `HF_MODEL`.")),
        }
    }
}

impl Config {
    /// Wrap and validate an already-built configuration.
    pub fn new(inner: ConfigInner) -> Res<Self> {
        let result = Config { inner: Arc::new(inner) };
        result.validate()?;

        Ok(result)
    }

    pub fn load(explicit_path: Option<&Path>) -> Res<Self> {
        hydrate_env_file()?;

        let mut cfg = config::Config::builder();

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        cfg = cfg.add_source(config::Environment::default());

        Self::new(cfg.build()?.try_deserialize()?)
    }

    fn validate(&self) -> Res<()> {
        if self.truthsocial_handle.trim().is_empty() {
            return Err(anyhow::anyhow!("TruthSocial handle must not be empty."));
        }

        let has_token = self.truthsocial_token.as_deref().is_some_and(|t| !t.is_empty());
        let has_login = !self.truthsocial_username.is_empty() && !self.truthsocial_password.is_empty();

        if !has_token && !has_login {
            return Err(anyhow::anyhow!("TruthSocial credentials missing: set a token, or both username and password."));
        }

        if self.truthsocial_max_pages < 1 {
            return Err(anyhow::anyhow!("TruthSocial max pages must be at least 1."));
        }

        if self.ntfy_topic.trim().is_empty() {
            return Err(anyhow::anyhow!("ntfy topic must not be empty."));
        }

        if !(1..=5).contains(&self.ntfy_priority) {
            return Err(anyhow::anyhow!("ntfy priority must be between 1 and 5."));
        }

        if let Some(temperature) = self.llm_temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(anyhow::anyhow!("LLM temperature must be between 0 and 2."));
            }
        }

        match self.llm_backend()? {
            LlmBackend::Ollama => {
                if self.ollama_model.as_deref().is_none_or(str::is_empty) {
                    return Err(anyhow::anyhow!("Ollama backend selected, but `OLLAMA_MODEL` is not set."));
                }
            }
            LlmBackend::HuggingFace => {
                if self.hf_model.as_deref().is_none_or(str::is_empty) {
                    return Err(anyhow::anyhow!("Hugging Face backend selected, but `HF_MODEL` is not set."));
                }

                if self.hf_api_token.as_deref().is_none_or(str::is_empty) {
                    return Err(anyhow::anyhow!("Hugging Face backend selected, but `HF_API_TOKEN` is not set."));
                }
            }
        }

        if self.check_interval.is_zero() {
            return Err(anyhow::anyhow!("Check interval must be greater than zero."));
        }

        if self.initial_lookback > MAX_INITIAL_LOOKBACK {
            return Err(anyhow::anyhow!("Initial lookback must be at most {} days.", MAX_INITIAL_LOOKBACK.as_secs() / 86400));
        }

        Ok(())
    }
}

/// Load a `.env` file from the working directory, if there is one.
fn hydrate_env_file() -> Res<()> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(anyhow::anyhow!("Failed to load `.env` file: {err}")),
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use std::{io::Write, sync::Mutex};

    use super::*;

    /// Serializes tests that read or write process environment variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn valid_inner() -> ConfigInner {
        ConfigInner {
            truthsocial_username: "watcher".to_string(),
            truthsocial_password: "hunter2".to_string(),
            ntfy_topic: "stock-alerts".to_string(),
            ollama_model: Some("llama3.2".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn accepts_valid_config() {
        let config = Config::new(valid_inner()).unwrap();

        assert_eq!(config.llm_backend().unwrap(), LlmBackend::Ollama);
        assert_eq!(config.truthsocial_handle, "realDonaldTrump");
        assert_eq!(config.check_interval, Duration::from_secs(300));
    }

    #[test]
    fn infers_hugging_face_backend() {
        let inner = ConfigInner {
            ollama_model: None,
            hf_model: Some("meta-llama/Llama-3.1-8B-Instruct".to_string()),
            hf_api_token: Some("hf_test".to_string()),
            ..valid_inner()
        };

        assert_eq!(Config::new(inner).unwrap().llm_backend().unwrap(), LlmBackend::HuggingFace);
    }

    #[test]
    fn explicit_backend_wins() {
        let inner = ConfigInner {
            llm_backend: Some(LlmBackend::HuggingFace),
            hf_model: Some("mistralai/Mistral-7B-Instruct-v0.3".to_string()),
            hf_api_token: Some("hf_test".to_string()),
            ..valid_inner()
        };

        assert_eq!(Config::new(inner).unwrap().llm_backend().unwrap(), LlmBackend::HuggingFace);
    }

    #[test]
    fn rejects_missing_backend() {
        let inner = ConfigInner { ollama_model: None, ..valid_inner() };

        assert!(Config::new(inner).is_err());
    }

    #[test]
    fn rejects_hugging_face_without_token() {
        let inner = ConfigInner {
            ollama_model: None,
            hf_model: Some("meta-llama/Llama-3.1-8B-Instruct".to_string()),
            ..valid_inner()
        };

        assert!(Config::new(inner).is_err());
    }

    #[test]
    fn rejects_missing_credentials() {
        let inner = ConfigInner { truthsocial_password: String::new(), ..valid_inner() };
        assert!(Config::new(inner).is_err());

        let inner = ConfigInner {
            truthsocial_username: String::new(),
            truthsocial_password: String::new(),
            truthsocial_token: Some("token".to_string()),
            ..valid_inner()
        };
        assert!(Config::new(inner).is_ok());
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(Config::new(ConfigInner { ntfy_topic: " ".to_string(), ..valid_inner() }).is_err());
        assert!(Config::new(ConfigInner { ntfy_priority: 0, ..valid_inner() }).is_err());
        assert!(Config::new(ConfigInner { ntfy_priority: 6, ..valid_inner() }).is_err());
        assert!(Config::new(ConfigInner { llm_temperature: Some(2.5), ..valid_inner() }).is_err());
        assert!(Config::new(ConfigInner { check_interval: Duration::ZERO, ..valid_inner() }).is_err());
        assert!(Config::new(ConfigInner { initial_lookback: Duration::from_secs(10_000_000_000_000), ..valid_inner() }).is_err());
        assert!(Config::new(ConfigInner { initial_lookback: MAX_INITIAL_LOOKBACK, ..valid_inner() }).is_ok());
    }

    #[test]
    fn loads_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
truthsocial_username = "watcher"
truthsocial_password = "hunter2"
truthsocial_handle = "someoneElse"
ntfy_topic = "my-topic"
llm_backend = "hf"
hf_model = "Qwen/Qwen2.5-7B-Instruct"
hf_api_token = "hf_test"
check_interval = 60
llm_timeout = 30
"#
        )
        .unwrap();

        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let config = Config::load(Some(file.path())).unwrap();

        assert_eq!(config.truthsocial_handle, "someoneElse");
        assert_eq!(config.ntfy_topic, "my-topic");
        assert_eq!(config.llm_backend().unwrap(), LlmBackend::HuggingFace);
        assert_eq!(config.check_interval, Duration::from_secs(60));
        assert_eq!(config.llm_timeout, Duration::from_secs(30));
        assert_eq!(config.initial_lookback, Duration::from_secs(86400));
        assert_eq!(config.state_path, PathBuf::from("last_post.json"));
    }

    #[test]
    fn loads_from_environment_over_file() {
        const VARS: [(&str, &str); 9] = [
            ("TRUTHSOCIAL_USERNAME", "env-watcher"),
            ("TRUTHSOCIAL_PASSWORD", "env-secret"),
            ("TRUTHSOCIAL_INCLUDE_REPLIES", "true"),
            ("NTFY_TOPIC", "env-topic"),
            ("NTFY_PRIORITY", "4"),
            ("HF_MODEL", "Qwen/Qwen2.5-7B-Instruct"),
            ("HF_API_TOKEN", "hf_env"),
            ("CHECK_INTERVAL", "60"),
            ("OLLAMA_PULL_ON_START", "false"),
        ];

        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
truthsocial_handle = "someone"
ntfy_topic = "file-topic"
check_interval = 600
"#
        )
        .unwrap();

        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        for (key, value) in VARS {
            // SAFETY: every test touching the environment holds `ENV_LOCK`.
            unsafe { std::env::set_var(key, value) };
        }

        let result = Config::load(Some(file.path()));

        for (key, _) in VARS {
            // SAFETY: every test touching the environment holds `ENV_LOCK`.
            unsafe { std::env::remove_var(key) };
        }

        let config = result.unwrap();

        assert_eq!(config.truthsocial_username, "env-watcher");
        assert_eq!(config.truthsocial_password, "env-secret");
        assert_eq!(config.truthsocial_handle, "someone");
        assert!(config.truthsocial_include_replies);
        assert_eq!(config.ntfy_topic, "env-topic");
        assert_eq!(config.ntfy_priority, 4);
        assert_eq!(config.llm_backend().unwrap(), LlmBackend::HuggingFace);
        assert_eq!(config.hf_model.as_deref(), Some("Qwen/Qwen2.5-7B-Instruct"));
        assert_eq!(config.hf_api_token.as_deref(), Some("hf_env"));
        assert_eq!(config.check_interval, Duration::from_secs(60));
        assert!(!config.ollama_pull_on_start);
    }
}
