//! Library root for `stock-watcher`.
//!
//! Stock-watcher is an LLM-powered monitor for a single TruthSocial account designed to:
//! - Poll the account for newly published posts
//! - Ask a language model whether each post could move the stock market
//! - Push an ntfy notification when it might
//!
//! The watcher integrates with TruthSocial as its post source, Ollama or Hugging Face
//! for analysis, ntfy for alerts, and a small JSON file for state. The architecture is
//! built around extensible traits that allow for different implementations of each service.

pub mod base;
pub mod interaction;
pub mod runtime;
pub mod service;

use base::{config::Config, types::Void};
use rustls::crypto;
use tracing::{info, warn};

/// Public async entry for the binary crate.
///
/// Sets up necessary services and starts the stock-watcher runtime:
/// - Initializes the crypto provider
/// - Creates the runtime context with source, LLM, notification, and state clients
/// - Runs a single check when `once` is set, or the polling loop otherwise
pub async fn start(config: Config, once: bool) -> Void {
    info!("Starting stock-watcher ...");

    // Start the crypto provider.
    if crypto::ring::default_provider().install_default().is_err() {
        warn!("A crypto provider was already installed.");
    }

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config)?;

    if once {
        runtime.llm.prepare().await?;
        let outcome = runtime.check_once().await?;
        info!("Check finished: {outcome:?}");

        return Ok(());
    }

    // Start the runtime.
    runtime.start().await?;

    Ok(())
}
