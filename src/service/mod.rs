//! Service integrations for external APIs and clients.
//!
//! This module contains implementations for various services used by the stock-watcher:
//! - Post sources (e.g., TruthSocial)
//! - LLM services (e.g., Ollama, Hugging Face)
//! - Notification services (e.g., ntfy)
//! - State stores (e.g., a JSON file)
//!
//! Each service module defines both generic traits and concrete implementations,
//! allowing for extensibility and easy testing.

pub mod llm;
pub mod notify;
pub mod source;
pub mod store;
