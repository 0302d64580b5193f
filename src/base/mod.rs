//! Core components, types, and utilities for the stock-watcher.
//!
//! This module contains fundamental building blocks used throughout the application:
//! - Configuration handling and environment variables.
//! - System prompts and directives for LLM interactions.
//! - HTML text extraction for post content.
//! - Common types and result handling.

pub mod config;
pub mod html;
pub mod prompts;
pub mod types;
