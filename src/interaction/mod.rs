//! Post handling for the stock-watcher.
//!
//! This module provides the per-post pipeline:
//! - Extracting the plain text of a post
//! - Asking the model for a market verdict
//! - Coordinating notifications for flagged posts

pub mod new_post;
