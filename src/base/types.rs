//! Common types shared by the services and the runtime.

use std::{cmp::Ordering, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type Err = anyhow::Error;
pub type Res<T> = Result<T, Err>;
pub type Void = Res<()>;

// Posts.

/// Identifier of a post on the source platform.
///
/// Ids are decimal snowflakes serialized as strings, so ordering compares
/// length first and then lexicographically, which matches numeric order
/// without overflowing on very long ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub String);

impl PostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for PostId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.len().cmp(&other.0.len()).then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for PostId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single post (a "truth") as returned by the statuses endpoint.
///
/// Only the fields the watcher needs are kept; everything else in the payload is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub created_at: DateTime<Utc>,
    /// Raw HTML content of the post.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub url: Option<String>,
    /// The original post when this one is a re-post.
    #[serde(default)]
    pub reblog: Option<Box<Post>>,
}

impl Post {
    /// The HTML that should be analyzed for this post.
    ///
    /// Re-posts carry an empty body of their own, so fall back to the reblogged content.
    pub fn display_content(&self) -> &str {
        match &self.reblog {
            Some(reblog) if self.content.trim().is_empty() => reblog.display_content(),
            _ => &self.content,
        }
    }
}

/// Parameters for a post fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostQuery {
    /// Handle of the account to pull from (without the leading `@`).
    pub handle: String,
    /// Stop at (and exclude) this id and anything older.
    pub since_id: Option<PostId>,
    /// Stop at (and exclude) posts created at or before this instant.
    pub created_after: Option<DateTime<Utc>>,
}

// Analysis.

/// The model's verdict on a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub could_impact_market: bool,
    pub text: String,
}

impl Analysis {
    /// Interpret a raw model answer.
    ///
    /// The model is asked to lead with "Yes" or "No"; reasoning models may prefix
    /// a `<think>` block, which is dropped before reading the verdict.
    pub fn from_response(response: &str) -> Self {
        let text = strip_reasoning(response).trim().to_string();

        let first_word = text
            .trim_start_matches(|c: char| !c.is_alphanumeric())
            .split(|c: char| !c.is_alphanumeric())
            .next()
            .unwrap_or_default();

        Self {
            could_impact_market: first_word.eq_ignore_ascii_case("yes"),
            text,
        }
    }
}

fn strip_reasoning(response: &str) -> &str {
    let trimmed = response.trim_start();

    if trimmed.starts_with("<think>") {
        if let Some(end) = trimmed.find("</think>") {
            return &trimmed[end + "</think>".len()..];
        }
    }

    trimmed
}

// Notifications.

/// A push notification to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
    /// URL opened when the notification is tapped.
    pub click: Option<String>,
    /// Priority from 1 (min) to 5 (max).
    pub priority: u8,
    pub tags: Vec<String>,
}

// Outcomes.

/// What happened to a post that reached the analysis stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostVerdict {
    /// The post had no text to analyze (e.g., media only).
    Empty,
    /// The model judged the post irrelevant to the market.
    Ignored(Analysis),
    /// The model flagged the post and a notification was sent.
    Notified(Analysis),
}

/// Result of a single polling cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    NoPosts,
    AlreadySeen { post_id: PostId },
    Processed { post_id: PostId, verdict: PostVerdict },
}

// Tests.
