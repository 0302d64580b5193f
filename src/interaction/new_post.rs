//! This module handles a post that has not been processed before.

use tracing::{info, instrument};

use crate::{
    base::{
        config::Config,
        html::extract_paragraph_text,
        types::{Notification, Post, PostVerdict, Res},
    },
    service::{llm::LlmClient, notify::NotifyClient},
};

/// Tags attached to every market alert.
const ALERT_TAGS: &[&str] = &["chart_with_upwards_trend"];

/// Analyze a new post and notify if the model flags it.
///
/// Errors from the model or the notifier are returned to the caller, so the post
/// can be retried rather than silently dropped.
#[instrument(skip_all, fields(post_id = %post.id))]
pub async fn handle_new_post(post: &Post, config: &Config, llm: &LlmClient, notify: &NotifyClient) -> Res<PostVerdict> {
    let content = extract_paragraph_text(post.display_content()).join("\n");

    if content.is_empty() {
        info!("Post has no text to analyze.");
        return Ok(PostVerdict::Empty);
    }

    let analysis = llm.get_market_analysis(&content).await?;

    if !analysis.could_impact_market {
        info!("Post unlikely to impact market.");
        return Ok(PostVerdict::Ignored(analysis));
    }

    info!("Post could impact market. Sending notification.");

    let notification = Notification {
        title: format!("New post from @{}", config.truthsocial_handle.trim_start_matches('@')),
        message: format!("{content}\n\nAnalysis: {}", analysis.text),
        click: post.url.clone().or_else(|| post.reblog.as_ref().and_then(|r| r.url.clone())),
        priority: config.ntfy_priority,
        tags: ALERT_TAGS.iter().map(|t| t.to_string()).collect(),
    };

    notify.send_notification(&notification).await?;

    Ok(PostVerdict::Notified(analysis))
}
