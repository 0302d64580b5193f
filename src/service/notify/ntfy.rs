//! ntfy push notification integration.
//!
//! Messages are published with a plain `POST <server>/<topic>`; metadata travels in headers.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, instrument};

use crate::base::{
    config::Config,
    types::{Notification, Res, Void},
};

use super::{GenericNotifyClient, NotifyClient};

// Extra methods on `NotifyClient` applied by the ntfy implementation.

impl NotifyClient {
    pub fn ntfy(config: &Config) -> Res<Self> {
        let client = NtfyNotifyClient::new(config)?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Specific implementations.

/// ntfy client implementation.
#[derive(Clone)]
pub struct NtfyNotifyClient {
    client: Client,
    topic_url: String,
    token: Option<String>,
}

impl NtfyNotifyClient {
    /// Create a new ntfy client.
    #[instrument(name = "NtfyNotifyClient::new", skip_all)]
    pub fn new(config: &Config) -> Res<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        let topic_url = format!("{}/{}", config.ntfy_server.trim_end_matches('/'), config.ntfy_topic);

        Ok(Self {
            client,
            topic_url,
            token: config.ntfy_token.clone().filter(|t| !t.is_empty()),
        })
    }
}

#[async_trait]
impl GenericNotifyClient for NtfyNotifyClient {
    #[instrument(name = "NtfyNotifyClient::send_notification", skip_all)]
    async fn send_notification(&self, notification: &Notification) -> Void {
        let mut request = self
            .client
            .post(&self.topic_url)
            .header("Title", &notification.title)
            .header("Priority", notification.priority.to_string())
            .body(notification.message.clone());

        if !notification.tags.is_empty() {
            request = request.header("Tags", notification.tags.join(","));
        }

        if let Some(click) = &notification.click {
            request = request.header("Click", click);
        }

        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("ntfy publish failed ({status}): {text}"));
        }

        info!("Notification sent to `{}`.", self.topic_url);

        Ok(())
    }
}

// Tests.
