//! Runtime services and shared state for the stock-watcher.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument};

use crate::{
    base::{
        config::Config,
        types::{CheckOutcome, PostQuery, Res, Void},
    },
    interaction::new_post::handle_new_post,
    service::{llm::LlmClient, notify::NotifyClient, source::SourceClient, store::StateStore},
};

/// Runtime service context that can be shared across the application.
///
/// This struct holds the post source, LLM, notification and state clients, and configuration.
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The post source client instance.
    pub source: SourceClient,
    /// The LLM client instance.
    pub llm: LlmClient,
    /// The notification client instance.
    pub notify: NotifyClient,
    /// The state store instance.
    pub store: StateStore,
}

impl Runtime {
    /// Create a new runtime instance.
    #[instrument(skip_all)]
    pub fn new(config: Config) -> Res<Self> {
        // Initialize the post source.
        let source = SourceClient::truthsocial(&config)?;

        // Initialize the LLM client.
        let llm = LlmClient::from_config(&config)?;

        // Initialize the notification client.
        let notify = NotifyClient::ntfy(&config)?;

        // Initialize the state store.
        let store = StateStore::file(&config.state_path);

        Ok(Self { config, source, llm, notify, store })
    }

    /// Prepare the model and poll until interrupted.
    pub async fn start(&self) -> Void {
        info!("Using model `{}`.", self.llm.model());

        self.llm.prepare().await?;

        let last_post_id = self.store.get_last_post_id().await?;
        info!("Last processed post ID: {}", last_post_id.map(|id| id.to_string()).unwrap_or_else(|| "none".to_string()));

        self.poll_until(tokio::signal::ctrl_c()).await
    }

    /// Poll every `check_interval` until `shutdown` completes.
    ///
    /// The shutdown future is polled for the whole run, so it also interrupts a check in flight.
    pub async fn poll_until<F: Future>(&self, shutdown: F) -> Void {
        let mut shutdown = std::pin::pin!(shutdown);

        loop {
            tokio::select! {
                result = self.check_once() => match result {
                    Ok(outcome) => info!("Check finished: {outcome:?}"),
                    Err(err) => error!("Error while checking for new posts: {err:#}"),
                },
                _ = &mut shutdown => {
                    info!("Shutting down ...");
                    return Ok(());
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.check_interval) => {}
                _ = &mut shutdown => {
                    info!("Shutting down ...");
                    return Ok(());
                }
            }
        }
    }

    /// Run a single polling cycle.
    ///
    /// Only the newest unseen post is analyzed. Its id is persisted once it has been
    /// fully handled, so any failure leaves it to be retried on the next cycle.
    #[instrument(skip_all)]
    pub async fn check_once(&self) -> Res<CheckOutcome> {
        info!("Checking for new posts at {}", Utc::now());

        let last_post_id = self.store.get_last_post_id().await?;

        // Without any history, only look back a bounded amount of time.
        let created_after = match last_post_id {
            Some(_) => None,
            None => Some(lookback_start(Utc::now(), self.config.initial_lookback)?),
        };

        let query = PostQuery {
            handle: self.config.truthsocial_handle.clone(),
            since_id: last_post_id.clone(),
            created_after,
        };

        let posts = self.source.get_posts(&query).await?;

        // Newest first.
        let Some(newest) = posts.into_iter().max_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))) else {
            info!("No posts found.");
            return Ok(CheckOutcome::NoPosts);
        };

        if last_post_id.as_ref().is_some_and(|last| newest.id <= *last) {
            info!("No new posts found.");
            return Ok(CheckOutcome::AlreadySeen { post_id: newest.id });
        }

        info!("New post found: {}", newest.id);

        let verdict = handle_new_post(&newest, &self.config, &self.llm, &self.notify).await?;

        self.store.set_last_post_id(&newest.id).await?;

        Ok(CheckOutcome::Processed { post_id: newest.id, verdict })
    }
}

/// The earliest creation time considered when nothing has been processed yet.
fn lookback_start(now: DateTime<Utc>, lookback: Duration) -> Res<DateTime<Utc>> {
    let lookback = chrono::Duration::from_std(lookback)?;

    now.checked_sub_signed(lookback)
        .ok_or_else(|| anyhow::anyhow!("Initial lookback of {}s reaches before the earliest representable time.", lookback.num_seconds()))
}

// Tests.
