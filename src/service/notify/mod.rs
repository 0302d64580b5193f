pub mod ntfy;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::types::{Notification, Void};

// Traits.

/// Generic "notify" trait that clients must implement.
///
/// This trait defines how alerts leave the application. Implementing this trait
/// allows different push services to be used with the stock-watcher.
#[async_trait]
pub trait GenericNotifyClient: Send + Sync + 'static {
    /// Deliver a push notification.
    async fn send_notification(&self, notification: &Notification) -> Void;
}

// Structs.

/// Notification client for the application.
///
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct NotifyClient {
    inner: Arc<dyn GenericNotifyClient>,
}

impl Deref for NotifyClient {
    type Target = dyn GenericNotifyClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl NotifyClient {
    pub fn new(inner: Arc<dyn GenericNotifyClient>) -> Self {
        Self { inner }
    }
}
