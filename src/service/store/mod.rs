pub mod file;
pub mod memory;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::types::{PostId, Res, Void};

// Traits.

/// Generic state store trait that stores must implement.
///
/// The watcher only needs to remember the last post it fully processed, so
/// that restarts neither re-alert nor skip anything.
#[async_trait]
pub trait GenericStateStore: Send + Sync + 'static {
    /// Get the id of the last processed post, if any.
    async fn get_last_post_id(&self) -> Res<Option<PostId>>;

    /// Record the id of the last processed post.
    async fn set_last_post_id(&self, post_id: &PostId) -> Void;
}

// Structs.

/// State store for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<dyn GenericStateStore>,
}

impl Deref for StateStore {
    type Target = dyn GenericStateStore;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl StateStore {
    pub fn new(inner: Arc<dyn GenericStateStore>) -> Self {
        Self { inner }
    }
}
