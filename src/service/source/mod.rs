pub mod truthsocial;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::types::{Post, PostQuery, Res};

// Traits.

/// Generic post source trait that clients must implement.
///
/// This trait defines how posts are pulled from the watched social platform.
/// Implementing this trait allows different platforms to be used with the stock-watcher.
#[async_trait]
pub trait GenericSourceClient: Send + Sync + 'static {
    /// Pull the posts newer than the query's bounds.
    ///
    /// When neither bound is set, the client returns as many recent posts as its
    /// paging limit allows. Order of the returned posts is unspecified.
    async fn get_posts(&self, query: &PostQuery) -> Res<Vec<Post>>;
}

// Structs.

/// Post source client for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct SourceClient {
    inner: Arc<dyn GenericSourceClient>,
}

impl Deref for SourceClient {
    type Target = dyn GenericSourceClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl SourceClient {
    pub fn new(inner: Arc<dyn GenericSourceClient>) -> Self {
        Self { inner }
    }
}
