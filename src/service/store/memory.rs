//! In-memory state store, used for tests and dry runs.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::base::types::{PostId, Res, Void};

use super::{GenericStateStore, StateStore};

impl StateStore {
    /// Create a state store that forgets everything on exit.
    pub fn memory() -> Self {
        Self {
            inner: Arc::new(MemoryStateStore::default()),
        }
    }
}

#[derive(Default)]
pub struct MemoryStateStore {
    last_post_id: RwLock<Option<PostId>>,
}

#[async_trait]
impl GenericStateStore for MemoryStateStore {
    async fn get_last_post_id(&self) -> Res<Option<PostId>> {
        Ok(self.last_post_id.read().await.clone())
    }

    async fn set_last_post_id(&self, post_id: &PostId) -> Void {
        *self.last_post_id.write().await = Some(post_id.clone());
        Ok(())
    }
}
