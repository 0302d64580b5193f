//! JSON file state store.
//!
//! The file holds a single object, `{"last_post_id": "<id>"}`.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::base::types::{PostId, Res, Void};

use super::{GenericStateStore, StateStore};

// Extra methods on `StateStore` applied by the file implementation.

impl StateStore {
    /// Create a state store backed by a JSON file.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            inner: Arc::new(FileStateStore::new(path)),
        }
    }
}

// Structs.

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    last_post_id: Option<PostId>,
}

/// File-backed state store implementation.
pub struct FileStateStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStateStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl GenericStateStore for FileStateStore {
    #[instrument(name = "FileStateStore::get_last_post_id", skip_all)]
    async fn get_last_post_id(&self) -> Res<Option<PostId>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("State file `{}` does not exist yet.", self.path.display());
                return Ok(None);
            }
            Err(err) => return Err(err).with_context(|| format!("Failed to read state file `{}`", self.path.display())),
        };

        let state: StateFile = serde_json::from_str(&contents).with_context(|| format!("State file `{}` is not valid JSON", self.path.display()))?;

        Ok(state.last_post_id)
    }

    #[instrument(name = "FileStateStore::set_last_post_id", skip_all)]
    async fn set_last_post_id(&self, post_id: &PostId) -> Void {
        let _guard = self.write_lock.lock().await;

        let state = StateFile {
            last_post_id: Some(post_id.clone()),
        };
        let contents = serde_json::to_string(&state)?;

        // Write then rename, so a crash never leaves a truncated file behind.
        let temp_path = self.temp_path();
        tokio::fs::write(&temp_path, contents)
            .await
            .with_context(|| format!("Failed to write state file `{}`", temp_path.display()))?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .with_context(|| format!("Failed to replace state file `{}`", self.path.display()))?;

        debug!("Saved last post id `{post_id}`.");

        Ok(())
    }
}

// Tests.
