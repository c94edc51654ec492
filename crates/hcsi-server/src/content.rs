//! File-backed [`ContentSource`] for `HCSI_CONTENT_SOURCE=file` mode: reads
//! a JSON `Vec<BackendContent>` off disk fresh on every call, so editing
//! the file and waiting for the next reconcile tick is enough to pick up
//! a change — no separate "reload" signal needed.

use hcsi_engine::error::FetchError;
use hcsi_engine::fetch::{BackendContent, ContentSource};

pub struct FileContentSource {
    path: String,
}

impl FileContentSource {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    async fn read_all(&self) -> Result<Vec<BackendContent>, FetchError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| FetchError::Source(format!("reading '{}': {e}", self.path)))?;
        serde_json::from_str(&raw).map_err(|e| FetchError::Source(format!("parsing '{}': {e}", self.path)))
    }
}

#[async_trait::async_trait]
impl ContentSource for FileContentSource {
    async fn list(&self) -> Result<Vec<BackendContent>, FetchError> {
        self.read_all().await
    }

    async fn get(&self, name: &str) -> Result<Option<BackendContent>, FetchError> {
        let all = self.read_all().await?;
        Ok(all.into_iter().find(|d| d.name == name))
    }
}
