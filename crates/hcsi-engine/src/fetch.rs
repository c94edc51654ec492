//! Backend fetcher (C4): reads backend descriptors from an external
//! orchestrator and narrows them to the syncable subset. Never mutates
//! [`crate::cache::BackendCache`] — that's C5's job.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// One pool entry inside a fetched descriptor. Capacities arrive as
/// decimal strings, the same wire shape the orchestrator uses for
/// `status.pools[].capacities`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolContent {
    pub name: String,
    pub capacities: HashMap<String, String>,
}

/// A declarative backend descriptor as read from the orchestrator.
///
/// Carries `Serialize`/`Deserialize` so `hcsi-server`'s file-config mode
/// can load a `Vec<BackendContent>` straight off disk into a
/// [`StaticContentSource`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendContent {
    pub name: String,
    pub storage: String,
    pub online: bool,
    /// Generation identity used by `LoadOrRebuildOneBackend` to decide
    /// whether a cached backend must be rebuilt.
    pub content_name: String,
    pub capabilities: HashMap<String, bool>,
    pub parameters: HashMap<String, String>,
    /// Raw, not-yet-validated `supportedTopologies` value; register.rs
    /// rejects anything that isn't a list of string-valued maps.
    pub supported_topologies: serde_json::Value,
    pub account_name: String,
    pub metro_domain: String,
    pub metro_vstore_pair_id: String,
    pub metro_backend_name: String,
    pub replica_backend_name: String,
    pub pools: Vec<PoolContent>,
}

/// The external collaborator boundary: anything that can hand back
/// backend descriptors by name or in bulk. [`crate::kube_source`] and
/// [`StaticContentSource`] are the two implementations.
#[async_trait::async_trait]
pub trait ContentSource: Send + Sync {
    async fn list(&self) -> Result<Vec<BackendContent>, FetchError>;
    async fn get(&self, name: &str) -> Result<Option<BackendContent>, FetchError>;
}

/// Narrows a [`ContentSource`] to the descriptors worth registering.
pub struct Fetcher {
    source: Arc<dyn ContentSource>,
}

impl Fetcher {
    #[must_use]
    pub fn new(source: Arc<dyn ContentSource>) -> Self {
        Self { source }
    }

    /// Every descriptor that is online and carries a non-empty
    /// capabilities map.
    ///
    /// # Errors
    ///
    /// Propagates the source's error.
    pub async fn list_syncable(&self) -> Result<Vec<BackendContent>, FetchError> {
        let all = self.source.list().await?;
        Ok(all.into_iter().filter(|d| d.online && !d.capabilities.is_empty()).collect())
    }

    /// Fetch one descriptor by name.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::NotFound`] if the descriptor is absent, or if
    /// `require_online` is set and the descriptor reports offline.
    pub async fn get_one(&self, name: &str, require_online: bool) -> Result<BackendContent, FetchError> {
        let descriptor = self.source.get(name).await?.ok_or_else(|| FetchError::NotFound(name.to_owned()))?;
        if require_online && !descriptor.online {
            return Err(FetchError::NotFound(name.to_owned()));
        }
        Ok(descriptor)
    }
}

/// An in-memory [`ContentSource`] backed by a `Vec` behind a lock, used by
/// every unit test and by file-config mode in `hcsi-server`/`hcsi-cli`.
pub struct StaticContentSource {
    descriptors: RwLock<Vec<BackendContent>>,
}

impl StaticContentSource {
    #[must_use]
    pub fn new(descriptors: Vec<BackendContent>) -> Self {
        Self {
            descriptors: RwLock::new(descriptors),
        }
    }

    /// Replace the whole descriptor list, e.g. to simulate an
    /// orchestrator-side update between two fetches.
    pub async fn set(&self, descriptors: Vec<BackendContent>) {
        *self.descriptors.write().await = descriptors;
    }

    /// Upsert a single descriptor by name.
    pub async fn put(&self, descriptor: BackendContent) {
        let mut list = self.descriptors.write().await;
        if let Some(existing) = list.iter_mut().find(|d| d.name == descriptor.name) {
            *existing = descriptor;
        } else {
            list.push(descriptor);
        }
    }

    /// Remove a descriptor by name, simulating the orchestrator deleting
    /// or hiding it.
    pub async fn remove(&self, name: &str) {
        self.descriptors.write().await.retain(|d| d.name != name);
    }
}

#[async_trait::async_trait]
impl ContentSource for StaticContentSource {
    async fn list(&self) -> Result<Vec<BackendContent>, FetchError> {
        Ok(self.descriptors.read().await.clone())
    }

    async fn get(&self, name: &str) -> Result<Option<BackendContent>, FetchError> {
        Ok(self.descriptors.read().await.iter().find(|d| d.name == name).cloned())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn descriptor(name: &str, online: bool, has_capabilities: bool) -> BackendContent {
        let mut capabilities = HashMap::new();
        if has_capabilities {
            capabilities.insert("SupportThin".to_owned(), true);
        }
        BackendContent {
            name: name.to_owned(),
            storage: "oceanstor-san".to_owned(),
            online,
            capabilities,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn list_syncable_drops_offline_and_empty_capabilities() {
        let source = StaticContentSource::new(vec![
            descriptor("a", true, true),
            descriptor("b", false, true),
            descriptor("c", true, false),
        ]);
        let fetcher = Fetcher::new(Arc::new(source));
        let syncable = fetcher.list_syncable().await.unwrap();
        assert_eq!(syncable.len(), 1);
        assert_eq!(syncable[0].name, "a");
    }

    #[tokio::test]
    async fn get_one_requiring_online_rejects_offline_descriptor() {
        let source = StaticContentSource::new(vec![descriptor("a", false, true)]);
        let fetcher = Fetcher::new(Arc::new(source));
        assert!(fetcher.get_one("a", true).await.is_err());
        assert!(fetcher.get_one("a", false).await.is_ok());
    }

    #[tokio::test]
    async fn get_one_missing_descriptor_errors() {
        let source = StaticContentSource::new(vec![]);
        let fetcher = Fetcher::new(Arc::new(source));
        assert!(fetcher.get_one("missing", false).await.is_err());
    }
}
