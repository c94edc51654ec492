//! Storage handler (C8): the read side of the registrar, exposing a
//! single backend's live capabilities/specifications/pool capacities for
//! the admin HTTP surface and the CLI.

use std::collections::HashMap;

use crate::error::RegisterError;
use crate::register::BackendRegister;

/// One pool's capacities, serialized to decimal strings the way the
/// backend descriptor's own wire format represents them.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolSnapshot {
    pub name: String,
    pub capacities: HashMap<String, String>,
}

/// The collected view `StorageHandler::collect` returns.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BackendSnapshot {
    pub capabilities: HashMap<String, bool>,
    pub specifications: HashMap<String, String>,
    pub pools: Vec<PoolSnapshot>,
}

/// Reads a backend's current plugin-reported state without mutating the
/// cache beyond the rebuild `load_or_rebuild_one_backend` already does.
pub struct StorageHandler<'a> {
    register: &'a BackendRegister,
}

impl<'a> StorageHandler<'a> {
    #[must_use]
    pub fn new(register: &'a BackendRegister) -> Self {
        Self { register }
    }

    /// Loads (rebuilding if `content_name` has rotated) the named backend,
    /// then asks its plugin for fresh capabilities and pool capacities.
    ///
    /// Nothing is cached from this call: a failure here does not disturb
    /// whatever is already in the cache.
    ///
    /// # Errors
    ///
    /// Propagates the registrar's load/rebuild error, or wraps a plugin
    /// failure as [`RegisterError::PluginInit`].
    pub async fn collect(&self, backend_name: &str, content_name: &str) -> Result<BackendSnapshot, RegisterError> {
        let backend = self.register.load_or_rebuild_one_backend(backend_name, content_name).await?;

        let (capabilities, specifications) = backend
            .plugin
            .update_backend_capabilities()
            .await
            .map_err(|e| RegisterError::PluginInit(backend_name.to_owned(), e))?;

        let pool_names: Vec<String> = backend.pools.iter().map(|p| p.name.clone()).collect();
        let capacities = backend
            .plugin
            .update_pool_capabilities(&pool_names)
            .await
            .map_err(|e| RegisterError::PluginInit(backend_name.to_owned(), e))?;

        let pools = pool_names
            .into_iter()
            .map(|name| {
                let capacities = capacities
                    .get(&name)
                    .map(|c| c.iter().map(|(k, v)| (k.clone(), v.to_string())).collect())
                    .unwrap_or_default();
                PoolSnapshot { name, capacities }
            })
            .collect();

        Ok(BackendSnapshot { capabilities, specifications, pools })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cache::BackendCache;
    use crate::fetch::{BackendContent, Fetcher, PoolContent, StaticContentSource};
    use hcsi_plugin::mock::MockPlugin;
    use hcsi_plugin::registry::PluginRegistry;
    use std::sync::Arc;

    fn descriptor(name: &str) -> BackendContent {
        let mut parameters = HashMap::new();
        parameters.insert("storagepool".to_owned(), "p1".to_owned());
        BackendContent {
            name: name.to_owned(),
            storage: "oceanstor-san".to_owned(),
            online: true,
            content_name: "v1".to_owned(),
            capabilities: HashMap::from([("SupportThin".to_owned(), true)]),
            parameters,
            pools: vec![PoolContent { name: "p1".to_owned(), capacities: HashMap::new() }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn collect_serializes_pool_capacities_as_strings() {
        let registry = PluginRegistry::new();
        registry.register(
            "oceanstor-san",
            Arc::new(|| -> Arc<dyn hcsi_plugin::Plugin> {
                let mut caps = HashMap::new();
                caps.insert("FreeCapacity".to_owned(), 2_000_000_000i64);
                Arc::new(MockPlugin::new("oceanstor-san").with_pool_capacity("p1", caps))
            }),
        );
        let cache = Arc::new(BackendCache::new());
        let source = Arc::new(StaticContentSource::new(vec![descriptor("b1")]));
        let register = BackendRegister::new(Arc::new(registry), cache.clone(), Fetcher::new(source));
        register.fetch_and_register_all_backend().await.unwrap();

        let handler = StorageHandler::new(&register);
        let snapshot = handler.collect("b1", "v1").await.unwrap();
        assert_eq!(snapshot.pools.len(), 1);
        assert_eq!(snapshot.pools[0].capacities.get("FreeCapacity"), Some(&"2000000000".to_owned()));
    }

    #[tokio::test]
    async fn collect_unknown_backend_errors() {
        let registry = PluginRegistry::new();
        let cache = Arc::new(BackendCache::new());
        let source = Arc::new(StaticContentSource::new(vec![]));
        let register = BackendRegister::new(Arc::new(registry), cache, Fetcher::new(source));

        let handler = StorageHandler::new(&register);
        let err = handler.collect("missing", "v1").await.unwrap_err();
        assert!(matches!(err, RegisterError::NotFound(_) | RegisterError::Fetch(_)));
    }
}
