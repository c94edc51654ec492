//! Backend selector (C7): the public entry point that turns a request
//! size plus parameter bag into a concrete `(local, remote?)` pool pair.

use crate::cache::BackendCache;
use crate::error::{CacheError, SelectError};
use crate::filter::{primary_chain, run_chain, secondary_chain, CandidatePool};
use crate::model::{Backend, StoragePool, StorageBackendTuple};
use crate::params::ParamBag;
use crate::register::BackendRegister;
use crate::topology::AccessibleTopology;
use crate::weight::{filter_by_capacity, weight_by_free_capacity};

pub struct BackendSelector<'a> {
    cache: &'a BackendCache,
    register: &'a BackendRegister,
}

impl<'a> BackendSelector<'a> {
    #[must_use]
    pub fn new(cache: &'a BackendCache, register: &'a BackendRegister) -> Self {
        Self { cache, register }
    }

    /// Looks up one backend by name via the registrar's cache-first path.
    ///
    /// # Errors
    ///
    /// Propagates the registrar's fetch/construction error.
    pub async fn select_backend(&self, name: &str) -> Result<Backend, crate::error::RegisterError> {
        self.register.load_or_register_one_backend(name).await
    }

    fn candidates_from_available(backends: Vec<Backend>) -> Vec<CandidatePool> {
        backends
            .into_iter()
            .filter(|b| b.available)
            .flat_map(|b| b.pools.iter().map(|p| CandidatePool { backend: b.clone(), pool: p.clone() }).collect::<Vec<_>>())
            .collect()
    }

    async fn run_primary(
        &self,
        size_bytes: i64,
        params: &ParamBag<'_>,
        topology: &AccessibleTopology,
    ) -> Result<Vec<CandidatePool>, SelectError> {
        let candidates = Self::candidates_from_available(self.cache.list().await);
        let filtered = run_chain(&primary_chain(), *params, candidates).await?;
        let narrowed = crate::topology::filter_requisite(&topology.requisite, filtered);
        if narrowed.is_empty() {
            return Err(SelectError::NoAvailablePool {
                filter: "topology".to_owned(),
                value: String::new(),
                parameters: params.as_map().clone(),
            });
        }
        let ordered = crate::topology::reorder_preferred(&topology.preferred, narrowed);
        let alloc_type = params.get_str("allocType");
        filter_by_capacity(alloc_type, size_bytes, ordered)
    }

    /// All local-pool candidates after the primary chain + topology +
    /// capacity narrowing. Retries once after a full reconcile if the
    /// first pass comes up empty — the exhaustion may have been caused by
    /// stale `available` flags.
    ///
    /// # Errors
    ///
    /// [`SelectError::NoAvailablePool`] if both attempts come up empty, or
    /// any filter's own error (e.g. qos rejection, malformed quota).
    pub async fn select_local_pool(
        &self,
        size_bytes: i64,
        params: &ParamBag<'_>,
        topology: &AccessibleTopology,
    ) -> Result<Vec<CandidatePool>, SelectError> {
        match self.run_primary(size_bytes, params, topology).await {
            Ok(candidates) => Ok(candidates),
            Err(SelectError::NoAvailablePool { .. }) => {
                self.register.fetch_and_register_all_backend().await?;
                self.run_primary(size_bytes, params, topology).await
            }
            Err(e) => Err(e),
        }
    }

    /// The remote-side pool for a hyper-metro/replication request, if the
    /// request asks for one.
    ///
    /// # Errors
    ///
    /// [`SelectError::MutuallyExclusiveTopology`] if both are requested;
    /// [`SelectError::PairingAbsent`] if the requested sibling isn't
    /// cached; the secondary chain's own filter errors otherwise.
    pub async fn select_remote_pool(
        &self,
        size_bytes: i64,
        local_backend_name: &str,
        params: &ParamBag<'_>,
    ) -> Result<Option<CandidatePool>, SelectError> {
        let hyper_metro = params.get_bool("hyperMetro").map_err(SelectError::InvalidParameter)?;
        let replication = params.get_bool("replication").map_err(SelectError::InvalidParameter)?;
        if hyper_metro && replication {
            return Err(SelectError::MutuallyExclusiveTopology);
        }
        if !hyper_metro && !replication {
            return Ok(None);
        }

        let local = self
            .cache
            .load(local_backend_name)
            .await
            .ok_or_else(|| SelectError::Cache(CacheError::NotFound(local_backend_name.to_owned())))?;

        let sibling = if hyper_metro {
            self.cache.metro_sibling(&local).await
        } else {
            self.cache.replica_sibling(&local).await
        }
        .ok_or_else(|| SelectError::PairingAbsent(local_backend_name.to_owned()))?;

        let candidates: Vec<CandidatePool> = sibling
            .pools
            .iter()
            .map(|p| CandidatePool { backend: sibling.clone(), pool: p.clone() })
            .collect();
        let filtered = run_chain(&secondary_chain(), *params, candidates).await?;
        let alloc_type = params.get_str("allocType");
        let sized = filter_by_capacity(alloc_type, size_bytes, filtered)?;
        let weighted = weight_by_free_capacity(sized);
        Ok(weighted.into_iter().next())
    }

    /// Full pair selection: picks a local candidate, computes its remote
    /// counterpart if requested, weights locals by free capacity, and
    /// reserves capacity for thick allocations.
    ///
    /// # Errors
    ///
    /// Any of [`Self::select_local_pool`]/[`Self::select_remote_pool`]'s
    /// errors, or [`SelectError::Cache`] if capacity reservation races out
    /// the chosen pool between selection and reservation.
    pub async fn select_pool_pair(
        &self,
        size_bytes: i64,
        params: &mut std::collections::HashMap<String, String>,
        topology: &AccessibleTopology,
    ) -> Result<StorageBackendTuple, SelectError> {
        let locals = {
            let bag = ParamBag::new(params);
            self.select_local_pool(size_bytes, &bag, topology).await?
        };
        let weighted_locals = weight_by_free_capacity(locals);

        let mut chosen: Option<(CandidatePool, Option<StoragePool>)> = None;
        let mut last_tried = String::new();
        for candidate in weighted_locals {
            let bag = ParamBag::new(params);
            let remote = self.select_remote_pool(size_bytes, &candidate.backend.name, &bag).await;
            match remote {
                Ok(remote) => {
                    chosen = Some((candidate, remote.map(|c| c.pool)));
                    break;
                }
                Err(SelectError::PairingAbsent(name)) => {
                    last_tried = name;
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        let (local, remote) = chosen.ok_or(SelectError::PairingAbsent(last_tried))?;

        let alloc_type = params.get("allocType").map(String::as_str).unwrap_or_default();
        if alloc_type == "thick" {
            self.cache.reserve_capacity(&local.backend.name, &local.pool.name, size_bytes).await?;
            if let Some(remote) = &remote {
                self.cache.reserve_capacity(&remote.parent, &remote.name, size_bytes).await?;
            }
        }

        params.insert("storagepool".to_owned(), local.pool.name.clone());
        if let Some(remote) = &remote {
            params.insert("remoteStoragePool".to_owned(), remote.name.clone());
            params.insert("metroDomain".to_owned(), local.backend.metro_domain.clone());
            params.insert("vStorePairID".to_owned(), local.backend.metro_vstore_pair_id.clone());
        }
        params.insert("accountName".to_owned(), local.backend.account_name.clone());

        Ok(StorageBackendTuple { local: local.pool, remote })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fetch::{BackendContent, Fetcher, PoolContent, StaticContentSource};
    use crate::model::capability;
    use hcsi_plugin::mock::MockPlugin;
    use hcsi_plugin::registry::PluginRegistry;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// A registry whose one factory yields a [`MockPlugin`] pre-configured
    /// with `capabilities` (backend-wide) and `pool_capacity` for pool
    /// `"p1"`, since `build_backend` sources a pool's real capability and
    /// capacity values from the plugin, not from the descriptor.
    fn registry_with_mock(family: &str, capabilities: Vec<(&'static str, bool)>, pool_free_capacity: i64) -> Arc<PluginRegistry> {
        let registry = PluginRegistry::new();
        let family_owned = family.to_owned();
        registry.register(
            family_owned.clone(),
            Arc::new(move || -> Arc<dyn hcsi_plugin::Plugin> {
                let mut plugin = MockPlugin::new(family_owned.clone());
                for (key, value) in &capabilities {
                    plugin = plugin.with_capability(*key, *value);
                }
                let mut caps = HashMap::new();
                caps.insert("FreeCapacity".to_owned(), pool_free_capacity);
                caps.insert("TotalCapacity".to_owned(), pool_free_capacity);
                plugin = plugin.with_pool_capacity("p1", caps);
                Arc::new(plugin)
            }),
        );
        Arc::new(registry)
    }

    fn nas_descriptor(name: &str) -> BackendContent {
        let mut parameters = HashMap::new();
        parameters.insert("storagepool".to_owned(), "p1".to_owned());
        BackendContent {
            name: name.to_owned(),
            storage: "oceanstor-nas".to_owned(),
            online: true,
            content_name: "v1".to_owned(),
            capabilities: HashMap::from([(capability::SUPPORT_THIN.to_owned(), true)]),
            parameters,
            pools: vec![PoolContent {
                name: "p1".to_owned(),
                capacities: HashMap::new(),
            }],
            ..Default::default()
        }
    }

    async fn setup(descriptor: BackendContent, registry: Arc<PluginRegistry>) -> (Arc<BackendCache>, BackendRegister) {
        let cache = Arc::new(BackendCache::new());
        let source = Arc::new(StaticContentSource::new(vec![descriptor]));
        let register = BackendRegister::new(registry, cache.clone(), Fetcher::new(source));
        register.fetch_and_register_all_backend().await.unwrap();
        (cache, register)
    }

    #[tokio::test]
    async fn single_backend_thin_create_selects_only_pool() {
        let registry = registry_with_mock("oceanstor-nas", vec![(capability::SUPPORT_THIN, true)], 10_737_418_240);
        let (cache, register) = setup(nas_descriptor("nasA"), registry).await;
        let backend = cache.load("nasA").await.unwrap();
        assert_eq!(backend.pools.len(), 1);

        let selector = BackendSelector::new(&cache, &register);
        let mut params = HashMap::new();
        params.insert("volumeType".to_owned(), "fs".to_owned());
        params.insert("allocType".to_owned(), "thin".to_owned());

        let pair = selector.select_pool_pair(1 << 30, &mut params, &AccessibleTopology::default()).await.unwrap();
        assert_eq!(pair.local.parent, "nasA");
        assert!(pair.remote.is_none());
        assert_eq!(pair.local.free_capacity(), 10_737_418_240);
    }

    #[tokio::test]
    async fn thick_exhaustion_surfaces_no_available_pool() {
        let registry = registry_with_mock("oceanstor-nas", vec![(capability::SUPPORT_THICK, true)], 524_288_000);
        let (cache, register) = setup(nas_descriptor("nasA"), registry).await;
        let backend = cache.load("nasA").await.unwrap();
        assert!(backend.pool("p1").unwrap().has_capability(capability::SUPPORT_THICK));

        let selector = BackendSelector::new(&cache, &register);
        let mut params = HashMap::new();
        params.insert("allocType".to_owned(), "thick".to_owned());

        let err = selector.select_pool_pair(1 << 30, &mut params, &AccessibleTopology::default()).await.unwrap_err();
        assert!(matches!(err, SelectError::NoAvailablePool { .. }));
    }

    #[tokio::test]
    async fn unavailable_backend_never_selected() {
        let registry = registry_with_mock("oceanstor-nas", vec![(capability::SUPPORT_THIN, true)], 10_737_418_240);
        let (cache, register) = setup(nas_descriptor("nasA"), registry).await;
        cache.set_available("nasA", false).await.unwrap();

        let selector = BackendSelector::new(&cache, &register);
        let mut params = HashMap::new();
        params.insert("allocType".to_owned(), "thin".to_owned());
        let result = selector.select_pool_pair(1 << 20, &mut params, &AccessibleTopology::default()).await;
        assert!(result.is_err());
    }
}
