//! Backend register (C5): builds [`Backend`] values from fetched
//! descriptors, installs them in [`BackendCache`], and keeps paired
//! (hyper-metro / replication) relationships consistent.
//!
//! Construction happens entirely on a local value; nothing is visible in
//! the cache until the whole pipeline below succeeds, matching the
//! "failure at any step leaves no partial state visible" rule.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::BackendCache;
use crate::error::RegisterError;
use crate::fetch::{BackendContent, Fetcher};
use crate::model::{Backend, StoragePool, TOPOLOGY_PROTOCOL_PREFIX};
use hcsi_plugin::registry::PluginRegistry;

/// Derives the protocol name the registrar stamps into
/// `supportedTopologies`. Underspecified upstream; resolved here as
/// `parameters["protocol"]` when present, else a family-driven default.
fn protocol_for(descriptor: &BackendContent) -> String {
    if let Some(p) = descriptor.parameters.get("protocol") {
        return p.clone();
    }
    if hcsi_plugin::families::is_nas(&descriptor.storage) {
        "nfs".to_owned()
    } else {
        "iscsi".to_owned()
    }
}

fn parse_topologies(name: &str, raw: &serde_json::Value) -> Result<Vec<HashMap<String, String>>, RegisterError> {
    match raw {
        serde_json::Value::Null => Ok(Vec::new()),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| {
                let obj = item
                    .as_object()
                    .ok_or_else(|| RegisterError::MalformedTopologies(name.to_owned(), "entry is not an object".to_owned()))?;
                obj.iter()
                    .map(|(k, v)| {
                        v.as_str()
                            .map(|s| (k.clone(), s.to_owned()))
                            .ok_or_else(|| RegisterError::MalformedTopologies(name.to_owned(), format!("key '{k}' is not a string value")))
                    })
                    .collect::<Result<HashMap<_, _>, _>>()
            })
            .collect(),
        _ => Err(RegisterError::MalformedTopologies(name.to_owned(), "supportedTopologies is not a list".to_owned())),
    }
}

fn append_protocol_entries(topologies: &mut Vec<HashMap<String, String>>, protocol: &str) {
    let protocol_key = format!("{TOPOLOGY_PROTOCOL_PREFIX}{protocol}");
    let crossed: Vec<HashMap<String, String>> = topologies
        .iter()
        .map(|t| {
            let mut t = t.clone();
            t.insert(protocol_key.clone(), protocol.to_owned());
            t
        })
        .collect();
    topologies.extend(crossed);

    let mut bare = HashMap::new();
    bare.insert(protocol_key, protocol.to_owned());
    topologies.push(bare);
}

fn validate_pairing(descriptor: &BackendContent) -> Result<(), RegisterError> {
    let has_metro_identity = !descriptor.metro_domain.is_empty() || !descriptor.metro_vstore_pair_id.is_empty();
    let has_metro_name = !descriptor.metro_backend_name.is_empty();
    if has_metro_identity != has_metro_name {
        return Err(RegisterError::HalfConfiguredMetro(descriptor.name.clone()));
    }
    Ok(())
}

fn build_pool_skeletons(descriptor: &BackendContent) -> Result<Vec<StoragePool>, RegisterError> {
    let pools = if descriptor.pools.is_empty() && hcsi_plugin::families::is_single_pool_family(&descriptor.storage) {
        vec![StoragePool::new(&descriptor.name, &descriptor.name, &descriptor.storage)]
    } else {
        descriptor
            .pools
            .iter()
            .map(|p| StoragePool::new(&p.name, &descriptor.name, &descriptor.storage))
            .collect()
    };

    if pools.is_empty() {
        return Err(RegisterError::EmptyPools(descriptor.name.clone()));
    }
    Ok(pools)
}

/// Builds one [`Backend`] from `descriptor`, running the full construction
/// algorithm. Does not touch the cache.
///
/// # Errors
///
/// Any step's [`RegisterError`]; the plugin is logged out before returning
/// if `Init` succeeded but a later step fails.
pub async fn build_backend(registry: &PluginRegistry, descriptor: &BackendContent) -> Result<Backend, RegisterError> {
    let plugin = registry
        .create(&descriptor.storage)
        .map_err(|_| RegisterError::UnknownFamily(descriptor.storage.clone()))?;

    if descriptor.parameters.is_empty() {
        return Err(RegisterError::MissingParameters(descriptor.name.clone()));
    }

    let mut topologies = parse_topologies(&descriptor.name, &descriptor.supported_topologies)?;
    validate_pairing(descriptor)?;
    let mut pools = build_pool_skeletons(descriptor)?;

    plugin
        .init(serde_json::Value::Null, &descriptor.parameters, true)
        .await
        .map_err(|e| RegisterError::PluginInit(descriptor.name.clone(), e))?;

    let protocol = protocol_for(descriptor);
    append_protocol_entries(&mut topologies, &protocol);

    match plugin.update_backend_capabilities().await {
        Ok((capabilities, _specifications)) => {
            for pool in &mut pools {
                pool.capabilities = capabilities.clone();
            }
        }
        Err(e) => {
            plugin.logout().await;
            return Err(RegisterError::PluginInit(descriptor.name.clone(), e));
        }
    }

    let pool_names: Vec<String> = pools.iter().map(|p| p.name.clone()).collect();
    match plugin.update_pool_capabilities(&pool_names).await {
        Ok(capacities) => {
            for pool in &mut pools {
                if let Some(c) = capacities.get(&pool.name) {
                    pool.capacities = c.clone();
                }
            }
        }
        Err(e) => {
            plugin.logout().await;
            return Err(RegisterError::PluginInit(descriptor.name.clone(), e));
        }
    }

    Ok(Backend {
        name: descriptor.name.clone(),
        storage: descriptor.storage.clone(),
        available: descriptor.online,
        content_name: descriptor.content_name.clone(),
        plugin,
        pools,
        parameters: descriptor.parameters.clone(),
        supported_topologies: topologies,
        account_name: descriptor.account_name.clone(),
        metro_domain: descriptor.metro_domain.clone(),
        metro_vstore_pair_id: descriptor.metro_vstore_pair_id.clone(),
        metro_backend_name: descriptor.metro_backend_name.clone(),
        replica_backend_name: descriptor.replica_backend_name.clone(),
    })
}

/// Iterates every cached backend, wires `UpdateMetroRemotePlugin` between
/// any two that now match the hyper-metro sibling rule, and does the same
/// for replication. Idempotent: calling twice is a no-op the second time,
/// since the mock plugin (and any real one) treats re-sending the same
/// sibling as a no-op.
pub async fn update_paired_backends(cache: &BackendCache) {
    let backends = cache.list().await;
    for backend in &backends {
        if backend.has_metro_hints() {
            if let Some(sibling) = cache.metro_sibling(backend).await {
                backend.plugin.update_metro_remote_plugin(sibling.plugin.clone()).await;
            }
        }
        if backend.has_replica_hints() {
            if let Some(sibling) = cache.replica_sibling(backend).await {
                backend.plugin.update_metro_remote_plugin(sibling.plugin.clone()).await;
            }
        }
    }
}

/// Builds `descriptor`'s backend and installs it in `cache`, then runs the
/// pairing pass over the whole cache.
///
/// # Errors
///
/// Propagates [`build_backend`]'s error without installing anything.
pub async fn update_and_add_backend(
    registry: &PluginRegistry,
    cache: &BackendCache,
    descriptor: &BackendContent,
) -> Result<(), RegisterError> {
    let backend = build_backend(registry, descriptor).await?;
    let name = backend.name.clone();
    cache.store(backend).await;
    update_paired_backends(cache).await;
    info!(backend = %name, "backend registered");
    Ok(())
}

/// Owns the registry/cache/fetcher triple and exposes the public
/// register operations.
pub struct BackendRegister {
    registry: Arc<PluginRegistry>,
    cache: Arc<BackendCache>,
    fetcher: Fetcher,
}

impl BackendRegister {
    #[must_use]
    pub fn new(registry: Arc<PluginRegistry>, cache: Arc<BackendCache>, fetcher: Fetcher) -> Self {
        Self { registry, cache, fetcher }
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<BackendCache> {
        &self.cache
    }

    /// Full reconcile: register every online+capable descriptor, then
    /// evict any cached backend whose descriptor disappeared or went
    /// offline. Per-descriptor construction failures are logged and
    /// skipped rather than aborting the whole pass.
    pub async fn fetch_and_register_all_backend(&self) -> Result<(), RegisterError> {
        let descriptors = self.fetcher.list_syncable().await?;
        let mut seen = std::collections::HashSet::new();
        for descriptor in &descriptors {
            seen.insert(descriptor.name.clone());
            if let Err(e) = update_and_add_backend(&self.registry, &self.cache, descriptor).await {
                warn!(backend = %descriptor.name, error = %e, "skipping backend during reconcile");
            }
        }
        self.check_consistency(&seen).await;
        Ok(())
    }

    /// Evicts any cached backend absent from `still_syncable`.
    async fn check_consistency(&self, still_syncable: &std::collections::HashSet<String>) {
        for backend in self.cache.list().await {
            if !still_syncable.contains(&backend.name) {
                self.cache.delete(&backend.name).await;
            }
        }
    }

    /// Single-descriptor fetch then upsert.
    ///
    /// # Errors
    ///
    /// The fetch error, or [`build_backend`]'s construction error.
    pub async fn fetch_and_register_one_backend(&self, name: &str, check_online: bool) -> Result<Backend, RegisterError> {
        let descriptor = self.fetcher.get_one(name, check_online).await?;
        update_and_add_backend(&self.registry, &self.cache, &descriptor).await?;
        self.cache
            .load(name)
            .await
            .ok_or_else(|| RegisterError::NotFound(name.to_owned()))
    }

    /// Cache-first read; fetches and registers on a miss.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::fetch_and_register_one_backend`]'s error.
    pub async fn load_or_register_one_backend(&self, name: &str) -> Result<Backend, RegisterError> {
        if let Some(backend) = self.cache.load(name).await {
            return Ok(backend);
        }
        self.fetch_and_register_one_backend(name, false).await
    }

    /// Cache-first read, but rebuilds if the cached `content_name` differs
    /// from `content_name`, handling descriptor rotation.
    ///
    /// # Errors
    ///
    /// Propagates the underlying fetch/construction error.
    pub async fn load_or_rebuild_one_backend(&self, name: &str, content_name: &str) -> Result<Backend, RegisterError> {
        if let Some(backend) = self.cache.load(name).await {
            if backend.content_name == content_name {
                return Ok(backend);
            }
            self.cache.delete(name).await;
        }
        self.fetch_and_register_one_backend(name, false).await
    }

    /// Upsert from an explicit descriptor, the event-driven path.
    ///
    /// # Errors
    ///
    /// [`build_backend`]'s construction error.
    pub async fn update_or_register_one_backend(&self, descriptor: &BackendContent) -> Result<(), RegisterError> {
        update_and_add_backend(&self.registry, &self.cache, descriptor).await
    }

    /// Explicit eviction.
    pub async fn remove_registered_one_backend(&self, name: &str) -> Option<Backend> {
        self.cache.delete(name).await
    }

    /// Applies one `(backendName, online)` event: flips `Backend.available`
    /// in place without rebuilding pools, re-running plugin init, or
    /// touching pairing links. A no-op if `name` isn't cached — the event's
    /// source may be racing an eviction.
    pub async fn handle_availability_event(&self, name: &str, online: bool) {
        if let Err(e) = self.cache.set_available(name, online).await {
            warn!(backend = %name, online, error = %e, "dropped availability event for unknown backend");
        }
    }

    /// The subscription handler: drains `events` and applies each one via
    /// [`Self::handle_availability_event`] until the channel closes. The
    /// publishing side is whatever produces `(backendName, online)` pairs —
    /// today a liveness-probe worker, potentially a future cluster watch.
    pub async fn run_status_subscriber(&self, mut events: tokio::sync::mpsc::UnboundedReceiver<(String, bool)>) {
        while let Some((name, online)) = events.recv().await {
            self.handle_availability_event(&name, online).await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fetch::{PoolContent, StaticContentSource};
    use hcsi_plugin::mock::MockPlugin;
    use std::sync::Arc;

    fn registry_with_mock(family: &str) -> Arc<PluginRegistry> {
        let registry = PluginRegistry::new();
        let family = family.to_owned();
        registry.register(
            family.clone(),
            Arc::new(move || -> Arc<dyn hcsi_plugin::Plugin> { Arc::new(MockPlugin::new(family.clone())) }),
        );
        Arc::new(registry)
    }

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
            supported_topologies: serde_json::Value::Null,
            pools: vec![PoolContent {
                name: "p1".to_owned(),
                capacities: HashMap::new(),
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn build_backend_rejects_unknown_family() {
        let registry = PluginRegistry::new();
        let err = build_backend(&registry, &descriptor("b1")).await.unwrap_err();
        assert!(matches!(err, RegisterError::UnknownFamily(_)));
    }

    #[tokio::test]
    async fn build_backend_rejects_half_configured_metro() {
        let registry = registry_with_mock("oceanstor-san");
        let mut d = descriptor("b1");
        d.metro_domain = "dom".to_owned();
        let err = build_backend(&registry, &d).await.unwrap_err();
        assert!(matches!(err, RegisterError::HalfConfiguredMetro(_)));
    }

    #[tokio::test]
    async fn build_backend_appends_protocol_topology() {
        let registry = registry_with_mock("oceanstor-san");
        let backend = build_backend(&registry, &descriptor("b1")).await.unwrap();
        assert!(backend
            .supported_topologies
            .iter()
            .any(|t| t.keys().any(|k| k.starts_with(TOPOLOGY_PROTOCOL_PREFIX))));
    }

    #[tokio::test]
    async fn fetch_and_register_all_evicts_disappeared_descriptor() {
        let registry = registry_with_mock("oceanstor-san");
        let cache = Arc::new(BackendCache::new());
        let source = Arc::new(StaticContentSource::new(vec![descriptor("b1")]));
        let register = BackendRegister::new(registry, cache.clone(), Fetcher::new(source.clone()));

        register.fetch_and_register_all_backend().await.unwrap();
        assert!(cache.load("b1").await.is_some());

        source.remove("b1").await;
        register.fetch_and_register_all_backend().await.unwrap();
        assert!(cache.load("b1").await.is_none());
    }

    #[tokio::test]
    async fn load_or_rebuild_reconstructs_on_content_name_change() {
        let registry = registry_with_mock("oceanstor-san");
        let cache = Arc::new(BackendCache::new());
        let source = Arc::new(StaticContentSource::new(vec![descriptor("b1")]));
        let register = BackendRegister::new(registry, cache.clone(), Fetcher::new(source.clone()));

        register.fetch_and_register_all_backend().await.unwrap();

        let mut updated = descriptor("b1");
        updated.content_name = "v2".to_owned();
        source.put(updated).await;

        let rebuilt = register.load_or_rebuild_one_backend("b1", "v2").await.unwrap();
        assert_eq!(rebuilt.content_name, "v2");
    }

    #[tokio::test]
    async fn metro_pairing_wires_both_plugins() {
        let registry = registry_with_mock("oceanstor-san");
        let cache = Arc::new(BackendCache::new());

        let mut a = descriptor("sanL");
        a.metro_domain = "D".to_owned();
        a.metro_backend_name = "sanR".to_owned();
        let mut b = descriptor("sanR");
        b.metro_domain = "D".to_owned();
        b.metro_backend_name = "sanL".to_owned();

        let source = Arc::new(StaticContentSource::new(vec![a, b]));
        let register = BackendRegister::new(registry, cache.clone(), Fetcher::new(source));
        register.fetch_and_register_all_backend().await.unwrap();

        let backend_a = cache.load("sanL").await.unwrap();
        let backend_b = cache.load("sanR").await.unwrap();
        assert!(backend_a.is_metro_sibling_of(&backend_b));
    }

    #[tokio::test]
    async fn status_subscriber_flips_availability_without_rebuild() {
        let registry = registry_with_mock("oceanstor-san");
        let cache = Arc::new(BackendCache::new());
        let source = Arc::new(StaticContentSource::new(vec![descriptor("b1")]));
        let register = Arc::new(BackendRegister::new(registry, cache.clone(), Fetcher::new(source)));
        register.fetch_and_register_all_backend().await.unwrap();
        assert!(cache.load("b1").await.unwrap().available);

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let subscriber = tokio::spawn({
            let register = Arc::clone(&register);
            async move { register.run_status_subscriber(rx).await }
        });

        tx.send(("b1".to_owned(), false)).unwrap();
        drop(tx);
        subscriber.await.unwrap();

        assert!(!cache.load("b1").await.unwrap().available);
    }

    #[tokio::test]
    async fn handle_availability_event_ignores_unknown_backend() {
        let registry = registry_with_mock("oceanstor-san");
        let cache = Arc::new(BackendCache::new());
        let source = Arc::new(StaticContentSource::new(Vec::new()));
        let register = BackendRegister::new(registry, cache.clone(), Fetcher::new(source));

        register.handle_availability_event("ghost", false).await;
        assert!(cache.load("ghost").await.is_none());
    }
}
