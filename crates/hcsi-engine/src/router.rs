//! Provisioning router (C9): maps a CSI-level operation onto the plugin
//! of the backend named by a parsed volume/snapshot ID, enforcing the
//! paired-backend guards the selector and register don't see.

use std::collections::HashMap;

use hcsi_plugin::{ModifyType, Volume};

use crate::cache::BackendCache;
use crate::error::RouterError;
use crate::ids::{SnapshotId, VolumeId};
use crate::model::Backend;
use crate::params::ParamBag;
use crate::register::BackendRegister;
use crate::selector::BackendSelector;
use crate::topology::AccessibleTopology;

/// The access mode a CSI volume capability carries, reduced to the two
/// values the router treats specially.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    MultiNodeMultiWriter,
    MultiNodeReaderOnly,
    Other,
}

/// Before any create/delete/expand/snapshot on a metro-capable NAS
/// backend with no metro sibling currently wired up, verify the floating
/// logical port hasn't silently failed over to the non-owning site.
/// Skipped when a sibling is active: pairing dispatch handles that case.
async fn guard_site(cache: &BackendCache, backend: &Backend) -> Result<(), RouterError> {
    if !backend.supports_metro_nas() {
        return Ok(());
    }
    if cache.metro_sibling(backend).await.is_some() {
        return Ok(());
    }
    let status = backend.plugin.site_status().await?;
    if !status.on_own_site() {
        return Err(RouterError::SiteMismatch);
    }
    Ok(())
}

fn filesystem_mode_block_lun(params: &HashMap<String, String>) -> bool {
    params.get("volumeType").map(String::as_str) == Some("lun")
        && params.get("fsType").is_some_and(|v| !v.is_empty())
}

pub struct ProvisioningRouter<'a> {
    cache: &'a BackendCache,
    register: &'a BackendRegister,
}

impl<'a> ProvisioningRouter<'a> {
    #[must_use]
    pub fn new(cache: &'a BackendCache, register: &'a BackendRegister) -> Self {
        Self { cache, register }
    }

    async fn load_backend(&self, name: &str) -> Result<Backend, RouterError> {
        Ok(self.register.load_or_register_one_backend(name).await?)
    }

    /// `CreateVolume`: selects a pool pair via C7, then invokes the local
    /// plugin with the merged (and selector-stamped) parameter map.
    ///
    /// # Errors
    ///
    /// [`RouterError::UnsupportedAccessMode`] for `MULTI_NODE_MULTI_WRITER`
    /// on a filesystem-mode block LUN; selection/registration errors;
    /// [`RouterError::SiteMismatch`] from the metro-NAS guard; the local
    /// plugin's own create error.
    pub async fn create_volume(
        &self,
        name: &str,
        size_bytes: i64,
        params: &mut HashMap<String, String>,
        topology: &AccessibleTopology,
        access_modes: &[AccessMode],
    ) -> Result<Volume, RouterError> {
        if filesystem_mode_block_lun(params) && access_modes.contains(&AccessMode::MultiNodeMultiWriter) {
            return Err(RouterError::UnsupportedAccessMode);
        }

        let selector = BackendSelector::new(self.cache, self.register);
        let pair = selector.select_pool_pair(size_bytes, params, topology).await?;

        let backend = self
            .cache
            .load(&pair.local.parent)
            .await
            .ok_or_else(|| RouterError::Select(crate::error::SelectError::Cache(crate::error::CacheError::NotFound(pair.local.parent.clone()))))?;

        guard_site(self.cache, &backend).await?;

        let volume = backend.plugin.create_volume(name, params).await?;
        Ok(volume)
    }

    /// `DeleteVolume`.
    ///
    /// # Errors
    ///
    /// [`RouterError::MalformedVolumeId`]; registration/guard/plugin
    /// errors.
    pub async fn delete_volume(&self, id: &str) -> Result<(), RouterError> {
        let id: VolumeId = id.parse()?;
        let backend = self.load_backend(&id.backend).await?;
        guard_site(self.cache, &backend).await?;
        backend.plugin.delete_volume(&id.volume).await?;
        Ok(())
    }

    /// `ExpandVolume`. Returns whether the node side must also run a
    /// filesystem-level expand.
    ///
    /// # Errors
    ///
    /// [`RouterError::ExpandDisabledByAccessMode`] for
    /// `MULTI_NODE_READER_ONLY`; otherwise as [`Self::delete_volume`].
    pub async fn expand_volume(&self, id: &str, new_size_bytes: i64, access_modes: &[AccessMode]) -> Result<bool, RouterError> {
        if access_modes.contains(&AccessMode::MultiNodeReaderOnly) {
            return Err(RouterError::ExpandDisabledByAccessMode);
        }
        let id: VolumeId = id.parse()?;
        let backend = self.load_backend(&id.backend).await?;
        guard_site(self.cache, &backend).await?;
        let node_expand_needed = backend.plugin.expand_volume(&id.volume, new_size_bytes).await?;
        Ok(node_expand_needed)
    }

    /// `CreateSnapshot`. `parent_volume_id` is a volume ID, not a
    /// snapshot ID: the parent must already exist as a volume.
    ///
    /// # Errors
    ///
    /// As [`Self::delete_volume`].
    pub async fn create_snapshot(
        &self,
        parent_volume_id: &str,
        snapshot_name: &str,
    ) -> Result<HashMap<String, serde_json::Value>, RouterError> {
        let parent: VolumeId = parent_volume_id.parse()?;
        let backend = self.load_backend(&parent.backend).await?;
        guard_site(self.cache, &backend).await?;
        let meta = backend.plugin.create_snapshot(&parent.volume, snapshot_name).await?;
        Ok(meta)
    }

    /// `DeleteSnapshot`.
    ///
    /// # Errors
    ///
    /// [`RouterError::MalformedSnapshotId`]; otherwise as
    /// [`Self::delete_volume`].
    pub async fn delete_snapshot(&self, id: &str) -> Result<(), RouterError> {
        let id: SnapshotId = id.parse()?;
        let backend = self.load_backend(&id.backend).await?;
        guard_site(self.cache, &backend).await?;
        backend.plugin.delete_snapshot(&id.parent_volume, &id.snapshot).await?;
        Ok(())
    }

    /// `ModifyVolume`. `hyper_metro` selects the direction: `true` drives
    /// `Local→HyperMetro` (requires an active metro pairing; picks a
    /// remote pool via the secondary chain and stamps `remoteStoragePool`
    /// into `params`); `false` drives `HyperMetro→Local` and deletes the
    /// remote volume.
    ///
    /// # Errors
    ///
    /// [`RouterError::Select`] wrapping [`crate::error::SelectError::PairingAbsent`]
    /// if `hyper_metro` is requested but no sibling is wired; otherwise
    /// registration/plugin errors.
    pub async fn modify_volume(
        &self,
        id: &str,
        hyper_metro: bool,
        params: &mut HashMap<String, String>,
    ) -> Result<(), RouterError> {
        let id: VolumeId = id.parse()?;
        let backend = self.load_backend(&id.backend).await?;
        let volume = backend.plugin.query_volume(&id.volume, params).await?;

        if hyper_metro {
            params.insert("hyperMetro".to_owned(), "true".to_owned());
            let selector = BackendSelector::new(self.cache, self.register);
            let bag = ParamBag::new(params);
            let remote = selector
                .select_remote_pool(volume.size_bytes, &id.backend, &bag)
                .await?
                .ok_or_else(|| crate::error::SelectError::PairingAbsent(id.backend.clone()))?;
            params.insert("remoteStoragePool".to_owned(), remote.pool.name.clone());
            backend.plugin.modify_volume(&volume.id, ModifyType::LocalToHyperMetro, params).await?;
        } else {
            let sibling = self.cache.metro_sibling(&backend).await;
            backend.plugin.modify_volume(&volume.id, ModifyType::HyperMetroToLocal, params).await?;
            if let Some(sibling) = sibling {
                sibling.plugin.delete_volume(&id.volume).await?;
            }
        }
        Ok(())
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
    use std::sync::Arc;

    fn lun_descriptor(name: &str, metro_domain: &str, metro_peer: &str) -> BackendContent {
        let mut parameters = HashMap::new();
        parameters.insert("storagepool".to_owned(), "p1".to_owned());
        BackendContent {
            name: name.to_owned(),
            storage: "oceanstor-san".to_owned(),
            online: true,
            content_name: "v1".to_owned(),
            capabilities: HashMap::from([(capability::SUPPORT_THIN.to_owned(), true)]),
            parameters,
            pools: vec![PoolContent { name: "p1".to_owned(), capacities: HashMap::new() }],
            metro_domain: metro_domain.to_owned(),
            metro_backend_name: metro_peer.to_owned(),
            ..Default::default()
        }
    }

    fn registry_with_capacity(family: &str, capabilities: Vec<(&'static str, bool)>, free: i64) -> Arc<PluginRegistry> {
        let registry = PluginRegistry::new();
        let family = family.to_owned();
        registry.register(
            family.clone(),
            Arc::new(move || -> Arc<dyn hcsi_plugin::Plugin> {
                let mut plugin = MockPlugin::new(family.clone());
                for (k, v) in &capabilities {
                    plugin = plugin.with_capability(*k, *v);
                }
                let mut caps = HashMap::new();
                caps.insert("FreeCapacity".to_owned(), free);
                caps.insert("TotalCapacity".to_owned(), free);
                plugin = plugin.with_pool_capacity("p1", caps);
                Arc::new(plugin)
            }),
        );
        Arc::new(registry)
    }

    #[tokio::test]
    async fn create_volume_rejects_multi_writer_filesystem_block_lun() {
        let registry = registry_with_capacity("oceanstor-san", vec![(capability::SUPPORT_THIN, true)], 10 << 30);
        let cache = Arc::new(BackendCache::new());
        let source = Arc::new(StaticContentSource::new(vec![lun_descriptor("sanA", "", "")]));
        let register = BackendRegister::new(registry, cache.clone(), Fetcher::new(source));
        register.fetch_and_register_all_backend().await.unwrap();

        let router = ProvisioningRouter::new(&cache, &register);
        let mut params = HashMap::new();
        params.insert("volumeType".to_owned(), "lun".to_owned());
        params.insert("fsType".to_owned(), "ext4".to_owned());
        params.insert("allocType".to_owned(), "thin".to_owned());

        let err = router
            .create_volume("v1", 1 << 30, &mut params, &AccessibleTopology::default(), &[AccessMode::MultiNodeMultiWriter])
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::UnsupportedAccessMode));
    }

    #[tokio::test]
    async fn expand_disabled_for_read_only_access_mode() {
        let registry = registry_with_capacity("oceanstor-san", vec![(capability::SUPPORT_THIN, true)], 10 << 30);
        let cache = Arc::new(BackendCache::new());
        let source = Arc::new(StaticContentSource::new(vec![lun_descriptor("sanA", "", "")]));
        let register = BackendRegister::new(registry, cache.clone(), Fetcher::new(source));
        register.fetch_and_register_all_backend().await.unwrap();

        let router = ProvisioningRouter::new(&cache, &register);
        let err = router
            .expand_volume("sanA.v1", 2 << 30, &[AccessMode::MultiNodeReaderOnly])
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::ExpandDisabledByAccessMode));
    }

    #[tokio::test]
    async fn hyper_metro_pair_create_wires_both_plugins() {
        let registry = registry_with_capacity("oceanstor-san", vec![(capability::SUPPORT_THIN, true), (capability::SUPPORT_METRO, true)], 10 << 30);
        let cache = Arc::new(BackendCache::new());
        let source = Arc::new(StaticContentSource::new(vec![
            lun_descriptor("sanL", "D", "sanR"),
            lun_descriptor("sanR", "D", "sanL"),
        ]));
        let register = BackendRegister::new(registry, cache.clone(), Fetcher::new(source));
        register.fetch_and_register_all_backend().await.unwrap();

        let router = ProvisioningRouter::new(&cache, &register);
        let mut params = HashMap::new();
        params.insert("volumeType".to_owned(), "lun".to_owned());
        params.insert("allocType".to_owned(), "thin".to_owned());
        params.insert("hyperMetro".to_owned(), "true".to_owned());

        let volume = router
            .create_volume("v1", 1 << 30, &mut params, &AccessibleTopology::default(), &[])
            .await
            .unwrap();
        assert!(!volume.id.is_empty());
        assert_eq!(params.get("remoteStoragePool").map(String::as_str), Some("p1"));
    }

    #[tokio::test]
    async fn delete_volume_rejects_failed_over_site() {
        let registry = PluginRegistry::new();
        registry.register(
            "oceanstor-nas",
            Arc::new(|| -> Arc<dyn hcsi_plugin::Plugin> {
                Arc::new(
                    MockPlugin::new("oceanstor-nas")
                        .with_capability(capability::SUPPORT_METRO_NAS, true)
                        .with_site_mismatch(),
                )
            }),
        );
        let cache = Arc::new(BackendCache::new());
        let mut parameters = HashMap::new();
        parameters.insert("storagepool".to_owned(), "p1".to_owned());
        let descriptor = BackendContent {
            name: "nasA".to_owned(),
            storage: "oceanstor-nas".to_owned(),
            online: true,
            content_name: "v1".to_owned(),
            capabilities: HashMap::from([(capability::SUPPORT_THIN.to_owned(), true)]),
            parameters,
            pools: vec![PoolContent { name: "p1".to_owned(), capacities: HashMap::new() }],
            ..Default::default()
        };
        let source = Arc::new(StaticContentSource::new(vec![descriptor]));
        let register = BackendRegister::new(Arc::new(registry), cache.clone(), Fetcher::new(source));
        register.fetch_and_register_all_backend().await.unwrap();

        let router = ProvisioningRouter::new(&cache, &register);
        let err = router.delete_volume("nasA.v1").await.unwrap_err();
        assert!(matches!(err, RouterError::SiteMismatch));
    }
}
