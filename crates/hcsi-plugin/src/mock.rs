//! An in-memory [`Plugin`] used by `hcsi-engine`'s and `hcsi-server`'s
//! tests: no real array, fully deterministic, and introspectable from
//! test code.
//!
//! State lives behind a plain [`std::sync::Mutex`], not a `tokio` lock —
//! every operation here is in-memory bookkeeping with no `.await` points,
//! so there is nothing to hold the lock across.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::{ModifyType, Plugin, PluginError, SiteStatus, Volume};

/// Builder-configured in-memory plugin.
pub struct MockPlugin {
    name: String,
    state: Mutex<State>,
}

struct State {
    logged_in: bool,
    capabilities: HashMap<String, bool>,
    specifications: HashMap<String, String>,
    pool_capacities: HashMap<String, HashMap<String, i64>>,
    volumes: HashMap<String, Volume>,
    snapshots: HashMap<String, HashMap<String, serde_json::Value>>,
    reject_qos: bool,
    sector_size: i64,
    remote: Option<Arc<dyn Plugin>>,
    site_status: SiteStatus,
}

impl MockPlugin {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(State {
                logged_in: false,
                capabilities: HashMap::new(),
                specifications: HashMap::new(),
                pool_capacities: HashMap::new(),
                volumes: HashMap::new(),
                snapshots: HashMap::new(),
                reject_qos: false,
                sector_size: 512,
                remote: None,
                site_status: SiteStatus::default(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set one capability flag reported by `update_backend_capabilities`.
    #[must_use]
    pub fn with_capability(self, key: impl Into<String>, value: bool) -> Self {
        self.lock().capabilities.insert(key.into(), value);
        self
    }

    /// Set the free/total/used capacity map reported for `pool`.
    #[must_use]
    pub fn with_pool_capacity(self, pool: impl Into<String>, capacities: HashMap<String, i64>) -> Self {
        self.lock().pool_capacities.insert(pool.into(), capacities);
        self
    }

    /// Make `support_qos_parameters` reject every request.
    #[must_use]
    pub fn rejecting_qos(self) -> Self {
        self.lock().reject_qos = true;
        self
    }

    #[must_use]
    pub fn with_sector_size(self, bytes: i64) -> Self {
        self.lock().sector_size = bytes;
        self
    }

    /// Simulate the floating logical port having failed over to the
    /// non-owning site.
    #[must_use]
    pub fn with_site_mismatch(self) -> Self {
        self.lock().site_status = SiteStatus {
            current_lif_wwn: "wwn-failed-over".to_owned(),
            current_site_wwn: "wwn-home".to_owned(),
        };
        self
    }

    /// Whether `init`/`re_login` has left a session open.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.lock().logged_in
    }

    /// Whether a sibling plugin was ever received via
    /// `update_metro_remote_plugin`.
    #[must_use]
    pub fn has_remote(&self) -> bool {
        self.lock().remote.is_some()
    }
}

#[async_trait::async_trait]
impl Plugin for MockPlugin {
    async fn init(
        &self,
        _config: serde_json::Value,
        _parameters: &HashMap<String, String>,
        keep_login: bool,
    ) -> Result<(), PluginError> {
        self.lock().logged_in = keep_login;
        Ok(())
    }

    async fn validate(&self, _config: serde_json::Value) -> Result<(), PluginError> {
        Ok(())
    }

    async fn logout(&self) {
        self.lock().logged_in = false;
    }

    async fn re_login(&self) -> Result<(), PluginError> {
        self.lock().logged_in = true;
        Ok(())
    }

    async fn create_volume(
        &self,
        name: &str,
        parameters: &HashMap<String, String>,
    ) -> Result<Volume, PluginError> {
        let pool = parameters.get("storagepool").cloned().unwrap_or_default();
        let size_bytes = parameters
            .get("size")
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(0);
        let volume = Volume {
            id: format!("{}-{name}", self.name),
            name: name.to_owned(),
            size_bytes,
            pool,
            attributes: HashMap::new(),
        };
        self.lock().volumes.insert(name.to_owned(), volume.clone());
        Ok(volume)
    }

    async fn query_volume(
        &self,
        name: &str,
        _parameters: &HashMap<String, String>,
    ) -> Result<Volume, PluginError> {
        self.lock()
            .volumes
            .get(name)
            .cloned()
            .ok_or_else(|| PluginError::NotFound {
                backend: self.name.clone(),
                resource: name.to_owned(),
            })
    }

    async fn delete_volume(&self, name: &str) -> Result<(), PluginError> {
        self.lock().volumes.remove(name);
        Ok(())
    }

    async fn expand_volume(&self, name: &str, new_size_bytes: i64) -> Result<bool, PluginError> {
        let mut state = self.lock();
        let volume = state
            .volumes
            .get_mut(name)
            .ok_or_else(|| PluginError::NotFound {
                backend: self.name.clone(),
                resource: name.to_owned(),
            })?;
        volume.size_bytes = new_size_bytes;
        Ok(volume.attributes.get("fsType").is_some())
    }

    async fn create_snapshot(
        &self,
        parent: &str,
        name: &str,
    ) -> Result<HashMap<String, serde_json::Value>, PluginError> {
        let key = format!("{parent}.{name}");
        let mut meta = HashMap::new();
        meta.insert("parent".to_owned(), serde_json::Value::String(parent.to_owned()));
        meta.insert("name".to_owned(), serde_json::Value::String(name.to_owned()));
        self.lock().snapshots.insert(key, meta.clone());
        Ok(meta)
    }

    async fn delete_snapshot(&self, parent: &str, name: &str) -> Result<(), PluginError> {
        self.lock().snapshots.remove(&format!("{parent}.{name}"));
        Ok(())
    }

    async fn modify_volume(
        &self,
        id: &str,
        _modify_type: ModifyType,
        _parameters: &HashMap<String, String>,
    ) -> Result<(), PluginError> {
        if self.lock().volumes.values().any(|v| v.id == id) {
            Ok(())
        } else {
            Err(PluginError::NotFound {
                backend: self.name.clone(),
                resource: id.to_owned(),
            })
        }
    }

    async fn update_backend_capabilities(
        &self,
    ) -> Result<(HashMap<String, bool>, HashMap<String, String>), PluginError> {
        let state = self.lock();
        Ok((state.capabilities.clone(), state.specifications.clone()))
    }

    async fn update_pool_capabilities(
        &self,
        pool_names: &[String],
    ) -> Result<HashMap<String, HashMap<String, i64>>, PluginError> {
        let state = self.lock();
        Ok(pool_names
            .iter()
            .filter_map(|name| state.pool_capacities.get(name).map(|c| (name.clone(), c.clone())))
            .collect())
    }

    async fn support_qos_parameters(&self, qos_json: &str) -> Result<(), PluginError> {
        if self.lock().reject_qos {
            return Err(PluginError::Permanent {
                backend: self.name.clone(),
                reason: "qos rejected by mock plugin".to_owned(),
            });
        }
        serde_json::from_str::<serde_json::Value>(qos_json).map_err(|e| PluginError::Permanent {
            backend: self.name.clone(),
            reason: format!("invalid qos json: {e}"),
        })?;
        Ok(())
    }

    fn sector_size(&self) -> i64 {
        self.lock().sector_size
    }

    async fn update_metro_remote_plugin(&self, other: Arc<dyn Plugin>) {
        self.lock().remote = Some(other);
    }

    async fn site_status(&self) -> Result<SiteStatus, PluginError> {
        Ok(self.lock().site_status.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_query_round_trips() {
        let plugin = MockPlugin::new("b1");
        let mut params = HashMap::new();
        params.insert("storagepool".to_owned(), "p1".to_owned());
        params.insert("size".to_owned(), "1024".to_owned());
        let created = plugin.create_volume("v1", &params).await.unwrap();
        let queried = plugin.query_volume("v1", &params).await.unwrap();
        assert_eq!(created, queried);
    }

    #[tokio::test]
    async fn query_missing_volume_is_not_found() {
        let plugin = MockPlugin::new("b1");
        let err = plugin.query_volume("missing", &HashMap::new()).await.unwrap_err();
        assert!(matches!(err, PluginError::NotFound { .. }));
    }

    #[tokio::test]
    async fn rejecting_qos_fails_every_request() {
        let plugin = MockPlugin::new("b1").rejecting_qos();
        let err = plugin.support_qos_parameters("{}").await.unwrap_err();
        assert!(matches!(err, PluginError::Permanent { .. }));
    }
}
