//! Storage-family plugin contract for `hcsi`.
//!
//! This crate defines the [`Plugin`] trait — the uniform capability set
//! every storage family (block SAN, file NAS, directory-tree, and the
//! distributed/fusion family) must implement so the orchestration engine
//! in `hcsi-engine` can drive any of them identically. It knows nothing
//! about filter pipelines, topology, or pairing — those live above this
//! layer in `hcsi-engine`.
//!
//! Two things are provided beyond the trait itself:
//!
//! - [`registry::PluginRegistry`] — a process-wide mapping from a storage
//!   family tag to a factory that produces an uninitialized plugin.
//! - [`mock::MockPlugin`] — an in-memory implementation used by
//!   `hcsi-engine`'s and `hcsi-server`'s tests, playing the same role a
//!   fake array would play without needing real array credentials.

pub mod error;
pub mod families;
pub mod mock;
pub mod registry;

use std::collections::HashMap;
use std::sync::Arc;

pub use error::PluginError;

/// A volume (LUN, filesystem, or dtree) as reported by a plugin.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Volume {
    /// Array-side identifier, opaque to the engine.
    pub id: String,
    /// The name the engine asked for (or discovered by, for `QueryVolume`).
    pub name: String,
    /// Actual provisioned size in bytes (may be rounded up to sector size).
    pub size_bytes: i64,
    /// Name of the pool the volume was placed in.
    pub pool: String,
    /// Family-specific attributes the caller may need downstream (e.g.
    /// WWN for a LUN, export path for a filesystem).
    pub attributes: HashMap<String, String>,
}

/// The direction of a `ModifyVolume` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyType {
    /// Turn a local-only volume into a hyper-metro pair.
    LocalToHyperMetro,
    /// Tear down a hyper-metro pair back to a local-only volume.
    HyperMetroToLocal,
}

/// A metro-capable NAS plugin's floating-logical-port identity, used to
/// detect a failover to the non-owning site before any array mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteStatus {
    /// Wwn of the logical interface currently serving requests.
    pub current_lif_wwn: String,
    /// Wwn of the site this backend is configured to own.
    pub current_site_wwn: String,
}

impl SiteStatus {
    /// Whether the logical port is on its own site: both wwns equal, or
    /// both empty (single-controller topology has no failover to detect).
    #[must_use]
    pub fn on_own_site(&self) -> bool {
        self.current_lif_wwn == self.current_site_wwn
    }
}

/// A storage-family plugin.
///
/// Implementations must be safe to share across async tasks behind an
/// `Arc<dyn Plugin>`: every method takes `&self`, so any session state
/// (an open management connection, a credential refresh timestamp) must
/// live behind interior mutability owned by the implementation.
#[async_trait::async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Validate `config`/`parameters` and, if `keep_login` is true, leave
    /// a management session open for subsequent calls. If `keep_login` is
    /// false, the plugin must log out again before returning.
    async fn init(
        &self,
        config: serde_json::Value,
        parameters: &HashMap<String, String>,
        keep_login: bool,
    ) -> Result<(), PluginError>;

    /// Dry-run login against `config` without installing any session
    /// state — used to validate credentials before registering a backend.
    async fn validate(&self, config: serde_json::Value) -> Result<(), PluginError>;

    /// Release any open management session. Idempotent — calling this on
    /// an already-logged-out plugin is not an error.
    async fn logout(&self);

    /// Refresh the management session after a credential change.
    async fn re_login(&self) -> Result<(), PluginError>;

    async fn create_volume(
        &self,
        name: &str,
        parameters: &HashMap<String, String>,
    ) -> Result<Volume, PluginError>;

    async fn query_volume(
        &self,
        name: &str,
        parameters: &HashMap<String, String>,
    ) -> Result<Volume, PluginError>;

    async fn delete_volume(&self, name: &str) -> Result<(), PluginError>;

    /// Expand a volume to `new_size_bytes`. Returns whether the node side
    /// must also perform a filesystem-level expand (true for a
    /// filesystem-mode block LUN; false for a NAS export, which expands
    /// transparently).
    async fn expand_volume(
        &self,
        name: &str,
        new_size_bytes: i64,
    ) -> Result<bool, PluginError>;

    /// Create a snapshot of `parent` named `name`. Returns family-specific
    /// metadata about the created snapshot.
    async fn create_snapshot(
        &self,
        parent: &str,
        name: &str,
    ) -> Result<HashMap<String, serde_json::Value>, PluginError>;

    /// Delete a snapshot. Families that don't support snapshots return
    /// [`PluginError::Unsupported`].
    async fn delete_snapshot(&self, parent: &str, name: &str) -> Result<(), PluginError>;

    /// Move a volume between local-only and hyper-metro topology.
    async fn modify_volume(
        &self,
        id: &str,
        modify_type: ModifyType,
        parameters: &HashMap<String, String>,
    ) -> Result<(), PluginError>;

    /// Current boolean capability set and string-valued specifications
    /// (vendor WWN, consistent-snapshot limits, ...) for the backend as a
    /// whole.
    async fn update_backend_capabilities(
        &self,
    ) -> Result<(HashMap<String, bool>, HashMap<String, String>), PluginError>;

    /// Current capacity figures (in bytes) for each named pool.
    async fn update_pool_capabilities(
        &self,
        pool_names: &[String],
    ) -> Result<HashMap<String, HashMap<String, i64>>, PluginError>;

    /// Family-specific validation of a QoS parameter JSON blob.
    async fn support_qos_parameters(&self, qos_json: &str) -> Result<(), PluginError>;

    /// Byte granularity this family rounds capacity to.
    fn sector_size(&self) -> i64;

    /// Receive a reference to the plugin of the paired hyper-metro or
    /// replication sibling backend, once pairing has been resolved.
    async fn update_metro_remote_plugin(&self, other: Arc<dyn Plugin>);

    /// Current floating-logical-port identity, for the metro-NAS site
    /// guard rail. Families without a floating port (anything that isn't
    /// metro-capable NAS) never need to override this: the default
    /// reports a single-controller topology, which always passes the
    /// guard.
    async fn site_status(&self) -> Result<SiteStatus, PluginError> {
        Ok(SiteStatus::default())
    }
}
