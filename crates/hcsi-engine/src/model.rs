//! Capability/capacity model: [`Backend`] and [`StoragePool`].
//!
//! A pool carries only its parent backend's *name*, never a plugin
//! reference, and a backend never stores its hyper-metro/replication
//! sibling as a field — both are resolved on demand against
//! [`crate::cache::BackendCache`] so that a pool is never dereferenced
//! without consulting the cache for its parent backend first; that's a
//! structural property rather than a convention callers must remember.

use std::collections::HashMap;
use std::sync::Arc;

use hcsi_plugin::Plugin;

/// Well-known capability keys reported by `update_backend_capabilities`/
/// `update_pool_capabilities`.
pub mod capability {
    pub const SUPPORT_THIN: &str = "SupportThin";
    pub const SUPPORT_THICK: &str = "SupportThick";
    pub const SUPPORT_QOS: &str = "SupportQoS";
    pub const SUPPORT_METRO: &str = "SupportMetro";
    pub const SUPPORT_REPLICATION: &str = "SupportReplication";
    pub const SUPPORT_CLONE: &str = "SupportClone";
    pub const SUPPORT_APPLICATION_TYPE: &str = "SupportApplicationType";
    pub const SUPPORT_QUOTA: &str = "SupportQuota";
    pub const SUPPORT_NFS3: &str = "SupportNFS3";
    pub const SUPPORT_NFS4: &str = "SupportNFS4";
    pub const SUPPORT_NFS41: &str = "SupportNFS41";
    pub const SUPPORT_NFS42: &str = "SupportNFS42";
    pub const SUPPORT_CONSISTENT_SNAPSHOT: &str = "SupportConsistentSnapshot";
    pub const SUPPORT_METRO_NAS: &str = "SupportMetroNAS";
}

/// Well-known capacity keys, values in bytes.
pub mod capacity {
    pub const FREE_CAPACITY: &str = "FreeCapacity";
    pub const TOTAL_CAPACITY: &str = "TotalCapacity";
    pub const USED_CAPACITY: &str = "UsedCapacity";
}

/// The topology protocol-key prefix the registrar appends after plugin
/// init.
pub const TOPOLOGY_PROTOCOL_PREFIX: &str = "topology.kubernetes.io/protocol.";

/// One logical capacity region on one array.
#[derive(Debug, Clone)]
pub struct StoragePool {
    /// Unique within its parent backend.
    pub name: String,
    /// Owning backend's name — never a direct plugin reference.
    pub parent: String,
    /// Family tag, duplicated from the parent for filter convenience.
    pub storage: String,
    pub capabilities: HashMap<String, bool>,
    pub capacities: HashMap<String, i64>,
}

impl StoragePool {
    #[must_use]
    pub fn new(name: impl Into<String>, parent: impl Into<String>, storage: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: parent.into(),
            storage: storage.into(),
            capabilities: HashMap::new(),
            capacities: HashMap::new(),
        }
    }

    #[must_use]
    pub fn has_capability(&self, key: &str) -> bool {
        self.capabilities.get(key).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn free_capacity(&self) -> i64 {
        self.capacities.get(capacity::FREE_CAPACITY).copied().unwrap_or(0)
    }
}

/// One configured storage array, or one vStore on it.
#[derive(Clone)]
pub struct Backend {
    pub name: String,
    pub storage: String,
    pub available: bool,
    /// Descriptor generation identity, used to decide whether a cached
    /// backend must be rebuilt rather than reused in place.
    pub content_name: String,
    pub plugin: Arc<dyn Plugin>,
    pub pools: Vec<StoragePool>,
    pub parameters: HashMap<String, String>,
    /// Ordered list of `{key: value}` topology maps this backend declares
    /// support for (including the protocol entries the registrar appends).
    pub supported_topologies: Vec<HashMap<String, String>>,
    pub account_name: String,
    pub metro_domain: String,
    pub metro_vstore_pair_id: String,
    pub metro_backend_name: String,
    pub replica_backend_name: String,
}

impl Backend {
    #[must_use]
    pub fn pool(&self, name: &str) -> Option<&StoragePool> {
        self.pools.iter().find(|p| p.name == name)
    }

    #[must_use]
    pub fn pool_mut(&mut self, name: &str) -> Option<&mut StoragePool> {
        self.pools.iter_mut().find(|p| p.name == name)
    }

    /// Whether this backend declares hyper-metro pairing hints at all.
    #[must_use]
    pub fn has_metro_hints(&self) -> bool {
        !self.metro_backend_name.is_empty()
    }

    /// Whether this backend declares replication pairing hints.
    #[must_use]
    pub fn has_replica_hints(&self) -> bool {
        !self.replica_backend_name.is_empty()
    }

    /// Whether any pool on this backend advertises metro-capable NAS, the
    /// condition that triggers the provisioning router's site guard rail.
    #[must_use]
    pub fn supports_metro_nas(&self) -> bool {
        self.pools.iter().any(|p| p.has_capability(capability::SUPPORT_METRO_NAS))
    }

    /// Whether `other` is this backend's hyper-metro sibling: same family,
    /// `other` names `self` back, and they share a non-empty `metroDomain`
    /// or `metrovStorePairID`.
    #[must_use]
    pub fn is_metro_sibling_of(&self, other: &Backend) -> bool {
        self.storage == other.storage
            && other.metro_backend_name == self.name
            && self.metro_backend_name == other.name
            && ((!self.metro_domain.is_empty() && self.metro_domain == other.metro_domain)
                || (!self.metro_vstore_pair_id.is_empty()
                    && self.metro_vstore_pair_id == other.metro_vstore_pair_id))
    }

    /// Whether `other` is this backend's replication sibling.
    #[must_use]
    pub fn is_replica_sibling_of(&self, other: &Backend) -> bool {
        self.storage == other.storage
            && other.replica_backend_name == self.name
            && self.replica_backend_name == other.name
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("name", &self.name)
            .field("storage", &self.storage)
            .field("available", &self.available)
            .field("content_name", &self.content_name)
            .field("pools", &self.pools.iter().map(|p| &p.name).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// `{local, remote?}` produced by the selector (C7). `remote` is `None`
/// when the request is neither metro nor replication.
#[derive(Debug, Clone)]
pub struct StorageBackendTuple {
    pub local: StoragePool,
    pub remote: Option<StoragePool>,
}
