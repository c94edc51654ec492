//! Error types for `hcsi-engine`.
//!
//! Each enum corresponds to one layer of the orchestration pipeline.
//! `From` conversions let the higher-level errors (`SelectError`,
//! `RouterError`) wrap the lower-level ones without losing the original
//! variant, layering each stage's error under the ones above it.

use std::collections::HashMap;

use hcsi_plugin::PluginError;

/// Failures while parsing or storing a backend descriptor during
/// construction. Fatal at register: the descriptor is skipped and
/// reconciliation continues for the rest.
#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("unknown storage family '{0}'")]
    UnknownFamily(String),

    #[error("backend '{0}' has no parameters map")]
    MissingParameters(String),

    #[error("backend '{0}' has a malformed supportedTopologies: {1}")]
    MalformedTopologies(String, String),

    #[error("backend '{0}' has incorrect hyperMetro configuration: metroDomain/metrovStorePairID and metroBackendName must both be set or both be absent")]
    HalfConfiguredMetro(String),

    #[error("backend '{0}' resolved to an empty pool list")]
    EmptyPools(String),

    #[error("plugin init failed for backend '{0}': {1}")]
    PluginInit(String, #[source] PluginError),

    #[error("descriptor fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("backend '{0}' not found")]
    NotFound(String),
}

/// Failures reading the orchestrator's descriptor list (C4).
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("content source error: {0}")]
    Source(String),

    #[error("descriptor '{0}' not found")]
    NotFound(String),
}

/// Failures mutating the backend cache (C2).
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("backend '{0}' not found in cache")]
    NotFound(String),

    #[error("pool '{1}' not found on backend '{0}'")]
    PoolNotFound(String, String),
}

/// Selection-no-match and pairing failures from the filter/weight pipeline
/// and selector (C6/C7).
#[derive(Debug, thiserror::Error)]
pub enum SelectError {
    /// Surfaced with the final filter's name, the last parameter value,
    /// and the parameter map; triggers one retry after a full reconcile.
    #[error("no available pool after filter '{filter}' (value '{value}'); parameters: {parameters:?}")]
    NoAvailablePool {
        filter: String,
        value: String,
        parameters: HashMap<String, String>,
    },

    #[error("hyperMetro and replication are mutually exclusive")]
    MutuallyExclusiveTopology,

    #[error("pairing absent: {0}")]
    PairingAbsent(String),

    #[error("invalid storageQuota parameter: {0}")]
    InvalidQuota(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("qos rejected on {rejections} pool(s): {reasons}")]
    QosRejected { rejections: usize, reasons: String },

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("register error: {0}")]
    Register(#[from] RegisterError),

    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("operation cancelled")]
    Cancelled,
}

/// Failures from the provisioning router (C9), wrapping the lower layers
/// plus ID parsing and the metro-NAS site guard rail.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("malformed volume id '{0}'")]
    MalformedVolumeId(String),

    #[error("malformed snapshot id '{0}'")]
    MalformedSnapshotId(String),

    #[error("access mode MULTI_NODE_MULTI_WRITER is not supported for a filesystem-mode block LUN")]
    UnsupportedAccessMode,

    #[error("volume is read-only (MULTI_NODE_READER_ONLY); expand is not permitted")]
    ExpandDisabledByAccessMode,

    #[error("logical port has failed over to the non-owning site; refusing to mutate the array")]
    SiteMismatch,

    #[error(transparent)]
    Select(#[from] SelectError),

    #[error(transparent)]
    Register(#[from] RegisterError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Plugin(#[from] PluginError),
}
