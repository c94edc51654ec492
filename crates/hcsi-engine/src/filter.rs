//! Filter/weight pipeline (C6): the ordered filter chain.
//!
//! Filters are modeled as data, per the Design Note "Filter chain as
//! data" — a `Vec<Box<dyn Filter>>` built fresh by [`primary_chain`] /
//! [`secondary_chain`] on every call, so new capability filters can be
//! added without touching the selector, and every filter's name is
//! available to report in a `SelectError::NoAvailablePool`.

use std::collections::HashMap;

use hcsi_plugin::Plugin;

use crate::error::SelectError;
use crate::model::{capability, Backend, StoragePool};
use crate::params::ParamBag;

/// One candidate pool together with its parent backend, so filters never
/// need a second cache round-trip mid-pipeline.
#[derive(Debug, Clone)]
pub struct CandidatePool {
    pub backend: Backend,
    pub pool: StoragePool,
}

impl CandidatePool {
    #[must_use]
    pub fn has_capability(&self, key: &str) -> bool {
        self.pool.has_capability(key)
    }
}

/// A single named filter stage.
#[async_trait::async_trait]
pub trait Filter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Narrow `candidates` according to `value` (the request's string
    /// value for this filter's parameter key; `""` means "don't filter").
    async fn apply(
        &self,
        value: &str,
        candidates: Vec<CandidatePool>,
    ) -> Result<Vec<CandidatePool>, SelectError>;
}

macro_rules! passthrough_if_empty {
    ($value:expr, $candidates:expr) => {
        if $value.is_empty() {
            return Ok($candidates);
        }
    };
}

/// `backend`: parent name equals requested backend.
pub struct BackendFilter;
#[async_trait::async_trait]
impl Filter for BackendFilter {
    fn name(&self) -> &'static str {
        "backend"
    }
    async fn apply(&self, value: &str, candidates: Vec<CandidatePool>) -> Result<Vec<CandidatePool>, SelectError> {
        passthrough_if_empty!(value, candidates);
        Ok(candidates.into_iter().filter(|c| c.backend.name == value).collect())
    }
}

/// `pool`: pool name equals requested pool.
pub struct PoolFilter;
#[async_trait::async_trait]
impl Filter for PoolFilter {
    fn name(&self) -> &'static str {
        "pool"
    }
    async fn apply(&self, value: &str, candidates: Vec<CandidatePool>) -> Result<Vec<CandidatePool>, SelectError> {
        passthrough_if_empty!(value, candidates);
        Ok(candidates.into_iter().filter(|c| c.pool.name == value).collect())
    }
}

/// `volumeType`: `"lun"`/empty -> SAN, `"fs"` -> NAS + distributed file,
/// `"dtree"` -> directory-tree.
pub struct VolumeTypeFilter;
#[async_trait::async_trait]
impl Filter for VolumeTypeFilter {
    fn name(&self) -> &'static str {
        "volumeType"
    }
    async fn apply(&self, value: &str, candidates: Vec<CandidatePool>) -> Result<Vec<CandidatePool>, SelectError> {
        Ok(candidates
            .into_iter()
            .filter(|c| match value {
                "" | "lun" => hcsi_plugin::families::is_san(&c.backend.storage),
                "fs" => hcsi_plugin::families::is_nas(&c.backend.storage),
                "dtree" => hcsi_plugin::families::is_dtree(&c.backend.storage),
                _ => false,
            })
            .collect())
    }
}

/// `allocType`: `"thin"`/empty -> `SupportThin`, `"thick"` -> `SupportThick`.
/// The distributed file legacy family is accepted unconditionally.
pub struct AllocTypeFilter;
#[async_trait::async_trait]
impl Filter for AllocTypeFilter {
    fn name(&self) -> &'static str {
        "allocType"
    }
    async fn apply(&self, value: &str, candidates: Vec<CandidatePool>) -> Result<Vec<CandidatePool>, SelectError> {
        Ok(candidates
            .into_iter()
            .filter(|c| {
                if hcsi_plugin::families::ignores_alloc_type(&c.backend.storage) {
                    return true;
                }
                match value {
                    "" | "thin" => c.has_capability(capability::SUPPORT_THIN),
                    "thick" => c.has_capability(capability::SUPPORT_THICK),
                    _ => false,
                }
            })
            .collect())
    }
}

/// `qos`: keep only pools with `SupportQoS` whose plugin accepts the QoS
/// JSON; accumulate rejection reasons and error if every pool is rejected.
pub struct QosFilter;
#[async_trait::async_trait]
impl Filter for QosFilter {
    fn name(&self) -> &'static str {
        "qos"
    }
    async fn apply(&self, value: &str, candidates: Vec<CandidatePool>) -> Result<Vec<CandidatePool>, SelectError> {
        passthrough_if_empty!(value, candidates);

        let total = candidates.len();
        let mut kept = Vec::new();
        let mut reasons = Vec::new();
        for candidate in candidates {
            if !candidate.has_capability(capability::SUPPORT_QOS) {
                reasons.push(format!("{}/{}: SupportQoS is false", candidate.backend.name, candidate.pool.name));
                continue;
            }
            match candidate.backend.plugin.support_qos_parameters(value).await {
                Ok(()) => kept.push(candidate),
                Err(e) => reasons.push(format!("{}/{}: {e}", candidate.backend.name, candidate.pool.name)),
            }
        }

        if kept.is_empty() && total > 0 {
            return Err(SelectError::QosRejected {
                rejections: reasons.len(),
                reasons: reasons.join("; "),
            });
        }
        Ok(kept)
    }
}

/// `hyperMetro`: keep pools whose parent has a resolvable metro sibling
/// and `SupportMetro`. Sibling resolution itself happens in the selector,
/// which passes this filter a pre-computed membership check via `value`
/// being the literal request value — the actual sibling lookup needs the
/// cache, so this filter only checks the capability flag and whether the
/// backend *declares* metro pairing hints at all.
pub struct HyperMetroFilter;
#[async_trait::async_trait]
impl Filter for HyperMetroFilter {
    fn name(&self) -> &'static str {
        "hyperMetro"
    }
    async fn apply(&self, value: &str, candidates: Vec<CandidatePool>) -> Result<Vec<CandidatePool>, SelectError> {
        if value != "true" {
            return Ok(candidates);
        }
        Ok(candidates
            .into_iter()
            .filter(|c| c.backend.has_metro_hints() && c.has_capability(capability::SUPPORT_METRO))
            .collect())
    }
}

/// `replication`: analogous to [`HyperMetroFilter`] for `replicaBackend`.
pub struct ReplicationFilter;
#[async_trait::async_trait]
impl Filter for ReplicationFilter {
    fn name(&self) -> &'static str {
        "replication"
    }
    async fn apply(&self, value: &str, candidates: Vec<CandidatePool>) -> Result<Vec<CandidatePool>, SelectError> {
        if value != "true" {
            return Ok(candidates);
        }
        Ok(candidates
            .into_iter()
            .filter(|c| c.backend.has_replica_hints() && c.has_capability(capability::SUPPORT_REPLICATION))
            .collect())
    }
}

/// `applicationType`: require `SupportApplicationType` when non-empty.
pub struct ApplicationTypeFilter;
#[async_trait::async_trait]
impl Filter for ApplicationTypeFilter {
    fn name(&self) -> &'static str {
        "applicationType"
    }
    async fn apply(&self, value: &str, candidates: Vec<CandidatePool>) -> Result<Vec<CandidatePool>, SelectError> {
        passthrough_if_empty!(value, candidates);
        Ok(candidates
            .into_iter()
            .filter(|c| c.has_capability(capability::SUPPORT_APPLICATION_TYPE))
            .collect())
    }
}

/// Quota JSON shape validated by [`StorageQuotaFilter`].
#[derive(Debug, serde::Deserialize)]
struct StorageQuota {
    #[serde(rename = "spaceQuota")]
    space_quota: String,
    #[serde(rename = "gracePeriod", default)]
    grace_period: i64,
}

/// `storageQuota`: require `SupportQuota` and a well-formed quota JSON.
pub struct StorageQuotaFilter;
#[async_trait::async_trait]
impl Filter for StorageQuotaFilter {
    fn name(&self) -> &'static str {
        "storageQuota"
    }
    async fn apply(&self, value: &str, candidates: Vec<CandidatePool>) -> Result<Vec<CandidatePool>, SelectError> {
        passthrough_if_empty!(value, candidates);

        let quota: StorageQuota = serde_json::from_str(value)
            .map_err(|e| SelectError::InvalidQuota(format!("malformed storageQuota json: {e}")))?;
        if quota.space_quota != "softQuota" && quota.space_quota != "hardQuota" {
            return Err(SelectError::InvalidQuota(format!(
                "spaceQuota must be 'softQuota' or 'hardQuota', got '{}'",
                quota.space_quota
            )));
        }
        if !(0..=u32::MAX as i64 - 1).contains(&quota.grace_period) {
            return Err(SelectError::InvalidQuota(
                "gracePeriod must be in [0, 2^32-2]".to_owned(),
            ));
        }
        if quota.space_quota == "hardQuota" && quota.grace_period != 0 {
            return Err(SelectError::InvalidQuota(
                "hardQuota forbids a non-zero gracePeriod".to_owned(),
            ));
        }

        Ok(candidates
            .into_iter()
            .filter(|c| c.has_capability(capability::SUPPORT_QUOTA))
            .collect())
    }
}

/// `sourceVolumeName`/`sourceSnapshotName`: require `SupportClone`.
pub struct CloneFilter {
    pub name: &'static str,
}
#[async_trait::async_trait]
impl Filter for CloneFilter {
    fn name(&self) -> &'static str {
        self.name
    }
    async fn apply(&self, value: &str, candidates: Vec<CandidatePool>) -> Result<Vec<CandidatePool>, SelectError> {
        passthrough_if_empty!(value, candidates);
        Ok(candidates
            .into_iter()
            .filter(|c| c.has_capability(capability::SUPPORT_CLONE))
            .collect())
    }
}

/// `nfsProtocol`: `nfs3`/`nfs4`/`nfs41` require the matching capability.
pub struct NfsProtocolFilter;
#[async_trait::async_trait]
impl Filter for NfsProtocolFilter {
    fn name(&self) -> &'static str {
        "nfsProtocol"
    }
    async fn apply(&self, value: &str, candidates: Vec<CandidatePool>) -> Result<Vec<CandidatePool>, SelectError> {
        let required = match value {
            "" => return Ok(candidates),
            "nfs3" => capability::SUPPORT_NFS3,
            "nfs4" => capability::SUPPORT_NFS4,
            "nfs41" => capability::SUPPORT_NFS41,
            _ => return Ok(candidates),
        };
        Ok(candidates.into_iter().filter(|c| c.has_capability(required)).collect())
    }
}

/// The primary chain, used for local-pool selection — includes the
/// structural filters (backend name, pool name) in addition to every
/// capability-style filter.
#[must_use]
pub fn primary_chain() -> Vec<Box<dyn Filter>> {
    vec![
        Box::new(BackendFilter),
        Box::new(PoolFilter),
        Box::new(VolumeTypeFilter),
        Box::new(AllocTypeFilter),
        Box::new(QosFilter),
        Box::new(HyperMetroFilter),
        Box::new(ReplicationFilter),
        Box::new(ApplicationTypeFilter),
        Box::new(StorageQuotaFilter),
        Box::new(CloneFilter { name: "sourceVolumeName" }),
        Box::new(CloneFilter { name: "sourceSnapshotName" }),
        Box::new(NfsProtocolFilter),
    ]
}

/// The secondary chain, used for remote-pool selection inside a
/// metro/replication request — restricted to capability-style filters.
#[must_use]
pub fn secondary_chain() -> Vec<Box<dyn Filter>> {
    vec![
        Box::new(VolumeTypeFilter),
        Box::new(AllocTypeFilter),
        Box::new(QosFilter),
        Box::new(ReplicationFilter),
        Box::new(ApplicationTypeFilter),
    ]
}

/// Run `chain` over `candidates`, looking up each filter's request value
/// from `params` by its own `name()`.
///
/// # Errors
///
/// Returns the first filter error encountered, or
/// [`SelectError::NoAvailablePool`] naming the filter that emptied the
/// candidate set.
pub async fn run_chain(
    chain: &[Box<dyn Filter>],
    params: ParamBag<'_>,
    mut candidates: Vec<CandidatePool>,
) -> Result<Vec<CandidatePool>, SelectError> {
    for filter in chain {
        let value = params.get_str(filter.name());
        candidates = filter.apply(value, candidates).await?;
        if candidates.is_empty() {
            return Err(SelectError::NoAvailablePool {
                filter: filter.name().to_owned(),
                value: value.to_owned(),
                parameters: params.as_map().clone(),
            });
        }
    }
    Ok(candidates)
}

/// Silences an unused-import warning when `Plugin` is only referenced
/// through trait-object method calls above.
#[allow(dead_code)]
const _ASSERT_PLUGIN_IN_SCOPE: fn() = || {
    fn assert_plugin<P: Plugin + ?Sized>() {}
};

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use hcsi_plugin::mock::MockPlugin;
    use std::sync::Arc;

    fn candidate(storage: &str, caps: &[(&str, bool)]) -> CandidatePool {
        let mut pool = StoragePool::new("p1", "b1", storage);
        for (k, v) in caps {
            pool.capabilities.insert((*k).to_owned(), *v);
        }
        let backend = Backend {
            name: "b1".to_owned(),
            storage: storage.to_owned(),
            available: true,
            content_name: "v1".to_owned(),
            plugin: Arc::new(MockPlugin::new("b1")),
            pools: vec![pool.clone()],
            parameters: HashMap::new(),
            supported_topologies: Vec::new(),
            account_name: String::new(),
            metro_domain: String::new(),
            metro_vstore_pair_id: String::new(),
            metro_backend_name: String::new(),
            replica_backend_name: String::new(),
        };
        CandidatePool { backend, pool }
    }

    #[tokio::test]
    async fn alloc_type_thin_requires_capability() {
        let c = candidate("oceanstor-san", &[(capability::SUPPORT_THIN, false)]);
        let filtered = AllocTypeFilter.apply("thin", vec![c]).await.unwrap();
        assert!(filtered.is_empty());
    }

    #[tokio::test]
    async fn alloc_type_distributed_file_ignores_flag() {
        let c = candidate("oceanstor-9000", &[(capability::SUPPORT_THICK, false)]);
        let filtered = AllocTypeFilter.apply("thick", vec![c]).await.unwrap();
        assert_eq!(filtered.len(), 1);
    }

    #[tokio::test]
    async fn chain_reports_emptying_filter_name() {
        let chain = primary_chain();
        let mut params = HashMap::new();
        params.insert("volumeType".to_owned(), "lun".to_owned());
        params.insert("allocType".to_owned(), "thin".to_owned());
        let c = candidate("oceanstor-san", &[(capability::SUPPORT_THIN, false)]);
        let err = run_chain(&chain, ParamBag::new(&params), vec![c]).await.unwrap_err();
        match err {
            SelectError::NoAvailablePool { filter, .. } => assert_eq!(filter, "allocType"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn chain_is_idempotent() {
        let chain = primary_chain();
        let mut params = HashMap::new();
        params.insert("volumeType".to_owned(), "lun".to_owned());
        params.insert("allocType".to_owned(), "thin".to_owned());
        let c = candidate("oceanstor-san", &[(capability::SUPPORT_THIN, true), (capability::SUPPORT_NFS3, false)]);
        let once = run_chain(&chain, ParamBag::new(&params), vec![c.clone()]).await.unwrap();
        let twice = run_chain(&chain, ParamBag::new(&params), once.clone()).await.unwrap();
        assert_eq!(once.len(), twice.len());
    }
}
