//! `KubeContentSource`: a [`crate::fetch::ContentSource`] backed by a
//! `StorageBackendContent` custom resource. Gated behind the `kube`
//! feature so the engine crate stays buildable without a cluster
//! dependency.
//!
//! This reads the resource the way an operator's reconcile loop would
//! read its input, but it is deliberately not a watch/reconcile
//! controller itself — it performs a point-in-time `list`/`get` each time
//! the fetcher calls it, and the caller decides when to call again.

use std::collections::HashMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::api::{Api, ListParams};
use kube::{Client, CustomResource};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::fetch::{BackendContent, ContentSource, PoolContent};

/// `spec` half of the custom resource: everything the registrar needs to
/// build a `Backend`.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageBackendContentSpec {
    pub backend_claim: String,
    pub storage: String,
    #[serde(default)]
    pub configmap_meta: String,
    #[serde(default)]
    pub secret_meta: String,
    #[serde(default)]
    pub cert_secret: String,
    #[serde(default)]
    pub use_cert: bool,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
    #[serde(default)]
    pub supported_topologies: serde_json::Value,
    #[serde(default)]
    pub account_name: String,
    #[serde(default)]
    pub metro_domain: String,
    #[serde(default)]
    pub metro_vstore_pair_id: String,
    #[serde(default)]
    pub metro_backend_name: String,
    #[serde(default)]
    pub replica_backend_name: String,
}

/// `status` half: live state the orchestrator's own controller keeps
/// current.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageBackendContentStatus {
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub capabilities: HashMap<String, bool>,
    #[serde(default)]
    pub pools: Vec<StorageBackendContentPool>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageBackendContentPool {
    pub name: String,
    #[serde(default)]
    pub capacities: HashMap<String, String>,
}

#[derive(Clone, CustomResource, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "storage.hcsi.example.invalid",
    version = "v1",
    kind = "StorageBackendContent",
    plural = "storagebackendcontents",
    status = "StorageBackendContentStatus",
    shortname = "sbc"
)]
#[serde(rename_all = "camelCase")]
pub struct StorageBackendContentSpecWrapper(pub StorageBackendContentSpec);

impl From<&StorageBackendContent> for BackendContent {
    fn from(cr: &StorageBackendContent) -> Self {
        let name = cr.metadata.name.clone().unwrap_or_default();
        let status = cr.status.clone().unwrap_or_default();
        let spec = &cr.spec.0;
        let content_name = cr
            .metadata
            .resource_version
            .clone()
            .unwrap_or_else(|| name.clone());

        Self {
            name,
            storage: spec.storage.clone(),
            online: status.online,
            content_name,
            capabilities: status.capabilities,
            parameters: spec.parameters.clone(),
            supported_topologies: spec.supported_topologies.clone(),
            account_name: spec.account_name.clone(),
            metro_domain: spec.metro_domain.clone(),
            metro_vstore_pair_id: spec.metro_vstore_pair_id.clone(),
            metro_backend_name: spec.metro_backend_name.clone(),
            replica_backend_name: spec.replica_backend_name.clone(),
            pools: status
                .pools
                .into_iter()
                .map(|p| PoolContent {
                    name: p.name,
                    capacities: p.capacities,
                })
                .collect(),
        }
    }
}

/// Reads `StorageBackendContent` resources from one namespace.
pub struct KubeContentSource {
    api: Api<StorageBackendContent>,
}

impl KubeContentSource {
    #[must_use]
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }

    #[must_use]
    pub fn cluster_scoped(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait::async_trait]
impl ContentSource for KubeContentSource {
    async fn list(&self) -> Result<Vec<BackendContent>, FetchError> {
        let list = self
            .api
            .list(&ListParams::default())
            .await
            .map_err(|e| FetchError::Source(e.to_string()))?;
        Ok(list.items.iter().map(BackendContent::from).collect())
    }

    async fn get(&self, name: &str) -> Result<Option<BackendContent>, FetchError> {
        match self.api.get(name).await {
            Ok(cr) => Ok(Some(BackendContent::from(&cr))),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
            Err(e) => Err(FetchError::Source(e.to_string())),
        }
    }
}
