//! Server configuration for `hcsi-server`.
//!
//! Loads configuration from environment variables with sensible defaults.
//! All settings can be overridden via `HCSI_*` environment variables.

use std::net::SocketAddr;

/// Where the engine reads backend descriptors from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSourceKind {
    /// A static JSON file containing a `Vec<BackendContent>`, reloaded on
    /// every reconcile tick.
    File { path: String },
    /// A `StorageBackendContent` custom resource read from the cluster
    /// the process runs in (requires the `kube` feature on `hcsi-engine`).
    Kube,
}

/// Process-wide configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Address to bind the admin HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Where backend descriptors come from.
    pub content_source: ContentSourceKind,
    /// Log level filter (e.g., `info`, `debug`, `warn`).
    pub log_level: String,
    /// Seconds between background reconcile passes.
    pub reconcile_interval_secs: u64,
    /// Seconds between background availability-probe passes.
    pub availability_probe_interval_secs: u64,
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PORT` — port to bind on (binds to `0.0.0.0`)
    /// - `HCSI_BIND_ADDR` — full bind address (overrides `PORT`, default: `127.0.0.1:8300`)
    /// - `HCSI_CONTENT_SOURCE` — `file` or `kube` (default: `file`)
    /// - `HCSI_CONTENT_FILE` — path to the descriptor JSON file (default: `./backends.json`)
    /// - `HCSI_LOG_LEVEL` — log filter (default: `info`)
    /// - `HCSI_RECONCILE_INTERVAL` — seconds between reconcile passes (default: `60`)
    /// - `HCSI_AVAILABILITY_PROBE_INTERVAL` — seconds between availability probe passes (default: `30`)
    #[must_use]
    pub fn from_env() -> Self {
        let bind_addr = if let Ok(addr) = std::env::var("HCSI_BIND_ADDR") {
            addr.parse().unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8300)))
        } else if let Ok(port_str) = std::env::var("PORT") {
            let port: u16 = port_str.parse().unwrap_or(8300);
            SocketAddr::from(([0, 0, 0, 0], port))
        } else {
            SocketAddr::from(([127, 0, 0, 1], 8300))
        };

        let content_source = match std::env::var("HCSI_CONTENT_SOURCE")
            .unwrap_or_else(|_| "file".to_owned())
            .to_lowercase()
            .as_str()
        {
            "kube" => ContentSourceKind::Kube,
            _ => ContentSourceKind::File {
                path: std::env::var("HCSI_CONTENT_FILE").unwrap_or_else(|_| "./backends.json".to_owned()),
            },
        };

        let log_level = std::env::var("HCSI_LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());

        let reconcile_interval_secs = std::env::var("HCSI_RECONCILE_INTERVAL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        let availability_probe_interval_secs = std::env::var("HCSI_AVAILABILITY_PROBE_INTERVAL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        Self {
            bind_addr,
            content_source,
            log_level,
            reconcile_interval_secs,
            availability_probe_interval_secs,
        }
    }
}
