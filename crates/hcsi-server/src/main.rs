//! `hcsi` admin server entry point.
//!
//! Bootstraps the plugin registry, backend cache, and register, then
//! starts the Axum HTTP server with graceful shutdown. A background
//! reconciler, a background availability prober feeding the register's own
//! status subscriber, and a background status logger run alongside the
//! server and are cancelled on shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::HeaderValue;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use hcsi_engine::cache::BackendCache;
use hcsi_engine::fetch::{ContentSource, Fetcher};
use hcsi_engine::register::BackendRegister;
use hcsi_plugin::mock::MockPlugin;
use hcsi_plugin::registry::PluginRegistry;

use hcsi_server::config::{ContentSourceKind, EngineConfig};
use hcsi_server::content::FileContentSource;
use hcsi_server::routes;
use hcsi_server::state::AppState;

use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EngineConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!(content_source = ?config.content_source, "hcsi-server starting");

    let state = build_app_state(&config).await?;

    if let Err(e) = state.register.fetch_and_register_all_backend().await {
        tracing::warn!(error = %e, "initial reconcile failed, starting with an empty cache");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let reconciler_handle = {
        let register = Arc::clone(&state.register);
        let mut rx = shutdown_rx.clone();
        let interval_secs = config.reconcile_interval_secs;
        tokio::spawn(async move {
            reconcile_worker(&register, &mut rx, interval_secs).await;
        })
    };

    let status_handle = {
        let cache = Arc::clone(&state.cache);
        let mut rx = shutdown_rx.clone();
        tokio::spawn(async move {
            status_subscriber(&cache, &mut rx).await;
        })
    };

    let (availability_tx, availability_rx) = tokio::sync::mpsc::unbounded_channel();

    let status_subscriber_handle = {
        let register = Arc::clone(&state.register);
        tokio::spawn(async move {
            register.run_status_subscriber(availability_rx).await;
        })
    };

    let probe_handle = {
        let cache = Arc::clone(&state.cache);
        let mut rx = shutdown_rx.clone();
        let interval_secs = config.availability_probe_interval_secs;
        tokio::spawn(async move {
            availability_probe_worker(&cache, &availability_tx, &mut rx, interval_secs).await;
        })
    };

    let app = build_router(Arc::new(state));

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "hcsi-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .context("server error")?;

    info!("waiting for background workers to stop");
    let _ = tokio::time::timeout(Duration::from_secs(10), reconciler_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(10), status_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(10), probe_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(10), status_subscriber_handle).await;

    info!("hcsi-server stopped");
    Ok(())
}

/// Build the shared application state: a plugin registry with every known
/// family wired to `MockPlugin` (no per-family array client ships in this
/// workspace — that REST client is a named external collaborator), a
/// content source per configuration, and the cache/register pair built
/// from them.
async fn build_app_state(config: &EngineConfig) -> anyhow::Result<AppState> {
    let plugin_registry = PluginRegistry::new();
    for family in hcsi_plugin::families::ALL {
        let family = (*family).to_owned();
        plugin_registry.register(
            family.clone(),
            Arc::new(move || -> Arc<dyn hcsi_plugin::Plugin> { Arc::new(MockPlugin::new(family.clone())) }),
        );
    }
    let plugin_registry = Arc::new(plugin_registry);

    let source: Arc<dyn ContentSource> = match &config.content_source {
        ContentSourceKind::File { path } => {
            info!(path = %path, "using file-backed content source");
            Arc::new(FileContentSource::new(path.clone()))
        }
        ContentSourceKind::Kube => {
            #[cfg(feature = "kube")]
            {
                info!("using Kubernetes StorageBackendContent content source");
                let client = kube::Client::try_default().await.context("failed to build kube client")?;
                match std::env::var("HCSI_KUBE_NAMESPACE") {
                    Ok(ns) => Arc::new(hcsi_engine::kube_source::KubeContentSource::new(client, &ns)),
                    Err(_) => Arc::new(hcsi_engine::kube_source::KubeContentSource::cluster_scoped(client)),
                }
            }
            #[cfg(not(feature = "kube"))]
            {
                anyhow::bail!("HCSI_CONTENT_SOURCE=kube requested but the 'kube' feature is not enabled");
            }
        }
    };

    let cache = Arc::new(BackendCache::new());
    let register = Arc::new(BackendRegister::new(plugin_registry, Arc::clone(&cache), Fetcher::new(source)));

    Ok(AppState { cache, register })
}

/// Build the Axum router with the admin routes and common middleware.
fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST, axum::http::Method::DELETE])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    Router::new()
        .nest("/v1/backends", routes::backends::router())
        .nest("/v1/pools", routes::pools::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state)
}

/// Periodically calls `fetch_and_register_all_backend`, logging failures
/// without aborting — a transient fetch error just means the cache goes
/// stale until the next tick.
async fn reconcile_worker(register: &BackendRegister, shutdown: &mut watch::Receiver<bool>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    info!(interval_secs, "reconcile worker started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match register.fetch_and_register_all_backend().await {
                    Ok(()) => tracing::debug!("reconcile tick complete"),
                    Err(e) => tracing::warn!(error = %e, "reconcile tick failed"),
                }
            }
            _ = shutdown.changed() => {
                info!("reconcile worker shutting down");
                return;
            }
        }
    }
}

/// The inbound side of backend availability: on each tick, calls every
/// cached backend's own `update_backend_capabilities` as a cheap liveness
/// check and sends the resulting `(name, online)` pair to the register's
/// status subscriber. A plugin error means the backend is unreachable, not
/// that the probe itself failed, so it maps to `online = false` rather than
/// being logged as a worker fault.
async fn availability_probe_worker(
    cache: &BackendCache,
    events: &tokio::sync::mpsc::UnboundedSender<(String, bool)>,
    shutdown: &mut watch::Receiver<bool>,
    interval_secs: u64,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    info!(interval_secs, "availability probe worker started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                for backend in cache.list().await {
                    let online = backend.plugin.update_backend_capabilities().await.is_ok();
                    if events.send((backend.name, online)).is_err() {
                        return;
                    }
                }
            }
            _ = shutdown.changed() => {
                info!("availability probe worker shutting down");
                return;
            }
        }
    }
}

/// Drains the cache's availability-change broadcast and logs each
/// transition, the operator-facing mirror of the subscription handler
/// that flips `Backend.available` in the first place.
async fn status_subscriber(cache: &BackendCache, shutdown: &mut watch::Receiver<bool>) {
    let mut rx = cache.subscribe_status();
    info!("status subscriber started");

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok((name, available)) => info!(backend = %name, available, "backend availability changed"),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "status subscriber lagged, resyncing from current cache state");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                }
            }
            _ = shutdown.changed() => {
                info!("status subscriber shutting down");
                return;
            }
        }
    }
}

/// Wait for SIGINT or SIGTERM, then broadcast shutdown.
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
    let _ = shutdown_tx.send(true);
}
