//! Shared application state for the `hcsi` admin server.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! Axum handlers via `Arc`. It holds the cache and register that every
//! admin route and both background tasks operate on.

use std::sync::Arc;

use hcsi_engine::cache::BackendCache;
use hcsi_engine::register::BackendRegister;

/// Shared application state passed to all HTTP handlers.
pub struct AppState {
    pub cache: Arc<BackendCache>,
    pub register: Arc<BackendRegister>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
