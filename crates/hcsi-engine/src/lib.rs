//! Backend-and-pool orchestration engine: discovery, capability cache,
//! filter/weight pool selection, and provisioning routing.
//!
//! This crate has no opinion on transport — it is driven by `hcsi-server`
//! over an in-process `Arc<BackendCache>`/`Arc<BackendRegister>` pair, and
//! tested directly against [`hcsi_plugin::mock::MockPlugin`] without any
//! array or cluster dependency.

pub mod cache;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod handler;
pub mod ids;
pub mod model;
pub mod params;
pub mod register;
pub mod router;
pub mod selector;
pub mod topology;
pub mod weight;

#[cfg(feature = "kube")]
pub mod kube_source;
