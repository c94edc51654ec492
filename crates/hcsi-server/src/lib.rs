//! Process bootstrap for the `hcsi` admin server: configuration, shared
//! state, the administrative HTTP surface, and the background reconciler
//! and status-subscriber tasks. The CSI gRPC surface is a separate,
//! out-of-scope collaborator — this crate only ever talks to
//! `hcsi_engine` in-process.

pub mod config;
pub mod content;
pub mod error;
pub mod routes;
pub mod state;
