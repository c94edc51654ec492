//! Administrative HTTP surface: a read-mostly view over the backend cache
//! plus manual reconcile/select actions for operators and `hcsi-cli`. Not
//! the CSI gRPC surface — there is no `CreateVolume` route here.

pub mod backends;
pub mod pools;
