//! Error types for `hcsi-plugin`.
//!
//! A plugin call fails in one of a small number of ways that the engine
//! needs to distinguish: a family that simply doesn't implement the
//! requested operation, a transient array/network hiccup the caller may
//! retry, a permanent rejection from the array, or a caller-initiated
//! cancellation. These map directly onto the Plugin-transient /
//! Plugin-permanent / Cancelled error kinds the engine surfaces upward.

/// Errors a [`crate::Plugin`] implementation may return.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// The family does not implement this operation at all (e.g. a block
    /// family asked for `CreateSnapshot` semantics only NAS supports).
    #[error("operation '{operation}' is not supported by storage family '{family}'")]
    Unsupported { family: String, operation: String },

    /// A network or session-level failure talking to the array. Safe to
    /// retry; the cache entry is left in place.
    #[error("transient array error on '{backend}': {reason}")]
    Transient { backend: String, reason: String },

    /// The array rejected the request outright (bad QoS JSON, quota
    /// exceeded, unsupported feature). Retrying without changing the
    /// request will not help.
    #[error("array rejected request on '{backend}': {reason}")]
    Permanent { backend: String, reason: String },

    /// The calling context was cancelled mid-operation.
    #[error("operation on '{backend}' was cancelled")]
    Cancelled { backend: String },

    /// The named resource does not exist on the array.
    #[error("'{resource}' not found on '{backend}'")]
    NotFound { backend: String, resource: String },
}

impl PluginError {
    /// Whether a caller may usefully retry this error without changing
    /// its request.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}
