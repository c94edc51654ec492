//! HTTP error types for the `hcsi` admin server.
//!
//! Maps domain errors from `hcsi-engine` into appropriate HTTP responses.
//! Every error variant produces a JSON body with a machine-readable `error`
//! field and a human-readable `message`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use hcsi_engine::error::{CacheError, RegisterError, RouterError, SelectError};

/// Application-level error returned from HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        };

        let body = ErrorBody { error: error_type, message };
        (status, axum::Json(body)).into_response()
    }
}

impl From<RegisterError> for AppError {
    fn from(err: RegisterError) -> Self {
        match err {
            RegisterError::NotFound(_) => Self::NotFound(err.to_string()),
            RegisterError::UnknownFamily(_)
            | RegisterError::MissingParameters(_)
            | RegisterError::MalformedTopologies(_, _)
            | RegisterError::HalfConfiguredMetro(_)
            | RegisterError::EmptyPools(_) => Self::BadRequest(err.to_string()),
            RegisterError::PluginInit(_, _) | RegisterError::Fetch(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        Self::NotFound(err.to_string())
    }
}

impl From<SelectError> for AppError {
    fn from(err: SelectError) -> Self {
        match err {
            SelectError::NoAvailablePool { .. } | SelectError::PairingAbsent(_) => Self::Conflict(err.to_string()),
            SelectError::MutuallyExclusiveTopology
            | SelectError::InvalidQuota(_)
            | SelectError::InvalidParameter(_)
            | SelectError::QosRejected { .. } => Self::BadRequest(err.to_string()),
            SelectError::Cache(e) => e.into(),
            SelectError::Register(e) => e.into(),
            SelectError::Plugin(_) | SelectError::Cancelled => Self::Internal(err.to_string()),
        }
    }
}

impl From<RouterError> for AppError {
    fn from(err: RouterError) -> Self {
        match err {
            RouterError::MalformedVolumeId(_) | RouterError::MalformedSnapshotId(_) | RouterError::UnsupportedAccessMode => {
                Self::BadRequest(err.to_string())
            }
            RouterError::ExpandDisabledByAccessMode | RouterError::SiteMismatch => Self::Conflict(err.to_string()),
            RouterError::Select(e) => e.into(),
            RouterError::Register(e) => e.into(),
            RouterError::Cache(e) => e.into(),
            RouterError::Plugin(_) => Self::Internal(err.to_string()),
        }
    }
}
