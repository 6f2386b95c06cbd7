//! Call telemetry error types.
//!
//! Errors map to gRPC status codes at the RPC boundary. Internal details are
//! logged server-side but not exposed to callers.

use thiserror::Error;
use tonic::{Code, Status};

/// Call telemetry error type.
///
/// Maps to gRPC codes:
/// - `Unauthenticated`: `UNAUTHENTICATED`
/// - `PermissionDenied`: `PERMISSION_DENIED`
/// - `InvalidWindow`: `INVALID_ARGUMENT`
/// - `ShuttingDown`: `UNAVAILABLE`
/// - `Config`, `AclParse`: `INTERNAL`
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Consumer identity missing or ambiguous in call metadata.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Consumer has no ACL pattern matching the requested method.
    #[error("Permission denied: consumer {consumer} may not call {method}")]
    PermissionDenied { consumer: String, method: String },

    /// Stat window shorter than one second.
    #[error("Invalid stat window: {0}s (minimum 1s)")]
    InvalidWindow(u64),

    /// Hubs have been shut down; no new subscriptions are accepted.
    #[error("Telemetry hubs are shutting down")]
    ShuttingDown,

    /// ACL text could not be parsed.
    #[error("ACL parse error: {0}")]
    AclParse(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl TelemetryError {
    /// Returns the gRPC status code for this error.
    #[must_use]
    pub fn code(&self) -> Code {
        match self {
            TelemetryError::Unauthenticated(_) => Code::Unauthenticated,
            TelemetryError::PermissionDenied { .. } => Code::PermissionDenied,
            TelemetryError::InvalidWindow(_) => Code::InvalidArgument,
            TelemetryError::ShuttingDown => Code::Unavailable,
            TelemetryError::AclParse(_) | TelemetryError::Config(_) => Code::Internal,
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            TelemetryError::Unauthenticated(_) => "Missing or invalid consumer metadata".to_string(),
            TelemetryError::PermissionDenied { method, .. } => {
                format!("Permission denied for {method}")
            }
            TelemetryError::InvalidWindow(_) => {
                "Stat interval must be at least 1 second".to_string()
            }
            TelemetryError::ShuttingDown => "Server is shutting down".to_string(),
            TelemetryError::AclParse(_) | TelemetryError::Config(_) => {
                "An internal error occurred".to_string()
            }
        }
    }

    /// Bounded label for metrics and log fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            TelemetryError::Unauthenticated(_) => "unauthenticated",
            TelemetryError::PermissionDenied { .. } => "permission_denied",
            TelemetryError::InvalidWindow(_) => "invalid_window",
            TelemetryError::ShuttingDown => "shutting_down",
            TelemetryError::AclParse(_) => "acl_parse",
            TelemetryError::Config(_) => "config",
        }
    }
}

impl From<TelemetryError> for Status {
    fn from(err: TelemetryError) -> Self {
        Status::new(err.code(), err.client_message())
    }
}
