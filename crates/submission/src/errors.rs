//! Error taxonomy for the TEK submission domain.
//!
//! [`ErrorKind`] is the terminal failure carried by a failed retrieval.
//! [`ServiceError`] is what the platform service adapter reports; it keeps the
//! two interactive cases apart from real failures so the orchestrator can
//! route them. [`ServiceError::AccessDenied`] is a refusal rather than a
//! failure and ends up as a declined retrieval.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Terminal failures
// ---------------------------------------------------------------------------

/// Why a retrieval attempt failed.
///
/// All variants are terminal for the attempt. The orchestrator never retries
/// on its own; whether to offer a user-initiated retry is the caller's call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The exposure-notification service is missing or not reachable.
    #[error("Exposure notification service unavailable")]
    PlatformUnavailable,

    /// The platform revoked this app's access to the service.
    #[error("Access to the exposure notification service was revoked")]
    Revoked,

    /// The platform did not answer within the configured fetch timeout.
    #[error("Timed out waiting for the exposure notification service")]
    Timeout,

    /// The platform or the host produced a result that does not fit the
    /// current step (unknown result code, repeated interaction request).
    #[error("Unexpected result: {detail}")]
    UnexpectedResult {
        /// Description of what was received.
        detail: String,
    },

    /// Anything the adapter could not classify.
    #[error("Unknown failure: {cause}")]
    Unknown {
        /// Description of the underlying failure.
        cause: String,
    },
}

// ---------------------------------------------------------------------------
// Service adapter errors
// ---------------------------------------------------------------------------

/// Errors reported by an [`crate::ExposureKeyService`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Exposure tracing is switched off; the user must consent to turning it
    /// on before keys can be read.
    #[error("Exposure tracing is disabled")]
    TracingDisabled,

    /// The platform needs the user to grant key access in an interactive flow.
    #[error("Key access requires an interactive permission grant")]
    ResolutionRequired,

    /// The platform refused access to the key history.
    #[error("Access to the key history was denied")]
    AccessDenied,

    /// Non-recoverable failure.
    #[error(transparent)]
    Failed(#[from] ErrorKind),
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

/// Category attached to a report sent to the [`crate::ErrorReporter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Failure originating in the exposure-notification platform.
    ExposureNotification,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::ExposureNotification => f.write_str("exposure_notification"),
        }
    }
}
