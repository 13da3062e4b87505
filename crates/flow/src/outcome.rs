//! Retrieval outcomes and the resume tokens carried by the interactive ones.
//!
//! A resume token holds only plain data (the attempt it belongs to and, for
//! permission, the request code). It can be serialised by the host, kept
//! across process teardown, and handed back later; the orchestrator decides
//! whether it still matches the pending step. Tokens are consumed on use.

use serde::{Deserialize, Serialize};
use submission::{AttemptId, ErrorKind, ExposureKey, RequestCode};

/// Answers a just-in-time consent prompt.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentResume {
    attempt: AttemptId,
}

impl ConsentResume {
    pub(crate) fn new(attempt: AttemptId) -> Self {
        Self { attempt }
    }

    /// The attempt this prompt belongs to.
    pub fn attempt(&self) -> AttemptId {
        self.attempt
    }
}

/// Feeds the result of the interactive permission flow back.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionResume {
    attempt: AttemptId,
    request_code: RequestCode,
}

impl PermissionResume {
    pub(crate) fn new(attempt: AttemptId, request_code: RequestCode) -> Self {
        Self {
            attempt,
            request_code,
        }
    }

    /// The attempt this permission flow belongs to.
    pub fn attempt(&self) -> AttemptId {
        self.attempt
    }

    /// Request code the host must launch the platform flow with.
    pub fn request_code(&self) -> RequestCode {
        self.request_code
    }
}

/// What one retrieval step produced.
#[derive(Debug, PartialEq)]
pub enum RetrievalOutcome {
    /// Keys were read. Terminal.
    KeysAvailable(Vec<ExposureKey>),
    /// The user or the platform refused access. Terminal.
    PermissionDeclined,
    /// The user must consent to enabling tracing first.
    ConsentRequired(ConsentResume),
    /// The host must run the platform's interactive permission flow.
    PermissionRequired(PermissionResume),
    /// The attempt failed. Terminal.
    Failed(ErrorKind),
}

impl RetrievalOutcome {
    /// Short name for log fields.
    pub fn label(&self) -> &'static str {
        match self {
            RetrievalOutcome::KeysAvailable(_) => "keys_available",
            RetrievalOutcome::PermissionDeclined => "permission_declined",
            RetrievalOutcome::ConsentRequired(_) => "consent_required",
            RetrievalOutcome::PermissionRequired(_) => "permission_required",
            RetrievalOutcome::Failed(_) => "failed",
        }
    }
}
