//! Shared value types for the TEK submission domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! the data that flows between the platform service, the retrieval flow, and
//! the presentation layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{RequestCode, ResultCode};

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// A Temporary Exposure Key as handed out by the platform service.
///
/// The retrieval flow treats keys as opaque payload: it counts them and passes
/// them on, it never inspects `key_data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureKey {
    /// Raw key material.
    pub key_data: Vec<u8>,

    /// First rolling interval (10-minute slot) the key was valid for.
    pub rolling_start_interval_number: u32,

    /// Number of rolling intervals the key stays valid.
    pub rolling_period: u32,

    /// Transmission risk level assigned by the platform.
    pub transmission_risk_level: u8,
}

// ---------------------------------------------------------------------------
// Submission mode
// ---------------------------------------------------------------------------

/// Scheduling state read by the background submission scheduler.
///
/// Only the flow controller writes it, and only [`SubmissionMode::Monitor`]
/// has a precondition: it is set exclusively in response to keys becoming
/// available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionMode {
    /// Background submission is disarmed.
    #[default]
    Inactive,
    /// Keys were retrieved; background submission proceeds autonomously.
    Monitor,
    /// A submission to the backend is currently running.
    Submitting,
}

impl std::fmt::Display for SubmissionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SubmissionMode::Inactive => "inactive",
            SubmissionMode::Monitor => "monitor",
            SubmissionMode::Submitting => "submitting",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Activity results
// ---------------------------------------------------------------------------

/// The raw triple the host reports when an interactive platform flow ends.
///
/// Forwarded verbatim; only the orchestrator interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityResult {
    /// Request code the flow was launched with.
    pub request_code: RequestCode,

    /// Outcome reported by the host.
    pub result_code: ResultCode,

    /// Opaque payload attached by the platform, if any.
    pub payload: Option<serde_json::Value>,
}

impl ActivityResult {
    /// Creates an [`ActivityResult`] from the host's raw values.
    pub fn new(request_code: i32, result_code: i32, payload: Option<serde_json::Value>) -> Self {
        Self {
            request_code: RequestCode::new(request_code),
            result_code: ResultCode::new(result_code),
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
