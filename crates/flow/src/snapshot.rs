//! Persistable orchestrator state.
//!
//! Only the discriminant and the data needed to rebuild resume tokens are
//! stored. An in-flight fetch cannot outlive the process, so a snapshot taken
//! while retrieving records [`PendingStep::Idle`].

use serde::{Deserialize, Serialize};
use submission::{AttemptId, RequestCode, Timestamp};

use crate::FlowError;

/// The step an orchestrator was in when the snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum PendingStep {
    /// No attempt has been made, or the last one was lost with the process.
    Idle,
    /// Waiting for the answer to a consent prompt.
    AwaitingConsent {
        /// Attempt the prompt belongs to.
        attempt: AttemptId,
    },
    /// Waiting for the host to report the permission flow's result.
    AwaitingPermission {
        /// Attempt the flow belongs to.
        attempt: AttemptId,
        /// Request code the flow was launched with.
        request_code: RequestCode,
    },
    /// The last attempt finished.
    Done,
}

/// A serialisable copy of an orchestrator's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorSnapshot {
    /// The captured step.
    pub step: PendingStep,
    /// Permission flows launched so far; request codes continue from here.
    #[serde(default)]
    pub permission_flows: u32,
    /// When the snapshot was taken.
    pub saved_at: Timestamp,
}

impl OrchestratorSnapshot {
    /// Creates a snapshot of `step` stamped with the current time.
    pub fn new(step: PendingStep, permission_flows: u32) -> Self {
        Self {
            step,
            permission_flows,
            saved_at: Timestamp::now(),
        }
    }

    /// Encodes the snapshot as JSON.
    pub fn to_json(&self) -> Result<String, FlowError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a snapshot previously produced by [`Self::to_json`].
    pub fn from_json(json: &str) -> Result<Self, FlowError> {
        Ok(serde_json::from_str(json)?)
    }
}
