//! Retrieval configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use submission::RequestCode;

use crate::FlowError;

/// Base request code for the interactive key-access flow unless configured.
pub const DEFAULT_PERMISSION_REQUEST_CODE: RequestCode = RequestCode::new(3011);

/// Upper bound for a single platform call unless configured.
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 30_000;

/// Tunables for the [`crate::RetrievalOrchestrator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Base request code for the interactive permission flow. Each flow an
    /// orchestrator launches gets the next code above the base, so results
    /// left over from an earlier flow no longer match.
    pub permission_request_code: RequestCode,

    /// Upper bound for each platform call (fetch or enable), in milliseconds.
    pub fetch_timeout_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            permission_request_code: DEFAULT_PERMISSION_REQUEST_CODE,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
        }
    }
}

impl RetrievalConfig {
    /// Returns the fetch timeout as a [`Duration`].
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Checks the configuration for values the orchestrator cannot work with.
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.fetch_timeout_ms == 0 {
            return Err(FlowError::ConfigurationError {
                message: "fetch_timeout_ms must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
