//! Errors raised by the flow crate outside of a retrieval attempt.
//!
//! Retrieval itself never fails across the orchestrator boundary; failures
//! there are encoded as [`crate::RetrievalOutcome::Failed`].

use thiserror::Error;

/// Configuration and persistence errors.
#[derive(Debug, Error)]
pub enum FlowError {
    /// The retrieval configuration is invalid.
    ///
    /// Produced at load time; no orchestrator is built from an invalid config.
    #[error("Configuration error: {message}")]
    ConfigurationError {
        /// Description of the configuration problem.
        message: String,
    },

    /// An orchestrator snapshot could not be encoded or decoded.
    #[error("Snapshot encoding failed: {0}")]
    Snapshot(#[from] serde_json::Error),
}
