//! Port traits for every collaborator of the retrieval flow.
//!
//! Infrastructure crates implement these; the `flow` crate depends only on the
//! traits. Async methods go through `async-trait` so the ports stay usable as
//! `Arc<dyn ...>`.

use async_trait::async_trait;
use tokio::sync::watch;

use crate::{ErrorCategory, ErrorKind, ExposureKey, ServiceError};

/// Adapter around the platform's exposure-notification API.
///
/// Implementations must report [`ServiceError::TracingDisabled`],
/// [`ServiceError::ResolutionRequired`] and [`ServiceError::Failed`] as
/// distinct cases; the orchestrator routes on them.
#[async_trait]
pub trait ExposureKeyService: Send + Sync {
    /// Reads the device's key history.
    async fn fetch_keys(&self) -> Result<Vec<ExposureKey>, ServiceError>;

    /// Switches exposure tracing on after the user consented to it.
    async fn enable_tracing(&self) -> Result<(), ServiceError>;
}

/// Holds the user's consent to submit keys.
///
/// Written elsewhere; the retrieval flow only reads it.
#[async_trait]
pub trait ConsentStore: Send + Sync {
    /// Returns the current consent value. Never cached by callers.
    async fn has_given_consent(&self) -> bool;

    /// Returns a receiver that tracks consent changes, for the presentation layer.
    fn observe(&self) -> watch::Receiver<bool>;
}

/// Receives failures that should be visible to operators.
pub trait ErrorReporter: Send + Sync {
    /// Reports `error` under `category`, labelled with the originating component.
    fn report(&self, error: &ErrorKind, category: ErrorCategory, context: &str);
}

/// Records submission-related analytics events.
pub trait SubmissionAnalytics: Send + Sync {
    /// The user reached key retrieval without (or after withdrawing) consent.
    fn report_consent_withdrawn(&self);
}

/// Refreshes the device-wide submission UI state.
pub trait DeviceStateRefresher: Send + Sync {
    /// Requests a refresh; `refresh_test_result` controls whether the test
    /// result itself is fetched again.
    fn refresh_device_ui_state(&self, refresh_test_result: bool);
}
