//! Reporters backed by `tracing`.
//!
//! Each reporter writes a structured event and keeps a count, so the CLI can
//! summarise a session and tests can assert on side effects.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use submission::{
    DeviceStateRefresher, ErrorCategory, ErrorKind, ErrorReporter, SubmissionAnalytics,
};
use tracing::{error, info};

/// One report received by a [`TracingErrorReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    /// The reported failure.
    pub error: ErrorKind,
    /// Category it was filed under.
    pub category: ErrorCategory,
    /// Component it came from.
    pub context: String,
}

/// Logs reported errors at `error` level and retains them.
#[derive(Debug, Default)]
pub struct TracingErrorReporter {
    reports: Mutex<Vec<ErrorReport>>,
}

impl TracingErrorReporter {
    /// Creates an empty reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports received so far, oldest first.
    pub fn reports(&self) -> Vec<ErrorReport> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ErrorReporter for TracingErrorReporter {
    fn report(&self, error: &ErrorKind, category: ErrorCategory, context: &str) {
        error!(%error, %category, context, "Error reported");
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ErrorReport {
                error: error.clone(),
                category,
                context: context.to_string(),
            });
    }
}

/// Logs analytics events.
#[derive(Debug, Default)]
pub struct TracingSubmissionAnalytics {
    consent_withdrawn: AtomicUsize,
}

impl TracingSubmissionAnalytics {
    /// Creates a collector with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// How often consent-withdrawn was reported.
    pub fn consent_withdrawn_count(&self) -> usize {
        self.consent_withdrawn.load(Ordering::SeqCst)
    }
}

impl SubmissionAnalytics for TracingSubmissionAnalytics {
    fn report_consent_withdrawn(&self) {
        self.consent_withdrawn.fetch_add(1, Ordering::SeqCst);
        info!(event = "consent_withdrawn", "Key submission analytics");
    }
}

/// Logs device UI state refresh requests.
#[derive(Debug, Default)]
pub struct TracingDeviceStateRefresher {
    refreshes: AtomicUsize,
}

impl TracingDeviceStateRefresher {
    /// Creates a refresher with no recorded requests.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of refresh requests so far.
    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

impl DeviceStateRefresher for TracingDeviceStateRefresher {
    fn refresh_device_ui_state(&self, refresh_test_result: bool) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        info!(refresh_test_result, "Device UI state refresh requested");
    }
}
