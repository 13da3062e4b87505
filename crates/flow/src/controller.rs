//! The submission flow controller.
//!
//! Sits between the presentation layer and the [`RetrievalOrchestrator`]:
//! checks consent, starts retrieval, and turns each [`RetrievalOutcome`] into
//! a submission mode update and a sequence of [`UiEvent`]s.
//!
//! Progress is shown before every call into the orchestrator and cleared by
//! every outcome handler, and by the forwarding entry points when nothing was
//! pending. A call ignored because a fetch is in flight leaves progress to
//! that fetch's outcome.
//!
//! Once the UI has detached (cancel confirmed, or the event receiver dropped)
//! late outcomes still update the submission mode but emit nothing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use submission::{
    ActivityResult, ConsentStore, DeviceStateRefresher, ErrorCategory, ErrorReporter,
    SubmissionAnalytics, SubmissionMode, SubmissionModeWriter,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, instrument};

use crate::snapshot::OrchestratorSnapshot;
use crate::{ConsentResume, Destination, RetrievalOrchestrator, RetrievalOutcome, UiEvent};

/// Label attached to error reports from this component.
pub const CONTROLLER_LABEL: &str = "SubmissionFlowController";

/// Collaborators the controller reports to or reads from.
pub struct Collaborators {
    /// Source of the user's consent to submit.
    pub consent: Arc<dyn ConsentStore>,
    /// Sink for retrieval failures.
    pub errors: Arc<dyn ErrorReporter>,
    /// Sink for the consent-withdrawn analytics event.
    pub analytics: Arc<dyn SubmissionAnalytics>,
    /// Refreshed once when the controller is created.
    pub device_state: Arc<dyn DeviceStateRefresher>,
}

/// Drives one submission-result screen session.
pub struct SubmissionFlowController {
    orchestrator: RetrievalOrchestrator,
    consent: Arc<dyn ConsentStore>,
    errors: Arc<dyn ErrorReporter>,
    analytics: Arc<dyn SubmissionAnalytics>,
    mode: SubmissionModeWriter,
    events: mpsc::UnboundedSender<UiEvent>,
    detached: AtomicBool,
}

impl SubmissionFlowController {
    /// Creates a controller and the receiver for its UI events.
    ///
    /// Requests a device UI state refresh without re-fetching the test result.
    pub fn new(
        orchestrator: RetrievalOrchestrator,
        collaborators: Collaborators,
        mode: SubmissionModeWriter,
    ) -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        collaborators.device_state.refresh_device_ui_state(false);

        let controller = Self {
            orchestrator,
            consent: collaborators.consent,
            errors: collaborators.errors,
            analytics: collaborators.analytics,
            mode,
            events,
            detached: AtomicBool::new(false),
        };
        (controller, receiver)
    }

    /// The user asked to submit their keys.
    #[instrument(skip(self))]
    pub async fn proceed(&self) {
        if !self.consent.has_given_consent().await {
            info!("No consent to submit keys; skipping retrieval");
            self.analytics.report_consent_withdrawn();
            self.emit(UiEvent::Navigate(Destination::NoConsent));
            return;
        }

        self.emit(UiEvent::ShowProgress(true));
        match self.orchestrator.start().await {
            Some(outcome) => self.apply(outcome),
            None => debug!("Retrieval already running; its outcome settles progress"),
        }
    }

    /// The user answered the consent prompt carried by `token`.
    #[instrument(skip(self, token))]
    pub async fn resume_consent(&self, token: ConsentResume, given: bool) {
        self.emit(UiEvent::ShowProgress(true));
        match self.orchestrator.resume_consent(token, given).await {
            Some(outcome) => self.apply(outcome),
            None => self.settle_ignored(),
        }
    }

    /// Forwards the host's activity result verbatim to the orchestrator.
    #[instrument(skip(self, payload))]
    pub async fn handle_activity_result(
        &self,
        request_code: i32,
        result_code: i32,
        payload: Option<Value>,
    ) {
        self.emit(UiEvent::ShowProgress(true));
        let result = ActivityResult::new(request_code, result_code, payload);
        match self.orchestrator.handle_activity_result(result).await {
            Some(outcome) => self.apply(outcome),
            None => self.settle_ignored(),
        }
    }

    /// The user pressed back.
    pub fn go_back(&self) {
        self.emit(UiEvent::ConfirmClose);
    }

    /// The user confirmed leaving the flow.
    ///
    /// Does not cancel a running retrieval; its outcome still updates the
    /// submission mode.
    pub fn on_cancel_confirmed(&self) {
        self.emit(UiEvent::Navigate(Destination::Main));
        self.detached.store(true, Ordering::SeqCst);
        debug!("UI session detached");
    }

    /// The user opened the consent explanation.
    pub fn go_consent(&self) {
        self.emit(UiEvent::Navigate(Destination::YourConsent {
            test_result_available: true,
        }));
    }

    /// Consent changes, for rendering the consent state.
    pub fn consent(&self) -> watch::Receiver<bool> {
        self.consent.observe()
    }

    /// The current submission mode.
    pub fn submission_mode(&self) -> SubmissionMode {
        self.mode.current()
    }

    /// Captures the orchestrator's state so the session can be rebuilt after
    /// the hosting process is torn down.
    pub fn snapshot(&self) -> OrchestratorSnapshot {
        self.orchestrator.snapshot()
    }

    fn apply(&self, outcome: RetrievalOutcome) {
        debug!(outcome = outcome.label(), "Applying retrieval outcome");
        match outcome {
            RetrievalOutcome::KeysAvailable(keys) => {
                info!(count = keys.len(), "Keys available; arming background submission");
                self.mode.set(SubmissionMode::Monitor);
                self.emit(UiEvent::Navigate(Destination::ConsentGiven));
                self.emit(UiEvent::ShowProgress(false));
            }
            RetrievalOutcome::PermissionDeclined => {
                self.emit(UiEvent::Navigate(Destination::NoConsent));
                self.emit(UiEvent::ShowProgress(false));
            }
            RetrievalOutcome::ConsentRequired(token) => {
                self.emit(UiEvent::ShowProgress(false));
                self.emit(UiEvent::PromptConsent(token));
            }
            RetrievalOutcome::PermissionRequired(token) => {
                self.emit(UiEvent::ShowProgress(false));
                self.emit(UiEvent::LaunchPermissionFlow(token));
            }
            RetrievalOutcome::Failed(err) => {
                error!(error = %err, "Failed to retrieve exposure keys");
                self.errors
                    .report(&err, ErrorCategory::ExposureNotification, CONTROLLER_LABEL);
                self.emit(UiEvent::ShowProgress(false));
            }
        }
    }

    fn settle_ignored(&self) {
        if self.orchestrator.is_retrieving() {
            debug!("Retrieval in flight; its outcome settles progress");
        } else {
            self.emit(UiEvent::ShowProgress(false));
        }
    }

    fn emit(&self, event: UiEvent) {
        if self.detached.load(Ordering::SeqCst) {
            debug!(?event, "UI detached; event dropped");
            return;
        }
        if let Err(mpsc::error::SendError(event)) = self.events.send(event) {
            debug!(?event, "UI event receiver gone; detaching");
            self.detached.store(true, Ordering::SeqCst);
        }
    }
}
