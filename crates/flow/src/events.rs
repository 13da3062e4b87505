//! Events emitted to the presentation layer, in emission order.

use serde::{Deserialize, Serialize};

use crate::{ConsentResume, PermissionResume};

/// Screens the controller can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    /// Back to the main screen.
    Main,
    /// Keys were retrieved; the user consented.
    ConsentGiven,
    /// No keys will be submitted (no consent, or access declined).
    NoConsent,
    /// Explanation of what the user consents to.
    YourConsent {
        /// Whether a test result is already available.
        test_result_available: bool,
    },
}

/// One instruction for the presentation layer.
#[derive(Debug, PartialEq)]
pub enum UiEvent {
    /// Show or hide the key-retrieval progress indicator.
    ShowProgress(bool),
    /// Navigate to a screen.
    Navigate(Destination),
    /// Ask the user to consent to enabling tracing, then answer through
    /// [`crate::SubmissionFlowController::resume_consent`].
    PromptConsent(ConsentResume),
    /// Launch the platform's permission flow with the token's request code,
    /// then forward its result through
    /// [`crate::SubmissionFlowController::handle_activity_result`].
    LaunchPermissionFlow(PermissionResume),
    /// Ask the user to confirm leaving the flow.
    ConfirmClose,
}
