//! Scripted presentation layer.
//!
//! Plays the part of the submission-result screen: consumes [`UiEvent`]s,
//! answers prompts from [`UserAnswers`], and drives the simulated platform's
//! permission flow. Ends when the flow navigates away.

use std::sync::Arc;

use flow::{
    Collaborators, Destination, PermissionResume, RetrievalConfig, RetrievalOrchestrator,
    SubmissionFlowController, UiEvent,
};
use platform::{
    InMemoryConsentStore, SimulatedExposureKeyService, TracingDeviceStateRefresher,
    TracingErrorReporter, TracingSubmissionAnalytics,
};
use serde::Serialize;
use submission::{ResultCode, SubmissionMode, SubmissionModeReader, SubmissionModeRegistry};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, instrument, warn};

use crate::config::{PermissionAnswer, SessionConfig, UserAnswers};

/// What happened during one session, printed when the CLI exits.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub destination: Option<Destination>,
    pub submission_mode: SubmissionMode,
    pub fetch_calls: usize,
    pub enable_calls: usize,
    pub errors_reported: usize,
    pub mode_changes: Vec<SubmissionMode>,
}

/// The next thing the scripted user does.
enum Action {
    AnswerConsent(flow::ConsentResume),
    FinishPermissionFlow(PermissionResume),
    Idle,
}

/// Runs one submission session against a simulated platform.
#[instrument(skip_all)]
pub async fn run(session: &SessionConfig, retrieval: RetrievalConfig) -> SessionSummary {
    let service = Arc::new(SimulatedExposureKeyService::from_config(&session.platform));
    let consent = Arc::new(InMemoryConsentStore::new(session.consent_given));
    let errors = Arc::new(TracingErrorReporter::new());

    let (writer, reader) = SubmissionModeRegistry::channel(session.initial_mode);
    let scheduler = tokio::spawn(watch_mode(reader));

    let orchestrator = RetrievalOrchestrator::new(service.clone(), retrieval);
    let collaborators = Collaborators {
        consent,
        errors: errors.clone(),
        analytics: Arc::new(TracingSubmissionAnalytics::new()),
        device_state: Arc::new(TracingDeviceStateRefresher::new()),
    };
    let (controller, mut events) = SubmissionFlowController::new(orchestrator, collaborators, writer);

    let destination = drive(&controller, &mut events, &service, &session.user).await;
    let submission_mode = controller.submission_mode();
    drop(controller);

    let mode_changes = match scheduler.await {
        Ok(changes) => changes,
        Err(err) => {
            warn!(error = %err, "Mode watcher ended abnormally");
            Vec::new()
        }
    };

    SessionSummary {
        destination,
        submission_mode,
        fetch_calls: service.fetch_calls(),
        enable_calls: service.enable_calls(),
        errors_reported: errors.reports().len(),
        mode_changes,
    }
}

async fn drive(
    controller: &SubmissionFlowController,
    events: &mut UnboundedReceiver<UiEvent>,
    service: &SimulatedExposureKeyService,
    answers: &UserAnswers,
) -> Option<Destination> {
    let mut retries_left = answers.retries;
    controller.proceed().await;

    loop {
        let mut action = Action::Idle;
        while let Ok(event) = events.try_recv() {
            match event {
                UiEvent::ShowProgress(visible) => debug!(visible, "Progress indicator"),
                UiEvent::Navigate(destination) => {
                    info!(?destination, "Leaving submission screen");
                    return Some(destination);
                }
                UiEvent::PromptConsent(token) => action = Action::AnswerConsent(token),
                UiEvent::LaunchPermissionFlow(token) => {
                    action = Action::FinishPermissionFlow(token)
                }
                UiEvent::ConfirmClose => {
                    info!("Close requested; confirming");
                    controller.on_cancel_confirmed();
                }
            }
        }

        match action {
            Action::AnswerConsent(token) => {
                info!(accept = answers.accept_tracing, "Answering tracing prompt");
                controller
                    .resume_consent(token, answers.accept_tracing)
                    .await;
            }
            Action::FinishPermissionFlow(token) => {
                let result_code = match answers.permission {
                    PermissionAnswer::Grant => {
                        service.grant_access();
                        ResultCode::OK
                    }
                    PermissionAnswer::PlatformDenies => {
                        service.deny_access();
                        ResultCode::OK
                    }
                    PermissionAnswer::Cancel => ResultCode::CANCELED,
                };
                info!(answer = ?answers.permission, "Permission flow finished");
                controller
                    .handle_activity_result(
                        token.request_code().as_i32(),
                        result_code.as_i32(),
                        None,
                    )
                    .await;
            }
            Action::Idle if retries_left > 0 => {
                retries_left -= 1;
                info!(retries_left, "Retrieval failed; retrying");
                controller.proceed().await;
            }
            Action::Idle => {
                info!("Retrieval failed; giving up");
                controller.go_back();
            }
        }
    }
}

/// Stand-in for the background submission scheduler: records every mode it
/// observes until the controller goes away.
async fn watch_mode(mut reader: SubmissionModeReader) -> Vec<SubmissionMode> {
    let mut seen = Vec::new();
    while let Some(mode) = reader.changed().await {
        info!(%mode, "Background scheduler observed submission mode");
        seen.push(mode);
    }
    seen
}
