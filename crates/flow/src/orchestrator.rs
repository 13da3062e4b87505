//! The TEK retrieval orchestrator.
//!
//! Drives one retrieval attempt at a time through
//! `fetch → (consent | permission)? → fetch → terminal outcome`.
//!
//! ## State machine
//!
//! | From | Trigger | To |
//! |------|---------|----|
//! | `Idle` / `Done` | `start()` | `Retrieving` |
//! | `Retrieving` | keys | `Done` (`KeysAvailable`) |
//! | `Retrieving` | tracing disabled | `AwaitingConsent` (`ConsentRequired`) |
//! | `Retrieving` | resolution required | `AwaitingPermission` (`PermissionRequired`) |
//! | `Retrieving` | access denied | `Done` (`PermissionDeclined`) |
//! | `Retrieving` | failure / timeout | `Done` (`Failed`) |
//! | `AwaitingConsent` | consent given | `Retrieving` |
//! | `AwaitingConsent` | consent refused | `Done` (`PermissionDeclined`) |
//! | `AwaitingPermission` | result `OK` | `Retrieving` |
//! | `AwaitingPermission` | result `CANCELED` | `Done` (`PermissionDeclined`) |
//! | `AwaitingPermission` | any other result | `Done` (`Failed`) |
//!
//! Calls that match no pending step return `None` and leave the state alone.
//!
//! Every permission flow gets its own request code, counting up from the
//! configured base, so a duplicated result from an earlier flow cannot
//! complete a later one.
//! The state lock is never held across an `.await`; while awaiting the user
//! the orchestrator holds nothing and does no work.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use submission::{
    ActivityResult, AttemptId, ErrorKind, ExposureKeyService, RequestCode, ResultCode,
    ServiceError,
};
use tracing::{debug, info, instrument, warn};

use crate::snapshot::{OrchestratorSnapshot, PendingStep};
use crate::{ConsentResume, PermissionResume, RetrievalConfig, RetrievalOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OrchestratorState {
    Idle,
    Retrieving {
        attempt: AttemptId,
    },
    AwaitingConsent {
        attempt: AttemptId,
    },
    AwaitingPermission {
        attempt: AttemptId,
        request_code: RequestCode,
    },
    Done,
}

impl From<PendingStep> for OrchestratorState {
    fn from(step: PendingStep) -> Self {
        match step {
            PendingStep::Idle => OrchestratorState::Idle,
            PendingStep::AwaitingConsent { attempt } => {
                OrchestratorState::AwaitingConsent { attempt }
            }
            PendingStep::AwaitingPermission {
                attempt,
                request_code,
            } => OrchestratorState::AwaitingPermission {
                attempt,
                request_code,
            },
            PendingStep::Done => OrchestratorState::Done,
        }
    }
}

impl From<OrchestratorState> for PendingStep {
    fn from(state: OrchestratorState) -> Self {
        match state {
            OrchestratorState::Idle | OrchestratorState::Retrieving { .. } => PendingStep::Idle,
            OrchestratorState::AwaitingConsent { attempt } => {
                PendingStep::AwaitingConsent { attempt }
            }
            OrchestratorState::AwaitingPermission {
                attempt,
                request_code,
            } => PendingStep::AwaitingPermission {
                attempt,
                request_code,
            },
            OrchestratorState::Done => PendingStep::Done,
        }
    }
}

/// Number of distinct request codes handed out before they repeat.
const REQUEST_CODE_WINDOW: u32 = 256;

/// Which interaction the current fetch follows, if any.
///
/// A platform that asks for the same interaction again right after it was
/// granted is misbehaving; that ends the attempt instead of looping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchCause {
    Start,
    ConsentGiven,
    PermissionGranted,
}

/// Retrieves keys from the platform service on behalf of one UI session.
pub struct RetrievalOrchestrator {
    service: Arc<dyn ExposureKeyService>,
    config: RetrievalConfig,
    state: Mutex<OrchestratorState>,
    permission_flows: AtomicU32,
}

impl RetrievalOrchestrator {
    /// Creates an idle orchestrator.
    pub fn new(service: Arc<dyn ExposureKeyService>, config: RetrievalConfig) -> Self {
        Self {
            service,
            config,
            state: Mutex::new(OrchestratorState::Idle),
            permission_flows: AtomicU32::new(0),
        }
    }

    /// Rebuilds an orchestrator from a snapshot taken before the hosting
    /// process was torn down. Tokens issued before the snapshot stay valid.
    pub fn restore(
        service: Arc<dyn ExposureKeyService>,
        config: RetrievalConfig,
        snapshot: &OrchestratorSnapshot,
    ) -> Self {
        debug!(step = ?snapshot.step, saved_at = %snapshot.saved_at, "Restoring retrieval orchestrator");
        Self {
            service,
            config,
            state: Mutex::new(snapshot.step.into()),
            permission_flows: AtomicU32::new(snapshot.permission_flows),
        }
    }

    /// Captures the current state for persistence.
    pub fn snapshot(&self) -> OrchestratorSnapshot {
        let state = self.lock_state();
        OrchestratorSnapshot::new(
            (*state).into(),
            self.permission_flows.load(Ordering::SeqCst),
        )
    }

    /// Returns `true` while a platform call is in flight. Its outcome is
    /// still to come.
    pub fn is_retrieving(&self) -> bool {
        matches!(*self.lock_state(), OrchestratorState::Retrieving { .. })
    }

    /// Returns the request code of the pending permission flow, if any.
    pub fn pending_permission(&self) -> Option<RequestCode> {
        match *self.lock_state() {
            OrchestratorState::AwaitingPermission { request_code, .. } => Some(request_code),
            _ => None,
        }
    }

    /// Starts a retrieval attempt.
    ///
    /// Returns `None` if a fetch is already in flight. While a consent prompt
    /// or permission flow is pending, the pending outcome is returned again
    /// with the same token and nothing is fetched.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Option<RetrievalOutcome> {
        let attempt = {
            let mut state = self.lock_state();
            let current = *state;
            match current {
                OrchestratorState::Retrieving { attempt } => {
                    warn!(%attempt, "Retrieval already in flight; start rejected");
                    return None;
                }
                OrchestratorState::AwaitingConsent { attempt } => {
                    debug!(%attempt, "Consent prompt still pending; re-issuing it");
                    return Some(RetrievalOutcome::ConsentRequired(ConsentResume::new(
                        attempt,
                    )));
                }
                OrchestratorState::AwaitingPermission {
                    attempt,
                    request_code,
                } => {
                    debug!(%attempt, "Permission flow still pending; re-issuing it");
                    return Some(RetrievalOutcome::PermissionRequired(
                        PermissionResume::new(attempt, request_code),
                    ));
                }
                OrchestratorState::Idle | OrchestratorState::Done => {
                    let attempt = AttemptId::new_random();
                    *state = OrchestratorState::Retrieving { attempt };
                    attempt
                }
            }
        };

        Some(self.retrieve(attempt, FetchCause::Start).await)
    }

    /// Delivers the user's answer to a consent prompt.
    ///
    /// `false` declines without touching the platform. `true` enables tracing
    /// and fetches once more.
    #[instrument(skip(self, token), fields(attempt = %token.attempt()))]
    pub async fn resume_consent(
        &self,
        token: ConsentResume,
        given: bool,
    ) -> Option<RetrievalOutcome> {
        let attempt = token.attempt();
        {
            let mut state = self.lock_state();
            let current = *state;
            match current {
                OrchestratorState::AwaitingConsent { attempt: pending } if pending == attempt => {
                    if !given {
                        info!("Tracing consent refused");
                        *state = OrchestratorState::Done;
                        return Some(RetrievalOutcome::PermissionDeclined);
                    }
                    *state = OrchestratorState::Retrieving { attempt };
                }
                _ => {
                    warn!(state = ?current, "Consent answer matches no pending prompt; ignored");
                    return None;
                }
            }
        }

        if let Err(err) = self.bounded(self.service.enable_tracing()).await {
            let kind = terminal_kind(err, "tracing could not be enabled after consent");
            *self.lock_state() = OrchestratorState::Done;
            return Some(RetrievalOutcome::Failed(kind));
        }

        Some(self.retrieve(attempt, FetchCause::ConsentGiven).await)
    }

    /// Delivers the permission flow result for the attempt named by `token`.
    #[instrument(skip(self, token, result), fields(attempt = %token.attempt()))]
    pub async fn resume_permission(
        &self,
        token: PermissionResume,
        result: ActivityResult,
    ) -> Option<RetrievalOutcome> {
        if result.request_code != token.request_code() {
            warn!(
                expected = %token.request_code(),
                received = %result.request_code,
                "Activity result does not belong to this token; ignored"
            );
            return None;
        }
        self.complete_permission(Some(token.attempt()), result).await
    }

    /// Delivers a raw activity result from the host.
    ///
    /// Results are matched on request code, which is unique per flow; anything
    /// that does not match the pending flow (including duplicates and results
    /// from earlier attempts) returns `None`.
    #[instrument(skip(self, result), fields(request_code = %result.request_code, result_code = %result.result_code))]
    pub async fn handle_activity_result(&self, result: ActivityResult) -> Option<RetrievalOutcome> {
        self.complete_permission(None, result).await
    }

    async fn complete_permission(
        &self,
        expected: Option<AttemptId>,
        result: ActivityResult,
    ) -> Option<RetrievalOutcome> {
        let attempt = {
            let mut state = self.lock_state();
            let current = *state;
            let OrchestratorState::AwaitingPermission {
                attempt,
                request_code,
            } = current
            else {
                debug!(state = ?current, "No permission flow pending; activity result ignored");
                return None;
            };
            if result.request_code != request_code || expected.is_some_and(|e| e != attempt) {
                debug!(%attempt, pending = %request_code, "Activity result is stale; ignored");
                return None;
            }

            if result.result_code == ResultCode::OK {
                *state = OrchestratorState::Retrieving { attempt };
                attempt
            } else if result.result_code == ResultCode::CANCELED {
                info!(%attempt, "Key access permission declined");
                *state = OrchestratorState::Done;
                return Some(RetrievalOutcome::PermissionDeclined);
            } else {
                *state = OrchestratorState::Done;
                return Some(RetrievalOutcome::Failed(ErrorKind::UnexpectedResult {
                    detail: format!("permission flow returned result code {}", result.result_code),
                }));
            }
        };

        Some(self.retrieve(attempt, FetchCause::PermissionGranted).await)
    }

    async fn retrieve(&self, attempt: AttemptId, cause: FetchCause) -> RetrievalOutcome {
        debug!(%attempt, ?cause, "Fetching exposure keys");
        let fetched = self.bounded(self.service.fetch_keys()).await;

        let mut state = self.lock_state();
        let (next, outcome) = match fetched {
            Ok(keys) => {
                debug!(%attempt, count = keys.len(), "Exposure keys retrieved");
                (
                    OrchestratorState::Done,
                    RetrievalOutcome::KeysAvailable(keys),
                )
            }
            Err(ServiceError::AccessDenied) => {
                info!(%attempt, "Platform denied access to the key history");
                (OrchestratorState::Done, RetrievalOutcome::PermissionDeclined)
            }
            Err(ServiceError::TracingDisabled) if cause != FetchCause::ConsentGiven => (
                OrchestratorState::AwaitingConsent { attempt },
                RetrievalOutcome::ConsentRequired(ConsentResume::new(attempt)),
            ),
            Err(ServiceError::ResolutionRequired) if cause != FetchCause::PermissionGranted => {
                let request_code = self.next_request_code();
                debug!(%attempt, %request_code, "Permission flow required");
                (
                    OrchestratorState::AwaitingPermission {
                        attempt,
                        request_code,
                    },
                    RetrievalOutcome::PermissionRequired(PermissionResume::new(
                        attempt,
                        request_code,
                    )),
                )
            }
            Err(err) => (
                OrchestratorState::Done,
                RetrievalOutcome::Failed(terminal_kind(err, "platform repeated its request")),
            ),
        };
        *state = next;
        outcome
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, ServiceError>>,
    {
        match tokio::time::timeout(self.config.fetch_timeout(), call).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::Failed(ErrorKind::Timeout)),
        }
    }

    fn next_request_code(&self) -> RequestCode {
        let flow = self.permission_flows.fetch_add(1, Ordering::SeqCst) % REQUEST_CODE_WINDOW;
        let base = self.config.permission_request_code.as_i32();
        RequestCode::new(base.wrapping_add_unsigned(flow))
    }

    fn lock_state(&self) -> MutexGuard<'_, OrchestratorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Maps a service error that cannot be routed any further to its terminal kind.
fn terminal_kind(err: ServiceError, context: &str) -> ErrorKind {
    match err {
        ServiceError::Failed(kind) => kind,
        ServiceError::TracingDisabled
        | ServiceError::ResolutionRequired
        | ServiceError::AccessDenied => {
            ErrorKind::UnexpectedResult {
                detail: format!("{context}: {err}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;
    use submission::ExposureKey;
    use tokio::sync::Notify;

    use super::*;

    // -----------------------------------------------------------------------
    // Fakes
    // -----------------------------------------------------------------------

    #[derive(Default)]
    struct FakeService {
        responses: Mutex<VecDeque<Result<Vec<ExposureKey>, ServiceError>>>,
        enable_result: Mutex<Option<ServiceError>>,
        fetches: AtomicUsize,
        enables: AtomicUsize,
        gate: Option<Arc<Notify>>,
        enable_delay: Option<Duration>,
    }

    impl FakeService {
        fn scripted(responses: Vec<Result<Vec<ExposureKey>, ServiceError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                ..Self::default()
            }
        }

        fn gated(mut self, gate: Arc<Notify>) -> Self {
            self.gate = Some(gate);
            self
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ExposureKeyService for FakeService {
        async fn fetch_keys(&self) -> Result<Vec<ExposureKey>, ServiceError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.responses
                .lock()
                .expect("lock")
                .pop_front()
                .unwrap_or_else(|| {
                    Err(ServiceError::Failed(ErrorKind::Unknown {
                        cause: "script exhausted".to_string(),
                    }))
                })
        }

        async fn enable_tracing(&self) -> Result<(), ServiceError> {
            self.enables.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.enable_delay {
                tokio::time::sleep(delay).await;
            }
            match self.enable_result.lock().expect("lock").take() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    fn key(byte: u8) -> ExposureKey {
        ExposureKey {
            key_data: vec![byte; 16],
            rolling_start_interval_number: 2_650_000,
            rolling_period: 144,
            transmission_risk_level: 3,
        }
    }

    fn orchestrator(service: &Arc<FakeService>) -> RetrievalOrchestrator {
        RetrievalOrchestrator::new(service.clone(), RetrievalConfig::default())
    }

    fn ok_result(request_code: RequestCode) -> ActivityResult {
        ActivityResult::new(request_code.as_i32(), ResultCode::OK.as_i32(), None)
    }

    // -----------------------------------------------------------------------
    // start()
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_start_returns_keys_on_direct_success() {
        let service = Arc::new(FakeService::scripted(vec![Ok(vec![key(1), key(2)])]));
        let orch = orchestrator(&service);

        let outcome = orch.start().await;

        assert_eq!(
            outcome,
            Some(RetrievalOutcome::KeysAvailable(vec![key(1), key(2)]))
        );
        assert_eq!(service.fetches(), 1);
        assert_eq!(orch.snapshot().step, PendingStep::Done);
    }

    #[tokio::test]
    async fn test_start_after_done_begins_new_attempt() {
        let service = Arc::new(FakeService::scripted(vec![
            Err(ErrorKind::PlatformUnavailable.into()),
            Ok(vec![key(1)]),
        ]));
        let orch = orchestrator(&service);

        assert_eq!(
            orch.start().await,
            Some(RetrievalOutcome::Failed(ErrorKind::PlatformUnavailable))
        );
        assert_eq!(
            orch.start().await,
            Some(RetrievalOutcome::KeysAvailable(vec![key(1)]))
        );
        assert_eq!(service.fetches(), 2);
    }

    #[tokio::test]
    async fn test_start_while_retrieving_is_rejected() {
        let gate = Arc::new(Notify::new());
        let service = Arc::new(
            FakeService::scripted(vec![Ok(vec![key(1)])]).gated(gate.clone()),
        );
        let orch = Arc::new(orchestrator(&service));

        let first = tokio::spawn({
            let orch = orch.clone();
            async move { orch.start().await }
        });
        while service.fetches() == 0 {
            tokio::task::yield_now().await;
        }

        assert_eq!(orch.start().await, None);

        gate.notify_one();
        let outcome = first.await.expect("join");
        assert_eq!(outcome, Some(RetrievalOutcome::KeysAvailable(vec![key(1)])));
        assert_eq!(service.fetches(), 1);
    }

    #[tokio::test]
    async fn test_start_while_awaiting_consent_reissues_same_token() {
        let service = Arc::new(FakeService::scripted(vec![Err(ServiceError::TracingDisabled)]));
        let orch = orchestrator(&service);

        let Some(RetrievalOutcome::ConsentRequired(first)) = orch.start().await else {
            panic!("expected consent prompt");
        };
        let Some(RetrievalOutcome::ConsentRequired(second)) = orch.start().await else {
            panic!("expected consent prompt again");
        };

        assert_eq!(first, second);
        assert_eq!(service.fetches(), 1);
    }

    #[tokio::test]
    async fn test_fetch_timeout_fails_attempt() {
        let gate = Arc::new(Notify::new());
        let service = Arc::new(FakeService::scripted(Vec::new()).gated(gate));
        let config = RetrievalConfig {
            fetch_timeout_ms: 20,
            ..RetrievalConfig::default()
        };
        let orch = RetrievalOrchestrator::new(service.clone(), config);

        assert_eq!(
            orch.start().await,
            Some(RetrievalOutcome::Failed(ErrorKind::Timeout))
        );
        assert_eq!(orch.snapshot().step, PendingStep::Done);
    }

    // -----------------------------------------------------------------------
    // Consent
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_consent_given_enables_tracing_and_fetches_once() {
        let service = Arc::new(FakeService::scripted(vec![
            Err(ServiceError::TracingDisabled),
            Ok(vec![key(7)]),
        ]));
        let orch = orchestrator(&service);

        let Some(RetrievalOutcome::ConsentRequired(token)) = orch.start().await else {
            panic!("expected consent prompt");
        };
        let outcome = orch.resume_consent(token, true).await;

        assert_eq!(outcome, Some(RetrievalOutcome::KeysAvailable(vec![key(7)])));
        assert_eq!(service.enables.load(Ordering::SeqCst), 1);
        assert_eq!(service.fetches(), 2);
    }

    #[tokio::test]
    async fn test_consent_refused_declines_without_fetch() {
        let service = Arc::new(FakeService::scripted(vec![Err(ServiceError::TracingDisabled)]));
        let orch = orchestrator(&service);

        let Some(RetrievalOutcome::ConsentRequired(token)) = orch.start().await else {
            panic!("expected consent prompt");
        };
        let outcome = orch.resume_consent(token, false).await;

        assert_eq!(outcome, Some(RetrievalOutcome::PermissionDeclined));
        assert_eq!(service.fetches(), 1);
        assert_eq!(service.enables.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_duplicate_consent_answer_is_ignored() {
        let service = Arc::new(FakeService::scripted(vec![
            Err(ServiceError::TracingDisabled),
            Ok(vec![key(1)]),
        ]));
        let orch = orchestrator(&service);

        let Some(RetrievalOutcome::ConsentRequired(token)) = orch.start().await else {
            panic!("expected consent prompt");
        };
        let attempt = token.attempt();
        assert!(orch.resume_consent(token, true).await.is_some());

        let replay = ConsentResume::new(attempt);
        assert_eq!(orch.resume_consent(replay, true).await, None);
        assert_eq!(service.fetches(), 2);
    }

    #[tokio::test]
    async fn test_tracing_still_disabled_after_consent_fails() {
        let service = Arc::new(FakeService::scripted(vec![
            Err(ServiceError::TracingDisabled),
            Err(ServiceError::TracingDisabled),
        ]));
        let orch = orchestrator(&service);

        let Some(RetrievalOutcome::ConsentRequired(token)) = orch.start().await else {
            panic!("expected consent prompt");
        };
        let outcome = orch.resume_consent(token, true).await;

        assert!(matches!(
            outcome,
            Some(RetrievalOutcome::Failed(ErrorKind::UnexpectedResult { .. }))
        ));
    }

    #[tokio::test]
    async fn test_enable_tracing_failure_fails_attempt() {
        let service = Arc::new(FakeService::scripted(vec![Err(ServiceError::TracingDisabled)]));
        *service.enable_result.lock().expect("lock") =
            Some(ServiceError::Failed(ErrorKind::Revoked));
        let orch = orchestrator(&service);

        let Some(RetrievalOutcome::ConsentRequired(token)) = orch.start().await else {
            panic!("expected consent prompt");
        };

        assert_eq!(
            orch.resume_consent(token, true).await,
            Some(RetrievalOutcome::Failed(ErrorKind::Revoked))
        );
        assert_eq!(service.fetches(), 1);
    }

    #[tokio::test]
    async fn test_slow_enable_tracing_times_out() {
        let service = Arc::new(FakeService {
            enable_delay: Some(Duration::from_millis(500)),
            ..FakeService::scripted(vec![Err(ServiceError::TracingDisabled)])
        });
        let config = RetrievalConfig {
            fetch_timeout_ms: 20,
            ..RetrievalConfig::default()
        };
        let orch = RetrievalOrchestrator::new(service.clone(), config);

        let Some(RetrievalOutcome::ConsentRequired(token)) = orch.start().await else {
            panic!("expected consent prompt");
        };

        assert_eq!(
            orch.resume_consent(token, true).await,
            Some(RetrievalOutcome::Failed(ErrorKind::Timeout))
        );
        assert_eq!(service.fetches(), 1);
        assert_eq!(orch.snapshot().step, PendingStep::Done);
    }

    // -----------------------------------------------------------------------
    // Permission
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_permission_granted_retries_fetch() {
        let service = Arc::new(FakeService::scripted(vec![
            Err(ServiceError::ResolutionRequired),
            Ok(vec![key(3)]),
        ]));
        let orch = orchestrator(&service);

        let Some(RetrievalOutcome::PermissionRequired(token)) = orch.start().await else {
            panic!("expected permission request");
        };
        let code = token.request_code();
        assert_eq!(orch.pending_permission(), Some(code));

        let outcome = orch.resume_permission(token, ok_result(code)).await;

        assert_eq!(outcome, Some(RetrievalOutcome::KeysAvailable(vec![key(3)])));
        assert_eq!(orch.pending_permission(), None);
    }

    #[tokio::test]
    async fn test_permission_canceled_declines() {
        let service = Arc::new(FakeService::scripted(vec![Err(ServiceError::ResolutionRequired)]));
        let orch = orchestrator(&service);
        assert!(orch.start().await.is_some());

        let code = orch.pending_permission().expect("pending");
        let result = ActivityResult::new(code.as_i32(), ResultCode::CANCELED.as_i32(), None);

        assert_eq!(
            orch.handle_activity_result(result).await,
            Some(RetrievalOutcome::PermissionDeclined)
        );
        assert_eq!(service.fetches(), 1);
    }

    #[tokio::test]
    async fn test_unknown_result_code_fails_attempt() {
        let service = Arc::new(FakeService::scripted(vec![Err(ServiceError::ResolutionRequired)]));
        let orch = orchestrator(&service);
        assert!(orch.start().await.is_some());

        let code = orch.pending_permission().expect("pending");
        let outcome = orch
            .handle_activity_result(ActivityResult::new(code.as_i32(), 7, None))
            .await;

        assert!(matches!(
            outcome,
            Some(RetrievalOutcome::Failed(ErrorKind::UnexpectedResult { .. }))
        ));
    }

    #[tokio::test]
    async fn test_foreign_request_code_is_ignored() {
        let service = Arc::new(FakeService::scripted(vec![Err(ServiceError::ResolutionRequired)]));
        let orch = orchestrator(&service);
        assert!(orch.start().await.is_some());

        let outcome = orch
            .handle_activity_result(ActivityResult::new(1, ResultCode::OK.as_i32(), None))
            .await;

        assert_eq!(outcome, None);
        assert!(orch.pending_permission().is_some());
        assert_eq!(service.fetches(), 1);
    }

    #[tokio::test]
    async fn test_each_permission_flow_gets_its_own_request_code() {
        let service = Arc::new(FakeService::scripted(vec![
            Err(ServiceError::ResolutionRequired),
            Err(ServiceError::ResolutionRequired),
        ]));
        let orch = orchestrator(&service);
        let base = RetrievalConfig::default().permission_request_code;

        assert!(orch.start().await.is_some());
        assert_eq!(orch.pending_permission(), Some(base));
        let canceled =
            ActivityResult::new(base.as_i32(), ResultCode::CANCELED.as_i32(), None);
        assert_eq!(
            orch.handle_activity_result(canceled.clone()).await,
            Some(RetrievalOutcome::PermissionDeclined)
        );

        let Some(RetrievalOutcome::PermissionRequired(second)) = orch.start().await else {
            panic!("expected a second permission request");
        };
        assert_eq!(second.request_code(), RequestCode::new(base.as_i32() + 1));

        // The first flow's result delivered again must not settle the second.
        assert_eq!(orch.handle_activity_result(canceled).await, None);
        assert_eq!(orch.pending_permission(), Some(second.request_code()));
        assert_eq!(service.fetches(), 2);
    }

    #[tokio::test]
    async fn test_restored_orchestrator_continues_request_codes() {
        let service = Arc::new(FakeService::scripted(vec![
            Err(ServiceError::ResolutionRequired),
            Err(ServiceError::ResolutionRequired),
        ]));
        let orch = orchestrator(&service);
        let base = RetrievalConfig::default().permission_request_code;
        assert!(orch.start().await.is_some());
        let canceled =
            ActivityResult::new(base.as_i32(), ResultCode::CANCELED.as_i32(), None);
        assert!(orch.handle_activity_result(canceled.clone()).await.is_some());

        let snapshot = orch.snapshot();
        assert_eq!(snapshot.permission_flows, 1);
        let restored =
            RetrievalOrchestrator::restore(service.clone(), RetrievalConfig::default(), &snapshot);

        assert!(restored.start().await.is_some());
        assert_eq!(
            restored.pending_permission(),
            Some(RequestCode::new(base.as_i32() + 1))
        );
        assert_eq!(restored.handle_activity_result(canceled).await, None);
    }

    #[tokio::test]
    async fn test_activity_result_without_pending_flow_is_ignored() {
        let service = Arc::new(FakeService::scripted(Vec::new()));
        let orch = orchestrator(&service);

        let outcome = orch
            .handle_activity_result(ok_result(RetrievalConfig::default().permission_request_code))
            .await;

        assert_eq!(outcome, None);
        assert_eq!(service.fetches(), 0);
        assert_eq!(orch.snapshot().step, PendingStep::Idle);
    }

    #[tokio::test]
    async fn test_access_denied_after_grant_declines() {
        let service = Arc::new(FakeService::scripted(vec![
            Err(ServiceError::ResolutionRequired),
            Err(ServiceError::AccessDenied),
        ]));
        let orch = orchestrator(&service);

        let Some(RetrievalOutcome::PermissionRequired(token)) = orch.start().await else {
            panic!("expected permission request");
        };
        let code = token.request_code();

        assert_eq!(
            orch.resume_permission(token, ok_result(code)).await,
            Some(RetrievalOutcome::PermissionDeclined)
        );
        assert_eq!(orch.snapshot().step, PendingStep::Done);
    }

    #[tokio::test]
    async fn test_resolution_required_again_after_grant_fails() {
        let service = Arc::new(FakeService::scripted(vec![
            Err(ServiceError::ResolutionRequired),
            Err(ServiceError::ResolutionRequired),
        ]));
        let orch = orchestrator(&service);

        let Some(RetrievalOutcome::PermissionRequired(token)) = orch.start().await else {
            panic!("expected permission request");
        };
        let code = token.request_code();
        let outcome = orch.resume_permission(token, ok_result(code)).await;

        assert!(matches!(
            outcome,
            Some(RetrievalOutcome::Failed(ErrorKind::UnexpectedResult { .. }))
        ));
        assert_eq!(service.fetches(), 2);
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_restored_orchestrator_accepts_pre_teardown_token() {
        let service = Arc::new(FakeService::scripted(vec![
            Err(ServiceError::ResolutionRequired),
            Ok(vec![key(9)]),
        ]));
        let orch = orchestrator(&service);
        let Some(RetrievalOutcome::PermissionRequired(token)) = orch.start().await else {
            panic!("expected permission request");
        };
        let persisted = orch.snapshot().to_json().expect("encode");
        let token_json = serde_json::to_string(&token).expect("encode token");
        drop(orch);

        let snapshot = OrchestratorSnapshot::from_json(&persisted).expect("decode");
        let restored =
            RetrievalOrchestrator::restore(service.clone(), RetrievalConfig::default(), &snapshot);
        let token: PermissionResume = serde_json::from_str(&token_json).expect("decode token");
        let code = token.request_code();

        assert_eq!(
            restored.resume_permission(token, ok_result(code)).await,
            Some(RetrievalOutcome::KeysAvailable(vec![key(9)]))
        );
    }

    #[tokio::test]
    async fn test_snapshot_while_retrieving_records_idle() {
        let gate = Arc::new(Notify::new());
        let service = Arc::new(
            FakeService::scripted(vec![Ok(vec![key(1)])]).gated(gate.clone()),
        );
        let orch = Arc::new(orchestrator(&service));

        let running = tokio::spawn({
            let orch = orch.clone();
            async move { orch.start().await }
        });
        while service.fetches() == 0 {
            tokio::task::yield_now().await;
        }

        assert!(orch.is_retrieving());
        assert_eq!(orch.snapshot().step, PendingStep::Idle);

        gate.notify_one();
        assert!(running.await.expect("join").is_some());
    }
}
