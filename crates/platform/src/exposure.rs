//! Simulated exposure-notification service.
//!
//! Models the parts of the platform the retrieval flow depends on: whether
//! tracing is switched on, whether this app may read the key history, and
//! transient failures. Used by the CLI and as a test double.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use submission::{ErrorKind, ExposureKey, ExposureKeyService, ServiceError};
use tracing::debug;

/// Whether the app may read the key history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyAccess {
    /// Reads succeed.
    Granted,
    /// Reads need the interactive permission flow first.
    #[default]
    NeedsResolution,
    /// Reads are refused outright.
    Denied,
}

/// Initial platform state, as loaded from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedPlatformConfig {
    /// Whether exposure tracing starts switched on.
    pub tracing_enabled: bool,
    /// Starting key access.
    pub access: KeyAccess,
    /// Failures returned by the next fetches, in order, before normal behaviour.
    pub failures: Vec<ErrorKind>,
    /// Number of keys in the simulated history.
    pub key_count: usize,
    /// Artificial delay applied to every call, in milliseconds.
    pub latency_ms: u64,
}

impl Default for SimulatedPlatformConfig {
    fn default() -> Self {
        Self {
            tracing_enabled: true,
            access: KeyAccess::NeedsResolution,
            failures: Vec::new(),
            key_count: 14,
            latency_ms: 0,
        }
    }
}

#[derive(Debug)]
struct PlatformState {
    tracing_enabled: bool,
    access: KeyAccess,
    failures: VecDeque<ErrorKind>,
}

/// In-process stand-in for the platform's exposure-notification API.
#[derive(Debug)]
pub struct SimulatedExposureKeyService {
    keys: Vec<ExposureKey>,
    latency: Duration,
    state: Mutex<PlatformState>,
    fetch_calls: AtomicUsize,
    enable_calls: AtomicUsize,
}

impl SimulatedExposureKeyService {
    /// Creates a service that hands out `keys` once tracing is on and access
    /// is granted.
    pub fn new(keys: Vec<ExposureKey>) -> Self {
        Self {
            keys,
            latency: Duration::ZERO,
            state: Mutex::new(PlatformState {
                tracing_enabled: true,
                access: KeyAccess::Granted,
                failures: VecDeque::new(),
            }),
            fetch_calls: AtomicUsize::new(0),
            enable_calls: AtomicUsize::new(0),
        }
    }

    /// Creates a service from configuration, generating `key_count` keys.
    pub fn from_config(config: &SimulatedPlatformConfig) -> Self {
        let keys = (0..config.key_count).map(generated_key).collect();
        Self::new(keys)
            .with_tracing_enabled(config.tracing_enabled)
            .with_access(config.access)
            .with_failures(config.failures.iter().cloned())
            .with_latency(Duration::from_millis(config.latency_ms))
    }

    /// Sets whether tracing starts switched on.
    pub fn with_tracing_enabled(self, enabled: bool) -> Self {
        self.lock_state().tracing_enabled = enabled;
        self
    }

    /// Sets the starting key access.
    pub fn with_access(self, access: KeyAccess) -> Self {
        self.lock_state().access = access;
        self
    }

    /// Queues failures for the next fetches.
    pub fn with_failures(self, failures: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.lock_state().failures.extend(failures);
        self
    }

    /// Delays every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Completes the interactive permission flow in the user's favour.
    pub fn grant_access(&self) {
        debug!("Simulated platform: key access granted");
        self.lock_state().access = KeyAccess::Granted;
    }

    /// Makes the platform refuse key access from now on.
    pub fn deny_access(&self) {
        debug!("Simulated platform: key access denied");
        self.lock_state().access = KeyAccess::Denied;
    }

    /// Number of `fetch_keys` calls so far.
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Number of `enable_tracing` calls so far.
    pub fn enable_calls(&self) -> usize {
        self.enable_calls.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, PlatformState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ExposureKeyService for SimulatedExposureKeyService {
    async fn fetch_keys(&self) -> Result<Vec<ExposureKey>, ServiceError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        let mut state = self.lock_state();
        if let Some(failure) = state.failures.pop_front() {
            debug!(%failure, "Simulated platform: injected failure");
            return Err(failure.into());
        }
        if !state.tracing_enabled {
            return Err(ServiceError::TracingDisabled);
        }
        match state.access {
            KeyAccess::Granted => Ok(self.keys.clone()),
            KeyAccess::NeedsResolution => Err(ServiceError::ResolutionRequired),
            KeyAccess::Denied => Err(ServiceError::AccessDenied),
        }
    }

    async fn enable_tracing(&self) -> Result<(), ServiceError> {
        self.enable_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.lock_state().tracing_enabled = true;
        debug!("Simulated platform: tracing enabled");
        Ok(())
    }
}

/// Builds a deterministic key for slot `index`: one key per day, counting back.
pub fn generated_key(index: usize) -> ExposureKey {
    const BASE_INTERVAL: u32 = 2_700_000;
    const INTERVALS_PER_DAY: u32 = 144;

    let day = u32::try_from(index).unwrap_or(u32::MAX);
    let mut key_data = vec![0u8; 16];
    for (i, byte) in key_data.iter_mut().enumerate() {
        *byte = (index as u8).wrapping_mul(31).wrapping_add(i as u8);
    }
    ExposureKey {
        key_data,
        rolling_start_interval_number: BASE_INTERVAL
            .saturating_sub(day.saturating_mul(INTERVALS_PER_DAY)),
        rolling_period: INTERVALS_PER_DAY,
        transmission_risk_level: (index % 8) as u8 + 1,
    }
}
