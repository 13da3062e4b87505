//! Infrastructure adapters for TEK submission.
//!
//! Implements the port traits defined in the [`submission`] crate:
//!
//! - [`SimulatedExposureKeyService`]: an in-process exposure-notification
//!   service with switchable tracing, key access, latency and injected
//!   failures.
//! - [`InMemoryConsentStore`]: consent flag in a watch channel.
//! - [`TracingErrorReporter`], [`TracingSubmissionAnalytics`],
//!   [`TracingDeviceStateRefresher`]: reporters that write `tracing` events.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain flow rules. The
//! [`submission`] crate sees only its own traits.

pub mod consent;
pub mod exposure;
pub mod reporting;

pub use consent::InMemoryConsentStore;
pub use exposure::{generated_key, KeyAccess, SimulatedExposureKeyService, SimulatedPlatformConfig};
pub use reporting::{
    ErrorReport, TracingDeviceStateRefresher, TracingErrorReporter, TracingSubmissionAnalytics,
};
