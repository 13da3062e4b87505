//! Domain types and port definitions for TEK submission.
//!
//! This crate contains the key and mode types, newtype identifiers, the error
//! taxonomy, and the traits every collaborator of the retrieval flow must
//! implement. Infrastructure crates implement the traits defined here; they
//! never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business types + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`RequestCode`, `ResultCode`, `AttemptId`) |
//! | [`types`] | Shared value types (`ExposureKey`, `SubmissionMode`, `ActivityResult`, `Timestamp`) |
//! | [`errors`] | Failure taxonomy and service adapter errors |
//! | [`ports`] | Collaborator traits (`ExposureKeyService`, `ConsentStore`, ...) |
//! | [`mode`] | The single-writer submission mode registry |

pub mod errors;
pub mod identifiers;
pub mod mode;
pub mod ports;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use errors::{ErrorCategory, ErrorKind, ServiceError};
pub use identifiers::{AttemptId, RequestCode, ResultCode};
pub use mode::{SubmissionModeReader, SubmissionModeRegistry, SubmissionModeWriter};
pub use ports::{
    ConsentStore, DeviceStateRefresher, ErrorReporter, ExposureKeyService, SubmissionAnalytics,
};
pub use types::{ActivityResult, ExposureKey, SubmissionMode, Timestamp};
