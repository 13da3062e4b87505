//! TEK retrieval orchestration and the submission flow controller.
//!
//! The [`RetrievalOrchestrator`] drives the platform service through
//! retrieval, consent and permission steps and reports exactly one
//! [`RetrievalOutcome`] per step. The [`SubmissionFlowController`] consumes
//! those outcomes, updates the submission mode, and emits [`UiEvent`]s.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** This crate sequences calls between the domain
//! types in [`submission`] and the collaborator ports it defines. It contains
//! no platform code of its own.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`orchestrator`] | Retrieval state machine |
//! | [`outcome`] | `RetrievalOutcome` and resume tokens |
//! | [`snapshot`] | Persistable orchestrator state |
//! | [`controller`] | Submission flow controller |
//! | [`events`] | UI events and destinations |
//! | [`config`] | Retrieval configuration |
//! | [`errors`] | Configuration and snapshot errors |

pub mod config;
pub mod controller;
pub mod errors;
pub mod events;
pub mod orchestrator;
pub mod outcome;
pub mod snapshot;

pub use config::RetrievalConfig;
pub use controller::{Collaborators, SubmissionFlowController, CONTROLLER_LABEL};
pub use errors::FlowError;
pub use events::{Destination, UiEvent};
pub use orchestrator::RetrievalOrchestrator;
pub use outcome::{ConsentResume, PermissionResume, RetrievalOutcome};
pub use snapshot::{OrchestratorSnapshot, PendingStep};
