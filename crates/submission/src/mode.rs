//! The submission mode registry.
//!
//! A single [`SubmissionMode`] cell shared between the flow controller (the
//! only writer) and the background scheduler (any number of readers). The
//! writer half is deliberately not `Clone`.

use tokio::sync::watch;
use tracing::info;

use crate::SubmissionMode;

/// Constructor for the writer/reader pair.
pub struct SubmissionModeRegistry;

impl SubmissionModeRegistry {
    /// Creates a registry holding `initial` and returns its two halves.
    pub fn channel(initial: SubmissionMode) -> (SubmissionModeWriter, SubmissionModeReader) {
        let (tx, rx) = watch::channel(initial);
        (SubmissionModeWriter { tx }, SubmissionModeReader { rx })
    }
}

/// Exclusive write access to the submission mode.
#[derive(Debug)]
pub struct SubmissionModeWriter {
    tx: watch::Sender<SubmissionMode>,
}

impl SubmissionModeWriter {
    /// Replaces the mode in one step and returns the previous value.
    ///
    /// Succeeds whether or not any reader is still alive.
    pub fn set(&self, mode: SubmissionMode) -> SubmissionMode {
        let previous = self.tx.send_replace(mode);
        if previous != mode {
            info!(%previous, current = %mode, "Submission mode updated");
        }
        previous
    }

    /// Returns the current mode.
    pub fn current(&self) -> SubmissionMode {
        *self.tx.borrow()
    }
}

/// Shared read access to the submission mode.
#[derive(Debug, Clone)]
pub struct SubmissionModeReader {
    rx: watch::Receiver<SubmissionMode>,
}

impl SubmissionModeReader {
    /// Returns the current mode.
    pub fn current(&self) -> SubmissionMode {
        *self.rx.borrow()
    }

    /// Waits for the next mode change and returns the new value.
    ///
    /// Returns `None` once the writer has been dropped.
    pub async fn changed(&mut self) -> Option<SubmissionMode> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }
}
