//! In-memory consent store.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use submission::ConsentStore;
use tokio::sync::watch;
use tracing::debug;

/// Holds the consent flag in a watch channel so the presentation layer can
/// follow changes.
#[derive(Debug)]
pub struct InMemoryConsentStore {
    tx: watch::Sender<bool>,
    reads: AtomicUsize,
}

impl InMemoryConsentStore {
    /// Creates a store holding `given`.
    pub fn new(given: bool) -> Self {
        let (tx, _rx) = watch::channel(given);
        Self {
            tx,
            reads: AtomicUsize::new(0),
        }
    }

    /// Records a new consent decision.
    pub fn set(&self, given: bool) {
        let previous = self.tx.send_replace(given);
        if previous != given {
            debug!(given, "Consent to submit changed");
        }
    }

    /// Number of [`ConsentStore::has_given_consent`] calls so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConsentStore for InMemoryConsentStore {
    async fn has_given_consent(&self) -> bool {
        self.reads.fetch_add(1, Ordering::SeqCst);
        *self.tx.borrow()
    }

    fn observe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
