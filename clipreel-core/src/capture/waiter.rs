//! Completion signalling for buffer saves.
//!
//! One sender per save request, any number of waiters. The outcome is stored
//! in a watch channel so late subscribers still observe it, and a dropped
//! sender reads as cancellation rather than success.

use tokio::sync::watch;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SaveOutcome {
    Saved,
    Failed(String),
    Cancelled,
}

#[derive(Debug)]
pub(crate) struct CompletionSender {
    tx: watch::Sender<Option<SaveOutcome>>,
}

impl CompletionSender {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> SaveWaiter {
        SaveWaiter {
            rx: self.tx.subscribe(),
        }
    }

    pub(crate) fn complete(self, outcome: SaveOutcome) {
        self.tx.send_replace(Some(outcome));
    }
}

/// Handle on the outcome of one buffer save. Cloning shares the outcome.
#[derive(Debug, Clone)]
pub struct SaveWaiter {
    rx: watch::Receiver<Option<SaveOutcome>>,
}

impl SaveWaiter {
    /// Wait until the save completes, fails or is abandoned.
    pub async fn wait(mut self) -> Result<()> {
        loop {
            let current = self.rx.borrow_and_update().clone();
            if let Some(outcome) = current {
                return outcome.into_result();
            }
            if self.rx.changed().await.is_err() {
                let last = self.rx.borrow().clone();
                return last.unwrap_or(SaveOutcome::Cancelled).into_result();
            }
        }
    }
}

impl SaveOutcome {
    fn into_result(self) -> Result<()> {
        match self {
            Self::Saved => Ok(()),
            Self::Failed(reason) => Err(Error::BackendUnavailable(reason)),
            Self::Cancelled => Err(Error::Cancelled("buffer save abandoned".to_string())),
        }
    }
}
