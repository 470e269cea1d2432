//! Debounced JSON snapshot persistence
//!
//! Writers call [`SnapshotHandle::request_save`] after mutating the store.
//! Requests arriving within the debounce window collapse into one write.
//! Writes go to a sibling temp file and are renamed into place.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::State;
use crate::{Result, StateStore};

/// Cheap cloneable trigger for a debounced snapshot write
#[derive(Clone, Debug)]
pub struct SnapshotHandle {
    tx: mpsc::Sender<()>,
}

impl SnapshotHandle {
    /// Ask for a write. Never blocks; a request already queued absorbs this one.
    pub fn request_save(&self) {
        let _ = self.tx.try_send(());
    }

    /// A handle whose requests go nowhere (tests, persistence disabled).
    #[must_use]
    pub fn disconnected() -> Self {
        let (tx, _rx) = mpsc::channel(1);
        Self { tx }
    }
}

pub struct Snapshotter {
    path: PathBuf,
    store: Arc<StateStore>,
    debounce: Duration,
    tx: mpsc::Sender<()>,
    rx: mpsc::Receiver<()>,
}

impl Snapshotter {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, store: Arc<StateStore>, debounce: Duration) -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            path: path.into(),
            store,
            debounce,
            tx,
            rx,
        }
    }

    #[must_use]
    pub fn handle(&self) -> SnapshotHandle {
        SnapshotHandle {
            tx: self.tx.clone(),
        }
    }

    /// Read the snapshot at `path`. A missing file is not an error.
    pub async fn load(path: impl AsRef<Path>) -> Result<Option<State>> {
        let bytes = match tokio::fs::read(path.as_ref()).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Run the debounce loop until `shutdown` fires, then write once more.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut deadline: Option<tokio::time::Instant> = None;

        loop {
            let flush_at = deadline;
            tokio::select! {
                () = shutdown.cancelled() => {
                    if let Err(e) = self.write_once().await {
                        warn!(path = %self.path.display(), error = %e, "Final snapshot write failed");
                    }
                    return;
                }
                Some(()) = self.rx.recv() => {
                    // reset debounce
                    deadline = Some(tokio::time::Instant::now() + self.debounce);
                }
                () = async {
                    match flush_at {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                } => {
                    deadline = None;
                    if let Err(e) = self.write_once().await {
                        warn!(path = %self.path.display(), error = %e, "Snapshot write failed");
                    }
                }
            }
        }
    }

    async fn write_once(&self) -> Result<()> {
        let state = self.store.get();
        let payload = serde_json::to_vec_pretty(state.as_ref())?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &payload).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), bytes = payload.len(), "Wrote state snapshot");
        Ok(())
    }
}

/// Load the snapshot into `store` if one exists on disk.
pub async fn restore(store: &StateStore, path: impl AsRef<Path>) -> Result<bool> {
    match Snapshotter::load(path.as_ref()).await? {
        Some(state) => {
            info!(
                path = %path.as_ref().display(),
                replays = state.replay_state.replays.len(),
                pending = state.replay_state.pending_highlights.len(),
                "Restored state snapshot"
            );
            store.replace(state);
            Ok(true)
        }
        None => Ok(false),
    }
}
