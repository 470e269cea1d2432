//! Capture engine: session clustering, save coordination and ingest
//!
//! Lock discipline:
//! - `sessions` and `pending` are short critical sections, never held across
//!   an `.await` and never held while calling into the [`StateStore`].
//! - `issue_lock` is held across the backend round trip so the FIFO of
//!   pending saves matches the order the backend received the requests.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backend::CaptureBackend;
use super::ingest::{build_highlight, PendingSave};
use super::session::{FlushTarget, SessionSnapshot, SessionTable};
use super::waiter::{CompletionSender, SaveOutcome, SaveWaiter};
use crate::config::CaptureConfig;
use crate::media::MediaProber;
use crate::models::HighlightRecord;
use crate::persist::SnapshotHandle;
use crate::{Error, Result, StateStore};

/// Collaborators the engine talks to
pub struct CaptureDeps {
    pub backend: Arc<dyn CaptureBackend>,
    pub prober: Arc<dyn MediaProber>,
    pub store: Arc<StateStore>,
    pub snapshots: SnapshotHandle,
    /// Upper bound on a single duration probe
    pub probe_deadline: Duration,
}

struct Inner {
    config: CaptureConfig,
    backend: Arc<dyn CaptureBackend>,
    prober: Arc<dyn MediaProber>,
    store: Arc<StateStore>,
    snapshots: SnapshotHandle,
    probe_deadline: Duration,

    sessions: Mutex<SessionTable>,
    pending: Mutex<VecDeque<PendingSave>>,
    issue_lock: tokio::sync::Mutex<()>,
    save_tx: mpsc::UnboundedSender<u64>,
    shutdown: CancellationToken,
}

/// Result of the synchronous half of a save request
enum SaveStart {
    Skip,
    Joined(Option<SaveWaiter>),
    Started {
        events: Vec<DateTime<Utc>>,
        waiter: SaveWaiter,
    },
}

#[derive(Clone)]
pub struct CaptureEngine {
    inner: Arc<Inner>,
}

impl CaptureEngine {
    /// Build the engine and spawn its save worker. Must be called inside a
    /// tokio runtime.
    pub fn start(config: CaptureConfig, deps: CaptureDeps, shutdown: CancellationToken) -> Self {
        let (save_tx, save_rx) = mpsc::unbounded_channel();
        let sessions = SessionTable::new(config.post_window(), config.max_span());

        let engine = Self {
            inner: Arc::new(Inner {
                config,
                backend: deps.backend,
                prober: deps.prober,
                store: deps.store,
                snapshots: deps.snapshots,
                probe_deadline: deps.probe_deadline,
                sessions: Mutex::new(sessions),
                pending: Mutex::new(VecDeque::new()),
                issue_lock: tokio::sync::Mutex::new(()),
                save_tx,
                shutdown,
            }),
        };

        tokio::spawn(engine.clone().run_save_worker(save_rx));
        engine
    }

    async fn run_save_worker(self, mut save_rx: mpsc::UnboundedReceiver<u64>) {
        loop {
            tokio::select! {
                () = self.inner.shutdown.cancelled() => break,
                next = save_rx.recv() => {
                    let Some(session_id) = next else { break };
                    if let Err(e) = self.request_save(session_id, false).await {
                        warn!(session_id, error = %e, "Debounced buffer save failed");
                    }
                }
            }
        }

        self.inner.sessions.lock().shutdown();
        debug!("Save worker stopped");
    }

    /// Record a highlight trigger at the current wall clock.
    pub fn record_trigger(&self) -> u64 {
        self.record_trigger_at(Utc::now())
    }

    /// Record a highlight trigger at `now` and (re)arm the session's debounce
    /// timer. Returns the id of the session the trigger landed in.
    pub fn record_trigger_at(&self, now: DateTime<Utc>) -> u64 {
        let mut sessions = self.inner.sessions.lock();
        let outcome = sessions.record(now);
        let session_id = outcome.session_id();

        if !self.inner.shutdown.is_cancelled() {
            let timer = self.arm_timer(session_id, outcome.generation());
            sessions.attach_timer(session_id, outcome.generation(), timer);
        }

        debug!(session_id, ?outcome, "Trigger recorded");
        session_id
    }

    fn arm_timer(&self, session_id: u64, generation: u64) -> AbortHandle {
        let inner = Arc::clone(&self.inner);
        let post_window = inner.config.post_window();

        tokio::spawn(async move {
            tokio::select! {
                () = inner.shutdown.cancelled() => {}
                () = tokio::time::sleep(post_window) => {
                    let fired = inner.sessions.lock().expire(session_id, generation);
                    if fired {
                        debug!(session_id, "Capture session closed after quiet period");
                        let _ = inner.save_tx.send(session_id);
                    }
                }
            }
        })
        .abort_handle()
    }

    /// Ask the backend to save the buffer for `session_id`.
    ///
    /// Unknown or empty sessions are ignored. A session that already has a
    /// save in flight is not saved twice: the caller joins the existing
    /// outcome instead. The waiter is only handed out when
    /// `want_completion` is set.
    pub async fn request_save(
        &self,
        session_id: u64,
        want_completion: bool,
    ) -> Result<Option<SaveWaiter>> {
        match self.begin_save(session_id) {
            SaveStart::Skip => Ok(None),
            SaveStart::Joined(waiter) => Ok(waiter.filter(|_| want_completion)),
            SaveStart::Started { events, waiter } => {
                self.issue_save(session_id, events).await?;
                Ok(want_completion.then_some(waiter))
            }
        }
    }

    fn begin_save(&self, session_id: u64) -> SaveStart {
        let mut sessions = self.inner.sessions.lock();
        let Some(session) = sessions.get_mut(session_id) else {
            debug!(session_id, "Save requested for unknown session");
            return SaveStart::Skip;
        };
        if session.events.is_empty() {
            return SaveStart::Skip;
        }
        if session.save_requested {
            debug!(session_id, "Save already requested, joining it");
            return SaveStart::Joined(session.completion.as_ref().map(CompletionSender::subscribe));
        }

        session.closed = true;
        session.save_requested = true;
        session.save_failed = false;
        session.disarm_timer();

        let completion = CompletionSender::new();
        let waiter = completion.subscribe();
        session.completion = Some(completion);

        SaveStart::Started {
            events: session.events.clone(),
            waiter,
        }
    }

    async fn issue_save(&self, session_id: u64, events: Vec<DateTime<Utc>>) -> Result<()> {
        let result = async {
            let _issue = self.inner.issue_lock.lock().await;

            match self.inner.backend.buffer_status().await {
                Ok(status) if status.active => {}
                Ok(_) => {
                    info!("Rolling buffer inactive, starting it");
                    self.inner.backend.start_buffer().await?;
                }
                Err(e) => warn!(error = %e, "Buffer status query failed, saving anyway"),
            }

            let requested_at = Utc::now();
            self.inner.backend.save_buffer().await?;
            self.inner.pending.lock().push_back(PendingSave {
                session_id,
                requested_at,
                events,
            });
            Ok::<(), Error>(())
        }
        .await;

        match &result {
            Ok(()) => info!(session_id, "Buffer save issued"),
            Err(e) => {
                warn!(session_id, error = %e, "Buffer save failed, session kept until superseded");
                self.roll_back(session_id, e);
            }
        }
        result
    }

    fn roll_back(&self, session_id: u64, err: &Error) {
        let reason = match err {
            Error::BackendUnavailable(reason) => reason.clone(),
            other => other.to_string(),
        };

        let mut sessions = self.inner.sessions.lock();
        if let Some(session) = sessions.get_mut(session_id) {
            session.closed = false;
            session.save_requested = false;
            session.save_failed = true;
            if let Some(completion) = session.completion.take() {
                completion.complete(SaveOutcome::Failed(reason));
            }
        }
    }

    /// Backend notification that the oldest outstanding save landed at
    /// `media_path`. Returns the highlight appended to the pending set.
    pub async fn on_buffer_saved(&self, media_path: &str) -> Option<HighlightRecord> {
        let Some(pending) = self.inner.pending.lock().pop_front() else {
            warn!(path = media_path, "Buffer saved with no save outstanding, discarding");
            return None;
        };

        let length_ms = self.probe_length_ms(media_path).await;

        let mut appended = None;
        self.inner.store.update(|state| {
            let record = build_highlight(&pending, media_path, length_ms, &state.match_info);
            let mut next = state.clone();
            next.replay_state.pending_highlights.push(record.clone());
            appended = Some(record);
            next
        });
        self.inner.snapshots.request_save();

        if let Some(mut session) = self.inner.sessions.lock().remove(pending.session_id) {
            if let Some(completion) = session.completion.take() {
                completion.complete(SaveOutcome::Saved);
            }
        }

        info!(
            session_id = pending.session_id,
            path = media_path,
            length_ms,
            events = pending.events.len(),
            "Highlight captured"
        );
        appended
    }

    async fn probe_length_ms(&self, media_path: &str) -> u64 {
        let nominal = self.inner.config.buffer_length_ms;
        let probe = self.inner.prober.duration_ms(media_path);

        match tokio::time::timeout(self.inner.probe_deadline, probe).await {
            Ok(Ok(ms)) if ms > 0 => ms,
            Ok(Ok(_)) => {
                warn!(path = media_path, "Probe reported zero duration, using nominal buffer length");
                nominal
            }
            Ok(Err(e)) => {
                warn!(path = media_path, error = %e, "Using nominal buffer length");
                nominal
            }
            Err(_) => {
                warn!(path = media_path, "Probe timed out, using nominal buffer length");
                nominal
            }
        }
    }

    /// Force the newest unsaved session out to the backend and wait for it to
    /// land, or join the save already in flight.
    ///
    /// Returns `Ok(false)` when nothing needed saving.
    pub async fn flush_open_session(&self, deadline: Duration) -> Result<bool> {
        let target = self.inner.sessions.lock().flush_target();

        let waiter = match target {
            FlushTarget::Nothing => return Ok(false),
            FlushTarget::Outstanding(waiter) => waiter,
            FlushTarget::Closed(session_id) => match self.begin_save(session_id) {
                SaveStart::Skip | SaveStart::Joined(None) => return Ok(false),
                SaveStart::Joined(Some(waiter)) => waiter,
                SaveStart::Started { events, waiter } => {
                    // Issued on its own task so a deadline here cannot strand
                    // the session half way through the backend round trip.
                    let engine = self.clone();
                    tokio::spawn(async move {
                        let _ = engine.issue_save(session_id, events).await;
                    });
                    waiter
                }
            },
        };

        tokio::select! {
            () = self.inner.shutdown.cancelled() => {
                Err(Error::Cancelled("capture engine shutting down".to_string()))
            }
            waited = tokio::time::timeout(deadline, waiter.wait()) => match waited {
                Ok(outcome) => outcome.map(|()| true),
                Err(_) => Err(Error::DeadlineExceeded(format!("buffer save ({deadline:?})"))),
            },
        }
    }

    /// Stop timers and the save worker. Open sessions are not flushed and
    /// outstanding waiters observe cancellation.
    pub fn close(&self) {
        self.inner.shutdown.cancel();
        self.inner.sessions.lock().shutdown();
    }

    #[must_use]
    pub fn sessions(&self) -> Vec<SessionSnapshot> {
        self.inner.sessions.lock().snapshots()
    }

    #[must_use]
    pub fn pending_saves(&self) -> usize {
        self.inner.pending.lock().len()
    }

    #[must_use]
    pub fn store(&self) -> &Arc<StateStore> {
        &self.inner.store
    }
}
