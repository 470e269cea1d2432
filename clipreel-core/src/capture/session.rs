//! Capture session bookkeeping
//!
//! Pure clustering logic over trigger timestamps. The engine owns one
//! [`SessionTable`] behind a mutex and layers timers and saves on top.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::warn;

use super::waiter::{CompletionSender, SaveOutcome, SaveWaiter};

/// A time-bounded cluster of trigger timestamps recorded as one segment.
#[derive(Debug)]
pub(crate) struct CaptureSession {
    pub(crate) id: u64,
    pub(crate) first_event_at: DateTime<Utc>,
    pub(crate) last_event_at: DateTime<Utc>,
    pub(crate) events: Vec<DateTime<Utc>>,
    pub(crate) closed: bool,
    pub(crate) save_requested: bool,
    /// Last save attempt failed. Kept for a flush to retry until a newer
    /// session starts.
    pub(crate) save_failed: bool,
    /// Bumped on every (re)arm and on close; a firing timer must match it.
    pub(crate) timer_generation: u64,
    pub(crate) timer: Option<AbortHandle>,
    pub(crate) completion: Option<CompletionSender>,
}

impl CaptureSession {
    fn new(id: u64, now: DateTime<Utc>) -> Self {
        Self {
            id,
            first_event_at: now,
            last_event_at: now,
            events: vec![now],
            closed: false,
            save_requested: false,
            save_failed: false,
            timer_generation: 0,
            timer: None,
            completion: None,
        }
    }

    fn is_open(&self) -> bool {
        !self.closed && !self.save_requested
    }

    /// Invalidate any pending timer fire and stop the task.
    pub(crate) fn disarm_timer(&mut self) {
        self.timer_generation += 1;
        if let Some(handle) = self.timer.take() {
            handle.abort();
        }
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            first_event_at: self.first_event_at,
            last_event_at: self.last_event_at,
            event_count: self.events.len(),
            closed: self.closed,
            save_requested: self.save_requested,
        }
    }
}

/// Read-only view of a live session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: u64,
    pub first_event_at: DateTime<Utc>,
    pub last_event_at: DateTime<Utc>,
    pub event_count: usize,
    pub closed: bool,
    pub save_requested: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TriggerOutcome {
    Created { session_id: u64, generation: u64 },
    Appended { session_id: u64, generation: u64 },
}

impl TriggerOutcome {
    pub(crate) const fn session_id(self) -> u64 {
        match self {
            Self::Created { session_id, .. } | Self::Appended { session_id, .. } => session_id,
        }
    }

    pub(crate) const fn generation(self) -> u64 {
        match self {
            Self::Created { generation, .. } | Self::Appended { generation, .. } => generation,
        }
    }
}

/// What an explicit flush should do
#[derive(Debug)]
pub(crate) enum FlushTarget {
    /// Nothing recorded that still needs saving
    Nothing,
    /// Newest session already has a save in flight
    Outstanding(SaveWaiter),
    /// Newest session was idle and has just been force-closed
    Closed(u64),
}

#[derive(Debug)]
pub(crate) struct SessionTable {
    next_id: u64,
    sessions: Vec<CaptureSession>,
    post_window: TimeDelta,
    max_span: TimeDelta,
}

impl SessionTable {
    pub(crate) fn new(post_window: Duration, max_span: Duration) -> Self {
        Self {
            next_id: 0,
            sessions: Vec::new(),
            post_window: TimeDelta::from_std(post_window).unwrap_or(TimeDelta::MAX),
            max_span: TimeDelta::from_std(max_span).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Cluster a trigger at `now` into the newest open session or a new one.
    /// The returned generation is the one a freshly armed timer must carry.
    pub(crate) fn record(&mut self, now: DateTime<Utc>) -> TriggerOutcome {
        let post_window = self.post_window;
        let max_span = self.max_span;

        if let Some(session) = self
            .sessions
            .last_mut()
            .filter(|s| s.is_open())
            .filter(|s| now - s.last_event_at <= post_window && now - s.first_event_at <= max_span)
        {
            session.events.push(now);
            session.last_event_at = session.last_event_at.max(now);
            session.save_failed = false;
            session.disarm_timer();
            return TriggerOutcome::Appended {
                session_id: session.id,
                generation: session.timer_generation,
            };
        }

        self.drop_failed();

        self.next_id += 1;
        let session = CaptureSession::new(self.next_id, now);
        let outcome = TriggerOutcome::Created {
            session_id: session.id,
            generation: session.timer_generation,
        };
        self.sessions.push(session);
        outcome
    }

    /// Forget sessions whose save failed and that nobody retried.
    fn drop_failed(&mut self) {
        self.sessions.retain(|s| {
            let stale = s.save_failed && !s.save_requested;
            if stale {
                warn!(
                    session_id = s.id,
                    events = s.events.len(),
                    "Dropping capture session after failed save"
                );
            }
            !stale
        });
    }

    /// Attach the task backing the timer armed for `generation`.
    pub(crate) fn attach_timer(&mut self, session_id: u64, generation: u64, handle: AbortHandle) {
        match self.get_mut(session_id) {
            Some(s) if s.timer_generation == generation && s.is_open() => {
                if let Some(old) = s.timer.replace(handle) {
                    old.abort();
                }
            }
            _ => handle.abort(),
        }
    }

    /// Debounce expiry. Closes the session and returns true only if the
    /// timer is still current and nobody closed the session meanwhile.
    pub(crate) fn expire(&mut self, session_id: u64, generation: u64) -> bool {
        match self.get_mut(session_id) {
            Some(s) if s.timer_generation == generation && s.is_open() => {
                s.closed = true;
                s.timer = None;
                true
            }
            _ => false,
        }
    }

    /// Pick the newest session with events for an explicit flush.
    pub(crate) fn flush_target(&mut self) -> FlushTarget {
        for session in self.sessions.iter_mut().rev() {
            if session.events.is_empty() {
                continue;
            }
            if session.save_requested {
                if let Some(completion) = &session.completion {
                    return FlushTarget::Outstanding(completion.subscribe());
                }
                continue;
            }
            session.closed = true;
            session.disarm_timer();
            return FlushTarget::Closed(session.id);
        }
        FlushTarget::Nothing
    }

    pub(crate) fn get_mut(&mut self, session_id: u64) -> Option<&mut CaptureSession> {
        self.sessions.iter_mut().find(|s| s.id == session_id)
    }

    pub(crate) fn remove(&mut self, session_id: u64) -> Option<CaptureSession> {
        let pos = self.sessions.iter().position(|s| s.id == session_id)?;
        let mut session = self.sessions.remove(pos);
        session.disarm_timer();
        Some(session)
    }

    pub(crate) fn snapshots(&self) -> Vec<SessionSnapshot> {
        self.sessions.iter().map(CaptureSession::snapshot).collect()
    }

    /// Stop every timer and abandon every outstanding waiter.
    pub(crate) fn shutdown(&mut self) {
        for session in &mut self.sessions {
            session.disarm_timer();
            if let Some(completion) = session.completion.take() {
                completion.complete(SaveOutcome::Cancelled);
            }
        }
    }
}
