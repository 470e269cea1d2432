//! Highlight capture
//!
//! Triggers are clustered into sessions, each session is saved from the
//! backend's rolling buffer once it goes quiet, and completed saves are
//! turned into [`HighlightRecord`](crate::models::HighlightRecord)s.

pub mod backend;
mod engine;
pub mod ingest;
mod session;
mod waiter;

pub use backend::{BufferStatus, CaptureBackend, HttpCaptureBackend};
pub use engine::{CaptureDeps, CaptureEngine};
pub use ingest::{build_highlight, PendingSave};
pub use session::SessionSnapshot;
pub use waiter::SaveWaiter;
