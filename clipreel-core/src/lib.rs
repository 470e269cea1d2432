//! clipreel-core - highlight capture and replay timeline engine
//!
//! Layout:
//! - models/   - Match, round and replay state (the persisted snapshot)
//! - store     - Copy-on-write snapshot store
//! - persist   - Debounced JSON snapshot writer
//! - capture/  - Session engine, save coordinator, segment ingestor
//! - replay/   - Replay builder, window policy, timeline planner, filter graph
//! - media/    - ffprobe / ffmpeg process plumbing

pub mod capture;
pub mod config;
pub mod error;
pub mod logging;
pub mod media;
pub mod models;
pub mod persist;
pub mod replay;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
pub use store::StateStore;
