//! Replay assembly: packing highlights into replays and planning playback

pub mod builder;
pub mod filter_graph;
pub mod planner;
pub mod window;

pub use builder::{ReplayBuilder, ReplayLocator};
pub use planner::{build_plan, ClipInterval, Plan};
pub use window::{replay_permitted, replay_window, stream_window_secs};
