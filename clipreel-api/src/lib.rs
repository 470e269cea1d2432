//! ClipReel API Library
//!
//! HTTP boundary for the capture engine and replay streaming

pub mod http;

pub use http::{create_router, AppState, StreamSettings};
