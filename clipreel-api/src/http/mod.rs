//! HTTP boundary
//! Event ingestion, replay creation and replay streaming over HTTP

pub mod error;
pub mod events;
pub mod health;
pub mod replays;

use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use clipreel_core::capture::CaptureEngine;
use clipreel_core::media::AudioTrackResolver;
use clipreel_core::persist::SnapshotHandle;
use clipreel_core::replay::{ReplayBuilder, ReplayLocator};
use clipreel_core::{Config, StateStore};

pub use error::{AppError, AppResult};

/// Settings used when serving a replay stream
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub ffmpeg_bin: String,
    pub encoder_args: Vec<String>,
    pub fade: Duration,
    /// How long replay creation waits for the open session to be saved
    pub flush_deadline: Duration,
}

impl StreamSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            ffmpeg_bin: config.media.ffmpeg_bin.clone(),
            encoder_args: config.media.video_encoder_args.clone(),
            fade: config.replay.fade(),
            flush_deadline: config.capture.flush_deadline(),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: CaptureEngine,
    pub store: Arc<StateStore>,
    pub snapshots: SnapshotHandle,
    pub builder: ReplayBuilder,
    pub locator: ReplayLocator,
    pub audio: Arc<AudioTrackResolver>,
    pub stream: Arc<StreamSettings>,
}

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let router = Router::new()
        .merge(health::create_health_router())
        .merge(events::create_events_router())
        .merge(replays::create_replays_router());

    router
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
