//! Event ingestion
//!
//! - POST /events/trigger       - a highlight-worthy moment just happened
//! - POST /events/match         - round/phase telemetry
//! - POST /events/buffer-saved  - the capture backend finished a save

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use clipreel_core::models::{HighlightRecord, MatchEvent};

use crate::http::{AppError, AppResult, AppState};

pub fn create_events_router() -> Router<AppState> {
    Router::new()
        .route("/events/trigger", post(record_trigger))
        .route("/events/match", post(apply_match_event))
        .route("/events/buffer-saved", post(buffer_saved))
}

async fn record_trigger(State(state): State<AppState>) -> StatusCode {
    let session_id = state.engine.record_trigger();
    debug!(session_id, "Highlight trigger received");
    StatusCode::NO_CONTENT
}

async fn apply_match_event(
    State(state): State<AppState>,
    Json(event): Json<MatchEvent>,
) -> StatusCode {
    let now = Utc::now();
    state.store.update(|cur| {
        let mut next = cur.clone();
        next.match_info = cur.match_info.apply(&event, now);
        next
    });
    state.snapshots.request_save();

    info!(?event, "Match event applied");
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
pub struct BufferSavedRequest {
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BufferSavedResponse {
    /// `None` when no save was outstanding and the file was ignored
    pub highlight: Option<HighlightRecord>,
}

async fn buffer_saved(
    State(state): State<AppState>,
    Json(req): Json<BufferSavedRequest>,
) -> AppResult<(StatusCode, Json<BufferSavedResponse>)> {
    let path = req.path.trim();
    if path.is_empty() {
        return Err(AppError::bad_request("path is required"));
    }

    let highlight = state.engine.on_buffer_saved(path).await;
    Ok((StatusCode::ACCEPTED, Json(BufferSavedResponse { highlight })))
}
