//! Replay endpoints
//!
//! - POST /replays        - flush the open session, pack pending highlights
//!                          (204 when the current phase defers replays)
//! - GET  /replays/{id}   - replay metadata
//! - GET  /replay.ts      - MPEG-TS stream of a replay, transcoded on the fly

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use clipreel_core::media::spawn_transcoder;
use clipreel_core::models::{ReplayUnit, RoundPhase};
use clipreel_core::replay::{build_plan, filter_graph, stream_window_secs, window::DEFAULT_WINDOW};
use clipreel_core::Error;

use crate::http::{AppError, AppResult, AppState};

pub fn create_replays_router() -> Router<AppState> {
    Router::new()
        .route("/replays", post(create_replay))
        .route("/replays/{id}", get(get_replay))
        .route("/replay.ts", get(stream_replay))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateReplayResponse {
    pub id: u32,
    pub url: String,
}

async fn create_replay(State(state): State<AppState>) -> AppResult<Response> {
    // Pull in whatever is still being recorded; a failed flush only means the
    // latest moments miss this replay.
    match state
        .engine
        .flush_open_session(state.stream.flush_deadline)
        .await
    {
        Ok(flushed) => info!(flushed, "Open session flushed before replay"),
        Err(e) => warn!(error = %e, "Flush before replay failed"),
    }

    let id = match state.builder.create_replay() {
        Ok(id) => id,
        Err(Error::ReplayDisallowed(reason)) => {
            // Highlights stay pending for the next request
            info!(%reason, "Replay deferred");
            return Ok(StatusCode::NO_CONTENT.into_response());
        }
        Err(e) => return Err(e.into()),
    };
    let max_duration = stream_window_secs(&state.store.get().match_info, Utc::now());
    let url = state.locator.url_for(id, Some(max_duration));

    info!(replay_id = id, url = %url, "Replay ready");
    Ok((StatusCode::CREATED, Json(CreateReplayResponse { id, url })).into_response())
}

fn find_replay(state: &AppState, id: u32) -> Result<ReplayUnit, Error> {
    state
        .builder
        .replay(id)
        .ok_or_else(|| Error::NotFound(format!("replay {id}")))
}

async fn get_replay(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> AppResult<Json<ReplayUnit>> {
    Ok(Json(find_replay(&state, id)?))
}

/// Query parameters for the replay stream
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    replay_id: Option<String>,
    /// Target playback length in whole seconds
    max_duration: Option<String>,
}

impl StreamQuery {
    fn replay_id(&self) -> AppResult<u32> {
        let raw = self
            .replay_id
            .as_deref()
            .ok_or_else(|| AppError::bad_request("missing replay_id"))?;
        raw.parse()
            .map_err(|_| AppError::bad_request("invalid replay_id"))
    }

    fn window(&self) -> AppResult<Duration> {
        match self.max_duration.as_deref() {
            Some(raw) => raw
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| AppError::bad_request("invalid max_duration")),
            None => Ok(RoundPhase::Shopping
                .nominal_duration()
                .unwrap_or(DEFAULT_WINDOW)),
        }
    }
}

async fn stream_replay(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> AppResult<Response> {
    let replay_id = query.replay_id()?;
    let window = query.window()?;

    let replay = find_replay(&state, replay_id)?;

    let plan = build_plan(window, &replay.highlights, state.stream.fade)?;
    let tracks = state.audio.resolve(&plan.clips).await;
    let args = filter_graph::compile(&plan.clips, &tracks, plan.fade, &state.stream.encoder_args)?;

    let transcoder = spawn_transcoder(&state.stream.ffmpeg_bin, &args)?;

    info!(
        replay_id,
        clips = plan.clips.len(),
        total_secs = plan.total_duration.as_secs_f64(),
        pid = transcoder.pid(),
        "Replay stream started"
    );

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/MP2T")
        .header(header::CACHE_CONTROL, "no-store")
        .body(Body::from_stream(transcoder))
        .map_err(|_| AppError::internal_server_error("Failed to build response"))?
        .into_response())
}
