use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use clipreel_api::{create_router, AppState, StreamSettings};
use clipreel_core::capture::{BufferStatus, CaptureBackend, CaptureDeps, CaptureEngine};
use clipreel_core::config::CaptureConfig;
use clipreel_core::media::{AudioStream, AudioTrackResolver, MediaProber};
use clipreel_core::models::State;
use clipreel_core::persist::SnapshotHandle;
use clipreel_core::replay::{ReplayBuilder, ReplayLocator};
use clipreel_core::{Result, StateStore};

struct IdleBackend;

#[async_trait]
impl CaptureBackend for IdleBackend {
    async fn buffer_status(&self) -> Result<BufferStatus> {
        Ok(BufferStatus { active: true })
    }

    async fn start_buffer(&self) -> Result<()> {
        Ok(())
    }

    async fn save_buffer(&self) -> Result<()> {
        Ok(())
    }
}

struct StubProber;

#[async_trait]
impl MediaProber for StubProber {
    async fn duration_ms(&self, _path: &str) -> Result<u64> {
        Ok(20_000)
    }

    async fn audio_streams(&self, _path: &str) -> Result<Vec<AudioStream>> {
        Ok(Vec::new())
    }
}

fn test_state() -> AppState {
    let store = Arc::new(StateStore::new(State::default()));
    let snapshots = SnapshotHandle::disconnected();
    let prober: Arc<dyn MediaProber> = Arc::new(StubProber);

    let engine = CaptureEngine::start(
        CaptureConfig::default(),
        CaptureDeps {
            backend: Arc::new(IdleBackend),
            prober: Arc::clone(&prober),
            store: Arc::clone(&store),
            snapshots: snapshots.clone(),
            probe_deadline: Duration::from_secs(1),
        },
        CancellationToken::new(),
    );

    AppState {
        engine,
        store: Arc::clone(&store),
        snapshots: snapshots.clone(),
        builder: ReplayBuilder::new(store, snapshots),
        locator: ReplayLocator::new("http://127.0.0.1:8080").unwrap(),
        audio: Arc::new(AudioTrackResolver::new(prober, "Game only", 1)),
        stream: Arc::new(StreamSettings {
            // Accepts any arguments and writes nothing
            ffmpeg_bin: "true".to_string(),
            encoder_args: vec!["-c:v".to_string(), "libx264".to_string()],
            fade: Duration::from_millis(350),
            flush_deadline: Duration::from_secs(1),
        }),
    }
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

/// Trigger, save and report one highlight through the public routes.
async fn capture_one(app: &Router, state: &AppState) {
    let (status, _) = send(app, Method::POST, "/events/trigger", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let session_id = state.engine.sessions()[0].id;
    state.engine.request_save(session_id, false).await.unwrap();

    let (status, body) = send(
        app,
        Method::POST,
        "/events/buffer-saved",
        Some(json!({"path": "/clips/one.mp4"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["highlight"]["mediaPath"], "/clips/one.mp4");
}

#[tokio::test]
async fn test_health() {
    let app = create_router(test_state());
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
}

#[tokio::test]
async fn test_match_events_update_state() {
    let state = test_state();
    let app = create_router(state.clone());

    let (status, _) = send(
        &app,
        Method::POST,
        "/events/match",
        Some(json!({"type": "match_started", "match_id": "m-42", "map": "Ascent"})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &app,
        Method::POST,
        "/events/match",
        Some(json!({"type": "round_started", "number": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let info = state.store.get().match_info.clone();
    assert_eq!(info.match_id, "m-42");
    assert_eq!(info.current_round, Some(1));
}

#[tokio::test]
async fn test_replay_lifecycle() {
    let state = test_state();
    let app = create_router(state.clone());

    let (status, _) = send(&app, Method::POST, "/replays", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    capture_one(&app, &state).await;

    let (status, body) = send(&app, Method::POST, "/replays", None).await;
    assert_eq!(status, StatusCode::CREATED);
    let created: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(created["id"], 0);
    assert_eq!(
        created["url"],
        "http://127.0.0.1:8080/replay.ts?replay_id=0&max_duration=30"
    );

    let (status, body) = send(&app, Method::GET, "/replays/0", None).await;
    assert_eq!(status, StatusCode::OK);
    let replay: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(replay["highlights"].as_array().unwrap().len(), 1);
    assert_eq!(replay["roundNumber"], Value::Null);

    let (status, body) = send(&app, Method::GET, "/replays/7", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"], "replay 7");
}

#[tokio::test]
async fn test_combat_phase_defers_replay() {
    let state = test_state();
    let app = create_router(state.clone());
    capture_one(&app, &state).await;

    for event in [
        json!({"type": "round_started", "number": 3}),
        json!({"type": "phase_changed", "phase": "combat"}),
    ] {
        send(&app, Method::POST, "/events/match", Some(event)).await;
    }

    let (status, body) = send(&app, Method::POST, "/replays", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());
    assert_eq!(state.store.get().replay_state.pending_highlights.len(), 1);

    // Once combat is over the same highlight becomes a replay
    send(
        &app,
        Method::POST,
        "/events/match",
        Some(json!({"type": "phase_changed", "phase": "end"})),
    )
    .await;
    let (status, _) = send(&app, Method::POST, "/replays", None).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_stream_query_validation() {
    let state = test_state();
    let app = create_router(state.clone());
    capture_one(&app, &state).await;
    send(&app, Method::POST, "/replays", None).await;

    let cases = [
        ("/replay.ts", StatusCode::BAD_REQUEST),
        ("/replay.ts?replay_id=abc", StatusCode::BAD_REQUEST),
        ("/replay.ts?replay_id=0&max_duration=soon", StatusCode::BAD_REQUEST),
        ("/replay.ts?replay_id=0&max_duration=0", StatusCode::BAD_REQUEST),
        ("/replay.ts?replay_id=5", StatusCode::NOT_FOUND),
    ];
    for (uri, expected) in cases {
        let (status, _) = send(&app, Method::GET, uri, None).await;
        assert_eq!(status, expected, "{uri}");
    }
}

#[tokio::test]
async fn test_stream_headers() {
    let state = test_state();
    let app = create_router(state.clone());
    capture_one(&app, &state).await;
    send(&app, Method::POST, "/replays", None).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/replay.ts?replay_id=0&max_duration=20")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/MP2T");
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_buffer_saved_requires_path() {
    let app = create_router(test_state());
    let (status, _) = send(&app, Method::POST, "/events/buffer-saved", Some(json!({"path": " "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Nothing outstanding: accepted and ignored
    let (status, body) = send(
        &app,
        Method::POST,
        "/events/buffer-saved",
        Some(json!({"path": "/clips/stray.mp4"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["highlight"], Value::Null);
}
