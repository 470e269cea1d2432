use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use clipreel_api::{create_router, AppState, StreamSettings};
use clipreel_core::capture::{CaptureDeps, CaptureEngine, HttpCaptureBackend};
use clipreel_core::media::{AudioTrackResolver, FfprobeProber, MediaProber};
use clipreel_core::models::State;
use clipreel_core::persist::{self, Snapshotter};
use clipreel_core::replay::{ReplayBuilder, ReplayLocator};
use clipreel_core::{Config, StateStore};

/// How long the final snapshot write may take during shutdown
const SNAPSHOT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ClipReelServer {
    config: Config,
    state: AppState,
    snapshotter: Snapshotter,
    shutdown: CancellationToken,
}

impl ClipReelServer {
    /// Restore persisted state and wire every component.
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let store = Arc::new(StateStore::new(State::default()));
        let snapshot_path = config.persistence.snapshot_path.clone();

        let restored = persist::restore(&store, &snapshot_path)
            .await
            .with_context(|| format!("Failed to load snapshot {snapshot_path}"))?;
        if restored {
            let state = store.get();
            info!(
                path = %snapshot_path,
                pending = state.replay_state.pending_highlights.len(),
                replays = state.replay_state.replays.len(),
                "Snapshot restored"
            );
        } else {
            info!(path = %snapshot_path, "No snapshot found, starting fresh");
        }

        let snapshotter = Snapshotter::new(&snapshot_path, Arc::clone(&store), config.persistence.debounce());
        let snapshots = snapshotter.handle();

        let backend = HttpCaptureBackend::new(
            &config.backend.base_url,
            Duration::from_millis(config.backend.request_timeout_ms),
        )?;
        let prober: Arc<dyn MediaProber> = Arc::new(FfprobeProber::new(
            config.media.ffprobe_bin.clone(),
            config.media.probe_timeout(),
        ));

        let shutdown = CancellationToken::new();
        let engine = CaptureEngine::start(
            config.capture.clone(),
            CaptureDeps {
                backend: Arc::new(backend),
                prober: Arc::clone(&prober),
                store: Arc::clone(&store),
                snapshots: snapshots.clone(),
                probe_deadline: config.media.probe_timeout(),
            },
            shutdown.child_token(),
        );

        let state = AppState {
            engine,
            store: Arc::clone(&store),
            snapshots: snapshots.clone(),
            builder: ReplayBuilder::new(store, snapshots),
            locator: ReplayLocator::new(&config.public_base_url())?,
            audio: Arc::new(AudioTrackResolver::new(
                prober,
                config.media.game_audio_title.clone(),
                config.media.game_audio_index,
            )),
            stream: Arc::new(StreamSettings::from_config(&config)),
        };

        Ok(Self {
            config,
            state,
            snapshotter,
            shutdown,
        })
    }

    /// Serve HTTP until a shutdown signal, then stop the engine and write a
    /// final snapshot.
    pub async fn start(self) -> anyhow::Result<()> {
        let Self {
            config,
            state,
            snapshotter,
            shutdown,
        } = self;

        let snapshot_task = tokio::spawn(snapshotter.run(shutdown.child_token()));
        let engine = state.engine.clone();

        let http_address = config.http_address();
        let listener = tokio::net::TcpListener::bind(&http_address)
            .await
            .with_context(|| format!("Failed to bind HTTP address {http_address}"))?;
        info!("HTTP server listening on {}", http_address);

        let graceful = {
            let shutdown = shutdown.clone();
            async move {
                tokio::select! {
                    () = shutdown_signal() => {
                        info!("Shutdown signal received, starting graceful shutdown...");
                    }
                    () = shutdown.cancelled() => {}
                }
                // Stop timers and waiters first so in-flight replay requests
                // unblock before connections drain.
                shutdown.cancel();
            }
        };

        let served = axum::serve(listener, create_router(state))
            .with_graceful_shutdown(graceful)
            .await;

        shutdown.cancel();
        engine.close();

        if let Err(e) = &served {
            error!("HTTP server error: {}", e);
        }

        match tokio::time::timeout(SNAPSHOT_FLUSH_TIMEOUT, snapshot_task).await {
            Ok(Ok(())) => info!("Final snapshot written"),
            Ok(Err(e)) => error!("Snapshot task failed: {}", e),
            Err(_) => warn!("Timed out waiting for the final snapshot"),
        }

        info!("ClipReel server stopped");
        served.context("HTTP server error")
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C signal");
            }
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("Received SIGTERM signal");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
