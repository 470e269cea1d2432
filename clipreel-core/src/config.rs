use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub capture: CaptureConfig,
    pub backend: BackendConfig,
    pub media: MediaConfig,
    pub replay: ReplayConfig,
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Base URL handed out in replay locators. Defaults to `http://host:port`.
    pub public_base_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            public_base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// Rolling buffer geometry used to cluster triggers into capture sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Length of the backend's rolling buffer
    pub buffer_length_ms: u64,
    /// Padding kept before the first event of a session
    pub pre_window_ms: u64,
    /// Debounce window; also the padding kept after the last event
    pub post_window_ms: u64,
    /// Reserved so a session never reaches the very edge of the buffer
    pub safety_slack_ms: u64,
    /// How long a replay request waits for an open session to be saved
    pub flush_deadline_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            buffer_length_ms: 20_000,
            pre_window_ms: 5_000,
            post_window_ms: 5_000,
            safety_slack_ms: 250,
            flush_deadline_ms: 3_000,
        }
    }
}

impl CaptureConfig {
    #[must_use]
    pub const fn buffer_length(&self) -> Duration {
        Duration::from_millis(self.buffer_length_ms)
    }

    #[must_use]
    pub const fn pre_window(&self) -> Duration {
        Duration::from_millis(self.pre_window_ms)
    }

    #[must_use]
    pub const fn post_window(&self) -> Duration {
        Duration::from_millis(self.post_window_ms)
    }

    #[must_use]
    pub const fn safety_slack(&self) -> Duration {
        Duration::from_millis(self.safety_slack_ms)
    }

    #[must_use]
    pub const fn flush_deadline(&self) -> Duration {
        Duration::from_millis(self.flush_deadline_ms)
    }

    /// Longest span a single session may cover: whatever the buffer can
    /// still hold once pre/post padding and the safety slack are reserved.
    #[must_use]
    pub fn max_span(&self) -> Duration {
        self.buffer_length()
            .saturating_sub(self.pre_window())
            .saturating_sub(self.post_window())
            .saturating_sub(self.safety_slack())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the capture-control bridge
    pub base_url: String,
    pub request_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:4456".to_string(),
            request_timeout_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub ffprobe_bin: String,
    pub ffmpeg_bin: String,
    pub probe_timeout_ms: u64,
    /// Title of the audio track carrying game sound only
    pub game_audio_title: String,
    /// Track used when no title matches, if the file has that many tracks
    pub game_audio_index: usize,
    /// Video encoder arguments appended after the stream maps
    pub video_encoder_args: Vec<String>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffprobe_bin: "ffprobe".to_string(),
            ffmpeg_bin: "ffmpeg".to_string(),
            probe_timeout_ms: 1_000,
            game_audio_title: "Game only".to_string(),
            game_audio_index: 1,
            video_encoder_args: [
                "-c:v", "h264_nvenc", "-preset", "p2", "-tune", "ll", "-rc", "cbr", "-b:v",
                "25M", "-maxrate", "25M", "-bufsize", "4M", "-g", "120",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
        }
    }
}

impl MediaConfig {
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Crossfade between consecutive clips
    pub fade_ms: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self { fade_ms: 350 }
    }
}

impl ReplayConfig {
    #[must_use]
    pub const fn fade(&self) -> Duration {
        Duration::from_millis(self.fade_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub snapshot_path: String,
    pub debounce_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            snapshot_path: "./state.json".to_string(),
            debounce_ms: 3_000,
        }
    }
}

impl PersistenceConfig {
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // CLIPREEL_CAPTURE__POST_WINDOW_MS etc.
        builder = builder.add_source(
            Environment::with_prefix("CLIPREEL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Get HTTP listen address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Base URL used when handing out replay locators
    #[must_use]
    pub fn public_base_url(&self) -> String {
        self.server
            .public_base_url
            .clone()
            .unwrap_or_else(|| format!("http://{}", self.http_address()))
    }

    /// Check for misconfigurations. Returns every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let capture = &self.capture;

        if capture.post_window_ms == 0 {
            errors.push("capture.post_window_ms must be greater than zero".to_string());
        }
        if capture.max_span().is_zero() {
            errors.push(format!(
                "capture.buffer_length_ms ({}) leaves no room for a session after pre/post windows and slack",
                capture.buffer_length_ms
            ));
        }
        if self.media.ffmpeg_bin.trim().is_empty() {
            errors.push("media.ffmpeg_bin must not be empty".to_string());
        }
        if self.media.ffprobe_bin.trim().is_empty() {
            errors.push("media.ffprobe_bin must not be empty".to_string());
        }
        if url::Url::parse(&self.backend.base_url).is_err() {
            errors.push(format!("backend.base_url is not a valid URL: {}", self.backend.base_url));
        }
        if url::Url::parse(&self.public_base_url()).is_err() {
            errors.push(format!(
                "server.public_base_url is not a valid URL: {}",
                self.public_base_url()
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
