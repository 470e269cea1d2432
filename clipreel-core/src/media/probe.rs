//! Media inspection through ffprobe
//!
//! The probe is slow and fallible, so every invocation runs under a
//! deadline and the child process is killed if the deadline wins.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::{Error, Result};

/// One audio stream of a media file, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioStream {
    /// Container-level stream index
    pub stream_index: usize,
    pub title: Option<String>,
}

#[async_trait]
pub trait MediaProber: Send + Sync {
    /// Container duration in milliseconds
    async fn duration_ms(&self, path: &str) -> Result<u64>;

    /// Audio streams in the order ffmpeg addresses them as `a:<n>`
    async fn audio_streams(&self, path: &str) -> Result<Vec<AudioStream>>;
}

#[derive(Debug, Clone)]
pub struct FfprobeProber {
    bin: String,
    timeout: Duration,
}

impl FfprobeProber {
    #[must_use]
    pub fn new(bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            timeout,
        }
    }

    async fn run(&self, args: &[&str]) -> Result<Vec<u8>> {
        let mut cmd = Command::new(&self.bin);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| Error::ProbeFailed(format!("{} timed out after {:?}", self.bin, self.timeout)))?
            .map_err(|e| Error::ProbeFailed(format!("failed to run {}: {e}", self.bin)))?;

        if !output.status.success() {
            return Err(Error::ProbeFailed(format!(
                "{} exited with {}: {}",
                self.bin,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl MediaProber for FfprobeProber {
    async fn duration_ms(&self, path: &str) -> Result<u64> {
        if path.trim().is_empty() {
            return Err(Error::ProbeFailed("media path is empty".to_string()));
        }
        let out = self
            .run(&[
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
                path,
            ])
            .await?;
        parse_duration_ms(&String::from_utf8_lossy(&out))
    }

    async fn audio_streams(&self, path: &str) -> Result<Vec<AudioStream>> {
        if path.trim().is_empty() {
            return Err(Error::ProbeFailed("media path is empty".to_string()));
        }
        let out = self
            .run(&[
                "-v",
                "error",
                "-select_streams",
                "a",
                "-show_streams",
                "-print_format",
                "json",
                path,
            ])
            .await?;
        parse_audio_streams(&out)
    }
}

/// Parse ffprobe's bare `format=duration` output (seconds, fractional).
pub fn parse_duration_ms(raw: &str) -> Result<u64> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "N/A" {
        return Err(Error::ProbeFailed("duration is not available".to_string()));
    }
    let secs: f64 = raw
        .parse()
        .map_err(|e| Error::ProbeFailed(format!("unparseable duration {raw:?}: {e}")))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(Error::ProbeFailed(format!("invalid duration {raw:?}")));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok((secs * 1000.0).round() as u64)
}

#[derive(Debug, Deserialize)]
struct StreamsResponse {
    #[serde(default)]
    streams: Vec<StreamEntry>,
}

#[derive(Debug, Deserialize)]
struct StreamEntry {
    index: usize,
    #[serde(default)]
    tags: HashMap<String, String>,
}

/// Parse `ffprobe -show_streams -print_format json` output.
pub fn parse_audio_streams(raw: &[u8]) -> Result<Vec<AudioStream>> {
    let response: StreamsResponse = serde_json::from_slice(raw)
        .map_err(|e| Error::ProbeFailed(format!("ffprobe json parse failed: {e}")))?;

    Ok(response
        .streams
        .into_iter()
        .map(|s| AudioStream {
            stream_index: s.index,
            title: s.tags.get("title").cloned(),
        })
        .collect())
}
