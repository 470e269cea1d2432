//! Picking the game-audio track of a recording

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::probe::{AudioStream, MediaProber};
use crate::replay::ClipInterval;

/// Resolves, per source file, which audio track (`a:<n>`) carries game
/// audio. Results are cached by path for the lifetime of the resolver.
pub struct AudioTrackResolver {
    prober: Arc<dyn MediaProber>,
    title: String,
    fallback_index: usize,
    cache: DashMap<String, usize>,
}

impl AudioTrackResolver {
    #[must_use]
    pub fn new(prober: Arc<dyn MediaProber>, title: impl Into<String>, fallback_index: usize) -> Self {
        Self {
            prober,
            title: title.into(),
            fallback_index,
            cache: DashMap::new(),
        }
    }

    /// One track index per clip, in clip order.
    pub async fn resolve(&self, clips: &[ClipInterval]) -> Vec<usize> {
        let mut tracks = Vec::with_capacity(clips.len());
        for clip in clips {
            tracks.push(self.resolve_path(&clip.source_path).await);
        }
        tracks
    }

    pub async fn resolve_path(&self, path: &str) -> usize {
        if let Some(track) = self.cache.get(path) {
            return *track;
        }

        let track = match self.prober.audio_streams(path).await {
            Ok(streams) => select_track(&streams, &self.title, self.fallback_index),
            Err(e) => {
                warn!(path, error = %e, "Audio stream probe failed, using track 0");
                0
            }
        };

        debug!(path, track, "Resolved game audio track");
        self.cache.insert(path.to_string(), track);
        track
    }

    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

/// Title match wins (case and surrounding whitespace ignored). Otherwise the
/// configured index if the file has that many audio streams, else track 0.
#[must_use]
pub fn select_track(streams: &[AudioStream], title: &str, fallback_index: usize) -> usize {
    let want = normalize(title);
    if !want.is_empty() {
        if let Some(pos) = streams
            .iter()
            .position(|s| s.title.as_deref().map(normalize).as_deref() == Some(want.as_str()))
        {
            return pos;
        }
    }

    if streams.len() > fallback_index {
        fallback_index
    } else {
        0
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn stream(index: usize, title: Option<&str>) -> AudioStream {
        AudioStream {
            stream_index: index,
            title: title.map(str::to_string),
        }
    }

    #[test]
    fn test_title_match_ignores_case_and_whitespace() {
        let streams = vec![
            stream(1, Some("Mixed")),
            stream(2, Some("Mic")),
            stream(3, Some("  game ONLY ")),
        ];
        assert_eq!(select_track(&streams, "Game only", 1), 2);
    }

    #[test]
    fn test_fallback_index_needs_enough_streams() {
        let two = vec![stream(1, Some("Mixed")), stream(2, None)];
        assert_eq!(select_track(&two, "Game only", 1), 1);

        let one = vec![stream(1, Some("Mixed"))];
        assert_eq!(select_track(&one, "Game only", 1), 0);
        assert_eq!(select_track(&[], "Game only", 1), 0);
    }

    #[test]
    fn test_empty_title_never_matches_untitled_streams() {
        let streams = vec![stream(1, None), stream(2, None), stream(3, None)];
        assert_eq!(select_track(&streams, "  ", 2), 2);
    }

    struct CountingProber {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MediaProber for CountingProber {
        async fn duration_ms(&self, _path: &str) -> Result<u64> {
            Err(Error::ProbeFailed("unused".to_string()))
        }

        async fn audio_streams(&self, path: &str) -> Result<Vec<AudioStream>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if path == "broken.mp4" {
                return Err(Error::ProbeFailed("unreadable".to_string()));
            }
            Ok(vec![stream(1, Some("Mixed")), stream(2, Some("Game only"))])
        }
    }

    fn clip(path: &str) -> ClipInterval {
        ClipInterval {
            source_path: path.to_string(),
            start_sec: 0.0,
            duration_sec: 7.5,
            sort_key_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_probes_each_path_once() {
        let prober = Arc::new(CountingProber {
            calls: AtomicUsize::new(0),
        });
        let resolver = AudioTrackResolver::new(prober.clone(), "Game only", 1);

        let clips = vec![clip("a.mp4"), clip("b.mp4"), clip("a.mp4"), clip("broken.mp4")];
        assert_eq!(resolver.resolve(&clips).await, vec![1, 1, 1, 0]);
        assert_eq!(prober.calls.load(Ordering::SeqCst), 3);

        resolver.resolve(&clips).await;
        assert_eq!(prober.calls.load(Ordering::SeqCst), 3);
        assert_eq!(resolver.cached(), 3);
    }
}
