//! External media tools: ffprobe for inspection, ffmpeg for transcoding

pub mod audio;
pub mod probe;
pub mod transcode;

pub use audio::AudioTrackResolver;
pub use probe::{AudioStream, FfprobeProber, MediaProber};
pub use transcode::{spawn_transcoder, TranscodeStream};
