//! ffmpeg argument list for a planned replay
//!
//! Each clip becomes one paced, seeked input. Video and audio are trimmed
//! and re-timed per clip, then folded left to right through pairwise
//! crossfades. Output is MPEG-TS on stdout.

use std::fmt::Write as _;
use std::time::Duration;

use super::planner::ClipInterval;
use crate::{Error, Result};

/// Compile the transcoder arguments for `clips`.
///
/// `audio_tracks[i]` selects the `a:<n>` track of clip `i`; missing entries
/// use track 0. `encoder_args` are spliced in verbatim as the video codec
/// settings.
pub fn compile(
    clips: &[ClipInterval],
    audio_tracks: &[usize],
    fade: Duration,
    encoder_args: &[String],
) -> Result<Vec<String>> {
    let Some(first) = clips.first() else {
        return Err(Error::NoClipsProduced);
    };

    let mut args: Vec<String> = Vec::with_capacity(clips.len() * 7 + encoder_args.len() + 24);
    for clip in clips {
        args.extend([
            "-thread_queue_size".to_string(),
            "1024".to_string(),
            "-re".to_string(),
            "-ss".to_string(),
            format!("{:.3}", clip.start_sec),
            "-i".to_string(),
            clip.source_path.clone(),
        ]);
    }

    let mut graph = String::new();
    for (i, clip) in clips.iter().enumerate() {
        let track = audio_tracks.get(i).copied().unwrap_or(0);
        let _ = write!(
            graph,
            "[{i}:v]trim=duration={dur:.3},setpts=PTS-STARTPTS[v{i}];",
            dur = clip.duration_sec
        );
        let _ = write!(
            graph,
            "[{i}:a:{track}]atrim=duration={dur:.3},asetpts=PTS-STARTPTS,\
             aformat=sample_rates=48000:channel_layouts=stereo,\
             aresample=async=1000:first_pts=0[a{i}];",
            dur = clip.duration_sec
        );
    }

    let fade_secs = fade.as_secs_f64();
    let mut out_v = "v0".to_string();
    let mut out_a = "a0".to_string();
    let mut running = first.duration_sec;

    for (i, clip) in clips.iter().enumerate().skip(1) {
        let offset = (running - fade_secs).max(0.0);
        let next_v = format!("vxf{i}");
        let next_a = format!("axf{i}");

        let _ = write!(
            graph,
            "[{out_v}][v{i}]xfade=transition=fade:duration={fade_secs:.3}:offset={offset:.3}[{next_v}];"
        );
        let _ = write!(
            graph,
            "[{out_a}][a{i}]acrossfade=d={fade_secs:.3}:c1=tri:c2=tri[{next_a}];"
        );

        running += clip.duration_sec - fade_secs;
        out_v = next_v;
        out_a = next_a;
    }

    if graph.ends_with(';') {
        graph.pop();
    }

    args.extend([
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "warning".to_string(),
        "-filter_complex".to_string(),
        graph,
        "-map".to_string(),
        format!("[{out_v}]"),
        "-map".to_string(),
        format!("[{out_a}]"),
    ]);
    args.extend(encoder_args.iter().cloned());
    args.extend(
        [
            "-c:a", "aac", "-b:a", "128k", "-f", "mpegts", "-muxdelay", "0", "-muxpreload", "0",
            "pipe:1",
        ]
        .map(String::from),
    );

    Ok(args)
}
