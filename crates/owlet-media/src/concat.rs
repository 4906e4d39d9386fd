//! Ordered clip concatenation.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::command::{FfmpegInvocation, ToolRunner};
use crate::error::MediaResult;
use crate::filters::concat_graph;
use crate::fs_utils::ensure_dir;
use crate::probe::{get_attribute, has_audio_stream, MediaAttribute};

/// How a set of clips can be joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcatMode {
    /// Every input has audio; join audio and video.
    AudioVideo,
    /// At least one input lacks audio; the joined artifact drops audio
    /// entirely. Partial-audio mixtures are not supported.
    VideoOnly,
}

/// Choose the join mode from per-clip audio presence.
pub fn concat_mode(audio_flags: &[bool]) -> ConcatMode {
    if audio_flags.iter().all(|&has| has) {
        ConcatMode::AudioVideo
    } else {
        ConcatMode::VideoOnly
    }
}

/// Concatenate processed clips into one artifact.
///
/// Clips are joined in the order given. Returns the probed video-stream
/// duration of the result so callers can check it against the sum of the
/// inputs' recorded durations. An empty input list creates nothing and
/// returns `0.0`.
pub async fn concat_clips(
    runner: &dyn ToolRunner,
    output: &Path,
    inputs: &[PathBuf],
) -> MediaResult<f64> {
    if inputs.is_empty() {
        return Ok(0.0);
    }

    let mut audio_flags = Vec::with_capacity(inputs.len());
    for input in inputs {
        audio_flags.push(has_audio_stream(runner, input).await);
    }
    let mode = concat_mode(&audio_flags);
    if mode == ConcatMode::VideoOnly && audio_flags.iter().any(|&has| has) {
        warn!(
            "Not all inputs for {} have audio; joining video only",
            output.display()
        );
    }

    if let Some(parent) = output.parent() {
        ensure_dir(parent).await?;
    }

    let mut invocation = FfmpegInvocation::new(output);
    for input in inputs {
        invocation = invocation.input(input);
    }
    invocation = invocation
        .filter_complex(concat_graph(inputs.len(), mode == ConcatMode::AudioVideo))
        .map("[outv]")
        .video_codec("libx264");
    if mode == ConcatMode::AudioVideo {
        invocation = invocation.map("[outa]").audio_codec("aac");
    }

    runner.run_ffmpeg(&invocation.build_args()).await?;

    let duration = get_attribute(runner, output, MediaAttribute::VideoDuration).await;
    info!(
        "Concatenated {} clips into {} ({:.2}s)",
        inputs.len(),
        output.display(),
        duration
    );
    Ok(duration)
}
