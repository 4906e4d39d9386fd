//! FFprobe metadata extraction.
//!
//! One ffprobe invocation (`-show_format -show_streams`) serves any number
//! of requested attributes. Attributes whose stream is absent come back as
//! `0.0` with a logged warning — many legitimate clips have no audio, and
//! callers must treat that as "feature unusable" rather than an error. A
//! failed tool invocation yields `-1.0` for everything requested, because
//! probing runs inside long batch loops where one bad file must not abort
//! the whole batch.

use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::command::ToolRunner;
use crate::error::MediaResult;

/// FFprobe JSON output.
#[derive(Debug, Default, Deserialize)]
pub struct ProbeOutput {
    #[serde(default)]
    pub format: ProbeFormat,
    #[serde(default)]
    pub streams: Vec<ProbeStream>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProbeFormat {
    pub duration: Option<String>,
    pub bit_rate: Option<String>,
    pub start_time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProbeStream {
    #[serde(default)]
    pub codec_type: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration: Option<String>,
    pub nb_frames: Option<String>,
    pub avg_frame_rate: Option<String>,
    pub r_frame_rate: Option<String>,
}

impl ProbeOutput {
    /// The first video stream, if any.
    pub fn video_stream(&self) -> Option<&ProbeStream> {
        self.streams.iter().find(|s| s.codec_type == "video")
    }

    /// The first audio stream, if any.
    pub fn audio_stream(&self) -> Option<&ProbeStream> {
        self.streams.iter().find(|s| s.codec_type == "audio")
    }
}

/// File attributes extractable from one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaAttribute {
    /// Container duration, seconds.
    Duration,
    /// Container bit rate, bits/second.
    BitRate,
    /// Container start time, seconds.
    StartTime,
    /// Video frame height, pixels.
    Height,
    /// Video frame width, pixels.
    Width,
    /// Video frame count.
    FrameCount,
    /// Video stream duration, seconds.
    VideoDuration,
    /// Audio stream duration, seconds.
    AudioDuration,
}

/// Probe a file, propagating tool failures.
///
/// Most callers want [`get_attributes`] instead; this is the raw form for
/// callers that inspect streams directly.
pub async fn stream_info(runner: &dyn ToolRunner, path: &Path) -> MediaResult<ProbeOutput> {
    let args: Vec<String> = [
        "-v",
        "quiet",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
    ]
    .iter()
    .map(|s| s.to_string())
    .chain(std::iter::once(path.to_string_lossy().to_string()))
    .collect();

    let stdout = runner.run_ffprobe(&args).await?;
    Ok(serde_json::from_slice(&stdout)?)
}

/// Extract several attributes from one probe invocation.
///
/// Never fails: a tool error yields `-1.0` per attribute, a missing stream
/// yields `0.0` for the attributes that need it.
pub async fn get_attributes(
    runner: &dyn ToolRunner,
    path: &Path,
    attributes: &[MediaAttribute],
) -> Vec<f64> {
    let probe = match stream_info(runner, path).await {
        Ok(probe) => probe,
        Err(e) => {
            warn!("Could not probe {}: {}", path.display(), e);
            return vec![-1.0; attributes.len()];
        }
    };

    attributes
        .iter()
        .map(|attr| extract_attribute(&probe, *attr, path))
        .collect()
}

/// Extract a single attribute; see [`get_attributes`].
pub async fn get_attribute(runner: &dyn ToolRunner, path: &Path, attribute: MediaAttribute) -> f64 {
    get_attributes(runner, path, &[attribute]).await[0]
}

/// Whether the file has an audio stream.
///
/// Probe failures count as "no audio" (warned) so concatenation can degrade
/// instead of aborting.
pub async fn has_audio_stream(runner: &dyn ToolRunner, path: &Path) -> bool {
    match stream_info(runner, path).await {
        Ok(probe) => probe.audio_stream().is_some(),
        Err(e) => {
            warn!("Could not probe {} for audio: {}", path.display(), e);
            false
        }
    }
}

fn extract_attribute(probe: &ProbeOutput, attribute: MediaAttribute, path: &Path) -> f64 {
    use MediaAttribute::*;

    let from_video = |field: fn(&ProbeStream) -> f64| match probe.video_stream() {
        Some(stream) => field(stream),
        None => {
            warn!("No video stream in {}", path.display());
            0.0
        }
    };

    match attribute {
        Duration => parse_opt(&probe.format.duration),
        BitRate => parse_opt(&probe.format.bit_rate),
        StartTime => parse_opt(&probe.format.start_time),
        Height => from_video(|s| s.height.unwrap_or(0) as f64),
        Width => from_video(|s| s.width.unwrap_or(0) as f64),
        FrameCount => from_video(|s| parse_opt(&s.nb_frames)),
        VideoDuration => from_video(|s| parse_opt(&s.duration)),
        AudioDuration => match probe.audio_stream() {
            Some(stream) => parse_opt(&stream.duration),
            None => {
                warn!("No audio stream in {}", path.display());
                0.0
            }
        },
    }
}

fn parse_opt(value: &Option<String>) -> f64 {
    value
        .as_ref()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Parse a frame rate string (e.g. "30/1" or "29.97").
pub fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::PathBuf;

    use crate::error::MediaError;

    /// Runner returning canned ffprobe JSON, or failing.
    struct CannedProbe(Option<&'static str>);

    #[async_trait]
    impl crate::command::ToolRunner for CannedProbe {
        async fn run_ffmpeg(&self, _args: &[String]) -> MediaResult<()> {
            unreachable!("probe tests never run ffmpeg")
        }

        async fn run_ffprobe(&self, _args: &[String]) -> MediaResult<Vec<u8>> {
            match self.0 {
                Some(json) => Ok(json.as_bytes().to_vec()),
                None => Err(MediaError::ffprobe_failed("boom", None)),
            }
        }
    }

    const BOTH_STREAMS: &str = r#"{
        "format": {"duration": "12.480000", "bit_rate": "520000", "start_time": "0.000000"},
        "streams": [
            {"codec_type": "video", "width": 640, "height": 480,
             "duration": "12.433333", "nb_frames": "373", "avg_frame_rate": "30/1"},
            {"codec_type": "audio", "duration": "12.480000"}
        ]
    }"#;

    const VIDEO_ONLY: &str = r#"{
        "format": {"duration": "5.0"},
        "streams": [{"codec_type": "video", "width": 640, "height": 480, "duration": "5.0"}]
    }"#;

    #[tokio::test]
    async fn test_multi_attribute_extraction() {
        let runner = CannedProbe(Some(BOTH_STREAMS));
        let values = get_attributes(
            &runner,
            &PathBuf::from("clip.flv"),
            &[
                MediaAttribute::Duration,
                MediaAttribute::Width,
                MediaAttribute::FrameCount,
                MediaAttribute::AudioDuration,
            ],
        )
        .await;
        assert!((values[0] - 12.48).abs() < 1e-6);
        assert_eq!(values[1], 640.0);
        assert_eq!(values[2], 373.0);
        assert!((values[3] - 12.48).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_missing_stream_yields_zero_not_error() {
        let runner = CannedProbe(Some(VIDEO_ONLY));
        let audio =
            get_attribute(&runner, &PathBuf::from("silent.mp4"), MediaAttribute::AudioDuration)
                .await;
        assert_eq!(audio, 0.0);
        assert!(!has_audio_stream(&runner, &PathBuf::from("silent.mp4")).await);
    }

    #[tokio::test]
    async fn test_tool_failure_yields_sentinels() {
        let runner = CannedProbe(None);
        let values = get_attributes(
            &runner,
            &PathBuf::from("gone.flv"),
            &[MediaAttribute::Duration, MediaAttribute::Height],
        )
        .await;
        assert_eq!(values, vec![-1.0, -1.0]);
        // Audio presence degrades to false rather than erroring.
        assert!(!has_audio_stream(&runner, &PathBuf::from("gone.flv")).await);
    }

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("x/0").is_none());
    }
}
