//! Single-clip transform pipeline.
//!
//! Converts one raw upload into a processed, labeled, optionally trimmed
//! mp4. The video and audio streams are rendered separately — the audio
//! padded with trailing silence — then muxed with `-shortest`, so the final
//! duration equals the (normally shorter) video stream's. A clip with no
//! usable video is recorded as a failure, never raised: callers run this in
//! long batch loops and must be able to proceed past bad files.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use owlet_models::VariantOutput;

use crate::command::{FfmpegInvocation, ToolRunner};
use crate::error::MediaResult;
use crate::filters::{audio_trim_chain, video_label_chain, LabelSpec};
use crate::fs_utils::{ensure_dir, move_file, remove_if_exists};
use crate::probe::{get_attribute, MediaAttribute};

/// Requested start offset for a numeric trim.
///
/// Negative `trim` keeps the last `|trim|` seconds: the start lands at
/// `duration + trim`, clamped to `0` so clips shorter than the window are
/// kept whole. Positive `trim` cuts that many seconds off the head.
pub fn start_for_trim_seconds(trim: f64, duration: f64) -> f64 {
    if trim < 0.0 {
        (duration + trim).max(0.0)
    } else {
        trim
    }
}

/// One clip-transform job.
#[derive(Debug, Clone)]
pub struct TransformRequest {
    /// Full path to the raw upload.
    pub source: PathBuf,
    /// Absolute directory the processed files go in.
    pub dest_dir: PathBuf,
    /// The same directory relative to the session root, for recorded paths.
    pub rel_dir: PathBuf,
    /// Raw filename without extension.
    pub stem: String,
    /// Variant name ("whole", "trimmed"), appended to the output filename.
    pub variant: String,
    /// Start offset in seconds, `None` for no trimming.
    pub trim_start: Option<f64>,
    /// Burned-in overlays.
    pub label: LabelSpec,
}

impl TransformRequest {
    /// Filename of the final processed mp4.
    pub fn merged_filename(&self) -> String {
        format!("{}_{}.mp4", self.stem, self.variant)
    }

    /// Absolute path of the final processed mp4.
    pub fn merged_path(&self) -> PathBuf {
        self.dest_dir.join(self.merged_filename())
    }

    /// Recorded path, relative to the session root.
    pub fn rel_path(&self) -> String {
        self.rel_dir
            .join(self.merged_filename())
            .to_string_lossy()
            .to_string()
    }

    fn video_only_path(&self) -> PathBuf {
        self.dest_dir.join(format!("{}_video.mp4", self.stem))
    }

    fn audio_only_path(&self) -> PathBuf {
        self.dest_dir.join(format!("{}_audio.m4a", self.stem))
    }
}

/// Produce one processed clip, or a recorded "could not produce" outcome.
///
/// The skip-if-already-done check lives in the caller, which owns the state
/// record this outcome is folded into.
pub async fn process_clip(
    runner: &dyn ToolRunner,
    request: &TransformRequest,
) -> MediaResult<VariantOutput> {
    ensure_dir(&request.dest_dir).await?;

    let height = get_attribute(runner, &request.source, MediaAttribute::Height).await;
    if height <= 0.0 {
        warn!("No video data in {}", request.source.display());
        return Ok(VariantOutput::failed());
    }

    let video_only = request.video_only_path();
    let audio_only = request.audio_only_path();
    let merged = request.merged_path();

    // Silent labeled render of the video stream alone.
    let render = FfmpegInvocation::new(&video_only)
        .input(&request.source)
        .filter_complex(video_label_chain(&request.label, request.trim_start))
        .map("[v0]")
        .video_codec("libx264")
        .no_audio()
        .output_args(["-vsync", "cfr", "-r", "30"])
        .crf(18);
    if let Err(e) = runner.run_ffmpeg(&render.build_args()).await {
        warn!("Video render failed for {}: {}", request.stem, e);
        remove_if_exists(&video_only).await;
        return Ok(VariantOutput::failed());
    }

    // The trim window may lie entirely past the end of the video stream.
    let video_dur = get_attribute(runner, &video_only, MediaAttribute::VideoDuration).await;
    if video_dur <= 0.0 {
        warn!(
            "No video in requested window for {}, recording failure",
            request.stem
        );
        remove_if_exists(&video_only).await;
        return Ok(VariantOutput::failed());
    }

    info!("Making {} mp4 for {}", request.variant, request.stem);

    // Matching audio-only render, tail-padded with silence.
    let audio_render = FfmpegInvocation::new(&audio_only)
        .input(&request.source)
        .no_video()
        .filter_complex(audio_trim_chain(request.trim_start))
        .map("[a0]")
        .audio_codec("aac");
    if let Err(e) = runner.run_ffmpeg(&audio_render.build_args()).await {
        warn!("Audio render failed for {}: {}", request.stem, e);
    }

    let audio_usable = audio_only.exists()
        && get_attribute(runner, &audio_only, MediaAttribute::AudioDuration).await > 0.0;

    if audio_usable {
        let mux = FfmpegInvocation::new(&merged)
            .input(&video_only)
            .input(&audio_only)
            .video_codec("copy")
            .audio_codec("copy")
            .shortest();
        if let Err(e) = runner.run_ffmpeg(&mux.build_args()).await {
            warn!("Mux failed for {}: {}", request.stem, e);
            cleanup_intermediates(&video_only, &audio_only).await;
            return Ok(VariantOutput::failed());
        }
    } else {
        // No usable audio: the video-only render becomes the artifact.
        move_file(&video_only, &merged).await?;
    }

    let duration = get_attribute(runner, &merged, MediaAttribute::VideoDuration).await;
    cleanup_intermediates(&video_only, &audio_only).await;

    if duration <= 0.0 {
        warn!("Processed clip for {} has no video, recording failure", request.stem);
        return Ok(VariantOutput::failed());
    }

    Ok(VariantOutput {
        duration_seconds: duration,
        rel_path: request.rel_path(),
    })
}

async fn cleanup_intermediates(video_only: &Path, audio_only: &Path) {
    remove_if_exists(video_only).await;
    remove_if_exists(audio_only).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    use crate::error::MediaError;

    /// Fake transcoder: creates the output file of every ffmpeg call and
    /// serves canned probe JSON per filename suffix.
    #[derive(Default)]
    struct FakeTool {
        ffmpeg_calls: Mutex<Vec<Vec<String>>>,
        probes: HashMap<String, String>,
    }

    impl FakeTool {
        fn probe(mut self, suffix: &str, json: &str) -> Self {
            self.probes.insert(suffix.to_string(), json.to_string());
            self
        }

        fn ffmpeg_count(&self) -> usize {
            self.ffmpeg_calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ToolRunner for FakeTool {
        async fn run_ffmpeg(&self, args: &[String]) -> MediaResult<()> {
            self.ffmpeg_calls.lock().unwrap().push(args.to_vec());
            std::fs::write(args.last().unwrap(), b"fake media")?;
            Ok(())
        }

        async fn run_ffprobe(&self, args: &[String]) -> MediaResult<Vec<u8>> {
            let path = args.last().unwrap();
            for (suffix, json) in &self.probes {
                if path.ends_with(suffix) {
                    return Ok(json.clone().into_bytes());
                }
            }
            Err(MediaError::ffprobe_failed(format!("no canned probe for {}", path), None))
        }
    }

    const SOURCE_PROBE: &str = r#"{
        "format": {"duration": "30.0"},
        "streams": [
            {"codec_type": "video", "width": 640, "height": 480, "duration": "30.0"},
            {"codec_type": "audio", "duration": "30.0"}
        ]
    }"#;

    const VIDEO_ONLY_PROBE: &str = r#"{
        "format": {"duration": "10.0"},
        "streams": [{"codec_type": "video", "width": 640, "height": 480, "duration": "10.0"}]
    }"#;

    const NO_VIDEO_PROBE: &str = r#"{
        "format": {"duration": "30.0"},
        "streams": [{"codec_type": "audio", "duration": "30.0"}]
    }"#;

    const EMPTY_AUDIO_PROBE: &str = r#"{
        "format": {},
        "streams": []
    }"#;

    fn request(dir: &TempDir) -> TransformRequest {
        TransformRequest {
            source: dir.path().join("clip.flv"),
            dest_dir: dir.path().join("study").join("sess"),
            rel_dir: PathBuf::from("study/sess"),
            stem: "clip".to_string(),
            variant: "whole".to_string(),
            trim_start: None,
            label: LabelSpec {
                text: "frame_sess_123".into(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_trim_start_boundaries() {
        // Keep the last 20 s of a 30 s clip.
        assert!((start_for_trim_seconds(-20.0, 30.0) - 10.0).abs() < 1e-9);
        // Window longer than the clip: keep the whole clip.
        assert_eq!(start_for_trim_seconds(-45.0, 30.0), 0.0);
        // Positive trim cuts from the head.
        assert_eq!(start_for_trim_seconds(5.0, 30.0), 5.0);
    }

    #[tokio::test]
    async fn test_clip_with_audio_is_muxed() {
        let dir = TempDir::new().unwrap();
        let tool = FakeTool::default()
            .probe("clip.flv", SOURCE_PROBE)
            .probe("_video.mp4", VIDEO_ONLY_PROBE)
            .probe("_audio.m4a", SOURCE_PROBE)
            .probe("_whole.mp4", VIDEO_ONLY_PROBE);
        let req = request(&dir);

        let outcome = process_clip(&tool, &req).await.unwrap();

        assert!((outcome.duration_seconds - 10.0).abs() < 1e-9);
        assert_eq!(outcome.rel_path, "study/sess/clip_whole.mp4");
        // video render + audio render + mux
        assert_eq!(tool.ffmpeg_count(), 3);
        assert!(req.merged_path().exists());
        // Intermediates cleaned up.
        assert!(!req.video_only_path().exists());
        assert!(!req.audio_only_path().exists());
    }

    #[tokio::test]
    async fn test_silent_clip_renames_video_into_place() {
        let dir = TempDir::new().unwrap();
        let tool = FakeTool::default()
            .probe("clip.flv", VIDEO_ONLY_PROBE)
            .probe("_video.mp4", VIDEO_ONLY_PROBE)
            .probe("_audio.m4a", EMPTY_AUDIO_PROBE)
            .probe("_whole.mp4", VIDEO_ONLY_PROBE);
        let req = request(&dir);

        let outcome = process_clip(&tool, &req).await.unwrap();

        assert!(outcome.is_available());
        // video render + audio render attempt, but no mux
        assert_eq!(tool.ffmpeg_count(), 2);
        assert!(req.merged_path().exists());
    }

    #[tokio::test]
    async fn test_source_without_video_records_failure() {
        let dir = TempDir::new().unwrap();
        let tool = FakeTool::default().probe("clip.flv", NO_VIDEO_PROBE);
        let req = request(&dir);

        let outcome = process_clip(&tool, &req).await.unwrap();

        assert_eq!(outcome, VariantOutput::failed());
        assert_eq!(tool.ffmpeg_count(), 0);
        assert!(!req.merged_path().exists());
    }

    #[tokio::test]
    async fn test_empty_trim_window_records_failure() {
        let dir = TempDir::new().unwrap();
        // The video-only render probes to zero duration: the trim window
        // started past the end of the video stream.
        let tool = FakeTool::default()
            .probe("clip.flv", SOURCE_PROBE)
            .probe("_video.mp4", EMPTY_AUDIO_PROBE);
        let mut req = request(&dir);
        req.trim_start = Some(29.5);

        let outcome = process_clip(&tool, &req).await.unwrap();

        assert_eq!(outcome, VariantOutput::failed());
        assert!(!req.video_only_path().exists());
    }
}
