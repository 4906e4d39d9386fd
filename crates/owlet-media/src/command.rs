//! FFmpeg invocation builder and tool runner.
//!
//! All external-tool calls go through the [`ToolRunner`] trait so pipeline
//! logic can be exercised in tests with a fake runner; [`SystemRunner`] is
//! the production implementation.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Builder for one FFmpeg invocation.
///
/// Translating to argv happens in exactly one place ([`Self::build_args`]);
/// everything upstream works with the typed form.
#[derive(Debug, Clone)]
pub struct FfmpegInvocation {
    /// Input file paths, in `-i` order.
    inputs: Vec<PathBuf>,
    /// Filter graph, if any.
    filter_complex: Option<String>,
    /// Output pad labels to map.
    maps: Vec<String>,
    /// Output arguments (codecs, rates, flags).
    output_args: Vec<String>,
    /// Output file path.
    output: PathBuf,
    /// Whether to overwrite the output.
    overwrite: bool,
    /// FFmpeg log level.
    log_level: String,
}

impl FfmpegInvocation {
    /// Create a new invocation writing to `output`.
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            filter_complex: None,
            maps: Vec::new(),
            output_args: Vec::new(),
            output: output.as_ref().to_path_buf(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add an input file.
    pub fn input(mut self, path: impl AsRef<Path>) -> Self {
        self.inputs.push(path.as_ref().to_path_buf());
        self
    }

    /// Set the filter graph.
    pub fn filter_complex(mut self, filter: impl Into<String>) -> Self {
        self.filter_complex = Some(filter.into());
        self
    }

    /// Map an output pad label (e.g. `[v0]`).
    pub fn map(mut self, label: impl Into<String>) -> Self {
        self.maps.push(label.into());
        self
    }

    /// Add an output argument.
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Set CRF (quality).
    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    /// Drop the audio streams.
    pub fn no_audio(self) -> Self {
        self.output_arg("-an")
    }

    /// Drop the video streams.
    pub fn no_video(self) -> Self {
        self.output_arg("-vn")
    }

    /// Truncate the output to the shortest input stream.
    pub fn shortest(self) -> Self {
        self.output_arg("-shortest")
    }

    /// The output path this invocation writes.
    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Build the argv for this invocation.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        for input in &self.inputs {
            args.push("-i".to_string());
            args.push(input.to_string_lossy().to_string());
        }

        if let Some(filter) = &self.filter_complex {
            args.push("-filter_complex".to_string());
            args.push(filter.clone());
        }

        for label in &self.maps {
            args.push("-map".to_string());
            args.push(label.clone());
        }

        args.extend(self.output_args.clone());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Executes the external transcoder and its inspector.
///
/// Production code uses [`SystemRunner`]; tests inject fakes that record
/// invocations and fabricate outputs.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run ffmpeg with the given argv. Blocks until it exits.
    async fn run_ffmpeg(&self, args: &[String]) -> MediaResult<()>;

    /// Run ffprobe with the given argv and return its stdout.
    async fn run_ffprobe(&self, args: &[String]) -> MediaResult<Vec<u8>>;
}

/// Runner that shells out to the real ffmpeg/ffprobe binaries.
#[derive(Debug, Default, Clone)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolRunner for SystemRunner {
    async fn run_ffmpeg(&self, args: &[String]) -> MediaResult<()> {
        check_ffmpeg()?;
        debug!("Running: ffmpeg {}", args.join(" "));

        let output = Command::new("ffmpeg")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if output.status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                Some(String::from_utf8_lossy(&output.stderr).to_string()),
                output.status.code(),
            ))
        }
    }

    async fn run_ffprobe(&self, args: &[String]) -> MediaResult<Vec<u8>> {
        check_ffprobe()?;
        debug!("Running: ffprobe {}", args.join(" "));

        let output = Command::new("ffprobe")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(MediaError::ffprobe_failed(
                "FFprobe exited with non-zero status",
                Some(String::from_utf8_lossy(&output.stderr).to_string()),
            ))
        }
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}
