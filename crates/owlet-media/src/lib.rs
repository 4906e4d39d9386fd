#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper for session-video processing.
//!
//! This crate provides:
//! - Type-safe FFmpeg invocation building behind an injectable runner
//! - FFprobe metadata extraction with per-stream fallback semantics
//! - The single-clip transform pipeline (label, trim, mux)
//! - Ordered concatenation with audio-degradation handling

pub mod command;
pub mod concat;
pub mod error;
pub mod filters;
pub mod fs_utils;
pub mod probe;
pub mod transform;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegInvocation, SystemRunner, ToolRunner};
pub use concat::{concat_clips, concat_mode, ConcatMode};
pub use error::{MediaError, MediaResult};
pub use filters::LabelSpec;
pub use probe::{get_attribute, get_attributes, has_audio_stream, stream_info, MediaAttribute};
pub use transform::{process_clip, start_for_trim_seconds, TransformRequest};
