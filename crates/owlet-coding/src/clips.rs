//! Clip-level transform driver.
//!
//! Walks a study's matched videos and produces one processed variant per
//! clip through the media engine. Every clip first checks for an existing
//! output on disk plus a state record of it; with `replace` off that makes
//! repeated runs cheap, which is the pipeline's main cost control.

use std::path::PathBuf;

use tracing::{info, warn};

use owlet_media::{process_clip, start_for_trim_seconds, LabelSpec, TransformRequest};
use owlet_models::{
    FrameData, SessionKey, StudySessions, TrimSpec, VideoIdentifier, RAW_EXTENSION,
};
use owlet_store::StoreKey;

use crate::context::{CodingData, RunContext, VideoData};
use crate::error::CodingResult;

/// Which sessions a pass covers.
#[derive(Debug, Clone)]
pub enum SessionSelection {
    All,
    Keys(Vec<SessionKey>),
}

impl SessionSelection {
    /// The session keys this selection covers.
    pub(crate) fn keys(&self, coding: &CodingData) -> Vec<SessionKey> {
        match self {
            SessionSelection::All => coding.keys().cloned().collect(),
            SessionSelection::Keys(keys) => {
                let mut keys = keys.clone();
                keys.sort();
                keys.dedup();
                keys
            }
        }
    }
}

/// One clip whose processed variant changed this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipChange {
    pub session_key: SessionKey,
    pub video_name: String,
    pub variant: String,
}

/// Produce a processed variant for every matched clip of the selected
/// sessions. Returns the clips actually (re)processed.
pub async fn process_study_clips(
    ctx: &RunContext,
    study: &str,
    selection: &SessionSelection,
    variant: &str,
    trim: &TrimSpec,
    replace: bool,
) -> CodingResult<Vec<ClipChange>> {
    info!("Making {} mp4s for study {}", variant, study);

    let coding: CodingData = ctx.store.load(&StoreKey::Coding(study.to_string())).await?;
    let mut video_data: VideoData = ctx.store.load(&StoreKey::Video).await?;
    let config = ctx.study_config(study);

    // Frame data only matters for event-based trimming and event overlays.
    let sessions: Option<StudySessions> =
        if matches!(trim, TrimSpec::EventSuffix(_)) || config.label_events {
            Some(ctx.store.load(&StoreKey::Sessions(study.to_string())).await?)
        } else {
            None
        };

    let mut changes = Vec::new();

    for session_key in selection.keys(&coding) {
        let Some(record) = coding.get(&session_key) else {
            continue;
        };
        if record.videos_expected.is_empty() {
            continue;
        }
        let (key_study, session_id) = session_key.parse()?;
        if key_study != study {
            warn!("Skipping session not for this study: {}", session_key);
            continue;
        }

        let rel_dir = PathBuf::from(study).join(&session_id);
        let dest_dir = ctx.config.session_dir.join(&rel_dir);

        let frame_data = sessions
            .as_ref()
            .and_then(|s| s.find(&session_key))
            .map(|s| &s.attributes.exp_data);

        for video_name in record.videos_found.iter().flatten() {
            let Some(video_record) = video_data.get(video_name) else {
                warn!("No video record for {}, skipping", video_name);
                continue;
            };

            let stem = video_name
                .strip_suffix(RAW_EXTENSION)
                .unwrap_or(video_name)
                .to_string();
            let merged_path = dest_dir.join(format!("{}_{}.mp4", stem, variant));
            let already_recorded = video_record
                .variant(variant)
                .map(|v| !v.rel_path.is_empty())
                .unwrap_or(false);
            if !replace && merged_path.exists() && already_recorded {
                continue;
            }

            let identifier = VideoIdentifier::parse(video_name)?;
            let clip_frame = frame_data.and_then(|frames| {
                frames
                    .get(&identifier.frame_id)
                    .or_else(|| frames.iter().find(|(id, _)| id.contains(&identifier.frame_id)).map(|(_, f)| f))
            });

            let trim_start = resolve_trim_start(
                trim,
                video_record.duration_seconds,
                clip_frame,
                video_name,
            );

            let label = LabelSpec {
                text: format!(
                    "{}_{}_{}",
                    identifier.frame_id, identifier.session_id, identifier.timestamp_token
                ),
                font_file: ctx.config.label_font.clone(),
                annotations: if config.label_events {
                    clip_frame.map(event_annotations).unwrap_or_default()
                } else {
                    Vec::new()
                },
            };

            let request = TransformRequest {
                source: ctx.config.video_dir.join(video_name),
                dest_dir: dest_dir.clone(),
                rel_dir: rel_dir.clone(),
                stem,
                variant: variant.to_string(),
                trim_start,
                label,
            };

            let outcome = process_clip(ctx.runner.as_ref(), &request).await?;
            video_data
                .get_mut(video_name)
                .expect("record checked above")
                .set_variant(variant, outcome);
            changes.push(ClipChange {
                session_key: session_key.clone(),
                video_name: video_name.clone(),
                variant: variant.to_string(),
            });
        }
    }

    ctx.store.save(&StoreKey::Video, &video_data).await?;
    Ok(changes)
}

/// Resolve a trim spec to a start offset for one clip.
fn resolve_trim_start(
    trim: &TrimSpec,
    clip_duration: f64,
    frame: Option<&FrameData>,
    video_name: &str,
) -> Option<f64> {
    match trim {
        TrimSpec::None => None,
        TrimSpec::Seconds(t) => Some(start_for_trim_seconds(*t, clip_duration)),
        TrimSpec::EventSuffix(suffix) => {
            let start = frame.and_then(|frame| {
                frame
                    .event_timings
                    .iter()
                    .find(|e| e.event_type.ends_with(suffix.as_str()))
                    .and_then(|e| e.stream_time)
            });
            if start.is_none() {
                warn!(
                    "No '{}' event for {}, not trimming",
                    suffix, video_name
                );
            }
            start
        }
    }
}

/// Timed label annotations from a frame's event timeline.
///
/// First occurrence of each event name, in stream order, labeled with the
/// name's final `:`-separated segment.
fn event_annotations(frame: &FrameData) -> Vec<(f64, String)> {
    let mut seen = Vec::new();
    let mut annotations: Vec<(f64, String)> = Vec::new();
    for event in &frame.event_timings {
        let Some(time) = event.stream_time else {
            continue;
        };
        let name = event
            .event_type
            .rsplit(':')
            .next()
            .unwrap_or(&event.event_type)
            .to_string();
        if seen.contains(&name) {
            continue;
        }
        seen.push(name.clone());
        annotations.push((time, name));
    }
    annotations.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    annotations
}
