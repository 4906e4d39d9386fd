//! Raw upload discovery and video-record bookkeeping.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use owlet_media::{get_attributes, MediaAttribute};
use owlet_models::{
    RawVideoRecord, SessionKey, StudySessions, VideoIdentifier, RAW_EXTENSION,
};
use owlet_store::StoreKey;

use crate::context::{RunContext, VideoData};
use crate::error::CodingResult;

/// Which discovered files to (re)process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestSelection {
    /// Only files with no record yet.
    NewOnly,
    /// Every file in the video directory.
    All,
    /// An explicit list of raw filenames.
    Named(Vec<String>),
}

/// What one ingest pass did and could not do.
#[derive(Debug, Default)]
pub struct IngestOutcome {
    /// Sessions whose video set changed, for downstream reconciliation.
    pub sessions_affected: Vec<SessionKey>,
    /// Filenames that did not parse; skipped, processing continued.
    pub improper: Vec<String>,
    /// Filenames that matched no known session.
    pub unmatched: Vec<String>,
}

/// List raw uploads in the video directory.
pub async fn list_raw_videos(ctx: &RunContext) -> CodingResult<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(&ctx.config.video_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(RAW_EXTENSION) {
                names.push(name);
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Update the video snapshot from the files in the video directory.
///
/// `reprocess` re-probes files that already have records; `reset_paths`
/// resets their processed-variant fields to unprocessed. `studies`
/// restricts ingestion to the given study ids (empty = all studies).
pub async fn update_video_data(
    ctx: &RunContext,
    selection: IngestSelection,
    reprocess: bool,
    reset_paths: bool,
    studies: &[String],
) -> CodingResult<IngestOutcome> {
    let mut video_data: VideoData = ctx.store.load(&StoreKey::Video).await?;
    let discovered = list_raw_videos(ctx).await?;

    let to_process: Vec<String> = match selection {
        IngestSelection::NewOnly => discovered
            .iter()
            .filter(|name| !video_data.contains_key(*name))
            .cloned()
            .collect(),
        IngestSelection::All => discovered,
        IngestSelection::Named(names) => names,
    };

    info!("Updating video data: {} files to process", to_process.len());

    let mut sessions_by_study: BTreeMap<String, StudySessions> = BTreeMap::new();
    let mut outcome = IngestOutcome::default();

    for video_name in to_process {
        let identifier = match VideoIdentifier::parse(&video_name) {
            Ok(identifier) => identifier,
            Err(_) => {
                warn!("Unexpected video filename format: {}", video_name);
                outcome.improper.push(video_name);
                continue;
            }
        };

        if !studies.is_empty() && !studies.contains(&identifier.study_id) {
            continue;
        }

        // Experimenter-site previews have no session or coding record.
        let Some(session_key) = identifier.session_key() else {
            debug!("Preview video, skipping: {}", video_name);
            continue;
        };

        if !sessions_by_study.contains_key(&identifier.study_id) {
            let sessions: StudySessions = ctx
                .store
                .load(&StoreKey::Sessions(identifier.study_id.clone()))
                .await?;
            sessions_by_study.insert(identifier.study_id.clone(), sessions);
        }
        let sessions = &sessions_by_study[&identifier.study_id];

        if sessions.find(&session_key).is_none() {
            warn!(
                "Could not find session for video {} (key {})",
                video_name, session_key
            );
            outcome.unmatched.push(video_name);
            continue;
        }

        let already_known = video_data.contains_key(&video_name);
        if already_known && !(reprocess || reset_paths) {
            continue;
        }

        outcome.sessions_affected.push(session_key.clone());

        let mut record = video_data.remove(&video_name).unwrap_or_else(|| {
            RawVideoRecord::new(
                identifier.short_name.clone(),
                session_key.clone(),
                identifier.study_id.clone(),
            )
        });
        record.short_name = identifier.short_name.clone();
        record.session_key = session_key;
        record.study_id = identifier.study_id.clone();

        if reprocess || !already_known {
            let source = ctx.config.video_dir.join(&video_name);
            let facts = get_attributes(
                ctx.runner.as_ref(),
                &source,
                &[
                    MediaAttribute::FrameCount,
                    MediaAttribute::Duration,
                    MediaAttribute::BitRate,
                    MediaAttribute::Width,
                    MediaAttribute::Height,
                ],
            )
            .await;
            record.framerate = if facts[1] > 0.0 { facts[0] / facts[1] } else { 0.0 };
            record.duration_seconds = facts[1];
            record.bit_rate = facts[2];
            record.width = facts[3].max(0.0) as u32;
            record.height = facts[4].max(0.0) as u32;
            debug!(
                "Processed {}: framerate {:.2}, duration {:.2}",
                video_name, record.framerate, record.duration_seconds
            );
        }

        if reset_paths || !already_known {
            record.reset_variants();
        }

        video_data.insert(video_name, record);
    }

    ctx.store.save(&StoreKey::Video, &video_data).await?;
    Ok(outcome)
}
