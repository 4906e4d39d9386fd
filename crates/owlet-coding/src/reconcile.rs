//! Session reconciliation: one artifact per session.
//!
//! Re-entrant across runs. Each pass makes sure the per-clip variants
//! exist, then for every selected session: applies the study's exclusion
//! rules, orders the surviving clips by their embedded timestamp, gates on
//! variant availability, concatenates, checks the result's duration against
//! the sum of the parts, and persists the outcome.

use std::collections::BTreeSet;

use tracing::{info, warn};

use owlet_media::concat_clips;
use owlet_models::{TrimSpec, VideoIdentifier, VARIANT_WHOLE};
use owlet_store::StoreKey;

use crate::clips::{process_study_clips, SessionSelection};
use crate::context::{CodingData, RunContext, VideoData};
use crate::error::CodingResult;
use crate::study::StrategySet;

/// One video frame period at 30 fps; duration discrepancies above this are
/// flagged for human review.
pub const DRIFT_TOLERANCE_SECONDS: f64 = 1.0 / 30.0;

/// Whether an expected-vs-actual duration pair counts as drift.
pub fn duration_drift(expected: f64, actual: f64) -> bool {
    (expected - actual).abs() > DRIFT_TOLERANCE_SECONDS
}

/// One clip scheduled for a session's artifact.
#[derive(Debug, Clone)]
pub struct ClipPlan {
    /// Raw filename (key into the video snapshot).
    pub video_name: String,
    /// Index into the session's match groups, for study post-processing.
    pub group_index: usize,
    /// Ordering token from the filename.
    pub timestamp_token: String,
    /// Processed variant contributing to the artifact.
    pub variant: String,
}

/// Concatenate the selected sessions' videos into per-session artifacts.
pub async fn concatenate_session_videos(
    ctx: &RunContext,
    study: &str,
    selection: &SessionSelection,
    replace: bool,
) -> CodingResult<()> {
    info!("Making concatenated session videos for study {}", study);

    let config = ctx.study_config(study);
    let strategies = StrategySet::for_kind(config.strategy);

    // The artifact can only use variants that exist; create missing ones
    // (never replacing) before looking at any session.
    let mut changes =
        process_study_clips(ctx, study, selection, VARIANT_WHOLE, &TrimSpec::None, false).await?;
    if config.concat_use_trimmed {
        changes.extend(
            process_study_clips(
                ctx,
                study,
                selection,
                owlet_models::VARIANT_TRIMMED,
                &config.trim,
                false,
            )
            .await?,
        );
    }
    let touched: BTreeSet<_> = changes.into_iter().map(|c| c.session_key).collect();

    let mut coding: CodingData = ctx.store.load(&StoreKey::Coding(study.to_string())).await?;
    let video_data: VideoData = ctx.store.load(&StoreKey::Video).await?;

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

        if config.only_concat_if_consent && !record.consent.trim().eq_ignore_ascii_case("yes") {
            info!("No confirmed consent for {}, skipping concat", session_key);
            continue;
        }

        let rel_dir = std::path::PathBuf::from(study).join(&session_id);
        let concat_filename = format!("{}_{}.mp4", study, session_id);
        let concat_path = ctx.config.session_dir.join(&rel_dir).join(&concat_filename);
        let concat_rel = rel_dir.join(&concat_filename).to_string_lossy().to_string();

        // The dominant cost control across nightly runs: an existing
        // artifact is only rebuilt when replacing or when one of this
        // session's clips changed in this run.
        if !replace && concat_path.exists() && !touched.contains(&session_key) {
            info!("Already have concat file {}, skipping", concat_filename);
            continue;
        }

        let mut plans = Vec::new();
        for (group_index, group) in record.videos_found.iter().enumerate() {
            for video_name in group {
                let identifier = VideoIdentifier::parse(video_name)?;
                if config.skips_frame(&identifier.frame_id) {
                    continue;
                }
                if strategies.concat_skip.skip(record, group_index) {
                    continue;
                }
                plans.push(ClipPlan {
                    video_name: video_name.clone(),
                    group_index,
                    timestamp_token: identifier.timestamp_token,
                    variant: config.variant_for_frame(&identifier.frame_id).to_string(),
                });
            }
        }

        // Canonical playback order is the upload timestamp embedded in the
        // filename, not group order.
        plans.sort_by(|a, b| a.timestamp_token.cmp(&b.timestamp_token));

        // Only clips whose variant actually got produced participate; a
        // failed transform never blocks the rest of the session.
        let (plans, paths): (Vec<ClipPlan>, Vec<std::path::PathBuf>) = plans
            .into_iter()
            .filter_map(|plan| {
                video_data
                    .get(&plan.video_name)
                    .and_then(|record| record.variant(&plan.variant))
                    .filter(|variant| variant.is_available())
                    .map(|variant| {
                        let path = ctx.config.session_dir.join(&variant.rel_path);
                        (plan, path)
                    })
            })
            .unzip();

        if plans.is_empty() {
            warn!("No video data for session {}", session_key);
            continue;
        }

        let expected_total: f64 = plans
            .iter()
            .map(|plan| {
                video_data[&plan.video_name]
                    .variant(&plan.variant)
                    .map(|v| v.duration_seconds)
                    .unwrap_or(0.0)
            })
            .sum();

        let actual = match concat_clips(ctx.runner.as_ref(), &concat_path, &paths).await {
            Ok(duration) => duration,
            Err(e) => {
                warn!("Concatenation failed for {}: {}", session_key, e);
                continue;
            }
        };

        if duration_drift(expected_total, actual) {
            warn!(
                "Duration drift for {}: predicted {:.3}, actual {:.3}",
                session_key, expected_total, actual
            );
        }

        let record = coding.get_mut(&session_key).expect("record checked above");
        record.concat_path = concat_rel;
        record.expected_duration_seconds = Some(expected_total);
        record.actual_duration_seconds = Some(actual);
        strategies.concat.process(record, &plans);
    }

    ctx.store
        .save(&StoreKey::Coding(study.to_string()), &coding)
        .await?;
    ctx.store.save(&StoreKey::Video, &video_data).await?;
    Ok(())
}
