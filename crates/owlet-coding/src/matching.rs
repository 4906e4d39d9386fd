//! Matching expected video fragments to discovered raw files.

use tracing::{info, warn};

use owlet_store::StoreKey;

use crate::context::{CodingData, RunContext, VideoData};
use crate::error::CodingResult;

/// Raw filenames whose short name matches an expected identifier.
///
/// A video matches when its reconstructed short name is contained in the
/// expected string; equality is the usual case, containment also covers
/// expectations that carry extra qualifiers around the recorded fragment.
pub fn match_expected(expected: &str, video_data: &VideoData) -> Vec<String> {
    video_data
        .iter()
        .filter(|(_, record)| expected.contains(record.short_name.as_str()))
        .map(|(name, _)| name.clone())
        .collect()
}

/// Rebuild every session's matched-video groups for a study.
///
/// After this, `videos_found` is index-aligned with `videos_expected` for
/// every record; expectations with no uploads get an empty group and a
/// warning, and coding continues without them.
pub async fn update_videos_found(ctx: &RunContext, study: &str) -> CodingResult<()> {
    info!("Updating videos found for study {}", study);

    let mut coding: CodingData = ctx.store.load(&StoreKey::Coding(study.to_string())).await?;
    let video_data: VideoData = ctx.store.load(&StoreKey::Video).await?;

    for (session_key, record) in coding.iter_mut() {
        if record.videos_expected.is_empty() {
            continue;
        }

        record.videos_found = record
            .videos_expected
            .iter()
            .map(|expected| {
                let matches = match_expected(expected, &video_data);
                if matches.is_empty() {
                    warn!(
                        "Expected video not found for {} (session {})",
                        expected, session_key
                    );
                }
                matches
            })
            .collect();
    }

    ctx.store
        .save(&StoreKey::Coding(study.to_string()), &coding)
        .await?;
    Ok(())
}
