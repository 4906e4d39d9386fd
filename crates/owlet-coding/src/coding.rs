//! Coding-record creation and expected-video derivation.

use tracing::info;

use owlet_models::{SessionCodingRecord, StudySessions};
use owlet_store::StoreKey;

use crate::context::{CodingData, RunContext};
use crate::error::CodingResult;
use crate::study::StrategySet;

/// Coder-specific record fields; each maps coder name to value on the
/// record and appears on sheets as `<field>.<coder>`.
pub fn coder_fields() -> Vec<&'static str> {
    vec!["coderComments"]
}

/// Create coding records for new sessions and refresh expectations.
///
/// Records written by older schema versions are backfilled with defaults on
/// load. Every session's `videos_expected` is rebuilt from its frame data
/// (frames that declare a video id, in frame order), then the study's
/// post-processor derives its extra fields. Returns the number of sessions
/// that got a brand-new record.
pub async fn update_coding(ctx: &RunContext, study: &str) -> CodingResult<usize> {
    let sessions: StudySessions = ctx
        .store
        .load(&StoreKey::Sessions(study.to_string()))
        .await?;
    let mut coding: CodingData = ctx.store.load(&StoreKey::Coding(study.to_string())).await?;

    let config = ctx.study_config(study);
    let strategies = StrategySet::for_kind(config.strategy);

    let mut new_records = 0;
    for session in &sessions.sessions {
        let record = coding.entry(session.id.clone()).or_insert_with(|| {
            new_records += 1;
            SessionCodingRecord::default()
        });

        record.videos_expected = session
            .attributes
            .exp_data
            .values()
            .filter_map(|frame| frame.video_id.clone())
            .collect();

        strategies.coding.process(record, &session.attributes);
    }

    ctx.store
        .save(&StoreKey::Coding(study.to_string()), &coding)
        .await?;

    info!(
        "Updated coding with {} new records for study {}",
        new_records, study
    );
    Ok(new_records)
}
