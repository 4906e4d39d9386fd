//! Grouping trimmed clips into fixed-minimum-duration coding batches.

use std::collections::BTreeMap;

use rand::Rng;
use tracing::{info, warn};

use owlet_media::concat_clips;
use owlet_models::{BatchId, BatchMember, BatchRecord, SessionKey, VARIANT_TRIMMED};
use owlet_store::StoreKey;

use crate::context::{CodingData, RunContext, VideoData};
use crate::error::{CodingError, CodingResult};
use crate::reconcile::duration_drift;

/// The batch snapshot for one study.
pub type BatchData = BTreeMap<BatchId, BatchRecord>;

/// A clip eligible for batching.
#[derive(Debug, Clone)]
pub struct BatchCandidate {
    pub session_key: SessionKey,
    pub video_name: String,
    pub duration_seconds: f64,
    pub width: u32,
}

/// Greedily partition candidates, in order, into batches.
///
/// A batch closes once its accumulated duration exceeds `min_seconds`, or
/// early when the next candidate's frame width differs from the batch's —
/// one concatenation never mixes resolutions. Returns the closed batches
/// and the leftover partial batch (possibly empty), as candidate indices.
pub fn partition_batches(
    candidates: &[BatchCandidate],
    min_seconds: f64,
) -> (Vec<Vec<usize>>, Vec<usize>) {
    let mut batches = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut current_duration = 0.0;
    let mut current_width = 0;

    for (index, candidate) in candidates.iter().enumerate() {
        if !current.is_empty() && candidate.width != current_width {
            batches.push(std::mem::take(&mut current));
            current_duration = 0.0;
        }
        if current.is_empty() {
            current_width = candidate.width;
        }
        current.push(index);
        current_duration += candidate.duration_seconds;
        if current_duration > min_seconds {
            batches.push(std::mem::take(&mut current));
            current_duration = 0.0;
        }
    }

    (batches, current)
}

/// Collect this study's trimmed, not-yet-batched clips that meet the
/// coding criteria (field values compared case- and whitespace-insensitively).
fn eligible_candidates(
    coding: &CodingData,
    video_data: &VideoData,
    criteria: &BTreeMap<String, Vec<String>>,
) -> Vec<BatchCandidate> {
    let mut candidates = Vec::new();

    for (session_key, record) in coding {
        let meets_criteria = criteria.iter().all(|(field, accepted)| {
            match record.field(field) {
                Some(value) => accepted
                    .iter()
                    .any(|a| a.trim().eq_ignore_ascii_case(value.trim())),
                None => {
                    warn!("Unknown coding criterion {}, excluding {}", field, session_key);
                    false
                }
            }
        });
        if !meets_criteria {
            continue;
        }

        for video_name in record.videos_found.iter().flatten() {
            let Some(video) = video_data.get(video_name) else {
                continue;
            };
            if video.is_batched() {
                continue;
            }
            let Some(trimmed) = video.variant(VARIANT_TRIMMED) else {
                continue;
            };
            if !trimmed.is_available() {
                continue;
            }
            candidates.push(BatchCandidate {
                session_key: session_key.clone(),
                video_name: video_name.clone(),
                duration_seconds: trimmed.duration_seconds,
                width: video.width,
            });
        }
    }

    candidates
}

/// Create coding batches for a study.
///
/// Batch mp4s are named `<study>_<code>.mp4` in the batch directory, with a
/// collision-checked random code. Returns the ids of the batches created.
pub async fn batch_videos(
    ctx: &RunContext,
    study: &str,
    min_minutes: f64,
    criteria: &BTreeMap<String, Vec<String>>,
    include_incomplete: bool,
) -> CodingResult<Vec<BatchId>> {
    info!("Making video batches for study {}", study);

    let coding: CodingData = ctx.store.load(&StoreKey::Coding(study.to_string())).await?;
    let mut video_data: VideoData = ctx.store.load(&StoreKey::Video).await?;
    let mut batch_data: BatchData = ctx
        .store
        .load(&StoreKey::Batches(study.to_string()))
        .await?;

    let candidates = eligible_candidates(&coding, &video_data, criteria);
    let (mut batches, leftover) = partition_batches(&candidates, min_minutes * 60.0);
    if !leftover.is_empty() {
        if include_incomplete {
            batches.push(leftover);
        } else {
            warn!("{} clips left unbatched, not long enough for a complete batch", leftover.len());
        }
    }

    let mut created = Vec::new();
    for batch_indices in batches {
        let members: Vec<BatchMember> = batch_indices
            .iter()
            .map(|&i| BatchMember {
                session_key: candidates[i].session_key.clone(),
                video_name: candidates[i].video_name.clone(),
                duration_seconds: candidates[i].duration_seconds,
            })
            .collect();
        let expected_total: f64 = members.iter().map(|m| m.duration_seconds).sum();

        let batch_filename = fresh_batch_filename(ctx, study);
        let batch_path = ctx.config.batch_dir.join(&batch_filename);

        let clip_paths: Vec<std::path::PathBuf> = batch_indices
            .iter()
            .map(|&i| {
                let rel = &video_data[&candidates[i].video_name]
                    .variant(VARIANT_TRIMMED)
                    .expect("eligibility checked")
                    .rel_path;
                ctx.config.session_dir.join(rel)
            })
            .collect();

        let actual = concat_clips(ctx.runner.as_ref(), &batch_path, &clip_paths).await?;
        info!(
            "Batch {} duration -- actual: {:.3}, expected: {:.3}",
            batch_filename, actual, expected_total
        );
        if duration_drift(expected_total, actual) {
            warn!(
                "Difference between predicted and actual batch length for {}",
                batch_filename
            );
        }

        let batch_id = BatchId::new();
        for (position, member) in members.iter().enumerate() {
            video_data
                .get_mut(&member.video_name)
                .expect("member taken from video data")
                .in_batches
                .insert(batch_id.as_str().to_string(), position);
        }
        batch_data.insert(batch_id.clone(), BatchRecord::new(batch_filename, members));
        created.push(batch_id);
    }

    // Membership back-references and batch records go to disk together.
    ctx.store
        .save(&StoreKey::Batches(study.to_string()), &batch_data)
        .await?;
    ctx.store.save(&StoreKey::Video, &video_data).await?;

    Ok(created)
}

fn fresh_batch_filename(ctx: &RunContext, study: &str) -> String {
    loop {
        let filename = format!("{}_{}.mp4", study, random_code(5));
        if !ctx.config.batch_dir.join(&filename).exists() {
            return filename;
        }
    }
}

fn random_code(len: usize) -> String {
    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::rng();
    (0..len)
        .map(|_| CHARS[rng.random_range(0..CHARS.len())] as char)
        .collect()
}

/// What to remove.
#[derive(Debug, Clone)]
pub enum BatchTarget {
    Id(BatchId),
    Filename(String),
    All,
}

/// The batch id for a batch filename.
pub async fn batch_for_filename(
    ctx: &RunContext,
    study: &str,
    filename: &str,
) -> CodingResult<BatchId> {
    let batch_data: BatchData = ctx
        .store
        .load(&StoreKey::Batches(study.to_string()))
        .await?;
    batch_data
        .iter()
        .find(|(_, record)| record.batch_file == filename)
        .map(|(id, _)| id.clone())
        .ok_or_else(|| CodingError::UnknownBatch(filename.to_string()))
}

/// A batch's record, by id.
pub async fn batch_info(ctx: &RunContext, study: &str, id: &BatchId) -> CodingResult<BatchRecord> {
    let batch_data: BatchData = ctx
        .store
        .load(&StoreKey::Batches(study.to_string()))
        .await?;
    batch_data
        .get(id)
        .cloned()
        .ok_or_else(|| CodingError::UnknownBatch(id.to_string()))
}

/// Remove batches, clearing membership back-references; optionally delete
/// the batch mp4s as well.
pub async fn remove_batch(
    ctx: &RunContext,
    study: &str,
    target: BatchTarget,
    delete_artifacts: bool,
) -> CodingResult<()> {
    let mut batch_data: BatchData = ctx
        .store
        .load(&StoreKey::Batches(study.to_string()))
        .await?;
    let mut video_data: VideoData = ctx.store.load(&StoreKey::Video).await?;

    let removed: Vec<(BatchId, BatchRecord)> = match target {
        BatchTarget::All => std::mem::take(&mut batch_data).into_iter().collect(),
        BatchTarget::Filename(filename) => {
            let id = batch_for_filename(ctx, study, &filename).await?;
            let record = batch_data.remove(&id).expect("looked up above");
            vec![(id, record)]
        }
        BatchTarget::Id(id) => {
            let record = batch_data
                .remove(&id)
                .ok_or_else(|| CodingError::UnknownBatch(id.to_string()))?;
            vec![(id, record)]
        }
    };

    for (id, record) in &removed {
        for member in &record.videos {
            if let Some(video) = video_data.get_mut(&member.video_name) {
                video.in_batches.remove(id.as_str());
            }
        }
    }

    ctx.store
        .save(&StoreKey::Batches(study.to_string()), &batch_data)
        .await?;
    ctx.store.save(&StoreKey::Video, &video_data).await?;
    info!("Removed {} batch(es) from batch and video data", removed.len());

    if delete_artifacts {
        for (_, record) in &removed {
            let path = ctx.config.batch_dir.join(&record.batch_file);
            if path.exists() {
                tokio::fs::remove_file(&path).await?;
                info!("Deleted batch video {}", record.batch_file);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use owlet_models::{RawVideoRecord, SessionCodingRecord, VariantOutput};

    use crate::testutil::{probe_json, test_context};

    const STUDY: &str = "teststudy";

    fn candidate(name: &str, duration: f64, width: u32) -> BatchCandidate {
        BatchCandidate {
            session_key: SessionKey::new(STUDY, "sess1"),
            video_name: name.to_string(),
            duration_seconds: duration,
            width,
        }
    }

    #[test]
    fn test_partition_closes_on_min_duration() {
        let candidates = vec![
            candidate("a", 40.0, 640),
            candidate("b", 40.0, 640),
            candidate("c", 40.0, 640),
            candidate("d", 40.0, 640),
        ];
        let (batches, leftover) = partition_batches(&candidates, 60.0);
        // 40 + 40 crosses 60; the crossing clip stays in its batch.
        assert_eq!(batches, vec![vec![0, 1], vec![2, 3]]);
        assert!(leftover.is_empty());
    }

    #[test]
    fn test_partition_never_mixes_widths() {
        let candidates = vec![
            candidate("a", 40.0, 640),
            candidate("b", 40.0, 1280),
            candidate("c", 40.0, 1280),
            candidate("d", 40.0, 1280),
        ];
        let (batches, leftover) = partition_batches(&candidates, 60.0);
        for batch in &batches {
            let widths: Vec<u32> = batch.iter().map(|&i| candidates[i].width).collect();
            assert!(widths.windows(2).all(|w| w[0] == w[1]));
        }
        // a alone (width change closed it), then b+c, leftover d.
        assert_eq!(batches, vec![vec![0], vec![1, 2]]);
        assert_eq!(leftover, vec![3]);
    }

    #[test]
    fn test_partition_leftover() {
        let candidates = vec![candidate("a", 10.0, 640)];
        let (batches, leftover) = partition_batches(&candidates, 300.0);
        assert!(batches.is_empty());
        assert_eq!(leftover, vec![0]);
    }

    async fn seed_trimmed_clips(ctx: &RunContext, clips: &[(&str, f64, u32)]) {
        let key = SessionKey::new(STUDY, "sess1");
        let mut video_data = VideoData::new();
        let mut found = Vec::new();
        for (name, duration, width) in clips {
            let mut record = RawVideoRecord::new(
                format!("short-{}", name),
                key.clone(),
                STUDY.to_string(),
            );
            record.width = *width;
            record.set_variant(
                VARIANT_TRIMMED,
                VariantOutput {
                    duration_seconds: *duration,
                    rel_path: format!("{}/sess1/{}_trimmed.mp4", STUDY, name),
                },
            );
            video_data.insert(name.to_string(), record);
            found.push(vec![name.to_string()]);
        }
        ctx.store.save(&StoreKey::Video, &video_data).await.unwrap();

        let mut record = SessionCodingRecord::default();
        record.consent = "Yes ".to_string();
        record.usable = "yes".to_string();
        record.videos_expected = clips.iter().map(|(n, _, _)| n.to_string()).collect();
        record.videos_found = found;
        let coding: CodingData = [(key, record)].into_iter().collect();
        ctx.store
            .save(&StoreKey::Coding(STUDY.to_string()), &coding)
            .await
            .unwrap();
    }

    fn criteria() -> BTreeMap<String, Vec<String>> {
        [
            ("consent".to_string(), vec!["yes".to_string()]),
            ("usable".to_string(), vec!["yes".to_string()]),
        ]
        .into_iter()
        .collect()
    }

    #[tokio::test]
    async fn test_batch_videos_creates_batch_and_back_references() {
        let (_dir, ctx, tool) = test_context();
        seed_trimmed_clips(&ctx, &[("a.flv", 200.0, 640), ("b.flv", 200.0, 640)]).await;
        tool.set_probe(".mp4", probe_json(400.0, 640, 480, true));

        let created = batch_videos(&ctx, STUDY, 5.0, &criteria(), true)
            .await
            .unwrap();
        assert_eq!(created.len(), 1);

        let batch = batch_info(&ctx, STUDY, &created[0]).await.unwrap();
        assert_eq!(batch.videos.len(), 2);
        assert!(batch.batch_file.starts_with("teststudy_"));
        assert!((batch.total_duration_seconds - 400.0).abs() < 1e-9);
        assert!(ctx.config.batch_dir.join(&batch.batch_file).exists());

        let video_data: VideoData = ctx.store.load(&StoreKey::Video).await.unwrap();
        assert_eq!(video_data["a.flv"].in_batches[created[0].as_str()], 0);
        assert_eq!(video_data["b.flv"].in_batches[created[0].as_str()], 1);

        // Everything is batched now; a second pass creates nothing.
        let created_again = batch_videos(&ctx, STUDY, 5.0, &criteria(), true)
            .await
            .unwrap();
        assert!(created_again.is_empty());
    }

    #[tokio::test]
    async fn test_criteria_filter_is_case_and_space_insensitive() {
        let (_dir, ctx, tool) = test_context();
        seed_trimmed_clips(&ctx, &[("a.flv", 200.0, 640)]).await;
        tool.set_probe(".mp4", probe_json(200.0, 640, 480, true));

        // Seeded consent is "Yes " and matches ["yes"]; flipping it to "no"
        // must exclude the clip.
        let created = batch_videos(&ctx, STUDY, 1.0, &criteria(), true)
            .await
            .unwrap();
        assert_eq!(created.len(), 1);

        remove_batch(&ctx, STUDY, BatchTarget::All, true).await.unwrap();
        let key = SessionKey::new(STUDY, "sess1");
        let mut coding: CodingData = ctx
            .store
            .load(&StoreKey::Coding(STUDY.to_string()))
            .await
            .unwrap();
        coding.get_mut(&key).unwrap().consent = "no".to_string();
        ctx.store
            .save(&StoreKey::Coding(STUDY.to_string()), &coding)
            .await
            .unwrap();

        let created = batch_videos(&ctx, STUDY, 1.0, &criteria(), true)
            .await
            .unwrap();
        assert!(created.is_empty());
    }

    #[tokio::test]
    async fn test_incomplete_batch_dropped_when_not_included() {
        let (_dir, ctx, tool) = test_context();
        seed_trimmed_clips(&ctx, &[("a.flv", 10.0, 640)]).await;
        tool.set_probe(".mp4", probe_json(10.0, 640, 480, true));

        let created = batch_videos(&ctx, STUDY, 5.0, &criteria(), false)
            .await
            .unwrap();
        assert!(created.is_empty());

        let video_data: VideoData = ctx.store.load(&StoreKey::Video).await.unwrap();
        assert!(!video_data["a.flv"].is_batched());
    }

    #[tokio::test]
    async fn test_remove_batch_clears_references_and_artifact() {
        let (_dir, ctx, tool) = test_context();
        seed_trimmed_clips(&ctx, &[("a.flv", 400.0, 640)]).await;
        tool.set_probe(".mp4", probe_json(400.0, 640, 480, true));

        let created = batch_videos(&ctx, STUDY, 5.0, &criteria(), true)
            .await
            .unwrap();
        let batch = batch_info(&ctx, STUDY, &created[0]).await.unwrap();
        let artifact = ctx.config.batch_dir.join(&batch.batch_file);
        assert!(artifact.exists());

        let found = batch_for_filename(&ctx, STUDY, &batch.batch_file)
            .await
            .unwrap();
        assert_eq!(found, created[0]);

        remove_batch(&ctx, STUDY, BatchTarget::Id(created[0].clone()), true)
            .await
            .unwrap();

        assert!(!artifact.exists());
        let video_data: VideoData = ctx.store.load(&StoreKey::Video).await.unwrap();
        assert!(!video_data["a.flv"].is_batched());
        assert!(batch_info(&ctx, STUDY, &created[0]).await.is_err());
    }
}
