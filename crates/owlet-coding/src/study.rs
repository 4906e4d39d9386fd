//! Study-specific processing strategies.
//!
//! Studies differ in how coding records are derived from frame data and in
//! which clips belong in the session artifact. Those differences live
//! behind small strategy traits with one implementation per study family,
//! selected by study-id configuration at startup.

use std::collections::BTreeMap;
use std::path::Path;

use owlet_models::{SessionAttributes, SessionCodingRecord, StudyConfig, StudyStrategyKind};

use crate::reconcile::ClipPlan;

/// Derives study-specific coding fields from a session's frame data.
pub trait CodingPostProcessor: Send + Sync {
    fn process(&self, record: &mut SessionCodingRecord, attributes: &SessionAttributes);
}

/// Decides whether a matched clip is excluded from concatenation.
pub trait ConcatSkipPredicate: Send + Sync {
    fn skip(&self, record: &SessionCodingRecord, group_index: usize) -> bool;
}

/// Updates a coding record after concatenation, given the clips included.
pub trait ConcatPostProcessor: Send + Sync {
    fn process(&self, record: &mut SessionCodingRecord, included: &[ClipPlan]);
}

/// The three hooks bundled for one study.
pub struct StrategySet {
    pub coding: Box<dyn CodingPostProcessor>,
    pub concat_skip: Box<dyn ConcatSkipPredicate>,
    pub concat: Box<dyn ConcatPostProcessor>,
}

impl StrategySet {
    /// The strategy bundle for a configured kind.
    pub fn for_kind(kind: StudyStrategyKind) -> Self {
        match kind {
            StudyStrategyKind::Standard => Self {
                coding: Box::new(StandardStudy),
                concat_skip: Box::new(StandardStudy),
                concat: Box::new(StandardStudy),
            },
            StudyStrategyKind::Physics => Self {
                coding: Box::new(PhysicsStudy),
                concat_skip: Box::new(PhysicsStudy),
                concat: Box::new(PhysicsStudy),
            },
        }
    }
}

/// Per-study configuration lookup.
#[derive(Debug, Clone)]
pub struct StudyRegistry {
    configs: BTreeMap<String, StudyConfig>,
}

impl Default for StudyRegistry {
    fn default() -> Self {
        let mut configs = BTreeMap::new();
        // Production study ids; anything else gets StudyConfig::default().
        configs.insert(
            "583c892ec0d9d70082123d94".to_string(),
            StudyConfig::physics(),
        );
        configs.insert(
            "58cc039ec0d9d70097f26220".to_string(),
            StudyConfig::geometry(),
        );
        Self { configs }
    }
}

impl StudyRegistry {
    /// Register (or replace) a study's configuration.
    pub fn register(&mut self, study_id: impl Into<String>, config: StudyConfig) {
        self.configs.insert(study_id.into(), config);
    }

    /// Configuration for a study, defaults when unregistered.
    pub fn config_for(&self, study_id: &str) -> StudyConfig {
        self.configs.get(study_id).cloned().unwrap_or_default()
    }
}

/// Default strategy: no derived fields, nothing excluded.
struct StandardStudy;

impl CodingPostProcessor for StandardStudy {
    fn process(&self, _record: &mut SessionCodingRecord, _attributes: &SessionAttributes) {}
}

impl ConcatSkipPredicate for StandardStudy {
    fn skip(&self, _record: &SessionCodingRecord, _group_index: usize) -> bool {
        false
    }
}

impl ConcatPostProcessor for StandardStudy {
    fn process(&self, _record: &mut SessionCodingRecord, _included: &[ClipPlan]) {}
}

/// Preferential-looking physics study.
///
/// Trials can show an alternate test stimulus after pausing, and pausing at
/// the wrong moment interrupts the trial. The event timeline determines,
/// per trial: whether the alternate was shown, whether the trial ended
/// early, and which stimulus file actually played.
struct PhysicsStudy;

const TRIAL_FRAME: &str = "pref-phys-videos";
const EXCLUDED_FRAME: &str = "32-32-pref-phys-videos";
const START_TEST: &str = "exp-physics:startTestVideo";
const START_ALTERNATE: &str = "exp-physics:startAlternateVideo";
const PAUSE: &str = "exp-physics:pauseVideo";

impl CodingPostProcessor for PhysicsStudy {
    fn process(&self, record: &mut SessionCodingRecord, attributes: &SessionAttributes) {
        record.videos_expected.clear();
        record.videos_shown.clear();
        record.showed_alternate.clear();
        record.ended_early.clear();

        for (frame_id, frame) in &attributes.exp_data {
            let Some(video_id) = &frame.video_id else {
                continue;
            };
            if frame_id == EXCLUDED_FRAME {
                continue;
            }

            if frame_id.contains(TRIAL_FRAME) {
                let events: Vec<&str> = frame
                    .event_timings
                    .iter()
                    .map(|e| e.event_type.as_str())
                    .collect();

                let showed_alternate = events.contains(&START_ALTERNATE);

                // Ended early if neither stimulus ever started (alternate
                // checked because heavy pausing can skip straight to it).
                let mut ended_early =
                    !events.contains(&START_TEST) && !events.contains(&START_ALTERNATE);

                // The alternate itself was paused.
                if showed_alternate {
                    let last_alternate =
                        events.iter().rposition(|e| *e == START_ALTERNATE).unwrap();
                    ended_early = ended_early || events[last_alternate..].contains(&PAUSE);
                }

                // The test video was paused but the alternate never started.
                if !ended_early && events.contains(&PAUSE) && events.contains(&START_TEST) {
                    let last_pause = events.iter().rposition(|e| *e == PAUSE).unwrap();
                    let first_test = events.iter().position(|e| *e == START_TEST).unwrap();
                    ended_early = ended_early || (last_pause > first_test && !showed_alternate);
                }

                let shown = frame
                    .videos_shown
                    .get(showed_alternate as usize)
                    .map(|path| stimulus_stem(path));

                record.videos_expected.push(video_id.clone());
                record.showed_alternate.push(Some(showed_alternate));
                record.ended_early.push(Some(ended_early));
                record.videos_shown.push(shown);
            } else {
                record.videos_expected.push(video_id.clone());
                record.showed_alternate.push(None);
                record.ended_early.push(None);
                record.videos_shown.push(None);
            }
        }
    }
}

impl ConcatSkipPredicate for PhysicsStudy {
    fn skip(&self, record: &SessionCodingRecord, group_index: usize) -> bool {
        matches!(record.ended_early.get(group_index), Some(Some(true)))
    }
}

impl ConcatPostProcessor for PhysicsStudy {
    fn process(&self, record: &mut SessionCodingRecord, included: &[ClipPlan]) {
        record.concat_showed_alternate = included
            .iter()
            .map(|plan| record.showed_alternate.get(plan.group_index).copied().flatten())
            .collect();
        record.concat_videos_shown = included
            .iter()
            .map(|plan| record.videos_shown.get(plan.group_index).cloned().flatten())
            .collect();
    }
}

/// Stimulus filename without path or extension.
fn stimulus_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use owlet_models::{FrameData, FrameEvent};

    fn event(event_type: &str) -> FrameEvent {
        FrameEvent {
            event_type: event_type.to_string(),
            ..Default::default()
        }
    }

    fn trial_frame(events: &[&str], shown: &[&str]) -> FrameData {
        FrameData {
            video_id: Some("study_frame_sess".to_string()),
            event_timings: events.iter().map(|e| event(e)).collect(),
            videos_shown: shown.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn process(frames: Vec<(&str, FrameData)>) -> SessionCodingRecord {
        let mut record = SessionCodingRecord::default();
        let attributes = SessionAttributes {
            exp_data: frames
                .into_iter()
                .map(|(id, frame)| (id.to_string(), frame))
                .collect(),
            ..Default::default()
        };
        CodingPostProcessor::process(&PhysicsStudy, &mut record, &attributes);
        record
    }

    #[test]
    fn test_normal_trial_is_not_ended_early() {
        let record = process(vec![(
            "11-pref-phys-videos",
            trial_frame(
                &[START_TEST],
                &["stims/sbs_stay.mp4", "stims/sbs_fall.mp4"],
            ),
        )]);
        assert_eq!(record.showed_alternate, vec![Some(false)]);
        assert_eq!(record.ended_early, vec![Some(false)]);
        assert_eq!(record.videos_shown, vec![Some("sbs_stay".to_string())]);
    }

    #[test]
    fn test_no_playback_event_means_ended_early() {
        let record = process(vec![(
            "11-pref-phys-videos",
            trial_frame(&[PAUSE], &["stims/sbs_stay.mp4"]),
        )]);
        assert_eq!(record.ended_early, vec![Some(true)]);
    }

    #[test]
    fn test_alternate_shown_selects_second_stimulus() {
        let record = process(vec![(
            "11-pref-phys-videos",
            trial_frame(
                &[START_TEST, PAUSE, START_ALTERNATE],
                &["stims/sbs_stay.mp4", "stims/sbs_fall.mp4"],
            ),
        )]);
        assert_eq!(record.showed_alternate, vec![Some(true)]);
        assert_eq!(record.ended_early, vec![Some(false)]);
        assert_eq!(record.videos_shown, vec![Some("sbs_fall".to_string())]);
    }

    #[test]
    fn test_paused_alternate_is_ended_early() {
        let record = process(vec![(
            "11-pref-phys-videos",
            trial_frame(&[START_TEST, START_ALTERNATE, PAUSE], &["a.mp4", "b.mp4"]),
        )]);
        assert_eq!(record.ended_early, vec![Some(true)]);
    }

    #[test]
    fn test_pause_after_test_without_alternate_is_ended_early() {
        let record = process(vec![(
            "11-pref-phys-videos",
            trial_frame(&[START_TEST, PAUSE], &["a.mp4"]),
        )]);
        assert_eq!(record.ended_early, vec![Some(true)]);
    }

    #[test]
    fn test_pause_before_test_is_fine() {
        let record = process(vec![(
            "11-pref-phys-videos",
            trial_frame(&[PAUSE, START_TEST], &["a.mp4"]),
        )]);
        assert_eq!(record.ended_early, vec![Some(false)]);
    }

    #[test]
    fn test_non_trial_frames_get_no_derived_values() {
        let mut consent = FrameData::default();
        consent.video_id = Some("study_consent_sess".to_string());
        let record = process(vec![("1-video-consent", consent)]);
        assert_eq!(record.showed_alternate, vec![None]);
        assert_eq!(record.ended_early, vec![None]);
    }

    #[test]
    fn test_excluded_frame_is_dropped_from_expectations() {
        let record = process(vec![
            ("11-pref-phys-videos", trial_frame(&[START_TEST], &["a.mp4"])),
            (EXCLUDED_FRAME, trial_frame(&[START_TEST], &["a.mp4"])),
        ]);
        assert_eq!(record.videos_expected.len(), 1);
    }

    #[test]
    fn test_skip_predicate_follows_ended_early() {
        let mut record = SessionCodingRecord::default();
        record.ended_early = vec![Some(false), Some(true), None];
        assert!(!PhysicsStudy.skip(&record, 0));
        assert!(PhysicsStudy.skip(&record, 1));
        assert!(!PhysicsStudy.skip(&record, 2));
        assert!(!StandardStudy.skip(&record, 1));
    }

    #[test]
    fn test_registry_defaults() {
        let registry = StudyRegistry::default();
        let physics = registry.config_for("583c892ec0d9d70082123d94");
        assert_eq!(physics.strategy, StudyStrategyKind::Physics);
        let unknown = registry.config_for("no-such-study");
        assert_eq!(unknown.strategy, StudyStrategyKind::Standard);
    }
}
