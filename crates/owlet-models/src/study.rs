//! Per-study configuration.

use serde::{Deserialize, Serialize};

/// How a clip's analysis window start is chosen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum TrimSpec {
    /// Keep the whole clip.
    #[default]
    None,
    /// Positive: trim this many seconds off the head. Negative: keep the
    /// last `|t|` seconds (the whole clip when shorter than that).
    Seconds(f64),
    /// Trim from the stream time of the first event whose name ends with
    /// this suffix; no trimming (with a warning) when no event matches.
    EventSuffix(String),
}

impl TrimSpec {
    pub fn is_none(&self) -> bool {
        matches!(self, TrimSpec::None)
    }
}

/// Which bundle of study-specific processing hooks applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StudyStrategyKind {
    /// No derived fields, nothing excluded from concatenation.
    #[default]
    Standard,
    /// Preferential-looking physics study: derives showed-alternate /
    /// ended-early per trial and excludes interrupted trials.
    Physics,
}

/// Everything configurable per study.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyConfig {
    /// Number of videos a complete session is expected to produce.
    #[serde(default)]
    pub n_videos_expected: usize,
    /// Frame-name fragments identifying the trial frames of this study.
    #[serde(default)]
    pub video_frame_names: Vec<String>,
    /// Trim rule for the "trimmed" processed variant.
    #[serde(default)]
    pub trim: TrimSpec,
    /// Frame-name fragments excluded from session concatenation (consent
    /// clips are archived separately, never joined).
    #[serde(default = "default_skip_frames")]
    pub concat_skip_frames: Vec<String>,
    /// Concatenate trimmed variants instead of whole ones.
    #[serde(default)]
    pub concat_use_trimmed: bool,
    /// Frame-name fragments that must use the whole variant even when
    /// `concat_use_trimmed` is set.
    #[serde(default)]
    pub use_whole_frames: Vec<String>,
    /// Only produce the session artifact once consent is confirmed.
    #[serde(default)]
    pub only_concat_if_consent: bool,
    /// Burn frame event annotations into processed clips.
    #[serde(default)]
    pub label_events: bool,
    /// Study-specific processing hooks.
    #[serde(default)]
    pub strategy: StudyStrategyKind,
    /// Field-name endings pulled into coding sheets beyond the basics.
    #[serde(default)]
    pub include_fields: Vec<String>,
    /// Derived fields shown on coding sheets for this study.
    #[serde(default)]
    pub study_fields: Vec<String>,
}

fn default_skip_frames() -> Vec<String> {
    vec!["consent".to_string()]
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            n_videos_expected: 0,
            video_frame_names: Vec::new(),
            trim: TrimSpec::None,
            concat_skip_frames: default_skip_frames(),
            concat_use_trimmed: false,
            use_whole_frames: Vec::new(),
            only_concat_if_consent: false,
            label_events: false,
            strategy: StudyStrategyKind::Standard,
            include_fields: Vec::new(),
            study_fields: Vec::new(),
        }
    }
}

impl StudyConfig {
    /// Preset for the preferential-looking physics study.
    pub fn physics() -> Self {
        Self {
            n_videos_expected: 24,
            video_frame_names: vec!["pref-phys-videos".to_string()],
            trim: TrimSpec::Seconds(-20.0),
            only_concat_if_consent: true,
            strategy: StudyStrategyKind::Physics,
            study_fields: vec![
                "videosShown".to_string(),
                "showedAlternate".to_string(),
                "endedEarly".to_string(),
            ],
            ..Default::default()
        }
    }

    /// Preset for the looking-time geometry study.
    pub fn geometry() -> Self {
        Self {
            n_videos_expected: 4,
            video_frame_names: vec!["alt-trials".to_string()],
            trim: TrimSpec::EventSuffix("startCalibration".to_string()),
            label_events: true,
            ..Default::default()
        }
    }

    /// Whether a frame is excluded from session concatenation.
    pub fn skips_frame(&self, frame_id: &str) -> bool {
        self.concat_skip_frames.iter().any(|s| frame_id.contains(s))
    }

    /// Which processed variant a frame's clip should contribute.
    pub fn variant_for_frame(&self, frame_id: &str) -> &'static str {
        use crate::video::{VARIANT_TRIMMED, VARIANT_WHOLE};
        if self.concat_use_trimmed && !self.use_whole_frames.iter().any(|s| frame_id.contains(s)) {
            VARIANT_TRIMMED
        } else {
            VARIANT_WHOLE
        }
    }
}
