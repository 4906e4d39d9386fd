//! Per-session coding records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Consent status assigned to brand-new records before review.
pub const CONSENT_UNREVIEWED: &str = "orig";

/// Human-coding state for one session.
///
/// One record is created the first time a session is seen and mutated on
/// every reconciliation pass. Every field defaults, so records written by
/// older versions load with missing fields backfilled rather than erroring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCodingRecord {
    /// Consent review status ("orig" until reviewed, then e.g. "yes"/"no").
    #[serde(default = "default_consent")]
    pub consent: String,
    /// Usability judgment, free text ("yes"/"no"/notes).
    #[serde(default)]
    pub usable: String,
    /// Whether the family withdrew; `None` until the exit survey is read.
    #[serde(default)]
    pub withdrawn: Option<bool>,
    /// Feedback to send back to the family.
    #[serde(default)]
    pub feedback: String,
    /// Expected video identifier fragments, in frame order.
    #[serde(default)]
    pub videos_expected: Vec<String>,
    /// Raw filenames matched per expectation; index-aligned with
    /// `videos_expected`, inner lists may be empty.
    #[serde(default)]
    pub videos_found: Vec<Vec<String>>,
    /// Path of the concatenated session mp4, relative to the session
    /// directory root; empty until produced.
    #[serde(default)]
    pub concat_path: String,
    /// Sum of per-clip durations fed to the last concatenation.
    #[serde(default)]
    pub expected_duration_seconds: Option<f64>,
    /// Probed video-stream duration of the last concatenated artifact.
    #[serde(default)]
    pub actual_duration_seconds: Option<f64>,
    /// Free-form comments keyed by coder name.
    #[serde(default)]
    pub coder_comments: BTreeMap<String, String>,

    // Derived per-trial data filled in by study-specific post-processors;
    // index-aligned with `videos_expected` when populated.
    /// Stimulus file shown per trial (`None` for non-trial frames).
    #[serde(default)]
    pub videos_shown: Vec<Option<String>>,
    /// Whether the alternate test stimulus was shown per trial.
    #[serde(default)]
    pub showed_alternate: Vec<Option<bool>>,
    /// Whether the trial was interrupted before a qualifying playback event.
    #[serde(default)]
    pub ended_early: Vec<Option<bool>>,
    /// `videos_shown`, restricted and reordered to the clips actually
    /// concatenated.
    #[serde(default)]
    pub concat_videos_shown: Vec<Option<String>>,
    /// `showed_alternate`, restricted and reordered likewise.
    #[serde(default)]
    pub concat_showed_alternate: Vec<Option<bool>>,
}

fn default_consent() -> String {
    CONSENT_UNREVIEWED.to_string()
}

impl Default for SessionCodingRecord {
    fn default() -> Self {
        // serde's field defaults double as the template for new records.
        serde_json::from_str("{}").expect("empty record template")
    }
}

impl SessionCodingRecord {
    /// Total number of raw files matched across all expectation groups.
    pub fn n_videos_found(&self) -> usize {
        self.videos_found.iter().map(Vec::len).sum()
    }

    /// Whether the match groups are index-aligned with the expectations.
    ///
    /// Holds after every reconciliation pass, even when groups are empty.
    pub fn groups_aligned(&self) -> bool {
        self.videos_found.len() == self.videos_expected.len()
    }

    /// A named global coding field, for criteria filters and sheet commits.
    pub fn field(&self, name: &str) -> Option<String> {
        match name {
            "consent" => Some(self.consent.clone()),
            "usable" => Some(self.usable.clone()),
            "feedback" => Some(self.feedback.clone()),
            "withdrawn" => self.withdrawn.map(|w| w.to_string()),
            _ => None,
        }
    }

    /// Set a named global coding field from sheet text.
    ///
    /// Returns false for unknown field names.
    pub fn set_field(&mut self, name: &str, value: &str) -> bool {
        match name {
            "consent" => self.consent = value.to_string(),
            "usable" => self.usable = value.to_string(),
            "feedback" => self.feedback = value.to_string(),
            "withdrawn" => self.withdrawn = value.trim().parse().ok(),
            _ => return false,
        }
        true
    }
}
