//! Raw video records and processed-variant bookkeeping.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::filename::SessionKey;

/// Untrimmed processed variant name.
pub const VARIANT_WHOLE: &str = "whole";
/// Trimmed processed variant name.
pub const VARIANT_TRIMMED: &str = "trimmed";

/// One processed rendition of a raw clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantOutput {
    /// Probed duration of the processed mp4 in seconds.
    ///
    /// `-1.0` means the variant has not been attempted yet; `0.0` means the
    /// transform ran but could not produce usable video.
    pub duration_seconds: f64,
    /// Path of the processed mp4 relative to the session directory root,
    /// empty while unprocessed or failed.
    pub rel_path: String,
}

impl Default for VariantOutput {
    fn default() -> Self {
        Self {
            duration_seconds: -1.0,
            rel_path: String::new(),
        }
    }
}

impl VariantOutput {
    /// Outcome recorded when the transform ran but produced no usable video.
    pub fn failed() -> Self {
        Self {
            duration_seconds: 0.0,
            rel_path: String::new(),
        }
    }

    /// Whether this variant exists and can be fed to concatenation.
    pub fn is_available(&self) -> bool {
        !self.rel_path.is_empty() && self.duration_seconds > 0.0
    }
}

/// Everything known about one raw uploaded video file.
///
/// Keyed by raw filename in the video snapshot. Fields absent from records
/// written by older versions are backfilled with their defaults on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawVideoRecord {
    /// Fragment matched against session expectations.
    pub short_name: String,
    /// Session this upload belongs to.
    pub session_key: SessionKey,
    /// Study (experiment) id.
    pub study_id: String,
    /// Approximate frame rate (frame count / duration).
    #[serde(default)]
    pub framerate: f64,
    /// Container duration in seconds.
    #[serde(default)]
    pub duration_seconds: f64,
    /// Container bit rate in bits/second.
    #[serde(default)]
    pub bit_rate: f64,
    /// Frame width in pixels; batches never mix widths.
    #[serde(default)]
    pub width: u32,
    /// Frame height in pixels; 0 means no video stream was found.
    #[serde(default)]
    pub height: u32,
    /// Processed renditions by variant name ("whole", "trimmed").
    #[serde(default)]
    pub variants: BTreeMap<String, VariantOutput>,
    /// Batch membership: batch id -> position of this clip in the batch.
    #[serde(default)]
    pub in_batches: BTreeMap<String, usize>,
}

impl RawVideoRecord {
    /// Create a record for a newly discovered upload.
    pub fn new(short_name: String, session_key: SessionKey, study_id: String) -> Self {
        let mut record = Self {
            short_name,
            session_key,
            study_id,
            framerate: 0.0,
            duration_seconds: 0.0,
            bit_rate: 0.0,
            width: 0,
            height: 0,
            variants: BTreeMap::new(),
            in_batches: BTreeMap::new(),
        };
        record.reset_variants();
        record
    }

    /// The recorded output for a variant, if any.
    pub fn variant(&self, name: &str) -> Option<&VariantOutput> {
        self.variants.get(name)
    }

    /// Record the output of a processing variant.
    pub fn set_variant(&mut self, name: &str, output: VariantOutput) {
        self.variants.insert(name.to_string(), output);
    }

    /// Reset both standard variants to their unprocessed defaults.
    pub fn reset_variants(&mut self) {
        self.variants
            .insert(VARIANT_WHOLE.to_string(), VariantOutput::default());
        self.variants
            .insert(VARIANT_TRIMMED.to_string(), VariantOutput::default());
    }

    /// Whether this clip is already a member of any batch.
    pub fn is_batched(&self) -> bool {
        !self.in_batches.is_empty()
    }
}
