//! Coding batch records.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::filename::SessionKey;

/// Unique identifier for a coding batch.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub String);

impl BatchId {
    /// Generate a new random batch id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BatchId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One clip inside a batch, in playback order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchMember {
    pub session_key: SessionKey,
    /// Raw filename (key into the video snapshot).
    pub video_name: String,
    /// Duration of the trimmed clip that went into the batch.
    pub duration_seconds: f64,
}

/// A concatenated batch of trimmed clips handed to coders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRecord {
    /// Filename of the batch mp4 within the batch directory.
    pub batch_file: String,
    /// Member clips in concatenation order.
    pub videos: Vec<BatchMember>,
    /// Coders who have completed this batch.
    #[serde(default)]
    pub coded_by: BTreeSet<String>,
    /// Sum of member durations.
    #[serde(default)]
    pub total_duration_seconds: f64,
    /// When the batch was created.
    pub created_at: DateTime<Utc>,
}

impl BatchRecord {
    /// Create a record for a freshly concatenated batch.
    pub fn new(batch_file: String, videos: Vec<BatchMember>) -> Self {
        let total_duration_seconds = videos.iter().map(|v| v.duration_seconds).sum();
        Self {
            batch_file,
            videos,
            coded_by: BTreeSet::new(),
            total_duration_seconds,
            created_at: Utc::now(),
        }
    }
}
