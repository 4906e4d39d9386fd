//! Record shapes consumed from the remote Experimenter API.
//!
//! These mirror the wire format (camelCase field names) closely enough to
//! deserialize the interesting parts; everything else rides along in the
//! `extra` maps so sheet export can still flatten it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::filename::SessionKey;

/// One experiment session as returned by the remote API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Full session key, e.g. `experimenter.session<study>s.<session>`.
    pub id: SessionKey,
    #[serde(default)]
    pub attributes: SessionAttributes,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Attributes of a session record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionAttributes {
    /// Per-frame experiment data, keyed by frame id.
    #[serde(default, rename = "expData")]
    pub exp_data: BTreeMap<String, FrameData>,
    #[serde(default)]
    pub feedback: String,
    #[serde(default, rename = "hasReadFeedback")]
    pub has_read_feedback: bool,
    #[serde(default)]
    pub completed: bool,
    /// `<username>.<child>` pointer into account data.
    #[serde(default, rename = "profileId")]
    pub profile_id: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Recorded data for one experiment frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameData {
    /// Expected video identifier fragment, when this frame records video.
    #[serde(default, rename = "videoId")]
    pub video_id: Option<String>,
    /// Event timeline for the frame.
    #[serde(default, rename = "eventTimings")]
    pub event_timings: Vec<FrameEvent>,
    /// Stimulus files shown, when applicable (regular then alternate).
    #[serde(default, rename = "videosShown")]
    pub videos_shown: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// One event in a frame's timeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameEvent {
    #[serde(rename = "eventType")]
    pub event_type: String,
    /// Offset into the frame's video stream, seconds.
    #[serde(default, rename = "streamTime")]
    pub stream_time: Option<f64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Snapshot of all sessions for one study.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudySessions {
    pub sessions: Vec<SessionRecord>,
}

impl StudySessions {
    /// Find a session by its key.
    pub fn find(&self, key: &SessionKey) -> Option<&SessionRecord> {
        self.sessions.iter().find(|s| &s.id == key)
    }

    /// All session keys in this snapshot.
    pub fn keys(&self) -> Vec<SessionKey> {
        self.sessions.iter().map(|s| s.id.clone()).collect()
    }
}

/// One family account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountRecord {
    pub username: String,
    #[serde(default)]
    pub profiles: Vec<ChildProfile>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl AccountRecord {
    /// Build from a remote account record (`{id, attributes: {...}}`).
    ///
    /// The username is the final `.`-separated segment of the record id.
    /// The password never leaves the wire shape; child profiles are lifted
    /// out of the attributes, everything else rides along in `extra`.
    pub fn from_remote(value: &Value) -> Option<Self> {
        let id = value.get("id")?.as_str()?;
        let username = id.rsplit('.').next()?.to_string();
        let mut attributes = value
            .get("attributes")
            .and_then(|a| a.as_object())
            .cloned()
            .unwrap_or_default();
        attributes.remove("password");
        let profiles = attributes
            .remove("profiles")
            .and_then(|p| serde_json::from_value(p).ok())
            .unwrap_or_default();
        Some(Self {
            username,
            profiles,
            extra: attributes.into_iter().collect(),
        })
    }

    /// The child profile a session's `profileId` points at.
    pub fn profile(&self, profile_id: &str) -> Option<&ChildProfile> {
        self.profiles.iter().find(|p| p.profile_id == profile_id)
    }
}

/// One child profile within an account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChildProfile {
    #[serde(default, rename = "profileId")]
    pub profile_id: String,
    #[serde(default)]
    pub birthday: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}
