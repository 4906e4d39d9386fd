//! Raw upload filename parsing and session keys.
//!
//! Uploaded recordings are named by the capture service as
//! `videoStream_<study>_<frame>_<session>_..._<timestamp>_<random>.flv`, e.g.
//! `videoStream_video-record-574db6fa...-0-video-consent-574f6286..._1464820374637_240.flv`.
//! Preview recordings made from the experimenter site carry the marker
//! `PREVIEW_DATA_DISREGARD` in place of a session id.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Extension of raw uploads as delivered by the capture service.
pub const RAW_EXTENSION: &str = ".flv";

/// Marker substring identifying preview recordings with no session behind them.
pub const PREVIEW_MARKER: &str = "PREVIEW_DATA_DISREGARD";

/// Session id embedded in a raw filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionId {
    /// A real session id.
    Session(String),
    /// Preview recording; has no session or coding record.
    Preview,
}

impl SessionId {
    /// Whether this identifies a preview recording.
    pub fn is_preview(&self) -> bool {
        matches!(self, SessionId::Preview)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionId::Session(s) => write!(f, "{}", s),
            SessionId::Preview => write!(f, "{}", PREVIEW_MARKER),
        }
    }
}

/// Composite key identifying one session of one study.
///
/// The string form `experimenter.session<study>s.<session>` is what session
/// records use as their `id` and what keys the coding snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

const SESSION_KEY_PREFIX: &str = "experimenter.session";

impl SessionKey {
    /// Build the key for a (study, session) pair.
    pub fn new(study_id: &str, session_id: &str) -> Self {
        Self(format!("{}{}s.{}", SESSION_KEY_PREFIX, study_id, session_id))
    }

    /// Parse a key back into its (study, session) pair.
    pub fn parse(&self) -> ModelResult<(String, String)> {
        let rest = self
            .0
            .strip_prefix(SESSION_KEY_PREFIX)
            .ok_or_else(|| ModelError::MalformedSessionKey(self.0.clone()))?;
        let (study, session) = rest
            .split_once('.')
            .ok_or_else(|| ModelError::MalformedSessionKey(self.0.clone()))?;
        let study = study
            .strip_suffix('s')
            .ok_or_else(|| ModelError::MalformedSessionKey(self.0.clone()))?;
        Ok((study.to_string(), session.to_string()))
    }

    /// The study id component.
    pub fn study_id(&self) -> ModelResult<String> {
        self.parse().map(|(study, _)| study)
    }

    /// The session id component.
    pub fn session_id(&self) -> ModelResult<String> {
        self.parse().map(|(_, session)| session)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifiers embedded in one raw upload filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoIdentifier {
    /// Study (experiment) id.
    pub study_id: String,
    /// Frame id within the experiment.
    pub frame_id: String,
    /// Session id, or the preview sentinel.
    pub session_id: SessionId,
    /// Trailing timestamp + random suffix; opaque, used only for ordering.
    pub timestamp_token: String,
    /// The fragment session frame data records as the expected video.
    ///
    /// Reconstructed by dropping the leading stream prefix and the trailing
    /// timestamp/random segments, so it can be matched against expectations
    /// by substring rather than by re-parsing.
    pub short_name: String,
}

impl VideoIdentifier {
    /// Parse a raw upload filename.
    ///
    /// The stem must split on `_` into at least four segments. Anything else
    /// (including the historical `-`-delimited naming) is a
    /// [`ModelError::MalformedFilename`].
    pub fn parse(filename: &str) -> ModelResult<Self> {
        let stem = filename
            .strip_suffix(RAW_EXTENSION)
            .ok_or_else(|| ModelError::MalformedFilename(filename.to_string()))?;

        let pieces: Vec<&str> = stem.split('_').collect();
        if pieces.len() < 4 {
            return Err(ModelError::MalformedFilename(filename.to_string()));
        }

        let session_id = if filename.contains(PREVIEW_MARKER) {
            SessionId::Preview
        } else {
            SessionId::Session(pieces[3].to_string())
        };

        Ok(Self {
            study_id: pieces[1].to_string(),
            frame_id: pieces[2].to_string(),
            session_id,
            timestamp_token: pieces[pieces.len() - 2..].join("_"),
            short_name: pieces[1..pieces.len() - 2].join("_"),
        })
    }

    /// The session key for this video, or `None` for preview recordings.
    pub fn session_key(&self) -> Option<SessionKey> {
        match &self.session_id {
            SessionId::Session(sess) => Some(SessionKey::new(&self.study_id, sess)),
            SessionId::Preview => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONSENT_NAME: &str =
        "videoStream_video-consent-574db6fa3de08a005bb8f844-0-video-consent-574f62863de08a005bb8f8b8_1464820374637_240.flv";

    #[test]
    fn test_parse_regular_filename() {
        let id = VideoIdentifier::parse(CONSENT_NAME).unwrap();
        assert_eq!(id.study_id, "video-consent-574db6fa3de08a005bb8f844-0-video-consent-574f62863de08a005bb8f8b8");
        assert_eq!(id.timestamp_token, "1464820374637_240");
        assert!(!id.session_id.is_preview());
    }

    #[test]
    fn test_short_name_round_trip() {
        // The reconstructed short name must equal the fragment recorded in
        // session frame data: everything between the stream prefix and the
        // trailing timestamp/random segments.
        let expected = "video-record-57472c903de08a0054472a02-2-video-1-574f693f3de08a005bb8f8e2";
        let filename = format!("videoStream_{}_1464820374637_240.flv", expected);
        let id = VideoIdentifier::parse(&filename).unwrap();
        assert_eq!(id.short_name, expected);
    }

    #[test]
    fn test_parse_preview_filename() {
        let name =
            "videoStream_57586a553de08a005bb8fb7f_1-video-consent_PREVIEW_DATA_DISREGARD_1465935820244_351.flv";
        let id = VideoIdentifier::parse(name).unwrap();
        assert!(id.session_id.is_preview());
        assert_eq!(id.study_id, "57586a553de08a005bb8fb7f");
        assert_eq!(id.frame_id, "1-video-consent");
        assert!(id.session_key().is_none());
    }

    #[test]
    fn test_parse_rejects_wrong_extension() {
        assert!(VideoIdentifier::parse("videoStream_a_b_c_d.mp4").is_err());
    }

    #[test]
    fn test_parse_rejects_too_few_segments() {
        assert!(VideoIdentifier::parse("videoStream_study_frame.flv").is_err());
        // Dash-delimited legacy naming has a single underscore-free stem.
        assert!(VideoIdentifier::parse("videoStream-study-frame-sess-123.flv").is_err());
    }

    #[test]
    fn test_session_key_round_trip() {
        let key = SessionKey::new("583c892ec0d9d70082123d94", "58474acfc0d9d70082123db6");
        assert_eq!(
            key.as_str(),
            "experimenter.session583c892ec0d9d70082123d94s.58474acfc0d9d70082123db6"
        );
        let (study, session) = key.parse().unwrap();
        assert_eq!(study, "583c892ec0d9d70082123d94");
        assert_eq!(session, "58474acfc0d9d70082123db6");
    }

    #[test]
    fn test_session_key_parse_rejects_garbage() {
        assert!(SessionKey::from("not-a-key").parse().is_err());
        assert!(SessionKey::from("experimenter.sessionABC.def").parse().is_err());
    }

    #[test]
    fn test_video_session_key() {
        let id = VideoIdentifier::parse(CONSENT_NAME).unwrap();
        let key = id.session_key().unwrap();
        let (study, _) = key.parse().unwrap();
        assert_eq!(study, id.study_id);
    }
}
