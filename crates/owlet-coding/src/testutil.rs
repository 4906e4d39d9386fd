//! Shared fixtures for this crate's tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use owlet_media::{MediaError, MediaResult, ToolRunner};
use owlet_store::StateStore;

use crate::config::tests::test_config;
use crate::context::RunContext;
use crate::study::StudyRegistry;

/// Fake transcoder: records ffmpeg invocations (creating each output file)
/// and serves canned ffprobe JSON chosen by longest matching path suffix.
pub(crate) struct FakeTool {
    pub ffmpeg_calls: Mutex<Vec<Vec<String>>>,
    probes: Mutex<HashMap<String, String>>,
}

impl FakeTool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            ffmpeg_calls: Mutex::new(Vec::new()),
            probes: Mutex::new(HashMap::new()),
        })
    }

    /// Serve `json` for probed paths ending in `suffix`.
    pub fn set_probe(&self, suffix: &str, json: String) {
        self.probes.lock().unwrap().insert(suffix.to_string(), json);
    }

    pub fn ffmpeg_count(&self) -> usize {
        self.ffmpeg_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ToolRunner for FakeTool {
    async fn run_ffmpeg(&self, args: &[String]) -> MediaResult<()> {
        self.ffmpeg_calls.lock().unwrap().push(args.to_vec());
        std::fs::write(args.last().unwrap(), b"fake media")?;
        Ok(())
    }

    async fn run_ffprobe(&self, args: &[String]) -> MediaResult<Vec<u8>> {
        let path = args.last().unwrap();
        let probes = self.probes.lock().unwrap();
        let best = probes
            .iter()
            .filter(|(suffix, _)| path.ends_with(suffix.as_str()))
            .max_by_key(|(suffix, _)| suffix.len())
            .map(|(_, json)| json.clone());
        match best {
            Some(json) => Ok(json.into_bytes()),
            None => Err(MediaError::ffprobe_failed(
                format!("no canned probe for {}", path),
                None,
            )),
        }
    }
}

/// FFprobe JSON for a clip with the given facts.
pub(crate) fn probe_json(duration: f64, width: u32, height: u32, with_audio: bool) -> String {
    let audio = if with_audio {
        format!(r#", {{"codec_type": "audio", "duration": "{:.3}"}}"#, duration)
    } else {
        String::new()
    };
    format!(
        r#"{{
            "format": {{"duration": "{dur:.3}", "bit_rate": "520000"}},
            "streams": [
                {{"codec_type": "video", "width": {w}, "height": {h},
                  "duration": "{dur:.3}", "nb_frames": "{frames}",
                  "avg_frame_rate": "30/1"}}{audio}
            ]
        }}"#,
        dur = duration,
        w = width,
        h = height,
        frames = (duration * 30.0) as u64,
        audio = audio,
    )
}

/// A context rooted in a fresh temp dir with a fake transcoder.
pub(crate) fn test_context() -> (TempDir, RunContext, Arc<FakeTool>) {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let store = StateStore::new(&config.data_dir).unwrap();
    let tool = FakeTool::new();
    let ctx = RunContext {
        config,
        store,
        runner: tool.clone(),
        studies: StudyRegistry::default(),
    };
    (dir, ctx, tool)
}
