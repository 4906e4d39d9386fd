//! Per-run context.
//!
//! Everything the engines share — configuration, the snapshot store, the
//! tool runner, study configuration — lives on one context object built
//! once per run and passed by reference. No global caches.

use std::collections::BTreeMap;
use std::sync::Arc;

use owlet_media::{SystemRunner, ToolRunner};
use owlet_models::{RawVideoRecord, SessionCodingRecord, SessionKey, StudyConfig};
use owlet_store::StateStore;

use crate::config::OwletConfig;
use crate::error::CodingResult;
use crate::study::StudyRegistry;

/// The video snapshot: raw filename -> record.
pub type VideoData = BTreeMap<String, RawVideoRecord>;

/// The coding snapshot for one study: session key -> record.
pub type CodingData = BTreeMap<SessionKey, SessionCodingRecord>;

/// Shared state for one pipeline run.
pub struct RunContext {
    pub config: OwletConfig,
    pub store: StateStore,
    pub runner: Arc<dyn ToolRunner>,
    pub studies: StudyRegistry,
}

impl RunContext {
    /// Build a context with the real transcoder and default study registry.
    pub fn new(config: OwletConfig) -> CodingResult<Self> {
        let store = StateStore::new(&config.data_dir)?;
        Ok(Self {
            config,
            store,
            runner: Arc::new(SystemRunner::new()),
            studies: StudyRegistry::default(),
        })
    }

    /// Replace the tool runner (used by tests to inject fakes).
    pub fn with_runner(mut self, runner: Arc<dyn ToolRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Study configuration for a study id (defaults when unregistered).
    pub fn study_config(&self, study_id: &str) -> StudyConfig {
        self.studies.config_for(study_id)
    }
}
