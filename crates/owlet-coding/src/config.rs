//! Pipeline configuration from environment variables.

use std::path::PathBuf;

use crate::error::{CodingError, CodingResult};

/// Everything the pipeline needs to know about its surroundings.
#[derive(Debug, Clone)]
pub struct OwletConfig {
    /// Directory raw uploads land in.
    pub video_dir: PathBuf,
    /// Root for per-session processed clips and artifacts.
    pub session_dir: PathBuf,
    /// Directory batch mp4s go in.
    pub batch_dir: PathBuf,
    /// Directory for state snapshots and their backups.
    pub data_dir: PathBuf,
    /// Directory coding sheets are exchanged through.
    pub coding_dir: PathBuf,
    /// Remote API base URL.
    pub api_base_url: String,
    /// Remote API token.
    pub api_token: String,
    /// Known coder names.
    pub coders: Vec<String>,
    /// Font file for burned-in labels; transcoder default when unset.
    pub label_font: Option<String>,
}

fn require(name: &str) -> CodingResult<String> {
    std::env::var(name).map_err(|_| CodingError::MissingEnv(name.to_string()))
}

impl OwletConfig {
    /// Read configuration from the environment and create the working
    /// directories.
    pub fn from_env() -> CodingResult<Self> {
        let config = Self {
            video_dir: require("VIDEO_DIR")?.into(),
            session_dir: require("SESSION_DIR")?.into(),
            batch_dir: require("BATCH_DIR")?.into(),
            data_dir: require("DATA_DIR")?.into(),
            coding_dir: require("CODING_DIR")?.into(),
            api_base_url: require("EXPERIMENTER_BASE_URL")?,
            api_token: require("EXPERIMENTER_TOKEN")?,
            coders: std::env::var("CODERS")
                .unwrap_or_default()
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            label_font: std::env::var("LABEL_FONT").ok(),
        };
        config.ensure_dirs()?;
        Ok(config)
    }

    fn ensure_dirs(&self) -> CodingResult<()> {
        for dir in [
            &self.video_dir,
            &self.session_dir,
            &self.batch_dir,
            &self.data_dir,
            &self.coding_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Whether a coder name is known.
    pub fn is_coder(&self, name: &str) -> bool {
        self.coders.iter().any(|c| c == name)
    }

    /// Path of the coding sheet for a study and coder.
    pub fn codesheet_path(&self, study: &str, coder: &str) -> PathBuf {
        self.coding_dir.join(format!("{}_{}.csv", study, coder))
    }

    /// Path of the exported accounts sheet.
    pub fn accountsheet_path(&self) -> PathBuf {
        self.coding_dir.join("accounts.csv")
    }

    /// Backup root for coding sheets.
    pub fn sheet_backup_root(&self) -> PathBuf {
        self.coding_dir.join("backups")
    }
}
