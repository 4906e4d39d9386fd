//! The state store itself.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// One persisted snapshot.
///
/// Video, account, and email state are shared across studies; session,
/// coding, and batch state are per study.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreKey {
    Video,
    Accounts,
    Email,
    Sessions(String),
    Coding(String),
    Batches(String),
}

impl StoreKey {
    /// Snapshot filename for this key.
    pub fn filename(&self) -> String {
        match self {
            StoreKey::Video => "video_data.json".to_string(),
            StoreKey::Accounts => "accounts.json".to_string(),
            StoreKey::Email => "email_data.json".to_string(),
            StoreKey::Sessions(study) => format!("session_data_{}.json", study),
            StoreKey::Coding(study) => format!("coding_data_{}.json", study),
            StoreKey::Batches(study) => format!("batch_data_{}.json", study),
        }
    }
}

/// Snapshot persistence rooted at a data directory.
///
/// No locking and no cross-key transactions: a crash between two saves can
/// leave snapshots mutually inconsistent, which the pipeline tolerates
/// because reconciliation rebuilds stale cross-references on the next run.
#[derive(Debug, Clone)]
pub struct StateStore {
    data_dir: PathBuf,
}

impl StateStore {
    /// Open a store rooted at `data_dir` (created if missing).
    pub fn new(data_dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir).map_err(|e| StoreError::io(&data_dir, e))?;
        Ok(Self { data_dir })
    }

    /// Full path of a snapshot.
    pub fn path_for(&self, key: &StoreKey) -> PathBuf {
        self.data_dir.join(key.filename())
    }

    /// Load a snapshot, or its empty default when none has been saved yet.
    pub async fn load<T>(&self, key: &StoreKey) -> StoreResult<T>
    where
        T: DeserializeOwned + Default,
    {
        let path = self.path_for(key);
        if !path.exists() {
            debug!("No snapshot at {}, starting empty", path.display());
            return Ok(T::default());
        }
        let bytes = fs::read(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        serde_json::from_slice(&bytes).map_err(|e| StoreError::corrupt(&path, e))
    }

    /// Save a snapshot, backing up the previous version first.
    ///
    /// The write itself goes through a temp file and rename so a crash
    /// mid-write cannot corrupt the current snapshot.
    pub async fn save<T>(&self, key: &StoreKey, value: &T) -> StoreResult<()>
    where
        T: Serialize,
    {
        let path = self.path_for(key);
        if path.exists() {
            backup_file(&path, &self.data_dir.join("backups")).await?;
        }

        let bytes =
            serde_json::to_vec_pretty(value).map_err(|e| StoreError::corrupt(&path, e))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &bytes)
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        debug!("Saved snapshot {}", path.display());
        Ok(())
    }
}

/// Move `path` into `<backup_root>/<yyMMddHHmmss>/<filename>`.
///
/// A second backup of the same file within the same second silently
/// overwrites the first; accepted limitation.
pub async fn backup_file(path: &Path, backup_root: &Path) -> StoreResult<()> {
    let stamp = Utc::now().format("%y%m%d%H%M%S").to_string();
    let backup_dir = backup_root.join(stamp);
    fs::create_dir_all(&backup_dir)
        .await
        .map_err(|e| StoreError::io(&backup_dir, e))?;

    let filename = path
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_default();
    let backup_path = backup_dir.join(filename);
    fs::rename(path, &backup_path)
        .await
        .map_err(|e| StoreError::io(path, e))?;
    debug!("Backed up {} to {}", path.display(), backup_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_missing_yields_default() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path()).unwrap();
        let data: BTreeMap<String, String> = store
            .load(&StoreKey::Coding("studyA".into()))
            .await
            .unwrap();
        assert!(data.is_empty());
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path()).unwrap();
        let mut data = BTreeMap::new();
        data.insert("clip.flv".to_string(), 12.5_f64);

        store.save(&StoreKey::Video, &data).await.unwrap();
        let loaded: BTreeMap<String, f64> = store.load(&StoreKey::Video).await.unwrap();
        assert_eq!(loaded, data);
    }

    #[tokio::test]
    async fn test_save_backs_up_previous_version() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path()).unwrap();
        let key = StoreKey::Batches("studyA".into());

        store.save(&key, &vec![1]).await.unwrap();
        store.save(&key, &vec![1, 2]).await.unwrap();

        let backups = dir.path().join("backups");
        let backed_up: Vec<_> = std::fs::read_dir(&backups)
            .unwrap()
            .map(|stamp_dir| stamp_dir.unwrap().path().join("batch_data_studyA.json"))
            .filter(|path| path.exists())
            .collect();
        assert_eq!(backed_up.len(), 1);
        let old: Vec<i32> =
            serde_json::from_slice(&std::fs::read(&backed_up[0]).unwrap()).unwrap();
        assert_eq!(old, vec![1]);

        let current: Vec<i32> = store.load(&key).await.unwrap();
        assert_eq!(current, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_shared_keys_have_fixed_filenames() {
        assert_eq!(StoreKey::Video.filename(), "video_data.json");
        assert_eq!(StoreKey::Accounts.filename(), "accounts.json");
        assert_eq!(StoreKey::Email.filename(), "email_data.json");
        assert_eq!(
            StoreKey::Sessions("studyA".into()).filename(),
            "session_data_studyA.json"
        );
    }

    #[tokio::test]
    async fn test_per_study_keys_are_distinct() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path()).unwrap();
        store
            .save(&StoreKey::Coding("a".into()), &vec!["a"])
            .await
            .unwrap();
        store
            .save(&StoreKey::Coding("b".into()), &vec!["b"])
            .await
            .unwrap();
        let a: Vec<String> = store.load(&StoreKey::Coding("a".into())).await.unwrap();
        assert_eq!(a, vec!["a"]);
    }
}
