//! Filesystem helpers for the transform pipeline.

use std::path::Path;

use tokio::fs;
use tracing::warn;

use crate::error::{MediaError, MediaResult};

/// Create a directory (and parents) if it does not exist yet.
pub async fn ensure_dir(path: impl AsRef<Path>) -> MediaResult<()> {
    let path = path.as_ref();
    if !path.exists() {
        fs::create_dir_all(path).await?;
    }
    Ok(())
}

/// Move a file, falling back to copy+delete for cross-device moves.
///
/// Used to rename a video-only render into place when a clip has no usable
/// audio; session directories can live on a different volume than the
/// scratch space.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        ensure_dir(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        // EXDEV: copy to a temp file on the destination volume, then rename.
        Err(e) if e.raw_os_error() == Some(18) => {
            let tmp = dst.with_extension("tmp");
            fs::copy(src, &tmp).await?;
            fs::rename(&tmp, dst).await.map_err(|e| {
                let _ = std::fs::remove_file(&tmp);
                MediaError::from(e)
            })?;
            if let Err(e) = fs::remove_file(src).await {
                warn!("Could not remove {} after move: {}", src.display(), e);
            }
            Ok(())
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

/// Remove a file if it exists; failures are logged, not raised.
pub async fn remove_if_exists(path: impl AsRef<Path>) {
    let path = path.as_ref();
    if path.exists() {
        if let Err(e) = fs::remove_file(path).await {
            warn!("Could not remove {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_ensure_dir_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_dir(&nested).await.unwrap();
        ensure_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
    }

    #[tokio::test]
    async fn test_move_file() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("clip_video.mp4");
        let dst = dir.path().join("sess").join("clip_whole.mp4");
        fs::write(&src, b"payload").await.unwrap();

        move_file(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read(&dst).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_remove_if_exists_is_quiet() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("never-created.m4a");
        remove_if_exists(&path).await;

        fs::write(&path, b"x").await.unwrap();
        remove_if_exists(&path).await;
        assert!(!path.exists());
    }
}
