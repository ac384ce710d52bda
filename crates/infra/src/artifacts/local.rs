use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use minerep_reporting::ArtifactName;

use super::{ArtifactStore, ArtifactStoreError};

/// Artifacts as files in one fixed directory.
///
/// A body is written to a hidden staging file in the same directory, synced,
/// then renamed onto its final name. Rename within a directory is atomic, so
/// readers see the old state or the complete new file.
#[derive(Clone, Debug)]
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names are only ever built from job ids, so this never leaves `root`.
    pub fn path_for(&self, name: &ArtifactName) -> PathBuf {
        self.root.join(name.as_str())
    }

    pub async fn ensure_root(&self) -> Result<(), ArtifactStoreError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| ArtifactStoreError::io("create results directory", &self.root, e))
    }

    /// Remove staging files left by writes that never reached the rename
    /// (process killed mid-write). Returns how many were removed.
    pub async fn sweep_staging(&self) -> Result<usize, ArtifactStoreError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(ArtifactStoreError::io("list results directory", &self.root, e)),
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ArtifactStoreError::io("list results directory", &self.root, e))?
        {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') && name.ends_with(".tmp") {
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) => warn!(file = %name, error = %e, "could not remove staging file"),
                }
            }
        }
        Ok(removed)
    }

    async fn write_staging(&self, tmp: &Path, body: &[u8]) -> Result<(), ArtifactStoreError> {
        let mut file = tokio::fs::File::create(tmp)
            .await
            .map_err(|e| ArtifactStoreError::io("create staging file", tmp, e))?;
        file.write_all(body)
            .await
            .map_err(|e| ArtifactStoreError::io("write staging file", tmp, e))?;
        file.sync_all()
            .await
            .map_err(|e| ArtifactStoreError::io("sync staging file", tmp, e))?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn publish(&self, name: &ArtifactName, body: &[u8]) -> Result<(), ArtifactStoreError> {
        self.ensure_root().await?;

        let path = self.path_for(name);
        let tmp = self
            .root
            .join(name.staging_name(&Uuid::now_v7().simple().to_string()));

        if let Err(e) = self.write_staging(&tmp, body).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }

        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(ArtifactStoreError::io("publish artifact", &path, e));
        }

        debug!(artifact = %name, bytes = body.len(), "artifact published");
        Ok(())
    }

    async fn read(&self, name: &ArtifactName) -> Result<Option<Vec<u8>>, ArtifactStoreError> {
        let path = self.path_for(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ArtifactStoreError::io("read artifact", &path, e)),
        }
    }
}
